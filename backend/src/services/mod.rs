pub mod mentions;
pub mod pipeline;
pub mod privacy;
pub mod templates;
