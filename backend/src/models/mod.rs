pub mod candidates;
pub mod workflows;

pub use candidates::{CandidateRow, CANDIDATE_COLUMNS};
pub use workflows::{ExecutionRow, WorkflowRow, EXECUTION_COLUMNS, WORKFLOW_COLUMNS};
