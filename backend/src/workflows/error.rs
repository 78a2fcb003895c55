use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid action params: {0}")]
    InvalidParams(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned status {0}")]
    WebhookStatus(u16),

    #[error("event queue error: {0}")]
    Queue(String),
}

pub type AutomationResult<T> = Result<T, AutomationError>;
