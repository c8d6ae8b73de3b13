#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no purchase stored under key {0:?}")]
    NotFound(String),

    #[error("storage: {0}")]
    Storage(#[from] tally_api::StorageError),

    #[error("{0}")]
    Engine(#[from] tally_engine::EngineError),

    #[error("input: {0}")]
    Io(#[from] std::io::Error),

    #[error("output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("worker: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
