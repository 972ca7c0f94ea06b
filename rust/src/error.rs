#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },
    #[error("malformed {stream} payload: {reason}")]
    MalformedEvent { stream: &'static str, reason: String },
    #[error("graphql error: {}", .0.join("; "))]
    GraphQl(Vec<String>),
    #[error("response carries no data for `{0}`")]
    MissingData(&'static str),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}
