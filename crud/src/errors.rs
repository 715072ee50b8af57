/// Errors are cloned into every request of a failed batch.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CrudError {
    #[error("database read on {db_alias}:{col} failed: {message}")]
    ReadFailed {
        db_alias: String,
        col: String,
        message: String,
    },

    #[error("merged read returned {0} instead of a list of documents")]
    UnexpectedResult(&'static str),

    #[error("batch was cancelled")]
    Cancelled,

    #[error("data loader for {0} has shut down")]
    LoaderClosed(String),
}
