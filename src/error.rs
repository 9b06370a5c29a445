use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("git executable not found on PATH: {0}")]
    GitMissing(String),

    #[error("mirror sync failed for {repo}: {detail}")]
    MirrorSync { repo: String, detail: String },

    #[error("index build failed: {0}")]
    IndexBuild(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type RagResult<T> = Result<T, RagError>;
