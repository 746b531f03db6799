//! Crate-wide error type.

pub type VectaResult<T> = Result<T, VectaError>;

#[derive(thiserror::Error, Debug)]
pub enum VectaError {
    #[error("load error: {0}")]
    Load(String),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("pool error: {0}")]
    Pool(String),

    #[error("decompress error: {0}")]
    Decompress(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VectaError {
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    pub fn surface(msg: impl Into<String>) -> Self {
        Self::Surface(msg.into())
    }

    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    pub fn decompress(msg: impl Into<String>) -> Self {
        Self::Decompress(msg.into())
    }
}
