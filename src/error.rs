use thiserror::Error;

#[derive(Debug, Error)]
pub enum C2eError {
    /// Structural corruption: bad magic, truncated payload, bad sentinel.
    #[error("format: {0}")]
    Format(String),

    /// A read past the end of the buffer.
    #[error("read of {wanted} bytes at position {position} exceeds buffer of {size} bytes")]
    Bounds {
        position: usize,
        wanted: usize,
        size: usize,
    },

    /// The operation is deliberately not implemented for this data.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A container already holds a block with this name.
    #[error("duplicate block name: {0}")]
    DuplicateName(String),

    /// A count field from untrusted input exceeds the defensive bound.
    #[error("{what} of {value} exceeds sanity limit {limit}")]
    SanityLimit {
        what: &'static str,
        value: usize,
        limit: usize,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type C2eResult<T> = Result<T, C2eError>;
