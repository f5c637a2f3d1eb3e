use thiserror::Error;

/// Unified error kind for every collaborator in the mesh intelligence
/// pipeline (spec §7). Transport-layer errors are mapped into one of
/// these at the boundary where they're produced; nothing above that
/// boundary throws.
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("circuit breaker open, retry after {retry_after:?}")]
    CircuitOpen { retry_after: std::time::Duration },

    #[error("operation cancelled")]
    Cancelled,

    #[error("malformed device output: {sample}")]
    Parse { sample: String },

    #[error("unknown suggestion token: {0}")]
    UnknownSuggestion(String),

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("unknown node: {0}")]
    UnknownNode(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type MeshResult<T> = std::result::Result<T, MeshError>;

impl MeshError {
    /// Build a `Parse` error, truncating the offending sample so logs
    /// never carry an unbounded device dump (spec §7: "logged with a
    /// truncated sample").
    pub fn parse(sample: impl AsRef<str>) -> Self {
        const MAX: usize = 200;
        let s = sample.as_ref();
        let mut end = s.len().min(MAX);
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        let truncated = if s.len() > end {
            format!("{}…", &s[..end])
        } else {
            s[..end].to_string()
        };
        MeshError::Parse { sample: truncated }
    }
}
