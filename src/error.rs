use std::path::PathBuf;

/// Errors that abort parsing or assembling a node outright.
///
/// `validate()` never returns these; it returns [`ValidationError`]
/// instead, since a validation pass is defined to never short-circuit
/// tree construction (see the Propagation rules this crate implements).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("buffer too small: need at least {need} bytes, have {have}")]
    ShortBuffer { need: usize, have: usize },

    #[error("{0}")]
    BadSignature(&'static str),

    #[error("section size mismatch! Section has size {declared}, but buffer is {actual} bytes big")]
    InvalidSize { declared: u64, actual: usize },

    #[error("checksum does not sum to zero")]
    OddLength,

    #[error("FV capacity exceeded: need {need} bytes, volume declares {capacity}")]
    FvCapacityExceeded { need: usize, capacity: usize },

    #[error("GUID-defined section requests unsupported compression GUID {0}")]
    UnsupportedCompression(String),

    #[error("codec failed: {0}")]
    CodecError(String),

    #[error("DEPEX opcode stream did not terminate with END")]
    DepexNoEnd,

    #[error("invalid UUID string {0:?}")]
    BadUuid(String),

    #[error("arithmetic overflow while computing a size or offset")]
    Arithmetic,

    #[error("no node found at extracted path {0:?}")]
    MissingExtractPath(PathBuf),

    #[error("malformed summary.json: {0}")]
    Summary(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A validation finding: never fatal to tree construction, only to
/// whatever the CLI driver decides to do once one has been found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    BadChecksum(String),
    DepexNoEnd(String),
    UnknownFileSystemGuid(String),
    Other(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadChecksum(s) => write!(f, "{s}"),
            Self::DepexNoEnd(s) => write!(f, "{s}"),
            Self::UnknownFileSystemGuid(s) => write!(f, "{s}"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}
