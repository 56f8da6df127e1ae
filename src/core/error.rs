use thiserror::Error;

/// Core error types for chainfold
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A jump target or start chain names a chain that is not in the universe
    #[error("Chain not defined: {0}")]
    ChainNotDefined(String),

    /// A jump leads back to a chain already on the current resolution path
    #[error("Chain cycle detected at '{name}' (path: {})", path.join(" -> "))]
    ChainCycleDetected { name: String, path: Vec<String> },

    /// Two chains in the same universe share a name
    #[error("Chain defined more than once: {0}")]
    DuplicateChain(String),

    /// Chain default policy other than ACCEPT/DROP
    #[error("Chain '{chain}' has unsupported default policy '{policy}'")]
    UnsupportedPolicy { chain: String, policy: String },

    /// Source is not a parseable CIDR
    #[error("Invalid source '{value}': {reason}")]
    InvalidSource { value: String, reason: String },

    /// Source parsed but is not IPv4
    #[error("Unsupported address family for '{0}' (only IPv4 sources are supported)")]
    UnsupportedAddressFamily(String),

    /// Port range with start > end or a zero port
    #[error("Invalid port range {start}-{end}")]
    InvalidPortRange { start: u16, end: u16 },

    /// Discovery input could not be parsed
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Strict flattening refused a result with skipped jump branches
    #[error("Chain '{chain}' resolved with {warnings} skipped jump branch(es)")]
    DegradedResolution { chain: String, warnings: usize },

    /// Snapshot operation failed
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Snapshot-specific errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Invalid snapshot name: {0}")]
    InvalidName(String),

    #[error("Snapshot not found: {0}")]
    NotFound(String),

    #[error("Snapshot too large: {0}")]
    TooLarge(String),

    #[error("Data directory not available")]
    DataDirUnavailable,
}

pub type Result<T> = std::result::Result<T, Error>;
