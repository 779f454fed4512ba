//! Error types for the gowasm bridge

use std::fmt;
use thiserror::Error;

/// How an error relates to the state shared with the guest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Guest and host have desynchronized; the bridge must stop
    Fatal,
    /// A JavaScript-level failure the guest can observe and handle
    Recoverable,
    /// The host environment itself is broken
    Resource,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => write!(f, "fatal"),
            Severity::Recoverable => write!(f, "recoverable"),
            Severity::Resource => write!(f, "resource"),
        }
    }
}

/// Main error type for gowasm
#[derive(Error, Debug)]
pub enum Error {
    /// Linear memory access outside the guest's memory
    #[error("memory access out of bounds: {len} bytes at {addr} (memory size {size})")]
    OutOfBounds { addr: u64, len: u64, size: usize },

    /// A reference id the table never handed out
    #[error("reference {0} not found")]
    NotFound(u32),

    /// Guest and host disagree on the shape of the boundary
    #[error("ABI violation: {0}")]
    AbiViolation(String),

    /// Entry point that is reserved but deliberately not provided
    #[error("{0} is not implemented")]
    NotImplemented(String),

    /// Operation applied to a value kind that does not support it
    #[error("unsupported type: {operation} on {kind}")]
    UnsupportedType { operation: &'static str, kind: &'static str },

    /// A value did not have the kind the guest runtime assumed
    #[error("type mismatch: expected {expected}, got {found}")]
    TypeMismatch { expected: &'static str, found: &'static str },

    /// Property lookup on an object that lacks it
    #[error("missing property '{0}'")]
    PropertyMissing(String),

    /// Indexed access past the end of a container
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    /// JavaScript-style TypeError raised by a value operation
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Failure raised by a host function
    #[error("{0}")]
    Thrown(String),

    /// Host resource (random source, output descriptor) failed
    #[error("resource failure: {0}")]
    Resource(String),

    /// IO error
    #[error("IOError: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Bridge configuration could not be read
    #[error("ConfigError: {0}")]
    Config(String),

    /// Module loading, compilation or linking failed
    #[error("ModuleError: {0}")]
    Module(String),

    /// Error reported by the WebAssembly engine
    #[error("engine error: {0:#}")]
    Engine(anyhow::Error),

    /// Operation not allowed in the bridge's current state
    #[error("invalid bridge state: {0}")]
    State(String),

    /// The guest called its exit import
    #[error("guest exited with code {0}")]
    Exit(i32),

    /// The run was cancelled by the embedder
    #[error("run cancelled")]
    Cancelled,
}

impl Error {
    /// Create an ABI violation
    pub fn abi(message: impl Into<String>) -> Self {
        Error::AbiViolation(message.into())
    }

    /// Create a TypeError
    pub fn type_error(message: impl Into<String>) -> Self {
        Error::TypeError(message.into())
    }

    /// Create a not-implemented error for an entry point
    pub fn not_implemented(what: impl Into<String>) -> Self {
        Error::NotImplemented(what.into())
    }

    /// Create a resource failure
    pub fn resource(message: impl Into<String>) -> Self {
        Error::Resource(message.into())
    }

    /// Classify the error
    pub fn severity(&self) -> Severity {
        match self {
            Error::PropertyMissing(_)
            | Error::IndexOutOfRange { .. }
            | Error::TypeError(_)
            | Error::Thrown(_) => Severity::Recoverable,
            Error::Resource(_) | Error::Io { .. } => Severity::Resource,
            _ => Severity::Fatal,
        }
    }

    /// Whether the error must stop the bridge
    pub fn is_fatal(&self) -> bool {
        self.severity() != Severity::Recoverable
    }

    /// Recover a bridge error from an engine error, unwrapping traps raised by
    /// import handlers.
    pub fn from_engine(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(err) => Error::Engine(err),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::from_engine(err)
    }
}

/// Result type alias for gowasm
pub type Result<T> = std::result::Result<T, Error>;
