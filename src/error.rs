//! Crate-wide error types, one enum per concern, following the source's
//! module-per-concern convention (see `ConfigError` in the teacher crate).

use thiserror::Error;

/// Precondition violations inside [`crate::state::State`].
///
/// A correctly driven reactor never triggers these; they exist so that a bug
/// in the reactor's own bookkeeping surfaces as a clear panic instead of
/// silently corrupting the broker's state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("name {0:?} is already owned, cannot add candidate twice for the same channel")]
    DuplicateCandidate(Vec<u8>),

    #[error("name {0:?} has no owner")]
    NameNotOwned(Vec<u8>),

    #[error("interest level for ({0:?}, {1:?}) is already zero")]
    InterestUnderflow(Vec<u8>, Vec<u8>),

    #[error("post id space exhausted after {0} allocations")]
    PostIdSpaceExhausted(u64),

    #[error("unknown post id {0}")]
    UnknownPost(u32),
}

/// Errors surfaced by the [`crate::channel::Channel`] handle.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("cannot put a verb upstream on a closed channel")]
    ClosedChannel,

    #[error("invariant violated: {0}")]
    Invariant(#[from] StateError),
}

/// Wire-codec failures for a transport's decoder.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown packet type 0x{0:02x}")]
    UnknownPacketType(u8),

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("field {field} exceeds frame size ({size} > {limit})")]
    FieldTooLarge {
        field: &'static str,
        size: usize,
        limit: usize,
    },

    #[error("unexpected character {0:?} in telnet command")]
    UnexpectedCharacter(char),

    #[error("malformed {0} argument")]
    MalformedArgument(&'static str),

    #[error("missing required argument {0}")]
    MissingArgument(&'static str),

    #[error("line exceeds maximum length of {0} bytes")]
    LineTooLong(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// CLI / process wiring failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address {0:?}: {1}")]
    InvalidAddress(String, std::net::AddrParseError),

    #[error("timeout value must be positive, got {0}")]
    InvalidTimeout(f64),
}
