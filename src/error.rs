//! Error kinds produced by the control surface (C5), per spec §7.
//!
//! The teacher wraps everything in `io::Error` with a handful of
//! `ErrorKind`-tagged constructors (`other_io_error`, `invalid_data_io_error`,
//! ...). That doesn't scale to a domain with a dozen distinct, user-visible
//! failure modes, so here each gets its own variant instead.

use thiserror::Error;

use crate::name::Name;

/// Every way a control operation can fail.
#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("name is not a valid dotted `$.`-rooted path: {0:?}")]
    NameInvalid(String),

    #[error("name exceeds the configured maximum length ({len} > {max})")]
    NameTooLong { len: usize, max: usize },

    #[error("message body exceeds the per-write limit ({len} > {max})")]
    MessageTooLarge { len: usize, max: usize },

    #[error("replier pattern {new:?} intersects existing replier pattern {existing:?}")]
    ReplierConflict { new: Name, existing: Name },

    #[error("no such binding: endpoint {endpoint} / {role:?} {name:?}")]
    NoSuchBinding {
        endpoint: u32,
        role: crate::binding::Role,
        name: String,
    },

    #[error("no replier is bound for {0:?}")]
    AddressNotAvailable(String),

    #[error("connection refused: unsolicited or misdirected reply")]
    ConnectionRefused,

    #[error("recipient queue full")]
    Busy,

    #[error("recipient queue full, would block")]
    WouldBlock,

    #[error("sender has no free slot to reserve for a reply")]
    NoLocks,

    #[error("write issued while a previous send is still pending completion")]
    AlreadyInSend,

    #[error("send called with nothing composed")]
    NoMessage,

    #[error("invalid argument or contradictory flags")]
    Invalid(&'static str),

    #[error("endpoint {0} does not exist")]
    NoSuchEndpoint(u32),

    #[error("device {0} does not exist")]
    NoSuchDevice(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SwitchError>;
