use crate::handle::{Handle, ObjectCategory};
use crate::session::TrimPhase;
use std::io;
use thiserror::Error;

/// Errors raised while adding or replacing tracked objects.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrackError {
    #[error("{category} {handle} is already tracked")]
    AlreadyTracked {
        category: ObjectCategory,
        handle: Handle,
    },

    #[error("handle {handle} is tracked as {existing}, cannot track it as {requested}")]
    CategoryConflict {
        handle: Handle,
        existing: ObjectCategory,
        requested: ObjectCategory,
    },

    #[error("handle {handle} is not tracked")]
    NotTracked { handle: Handle },

    #[error("the null handle cannot be tracked as {category}")]
    NullHandle { category: ObjectCategory },
}

/// Failure to build a synthesized packet.
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("failed to encode arguments for {call}")]
    Encode {
        call: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("trim frame range {start}..{end} is empty")]
    EmptyFrameRange { start: u64, end: u64 },
}

/// Errors from the emit phases of a trim session.
#[derive(Debug, Error)]
pub enum TrimError {
    #[error("failed to write trace packet")]
    Write(#[from] io::Error),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("cannot {operation} while the session is {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: TrimPhase,
    },
}
