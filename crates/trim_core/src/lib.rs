//! Trim Core
//!
//! State tracking for frame-range trimming of API traces:
//! - Object state tracker and derived queries
//! - Reference recording for the trim window
//! - Packet recording and synthesized packets
//! - Snapshot and emit of the trimmed stream
//! - The trim session state machine

pub mod allocator;
pub mod emit;
pub mod error;
pub mod handle;
pub mod object;
pub mod packet;
pub mod query;
pub mod reference;
pub mod session;
pub mod tracker;

pub use allocator::{AllocatorCallbacks, AllocatorId, AllocatorRegistry};
pub use emit::TrimStats;
pub use error::{ConfigError, PacketError, TrackError, TrimError};
pub use handle::{Handle, ObjectCategory};
pub use object::{ObjectInfo, ObjectPayload};
pub use packet::{MemorySink, NullSink, Packet, PacketRecorder, PacketSink};
pub use session::{FrameRange, ImageCreationPolicy, TrimConfig, TrimPhase, TrimSession};
pub use tracker::StateTracker;

pub use ash::vk;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
