//! Wire protocol: client frames in, `version`/`event`/`result` messages out.

pub mod errors;
pub mod incoming;
pub mod outgoing;

pub use errors::{CommandError, ErrorCode};
pub use incoming::{parse_frame, Command, FrameError, IncomingMessage};
pub use outgoing::{OutgoingMessage, ResultMessage, VersionMessage};

/// Oldest schema version the snapshotter can render.
pub const MIN_SCHEMA_VERSION: u32 = 0;
/// Newest schema version the snapshotter can render.
pub const MAX_SCHEMA_VERSION: u32 = 33;
/// First schema version that receives typed `errorCode`s instead of having
/// every failure folded into `zwave_error`.
pub const STRUCTURED_ERRORS_SINCE: u32 = 32;

/// Version reported in the `serverVersion` banner field.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
