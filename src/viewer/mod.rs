//! Viewer: one camera session at a time
//!
//! `ViewerController` owns the current `ViewerSession` (signaling channel +
//! peer connection) and runs the per-session state machine:
//!
//! ```text
//! Idle -> Connecting -> SignalingOpen -> OfferSent -> Answered -> Streaming
//!   \__________\______________\______________\___________\_________\--> Closed
//! ```

pub mod controller;
pub mod session;
pub mod sink;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{ViewerController, ViewerDeps};
pub use session::ViewerSession;
pub use sink::{TrackSink, VideoSink};
pub use state::{ViewerState, ViewerStatus};
