//! Live listening over WebSocket: the broadcast hub and its wire frame.

mod hub;

pub use hub::{build_frame, LiveHub};
