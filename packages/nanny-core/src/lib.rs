//! NRL Nanny core - voice relay and beacon station for the NRL21 network.
//!
//! The station speaks the NRL21 UDP device protocol with a central server,
//! mixing four local PCM sources - a cron-fired beacon, time-of-day clips,
//! a music playlist and the microphone - into the outbound A-law voice
//! stream, while teeing inbound voice to per-speaker WAV recordings and to
//! browser listeners over WebSocket.
//!
//! # Architecture
//!
//! - [`codec`]: G.711 A-law tables, the NRL21 packet format, AT blocks
//! - [`net`]: UDP session, heartbeat, and the inbound packet router
//! - [`audio`]: the 20 ms frame unit, source channels, WAV I/O
//! - [`mixer`]: fixed-cadence fusion of the four sources
//! - [`capture`]: microphone input and the conditioning chain
//! - [`sched`]: beacon, timed-clip and music schedulers
//! - [`recorder`]: segmenting inbound-voice recorder
//! - [`live`]: WebSocket fan-out hub for browser listeners
//! - [`state`]: toggles, volume register, status snapshot
//! - [`station`]: composition root wiring it all together

#![warn(clippy::all)]

pub mod api;
pub mod audio;
pub mod capture;
pub mod codec;
pub mod error;
pub mod live;
pub mod mixer;
pub mod net;
pub mod protocol_constants;
pub mod recorder;
pub mod sched;
pub mod state;
pub mod station;

// Re-export commonly used types at the crate root
pub use codec::nrl21::Identity;
pub use error::{NannyError, NannyResult};
pub use live::LiveHub;
pub use recorder::Recorder;
pub use sched::music::{MusicCommand, MusicControl};
pub use state::{StationConfig, StationState, StatusSnapshot};
pub use station::Station;
