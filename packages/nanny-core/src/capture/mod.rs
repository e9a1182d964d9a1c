//! Platform microphone capture.
//!
//! The device side is cpal's job (one backend per host); everything after
//! the callback - downmix, DC removal, anti-alias filtering, resampling to
//! the canonical 8 kHz mono stream - is the shared conditioning chain.

mod chain;
mod device;

pub use chain::ConditioningChain;
pub use device::spawn_capture;
