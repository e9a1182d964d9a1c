//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by the NRL21 wire format and the G.711 voice
//! contract; changing them would break interoperability with the network.

// ─────────────────────────────────────────────────────────────────────────────
// Audio contract
// ─────────────────────────────────────────────────────────────────────────────

/// Canonical voice sample rate (Hz). All PCM in the station is 8 kHz mono.
pub const SAMPLE_RATE: u32 = 8000;

/// Samples per mixer frame: 20 ms at 8 kHz.
pub const FRAME_SAMPLES: usize = 160;

/// Mixer scheduling period (ms). One frame is emitted per tick.
pub const TICK_MS: u64 = 20;

/// Anti-alias cutoff applied before resampling foreign capture rates (Hz).
pub const LOWPASS_CUTOFF_HZ: f32 = 3400.0;

/// Tap count of the windowed-sinc anti-alias filter.
pub const LOWPASS_TAPS: usize = 63;

/// DC-removal high-pass coefficient for the capture chain.
pub const DC_BLOCK_COEF: f32 = 0.995;

// ─────────────────────────────────────────────────────────────────────────────
// NRL21 wire format
// ─────────────────────────────────────────────────────────────────────────────

/// Every packet starts with these four bytes.
pub const NRL21_MAGIC: &[u8; 4] = b"NRL2";

/// Fixed header size preceding the payload.
pub const NRL21_HEADER_LEN: usize = 48;

/// Largest datagram the session reads or writes (fits one MTU).
pub const MAX_DATAGRAM: usize = 1460;

/// Device model byte stamped on every outbound packet.
pub const DEV_MODEL: u8 = 250;

/// Packet type: G.711 voice payload.
pub const PKT_VOICE: u8 = 1;

/// Packet type: heartbeat (empty payload).
pub const PKT_HEARTBEAT: u8 = 2;

/// Packet type: text message.
pub const PKT_TEXT: u8 = 5;

/// Packet type: AT command block.
pub const PKT_AT: u8 = 11;

/// Heartbeat cadence (seconds).
pub const HEARTBEAT_SECS: u64 = 2;

/// Banner opening every AT status reply.
pub const AT_BANNER: &str = "NRLNANNY V2.0\r\n";

// ─────────────────────────────────────────────────────────────────────────────
// Inbound voice handling
// ─────────────────────────────────────────────────────────────────────────────

/// Silence gap that ends a call: recorder segment boundary and the
/// voice-end watchdog both key off this (seconds).
pub const SILENCE_GAP_SECS: u64 = 2;

/// Recordings below this PCM size are discarded (2 s at 8 kHz / 16-bit).
pub const MIN_RECORD_BYTES: usize = 32000;

/// Recordings shorter than this are discarded (seconds).
pub const MIN_RECORD_SECS: u64 = 2;

// ─────────────────────────────────────────────────────────────────────────────
// Channels and queues
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of each mixer source channel (frames).
pub const SOURCE_CHANNEL_CAPACITY: usize = 3;

/// Per-client send queue of the live broadcast hub (frames).
pub const LIVE_CLIENT_QUEUE: usize = 256;

/// WebSocket write deadline per message (seconds).
pub const LIVE_WRITE_DEADLINE_SECS: u64 = 5;

// ─────────────────────────────────────────────────────────────────────────────
// Live broadcast frame types
// ─────────────────────────────────────────────────────────────────────────────

/// Live frame: linear PCM audio payload.
pub const MSG_AUDIO: u8 = 0x01;

/// Live frame: a call just became active.
pub const MSG_VOICE_START: u8 = 0x02;

/// Live frame: the active call went silent.
pub const MSG_VOICE_END: u8 = 0x03;
