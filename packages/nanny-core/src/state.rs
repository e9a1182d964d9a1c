//! Station state: typed configuration, feature toggles, and the status
//! snapshot read by the HTTP collaborator.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

/// Typed configuration for one station process.
///
/// Produced by the binary's YAML loader; the core never touches the config
/// file itself.
#[derive(Debug, Clone)]
pub struct StationConfig {
    /// UDP server hostname or address.
    pub server: String,
    /// UDP server port.
    pub port: u16,
    /// Station callsign (up to 6 ASCII characters).
    pub callsign: String,
    /// Station SSID.
    pub ssid: u8,
    /// Linear gain applied before A-law encode (0.0 ..= 2.0).
    pub volume: f64,
    /// Attenuation applied to ducked sources (0.0 ..= 1.0).
    pub duck_scale: f64,
    /// Duck the microphone while a beacon or timed clip plays.
    pub duck_mic: bool,
    /// Duck music while a beacon or timed clip plays.
    pub duck_music: bool,
    /// Initial state of the mic capture toggle.
    pub record_mic: bool,
    /// Initial state of the inbound-voice recording toggle.
    pub record_voice: bool,
    /// Initial state of the music scheduler toggle.
    pub enable_music: bool,
    /// Initial state of the beacon scheduler toggle.
    pub enable_cron: bool,
    /// Initial state of the timed-clip scheduler toggle.
    pub enable_time_play: bool,
    /// Whether music starts playing or paused.
    pub music_playing: bool,
    /// Beacon WAV path (empty disables the beacon).
    pub beacon_file: PathBuf,
    /// Directory of `*-HHMM.wav` timed clips (empty disables).
    pub timed_dir: PathBuf,
    /// Music library directory of `*-NNNN.wav` tracks (empty disables).
    pub music_dir: PathBuf,
    /// Root directory for inbound voice recordings.
    pub recordings_dir: PathBuf,
    /// Cron expression driving the beacon.
    pub cron_expr: String,
    /// Port for the live WebSocket and status snapshot.
    pub web_port: u16,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: 60050,
            callsign: String::new(),
            ssid: 0,
            volume: 1.0,
            duck_scale: 0.3,
            duck_mic: false,
            duck_music: true,
            record_mic: false,
            record_voice: true,
            enable_music: true,
            enable_cron: true,
            enable_time_play: true,
            music_playing: true,
            beacon_file: PathBuf::new(),
            timed_dir: PathBuf::new(),
            music_dir: PathBuf::new(),
            recordings_dir: PathBuf::from("recordings"),
            cron_expr: String::new(),
            web_port: 8080,
        }
    }
}

impl StationConfig {
    /// Validates values the rest of the station assumes.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.is_empty() {
            return Err("Server must be set".into());
        }
        if self.callsign.is_empty() || self.callsign.len() > 6 {
            return Err(format!(
                "Callsign must be 1-6 characters, got {:?}",
                self.callsign
            ));
        }
        if !self.callsign.is_ascii() {
            return Err("Callsign must be ASCII".into());
        }
        if !(0.0..=2.0).contains(&self.volume) {
            return Err(format!("Volume must be within 0..2, got {}", self.volume));
        }
        if !(0.0..=1.0).contains(&self.duck_scale) {
            return Err(format!(
                "DuckScale must be within 0..1, got {}",
                self.duck_scale
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Toggles
// ─────────────────────────────────────────────────────────────────────────────

/// A feature flag with edge notification.
///
/// The flag itself is an atomic; every `set` also fires a capacity-1
/// signaling channel so a consumer can block on the channel and read the
/// atomic on wake. A full channel means a wake-up is already pending, so
/// the edge is still delivered within one cycle.
pub struct Toggle {
    flag: AtomicBool,
    notify_tx: mpsc::Sender<()>,
    notify_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl Toggle {
    pub fn new(initial: bool) -> Self {
        let (notify_tx, notify_rx) = mpsc::channel(1);
        Self {
            flag: AtomicBool::new(initial),
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
        }
    }

    pub fn get(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: bool) {
        self.flag.store(value, Ordering::Relaxed);
        let _ = self.notify_tx.try_send(());
    }

    /// Flips the flag and returns the new value.
    pub fn toggle(&self) -> bool {
        let value = !self.get();
        self.set(value);
        value
    }

    /// Hands the notification receiver to the single consumer of this flag.
    /// Subsequent calls return `None`.
    pub fn take_listener(&self) -> Option<mpsc::Receiver<()>> {
        self.notify_rx.lock().take()
    }
}

/// The station's five feature toggles.
pub struct Toggles {
    pub record_mic: Toggle,
    pub record_voice: Toggle,
    pub music: Toggle,
    pub cron: Toggle,
    pub time_play: Toggle,
}

// ─────────────────────────────────────────────────────────────────────────────
// Volume register
// ─────────────────────────────────────────────────────────────────────────────

/// Linear gain register shared by the mixer's encoder, the configuration
/// and the AT+VOLUME handler. Stored as `f64` bits in an atomic so the
/// 20 ms tick never takes a lock for it.
pub struct VolumeRegister(AtomicU64);

impl VolumeRegister {
    pub fn new(volume: f64) -> Self {
        Self(AtomicU64::new(volume.to_bits()))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, volume: f64) {
        self.0.store(volume.clamp(0.0, 2.0).to_bits(), Ordering::Relaxed);
    }

    /// Gain as the 0-100 integer scale AT+VOLUME speaks (50 = unity).
    pub fn percent(&self) -> u8 {
        (self.get() * 50.0).round().clamp(0.0, 100.0) as u8
    }

    /// Sets the gain from the 0-100 AT scale.
    pub fn set_percent(&self, percent: u8) {
        self.set(f64::from(percent.min(100)) / 50.0);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Status snapshot
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct PlayStatus {
    status: String,
    progress: u8,
    playing: bool,
    next_beacon: Option<String>,
}

/// Point-in-time view of the station, serialized on `/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub status: String,
    pub progress: u8,
    pub playing: bool,
    pub next_beacon: Option<String>,
    pub volume: f64,
    pub record_mic: bool,
    pub record_voice: bool,
    pub music_enabled: bool,
    pub cron_enabled: bool,
    pub time_play_enabled: bool,
    pub live_clients: usize,
}

/// Mutable station state shared across services.
pub struct StationState {
    pub toggles: Toggles,
    pub volume: VolumeRegister,
    pub duck_scale: f64,
    pub duck_mic: bool,
    pub duck_music: bool,
    status: Mutex<PlayStatus>,
}

impl StationState {
    pub fn new(config: &StationConfig) -> Self {
        Self {
            toggles: Toggles {
                record_mic: Toggle::new(config.record_mic),
                record_voice: Toggle::new(config.record_voice),
                music: Toggle::new(config.enable_music),
                cron: Toggle::new(config.enable_cron),
                time_play: Toggle::new(config.enable_time_play),
            },
            volume: VolumeRegister::new(config.volume),
            duck_scale: config.duck_scale,
            duck_mic: config.duck_mic,
            duck_music: config.duck_music,
            status: Mutex::new(PlayStatus {
                status: "Idle".to_string(),
                ..PlayStatus::default()
            }),
        }
    }

    /// Updates what is currently playing. `playing` reflects the music
    /// play/pause state for the UI button.
    pub fn set_play_status(&self, text: impl Into<String>, progress: u8, playing: bool) {
        let mut status = self.status.lock();
        status.status = text.into();
        status.progress = progress;
        status.playing = playing;
    }

    /// Updates the next beacon fire time shown on the status surface.
    pub fn set_next_beacon(&self, eta: Option<String>) {
        self.status.lock().next_beacon = eta;
    }

    /// Builds the snapshot served to the HTTP collaborator.
    pub fn snapshot(&self, live_clients: usize) -> StatusSnapshot {
        let status = self.status.lock().clone();
        StatusSnapshot {
            status: status.status,
            progress: status.progress,
            playing: status.playing,
            next_beacon: status.next_beacon,
            volume: self.volume.get(),
            record_mic: self.toggles.record_mic.get(),
            record_voice: self.toggles.record_voice.get(),
            music_enabled: self.toggles.music.get(),
            cron_enabled: self.toggles.cron.get(),
            time_play_enabled: self.toggles.time_play.get(),
            live_clients,
        }
    }
}
