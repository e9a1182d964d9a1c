//! Station configuration.
//!
//! Loaded from a YAML file whose keys live under a `System` mapping, then
//! converted into the core's typed config. Port-like values are carried as
//! strings in the file for compatibility with existing deployments.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nanny_core::StationConfig;
use serde::Deserialize;

/// On-disk configuration document.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(rename = "System", default)]
    pub system: SystemSection,
}

/// The `System:` mapping of the config file.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SystemSection {
    #[serde(rename = "Server")]
    pub server: String,
    #[serde(rename = "Port")]
    pub port: String,
    #[serde(rename = "Callsign")]
    pub callsign: String,
    #[serde(rename = "SSID")]
    pub ssid: u8,
    #[serde(rename = "Volume")]
    pub volume: f64,
    #[serde(rename = "DuckScale")]
    pub duck_scale: f64,
    #[serde(rename = "DuckMicPCM")]
    pub duck_mic_pcm: bool,
    #[serde(rename = "DuckMusicPCM")]
    pub duck_music_pcm: bool,
    #[serde(rename = "RecordMic")]
    pub record_mic: bool,
    #[serde(rename = "RecordVoice")]
    pub record_voice: bool,
    #[serde(rename = "EnableMusic")]
    pub enable_music: bool,
    #[serde(rename = "EnableCron")]
    pub enable_cron: bool,
    #[serde(rename = "EnableTimePlay")]
    pub enable_time_play: bool,
    #[serde(rename = "MusicPlaying")]
    pub music_playing: bool,
    #[serde(rename = "AudioFile")]
    pub audio_file: String,
    #[serde(rename = "AudioFilePath")]
    pub audio_file_path: String,
    #[serde(rename = "MusicFilePath")]
    pub music_file_path: String,
    #[serde(rename = "RecoderFilePath")]
    pub recoder_file_path: String,
    #[serde(rename = "CronString")]
    pub cron_string: String,
    #[serde(rename = "WebPort")]
    pub web_port: String,
}

impl Default for SystemSection {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: "60050".to_string(),
            callsign: String::new(),
            ssid: 0,
            volume: 1.0,
            duck_scale: 0.3,
            duck_mic_pcm: false,
            duck_music_pcm: true,
            record_mic: false,
            record_voice: true,
            enable_music: true,
            enable_cron: true,
            enable_time_play: true,
            music_playing: true,
            audio_file: String::new(),
            audio_file_path: String::new(),
            music_file_path: String::new(),
            recoder_file_path: "recordings".to_string(),
            cron_string: String::new(),
            web_port: "8080".to_string(),
        }
    }
}

impl ConfigFile {
    /// Loads and parses the YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Converts to the core's typed config, parsing the stringly ports.
    pub fn to_core_config(&self) -> Result<StationConfig> {
        let s = &self.system;
        let port: u16 = s
            .port
            .parse()
            .with_context(|| format!("Port is not a valid port number: {:?}", s.port))?;
        let web_port: u16 = s
            .web_port
            .parse()
            .with_context(|| format!("WebPort is not a valid port number: {:?}", s.web_port))?;
        Ok(StationConfig {
            server: s.server.clone(),
            port,
            callsign: s.callsign.clone(),
            ssid: s.ssid,
            volume: s.volume,
            duck_scale: s.duck_scale,
            duck_mic: s.duck_mic_pcm,
            duck_music: s.duck_music_pcm,
            record_mic: s.record_mic,
            record_voice: s.record_voice,
            enable_music: s.enable_music,
            enable_cron: s.enable_cron,
            enable_time_play: s.enable_time_play,
            music_playing: s.music_playing,
            beacon_file: PathBuf::from(&s.audio_file),
            timed_dir: PathBuf::from(&s.audio_file_path),
            music_dir: PathBuf::from(&s.music_file_path),
            recordings_dir: PathBuf::from(&s.recoder_file_path),
            cron_expr: s.cron_string.clone(),
            web_port,
        })
    }
}
