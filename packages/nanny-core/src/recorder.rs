//! Inbound voice recorder.
//!
//! One session is open at a time, keyed by the speaker (`CALLSIGN-SSID`).
//! A frame from a different speaker, or more than two seconds without
//! data, closes the session. Closed sessions are flushed to dated WAV
//! files; fragments under two seconds (or 32000 PCM bytes) are discarded.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::audio::wav;
use crate::protocol_constants::{MIN_RECORD_BYTES, MIN_RECORD_SECS, SILENCE_GAP_SECS};

struct Session {
    speaker: String,
    started: DateTime<Local>,
    buffer: Vec<u8>,
    last_data: Instant,
}

/// Segmenting recorder for inbound voice.
pub struct Recorder {
    root: PathBuf,
    session: Mutex<Option<Session>>,
}

impl Recorder {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            session: Mutex::new(None),
        }
    }

    /// Appends PCM data for a speaker, opening, continuing or rotating the
    /// session as needed.
    pub fn push(&self, speaker: &str, pcm: &[u8]) {
        if pcm.is_empty() {
            return;
        }
        let closed = {
            let mut guard = self.session.lock();
            if let Some(session) = guard.as_mut().filter(|s| s.speaker == speaker) {
                session.buffer.extend_from_slice(pcm);
                session.last_data = Instant::now();
                None
            } else {
                let previous = guard.take();
                log::info!("[Recorder] Recording started for {}", speaker);
                *guard = Some(Session {
                    speaker: speaker.to_string(),
                    started: Local::now(),
                    buffer: pcm.to_vec(),
                    last_data: Instant::now(),
                });
                previous
            }
        };
        // Flush outside the lock; the watchdog takes the same mutex.
        if let Some(session) = closed {
            self.flush(session);
        }
    }

    /// Closes the session if its last data is older than the silence gap.
    pub fn flush_if_idle(&self) {
        let closed = {
            let mut guard = self.session.lock();
            match guard.as_ref() {
                Some(s) if s.last_data.elapsed() > Duration::from_secs(SILENCE_GAP_SECS) => {
                    guard.take()
                }
                _ => None,
            }
        };
        if let Some(session) = closed {
            self.flush(session);
        }
    }

    /// Closes and flushes any open session unconditionally (shutdown path).
    pub fn flush_now(&self) {
        let closed = self.session.lock().take();
        if let Some(session) = closed {
            self.flush(session);
        }
    }

    fn flush(&self, session: Session) {
        let duration_secs = session.buffer.len() as u64 / 16000;
        if session.buffer.len() < MIN_RECORD_BYTES || duration_secs < MIN_RECORD_SECS {
            log::debug!(
                "[Recorder] Discarding {} fragment: {} bytes, {} s",
                session.speaker,
                session.buffer.len(),
                duration_secs
            );
            return;
        }

        let day = session.started.format("%Y-%m-%d").to_string();
        let dir = self.root.join(&day);
        if let Err(e) = std::fs::create_dir_all(&dir) {
            log::warn!("[Recorder] Cannot create {}: {}", dir.display(), e);
            return;
        }

        let filename = format!(
            "{}_{}_{}_{}s.wav",
            session.speaker,
            day,
            session.started.format("%H%M%S"),
            duration_secs
        );
        let path = dir.join(filename);
        match wav::write_recording(&path, &session.buffer) {
            Ok(()) => log::info!(
                "[Recorder] Saved {} ({} s) for {}",
                path.display(),
                duration_secs,
                session.speaker
            ),
            Err(e) => log::warn!("[Recorder] Flush failed, buffer discarded: {}", e),
        }
    }

    #[cfg(test)]
    fn age_session(&self, by: Duration) {
        if let Some(session) = self.session.lock().as_mut() {
            session.last_data -= by;
        }
    }
}

/// Periodic check that closes a session once the speaker has been silent
/// past the gap.
pub async fn run_watchdog(recorder: Arc<Recorder>, cancel: CancellationToken) {
    let mut ticker = interval(Duration::from_secs(SILENCE_GAP_SECS));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => recorder.flush_if_idle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// PCM bytes for `secs` seconds of constant tone.
    fn pcm(secs: usize) -> Vec<u8> {
        let samples = secs * 8000;
        let mut out = Vec::with_capacity(samples * 2);
        for _ in 0..samples {
            out.extend_from_slice(&1000i16.to_le_bytes());
        }
        out
    }

    fn files_under(root: &std::path::Path) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(days) = std::fs::read_dir(root) {
            for day in days.flatten() {
                if let Ok(files) = std::fs::read_dir(day.path()) {
                    for f in files.flatten() {
                        names.push(f.file_name().to_string_lossy().into_owned());
                    }
                }
            }
        }
        names.sort();
        names
    }

    #[test]
    fn speaker_change_splits_sessions() {
        let dir = tempdir().unwrap();
        let recorder = Recorder::new(dir.path().to_path_buf());
        recorder.push("N0CALL-7", &pcm(3));
        recorder.push("K1ABC-2", &pcm(2));
        recorder.flush_now();

        let names = files_under(dir.path());
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.starts_with("N0CALL-7_") && n.ends_with("_3s.wav")));
        assert!(names.iter().any(|n| n.starts_with("K1ABC-2_") && n.ends_with("_2s.wav")));
    }

    #[test]
    fn short_fragment_is_discarded() {
        let dir = tempdir().unwrap();
        let recorder = Recorder::new(dir.path().to_path_buf());
        recorder.push("N0CALL-7", &pcm(1));
        recorder.flush_now();
        assert!(files_under(dir.path()).is_empty());
    }

    #[test]
    fn undersized_buffer_is_discarded() {
        let dir = tempdir().unwrap();
        let recorder = Recorder::new(dir.path().to_path_buf());
        recorder.push("N0CALL-7", &vec![0u8; MIN_RECORD_BYTES - 2]);
        recorder.flush_now();
        assert!(files_under(dir.path()).is_empty());
    }

    #[test]
    fn exact_threshold_is_kept() {
        let dir = tempdir().unwrap();
        let recorder = Recorder::new(dir.path().to_path_buf());
        recorder.push("N0CALL-7", &vec![1u8; MIN_RECORD_BYTES]);
        recorder.flush_now();
        assert_eq!(files_under(dir.path()).len(), 1);
    }

    #[test]
    fn silence_gap_closes_the_session() {
        let dir = tempdir().unwrap();
        let recorder = Recorder::new(dir.path().to_path_buf());
        recorder.push("N0CALL-7", &pcm(3));

        // Not yet stale: nothing flushes
        recorder.flush_if_idle();
        assert!(files_under(dir.path()).is_empty());

        recorder.age_session(Duration::from_millis(2500));
        recorder.flush_if_idle();

        let names = files_under(dir.path());
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with("_3s.wav"));

        // A new call after the gap opens a second file
        recorder.push("N0CALL-7", &pcm(2));
        recorder.flush_now();
        assert_eq!(files_under(dir.path()).len(), 2);
    }

    #[test]
    fn files_land_under_dated_folder() {
        let dir = tempdir().unwrap();
        let recorder = Recorder::new(dir.path().to_path_buf());
        recorder.push("N0CALL-7", &pcm(2));
        recorder.flush_now();

        let today = Local::now().format("%Y-%m-%d").to_string();
        let day_dir = dir.path().join(&today);
        assert!(day_dir.is_dir());
        let names = files_under(dir.path());
        assert!(names[0].contains(&today));
    }
}
