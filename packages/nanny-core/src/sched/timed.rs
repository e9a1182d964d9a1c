//! Time-of-day clip scheduler.
//!
//! Watches a directory of `*-HHMM.wav` files and plays each at its
//! embedded wall-clock time. Every file gets a one-shot timer for the next
//! occurrence of `HH:MM` today (only if still in the future); create events
//! register timers, remove/rename events cancel them, and midnight cancels
//! everything and rescans so each file fires once per day. At most one
//! timer is pending per path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use notify::event::{EventKind, ModifyKind};
use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::stream_clip;
use crate::audio::sources::SourceSender;
use crate::state::StationState;

/// Parses the `-HHMM.wav` tail of a scheduled filename.
pub fn parse_clip_name(name: &str) -> Option<(u32, u32)> {
    let lower = name.to_ascii_lowercase();
    let stem = lower.strip_suffix(".wav")?;
    if stem.len() < 5 {
        return None;
    }
    let (head, digits) = stem.split_at(stem.len() - 4);
    if !head.ends_with('-') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: u32 = digits[..2].parse().ok()?;
    let minute: u32 = digits[2..].parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

/// Delay until `HH:MM` today, or `None` if that moment has passed.
fn delay_until(hour: u32, minute: u32, now: DateTime<Local>) -> Option<Duration> {
    let fire = Local
        .from_local_datetime(&now.date_naive().and_hms_opt(hour, minute, 0)?)
        .single()?;
    (fire > now).then(|| (fire - now).to_std().unwrap_or(Duration::ZERO))
}

/// Directory-watched scheduler for time-of-day clips.
pub struct TimedScheduler {
    dir: PathBuf,
    source: SourceSender,
    state: Arc<StationState>,
    pending: HashMap<PathBuf, CancellationToken>,
}

impl TimedScheduler {
    pub fn new(dir: PathBuf, source: SourceSender, state: Arc<StationState>) -> Self {
        Self {
            dir,
            source,
            state,
            pending: HashMap::new(),
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            log::warn!(
                "[Timed] Cannot create clip directory {}: {}",
                self.dir.display(),
                e
            );
            return;
        }

        let (event_tx, mut event_rx) = mpsc::channel(64);
        let mut watcher = match notify::recommended_watcher(move |res| {
            let _ = event_tx.blocking_send(res);
        }) {
            Ok(w) => w,
            Err(e) => {
                log::warn!("[Timed] Watcher failed: {}", e);
                return;
            }
        };
        if let Err(e) = watcher.watch(&self.dir, RecursiveMode::NonRecursive) {
            log::warn!("[Timed] Cannot watch {}: {}", self.dir.display(), e);
            return;
        }

        self.rescan(&cancel);
        log::info!("[Timed] Scheduler watching {}", self.dir.display());

        let mut midnight = Box::pin(tokio::time::sleep(super::until_next_midnight()));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = &mut midnight => {
                    log::info!("[Timed] Midnight, rescheduling all clips");
                    self.rescan(&cancel);
                    midnight = Box::pin(tokio::time::sleep(super::until_next_midnight()));
                }
                event = event_rx.recv() => match event {
                    Some(Ok(event)) => self.handle_event(event, &cancel),
                    Some(Err(e)) => log::warn!("[Timed] Watch error: {}", e),
                    None => break,
                }
            }
        }
        self.cancel_all();
    }

    fn handle_event(&mut self, event: notify::Event, cancel: &CancellationToken) {
        match event.kind {
            EventKind::Create(_) => {
                for path in event.paths {
                    self.schedule_file(path, cancel);
                }
            }
            EventKind::Remove(_) => {
                for path in event.paths {
                    self.cancel_file(&path);
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                // A rename arrives as name-change events on the old and/or
                // new path; reconcile against what is on disk.
                for path in event.paths {
                    if path.exists() {
                        self.schedule_file(path, cancel);
                    } else {
                        self.cancel_file(&path);
                    }
                }
            }
            _ => {}
        }
    }

    fn rescan(&mut self, cancel: &CancellationToken) {
        self.cancel_all();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("[Timed] Scan of {} failed: {}", self.dir.display(), e);
                return;
            }
        };
        let mut scheduled = 0;
        for entry in entries.flatten() {
            if entry.path().is_file() && self.schedule_file(entry.path(), cancel) {
                scheduled += 1;
            }
        }
        log::info!("[Timed] {} clip(s) scheduled for today", scheduled);
    }

    /// Registers the one-shot timer for a path. Replaces any pending timer
    /// for the same path.
    fn schedule_file(&mut self, path: PathBuf, cancel: &CancellationToken) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let Some((hour, minute)) = parse_clip_name(name) else {
            if name.to_ascii_lowercase().ends_with(".wav") {
                log::debug!("[Timed] Skipping {}: name does not match *-HHMM.wav", name);
            }
            return false;
        };
        let Some(delay) = delay_until(hour, minute, Local::now()) else {
            return false; // already past for today
        };

        self.cancel_file(&path);
        let token = cancel.child_token();
        self.pending.insert(path.clone(), token.clone());

        let source = self.source.clone();
        let state = Arc::clone(&self.state);
        log::info!(
            "[Timed] {} scheduled for {:02}:{:02} ({} s from now)",
            name,
            hour,
            minute,
            delay.as_secs()
        );
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if !state.toggles.time_play.get() {
                log::debug!("[Timed] Fire skipped, timed play disabled");
                return;
            }
            state.set_play_status("Timed clip playing...", 0, false);
            if let Err(e) = stream_clip(&path, &source, &token, |_, _| {}).await {
                log::warn!("[Timed] Clip rejected: {}", e);
            }
            state.set_play_status("Idle", 0, false);
        });
        true
    }

    fn cancel_file(&mut self, path: &Path) {
        if let Some(token) = self.pending.remove(path) {
            token.cancel();
        }
    }

    fn cancel_all(&mut self) {
        for (_, token) in self.pending.drain() {
            token.cancel();
        }
    }
}
