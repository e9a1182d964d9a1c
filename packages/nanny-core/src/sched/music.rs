//! Music playlist scheduler.
//!
//! The library is a directory of `*-NNNN.wav` tracks played in ascending
//! id order with wrap-around. The playlist is rebuilt at startup and each
//! midnight, and updated incrementally from filesystem events in between.
//! Control signals (next, prev, pause, play-id) arrive on a single-slot
//! queue and take effect at the next frame boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::{EventKind, ModifyKind};
use notify::{RecursiveMode, Watcher};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audio::sources::SourceSender;
use crate::audio::{self, wav};
use crate::state::StationState;

/// Control signal for the player. Senders never block; a full slot means a
/// command is already waiting and the new one is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicCommand {
    Next,
    Prev,
    PauseToggle,
    PlayId(u32),
}

/// Cloneable handle used by the UI and the AT dispatcher.
#[derive(Clone)]
pub struct MusicControl {
    tx: mpsc::Sender<MusicCommand>,
}

impl MusicControl {
    /// Non-blocking send; returns whether the command was accepted.
    pub fn send(&self, command: MusicCommand) -> bool {
        self.tx.try_send(command).is_ok()
    }
}

/// One playable track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicTrack {
    pub path: PathBuf,
    pub id: u32,
}

/// Parses the `-NNNN.wav` tail of a track filename.
pub fn parse_track_name(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let stem = lower.strip_suffix(".wav")?;
    if stem.len() < 5 {
        return None;
    }
    let (head, digits) = stem.split_at(stem.len() - 4);
    if !head.ends_with('-') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Ordered track set. Ids need not be contiguous or unique; play order is
/// ascending with wrap-around.
#[derive(Debug, Default)]
pub struct Playlist {
    tracks: Vec<MusicTrack>,
}

impl Playlist {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Adds or re-adds a track, keeping the ascending order.
    pub fn insert(&mut self, track: MusicTrack) {
        self.tracks.retain(|t| t.path != track.path);
        let at = self.tracks.partition_point(|t| t.id <= track.id);
        self.tracks.insert(at, track);
    }

    pub fn remove(&mut self, path: &Path) {
        self.tracks.retain(|t| t.path != path);
    }

    /// Replaces the whole set (full rescan).
    pub fn replace(&mut self, mut tracks: Vec<MusicTrack>) {
        tracks.sort_by_key(|t| t.id);
        self.tracks = tracks;
    }

    /// Minimum id strictly greater than `current`, wrapping to the absolute
    /// minimum. `None` current means "start of the rotation".
    pub fn next_after(&self, current: Option<u32>) -> Option<MusicTrack> {
        match current {
            Some(id) => self
                .tracks
                .iter()
                .find(|t| t.id > id)
                .or_else(|| self.tracks.first()),
            None => self.tracks.first(),
        }
        .cloned()
    }

    /// Maximum id strictly less than `current`, wrapping to the absolute
    /// maximum.
    pub fn prev_before(&self, current: Option<u32>) -> Option<MusicTrack> {
        match current {
            Some(id) => self
                .tracks
                .iter()
                .rev()
                .find(|t| t.id < id)
                .or_else(|| self.tracks.last()),
            None => self.tracks.last(),
        }
        .cloned()
    }

    pub fn by_id(&self, id: u32) -> Option<MusicTrack> {
        self.tracks.iter().find(|t| t.id == id).cloned()
    }
}

fn scan_library(dir: &Path) -> Vec<MusicTrack> {
    let mut tracks = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return tracks;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(id) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_track_name)
        {
            tracks.push(MusicTrack { path, id });
        }
    }
    tracks
}

/// What ended a track.
enum TrackOutcome {
    Finished,
    Aborted(MusicCommand),
    Failed,
    Stopped,
}

/// Which track to pick next.
enum Selection {
    Forward,
    Backward,
    Specific(u32),
}

/// The playback half of the scheduler. One per station.
pub struct MusicPlayer {
    dir: PathBuf,
    source: SourceSender,
    state: Arc<StationState>,
    playlist: Arc<RwLock<Playlist>>,
    commands: mpsc::Receiver<MusicCommand>,
    update_rx: mpsc::Receiver<()>,
    update_tx: mpsc::Sender<()>,
    paused: bool,
    current_id: Option<u32>,
}

impl MusicPlayer {
    pub fn new(
        dir: PathBuf,
        source: SourceSender,
        state: Arc<StationState>,
        playing: bool,
    ) -> (Self, MusicControl) {
        let (cmd_tx, commands) = mpsc::channel(1);
        let (update_tx, update_rx) = mpsc::channel(1);
        (
            Self {
                dir,
                source,
                state,
                playlist: Arc::new(RwLock::new(Playlist::default())),
                commands,
                update_rx,
                update_tx,
                paused: !playing,
                current_id: None,
            },
            MusicControl { tx: cmd_tx },
        )
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            log::warn!(
                "[Music] Cannot create library directory {}: {}",
                self.dir.display(),
                e
            );
            return;
        }

        {
            let tracks = scan_library(&self.dir);
            log::info!("[Music] Library scan found {} track(s)", tracks.len());
            self.playlist.write().replace(tracks);
        }
        tokio::spawn(watch_library(
            self.dir.clone(),
            Arc::clone(&self.playlist),
            self.update_tx.clone(),
            cancel.child_token(),
        ));

        let mut enabled_listener = self.state.toggles.music.take_listener();
        let mut pending = Selection::Forward;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if !self.state.toggles.music.get() {
                self.state.set_play_status("Music off", 0, false);
                match enabled_listener.as_mut() {
                    Some(listener) => {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = listener.recv() => {}
                        }
                    }
                    None => tokio::time::sleep(Duration::from_secs(1)).await,
                }
                continue;
            }

            let track = {
                let playlist = self.playlist.read();
                match pending {
                    Selection::Forward => playlist.next_after(self.current_id),
                    Selection::Backward => playlist.prev_before(self.current_id),
                    Selection::Specific(id) => playlist
                        .by_id(id)
                        .or_else(|| playlist.next_after(self.current_id)),
                }
            };
            pending = Selection::Forward;

            let Some(track) = track else {
                log::debug!("[Music] Library empty, waiting for tracks");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = self.update_rx.recv() => {}
                    _ = tokio::time::sleep(Duration::from_secs(10)) => {}
                }
                continue;
            };

            self.current_id = Some(track.id);
            match self.play_track(&track, &cancel).await {
                TrackOutcome::Finished => {
                    if let Some(next) = self.quiesce(&cancel).await {
                        pending = next;
                    }
                }
                TrackOutcome::Aborted(MusicCommand::Prev) => pending = Selection::Backward,
                TrackOutcome::Aborted(MusicCommand::PlayId(id)) => {
                    pending = Selection::Specific(id)
                }
                TrackOutcome::Aborted(_) => {}
                TrackOutcome::Failed => {
                    log::warn!(
                        "[Music] Removing unreadable track {}",
                        track.path.display()
                    );
                    self.playlist.write().remove(&track.path);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                TrackOutcome::Stopped => {}
            }
        }
        self.state.set_play_status("Idle", 0, false);
    }

    async fn play_track(&mut self, track: &MusicTrack, cancel: &CancellationToken) -> TrackOutcome {
        let samples = match wav::read_clip(&track.path) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("[Music] {}", e);
                return TrackOutcome::Failed;
            }
        };
        let frames: Vec<audio::Frame> = audio::frames(&samples).collect();
        let total = frames.len().max(1);
        let name = track
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        log::info!("[Music] Playing {} (id {:04})", name, track.id);
        self.state
            .set_play_status(format!("Playing {}", name), 0, !self.paused);

        for (i, frame) in frames.into_iter().enumerate() {
            // While paused nothing is fed; the file stays loaded and the
            // control queue stays responsive.
            while self.paused {
                self.state.set_play_status(format!("Paused {}", name), (i * 100 / total) as u8, false);
                tokio::select! {
                    _ = cancel.cancelled() => return TrackOutcome::Stopped,
                    cmd = self.commands.recv() => match cmd {
                        Some(MusicCommand::PauseToggle) => {
                            self.paused = false;
                            self.state.set_play_status(format!("Playing {}", name), (i * 100 / total) as u8, true);
                        }
                        Some(other) => return TrackOutcome::Aborted(other),
                        None => return TrackOutcome::Stopped,
                    }
                }
            }

            if !self.state.toggles.music.get() {
                return TrackOutcome::Stopped;
            }

            tokio::select! {
                _ = cancel.cancelled() => return TrackOutcome::Stopped,
                cmd = self.commands.recv() => match cmd {
                    Some(MusicCommand::PauseToggle) => self.paused = true,
                    Some(other) => return TrackOutcome::Aborted(other),
                    None => return TrackOutcome::Stopped,
                },
                sent = self.source.feed(frame) => {
                    if !sent {
                        return TrackOutcome::Stopped;
                    }
                    if (i + 1) % 50 == 0 {
                        self.state.set_play_status(
                            format!("Playing {}", name),
                            ((i + 1) * 100 / total) as u8,
                            true,
                        );
                    }
                }
            }
        }
        TrackOutcome::Finished
    }

    /// One second of quiet between tracks. Commands arriving during the
    /// gap decide the next selection.
    async fn quiesce(&mut self, cancel: &CancellationToken) -> Option<Selection> {
        let gap = tokio::time::sleep(Duration::from_secs(1));
        tokio::pin!(gap);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = &mut gap => return None,
                cmd = self.commands.recv() => match cmd {
                    Some(MusicCommand::PauseToggle) => self.paused = !self.paused,
                    Some(MusicCommand::Next) => return Some(Selection::Forward),
                    Some(MusicCommand::Prev) => return Some(Selection::Backward),
                    Some(MusicCommand::PlayId(id)) => return Some(Selection::Specific(id)),
                    None => return None,
                }
            }
        }
    }
}

/// Incremental library watcher plus the midnight full rescan.
async fn watch_library(
    dir: PathBuf,
    playlist: Arc<RwLock<Playlist>>,
    update_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
) {
    let (event_tx, mut event_rx) = mpsc::channel(64);
    let mut watcher = match notify::recommended_watcher(move |res| {
        let _ = event_tx.blocking_send(res);
    }) {
        Ok(w) => w,
        Err(e) => {
            log::warn!("[Music] Watcher failed: {}", e);
            return;
        }
    };
    if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
        log::warn!("[Music] Cannot watch {}: {}", dir.display(), e);
        return;
    }
    log::info!("[Music] Watching {} for library changes", dir.display());

    let mut midnight = Box::pin(tokio::time::sleep(super::until_next_midnight()));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = &mut midnight => {
                let tracks = scan_library(&dir);
                log::info!("[Music] Midnight rescan found {} track(s)", tracks.len());
                playlist.write().replace(tracks);
                let _ = update_tx.try_send(());
                midnight = Box::pin(tokio::time::sleep(super::until_next_midnight()));
            }
            event = event_rx.recv() => match event {
                Some(Ok(event)) => {
                    handle_library_event(event, &playlist, &update_tx);
                }
                Some(Err(e)) => log::warn!("[Music] Watch error: {}", e),
                None => break,
            }
        }
    }
}

fn handle_library_event(
    event: notify::Event,
    playlist: &Arc<RwLock<Playlist>>,
    update_tx: &mpsc::Sender<()>,
) {
    let added = |path: &PathBuf| -> Option<MusicTrack> {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_track_name)
            .map(|id| MusicTrack {
                path: path.clone(),
                id,
            })
    };

    match event.kind {
        EventKind::Create(_) => {
            for path in &event.paths {
                if let Some(track) = added(path) {
                    log::info!("[Music] Track added: {}", path.display());
                    playlist.write().insert(track);
                    let _ = update_tx.try_send(());
                }
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                log::info!("[Music] Track removed: {}", path.display());
                playlist.write().remove(path);
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            for path in &event.paths {
                if path.exists() {
                    if let Some(track) = added(path) {
                        playlist.write().insert(track);
                        let _ = update_tx.try_send(());
                    }
                } else {
                    playlist.write().remove(path);
                }
            }
        }
        _ => {}
    }
}
