//! Station bootstrap and dependency wiring.
//!
//! This is the composition root: every service is instantiated here and
//! wired together explicitly, so all of the process's singletons - source
//! channels, registers, the hub, the recorder - are fields reachable from
//! one `Station` value rather than ambient globals.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::api::{self, AppState};
use crate::audio::sources::source_channels;
use crate::capture;
use crate::codec::nrl21::Identity;
use crate::error::{NannyError, NannyResult};
use crate::live::LiveHub;
use crate::mixer::Mixer;
use crate::net::inbound::{self, InboundRouter};
use crate::net::session;
use crate::recorder::{self, Recorder};
use crate::sched::beacon::BeaconScheduler;
use crate::sched::music::{MusicControl, MusicPlayer};
use crate::sched::timed::TimedScheduler;
use crate::state::{StationConfig, StationState};

/// One running station process.
pub struct Station {
    pub state: Arc<StationState>,
    pub hub: Arc<LiveHub>,
    pub recorder: Arc<Recorder>,
    pub music: MusicControl,
    socket: Arc<UdpSocket>,
    cancel: CancellationToken,
}

impl Station {
    /// Dials the server, wires every service, and starts the background
    /// tasks. Configuration and dial failures are fatal here; everything
    /// after startup degrades and logs instead.
    pub async fn start(config: StationConfig) -> NannyResult<Station> {
        config.validate().map_err(NannyError::ConfigInvalid)?;

        let socket = session::connect(&config.server, config.port).await?;
        let identity = Identity::new(&config.callsign, config.ssid);
        let state = Arc::new(StationState::new(&config));
        let hub = Arc::new(LiveHub::new());
        let recorder = Arc::new(Recorder::new(config.recordings_dir.clone()));
        let cancel = CancellationToken::new();

        let (sources, taps) = source_channels();

        // Music player and its control handle; the AT dispatcher and the
        // HTTP collaborator share the same single-slot control queue.
        let (player, music) = MusicPlayer::new(
            config.music_dir.clone(),
            sources.music.clone(),
            Arc::clone(&state),
            config.music_playing,
        );

        let router = Arc::new(InboundRouter::new(
            Arc::clone(&socket),
            identity.clone(),
            Arc::clone(&state),
            Arc::clone(&recorder),
            Arc::clone(&hub),
            music.clone(),
        ));

        // Session tasks. A dead socket cancels the whole station.
        tokio::spawn(session::run_heartbeat(
            Arc::clone(&socket),
            identity.clone(),
            cancel.clone(),
        ));
        {
            let receive_cancel = cancel.clone();
            let socket = Arc::clone(&socket);
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                if let Err(e) = session::run_receive(socket, router, receive_cancel.clone()).await {
                    log::error!("[Station] Receive loop died: {}", e);
                    receive_cancel.cancel();
                }
            });
        }

        // Outbound pipeline.
        tokio::spawn(
            Mixer::new(taps, Arc::clone(&socket), Arc::clone(&state), identity)
                .run(cancel.clone()),
        );
        capture::spawn_capture(Arc::clone(&state), sources.mic.clone(), cancel.clone());

        // Inbound watchdogs.
        tokio::spawn(recorder::run_watchdog(Arc::clone(&recorder), cancel.clone()));
        tokio::spawn(inbound::run_voice_watchdog(router, cancel.clone()));

        // Schedulers. An empty path disables a scheduler outright; the
        // toggles gate individual fires at runtime.
        if !config.cron_expr.is_empty() && !config.beacon_file.as_os_str().is_empty() {
            let beacon = BeaconScheduler::new(
                &config.cron_expr,
                config.beacon_file.clone(),
                sources.beacon.clone(),
                Arc::clone(&state),
            )?;
            tokio::spawn(beacon.run(cancel.clone()));
        } else {
            log::info!("[Station] Beacon disabled: no clip or cron expression configured");
        }

        if !config.timed_dir.as_os_str().is_empty() {
            let timed = TimedScheduler::new(
                config.timed_dir.clone(),
                sources.timed.clone(),
                Arc::clone(&state),
            );
            tokio::spawn(timed.run(cancel.clone()));
        } else {
            log::info!("[Station] Timed clips disabled: no directory configured");
        }

        if !config.music_dir.as_os_str().is_empty() {
            tokio::spawn(player.run(cancel.clone()));
        } else {
            log::info!("[Station] Music disabled: no library directory configured");
        }

        // Browser surface: live WebSocket plus the status snapshot.
        {
            let app = AppState {
                hub: Arc::clone(&hub),
                state: Arc::clone(&state),
            };
            let web_cancel = cancel.clone();
            let port = config.web_port;
            tokio::spawn(async move {
                if let Err(e) = api::serve(app, port, web_cancel).await {
                    log::error!("[Station] Web surface failed: {}", e);
                }
            });
        }

        log::info!(
            "[Station] {} up, relaying to {}:{}",
            config.callsign,
            config.server,
            config.port
        );

        Ok(Station {
            state,
            hub,
            recorder,
            music,
            socket,
            cancel,
        })
    }

    /// Resolves when the station has failed internally (dead socket).
    pub async fn failed(&self) {
        self.cancel.cancelled().await;
    }

    /// Stops every task and flushes the open recording, if any.
    pub async fn shutdown(&self) {
        log::info!("[Station] Shutting down...");
        self.cancel.cancel();
        self.recorder.flush_now();
        log::info!("[Station] Shutdown complete");
    }

    /// The connected session socket.
    pub fn socket(&self) -> &Arc<UdpSocket> {
        &self.socket
    }
}
