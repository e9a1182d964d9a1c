//! Cron-driven station identification beacon.
//!
//! On each fire the WAV is re-read from disk, so edits to the clip take
//! effect without a restart. Frames go into the beacon source channel with
//! blocking sends; the scheduler is paced by the mixer.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use cron::Schedule;
use tokio_util::sync::CancellationToken;

use super::stream_clip;
use crate::audio::sources::SourceSender;
use crate::error::{NannyError, NannyResult};
use crate::state::StationState;

/// Periodic beacon feeder.
pub struct BeaconScheduler {
    schedule: Schedule,
    expr: String,
    clip: PathBuf,
    source: SourceSender,
    state: Arc<StationState>,
}

impl BeaconScheduler {
    /// Parses the cron expression up front so a broken schedule is caught
    /// at startup.
    pub fn new(
        expr: &str,
        clip: PathBuf,
        source: SourceSender,
        state: Arc<StationState>,
    ) -> NannyResult<Self> {
        let schedule = Schedule::from_str(expr)
            .map_err(|e| NannyError::SchedulerParse(format!("cron {:?}: {}", expr, e)))?;
        Ok(Self {
            schedule,
            expr: expr.to_string(),
            clip,
            source,
            state,
        })
    }

    pub async fn run(self, cancel: CancellationToken) {
        log::info!(
            "[Beacon] Scheduler started: {} on {:?}",
            self.clip.display(),
            self.expr
        );
        loop {
            let Some(next) = self.schedule.upcoming(Local).next() else {
                log::warn!("[Beacon] Schedule has no upcoming fire time, stopping");
                break;
            };
            self.state
                .set_next_beacon(Some(next.format("%H:%M:%S").to_string()));

            let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            if !self.state.toggles.cron.get() {
                log::debug!("[Beacon] Fire skipped, beacon disabled");
                continue;
            }
            self.play(&cancel).await;
        }
        self.state.set_next_beacon(None);
    }

    async fn play(&self, cancel: &CancellationToken) {
        self.state.set_play_status("Beacon playing...", 0, false);
        let state = &self.state;
        let result = stream_clip(&self.clip, &self.source, cancel, |done, total| {
            if done % 25 == 0 || done == total {
                let percent = (done * 100 / total.max(1)) as u8;
                state.set_play_status("Beacon playing...", percent, false);
            }
        })
        .await;
        if let Err(e) = result {
            log::warn!("[Beacon] Clip rejected: {}", e);
        }
        self.state.set_play_status("Idle", 0, false);
    }
}
