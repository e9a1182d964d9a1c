//! Time-triggered PCM sources: the cron beacon, the clock-scheduled clip
//! player, and the music playlist.

pub mod beacon;
pub mod music;
pub mod timed;

use std::path::Path;
use std::time::Duration;

use chrono::{Local, TimeZone};
use tokio_util::sync::CancellationToken;

use crate::audio::sources::SourceSender;
use crate::audio::{self, wav};
use crate::error::NannyResult;

/// Duration until the next local midnight, when the watched schedulers
/// rebuild their day.
pub(crate) fn until_next_midnight() -> Duration {
    let now = Local::now();
    let tomorrow = now.date_naive().succ_opt().unwrap_or(now.date_naive());
    Local
        .from_local_datetime(&tomorrow.and_hms_opt(0, 0, 0).expect("valid midnight"))
        .single()
        .map(|midnight| (midnight - now).to_std().unwrap_or(Duration::ZERO))
        .unwrap_or(Duration::from_secs(24 * 3600))
}

/// Reads a clip and feeds it frame-by-frame into a source channel.
///
/// The sends block: the mixer's 20 ms drain is the tempo, so the clip plays
/// at real rate instead of flooding the queue. `progress` is called with
/// (frames fed, total frames).
pub(crate) async fn stream_clip(
    path: &Path,
    source: &SourceSender,
    cancel: &CancellationToken,
    mut progress: impl FnMut(usize, usize),
) -> NannyResult<()> {
    let samples = wav::read_clip(path)?;
    let frames: Vec<audio::Frame> = audio::frames(&samples).collect();
    let total = frames.len();
    log::info!(
        "[Sched] Playing {} ({} frames, {:.1} s)",
        path.display(),
        total,
        total as f64 * 0.02
    );

    for (i, frame) in frames.into_iter().enumerate() {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            sent = source.feed(frame) => {
                if !sent {
                    return Ok(());
                }
            }
        }
        progress(i + 1, total);
    }
    Ok(())
}
