//! Bounded single-producer frame channels between the PCM sources and the
//! mixer.
//!
//! Each source gets a queue of 3 frames. The schedulers send blocking -
//! the mixer's 20 ms drain paces them, so a clip plays at real rate instead
//! of flooding the channel. The mic pushes non-blocking and drops on full,
//! preferring bounded latency over backpressure into the capture callback.

use tokio::sync::mpsc;

use super::Frame;
use crate::protocol_constants::SOURCE_CHANNEL_CAPACITY;

/// Producer half of one source channel.
#[derive(Clone)]
pub struct SourceSender {
    name: &'static str,
    tx: mpsc::Sender<Frame>,
}

impl SourceSender {
    /// Non-blocking push; the frame is dropped when the queue is full.
    /// Returns whether the frame was accepted.
    pub fn push(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::trace!("[Sources] {} queue full, frame dropped", self.name);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Blocking push used by the schedulers; suspends until the mixer has
    /// drained a slot. Returns false once the mixer is gone.
    pub async fn feed(&self, frame: Frame) -> bool {
        self.tx.send(frame).await.is_ok()
    }
}

/// Consumer half of one source channel; owned by the mixer.
pub struct SourceReceiver {
    rx: mpsc::Receiver<Frame>,
}

impl SourceReceiver {
    /// Non-blocking receive of at most one frame.
    pub fn poll(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

fn channel(name: &'static str) -> (SourceSender, SourceReceiver) {
    let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
    (SourceSender { name, tx }, SourceReceiver { rx })
}

/// Producer ends of the four source channels.
pub struct SourceSet {
    pub beacon: SourceSender,
    pub timed: SourceSender,
    pub music: SourceSender,
    pub mic: SourceSender,
}

/// Consumer ends of the four source channels.
pub struct SourceTaps {
    pub beacon: SourceReceiver,
    pub timed: SourceReceiver,
    pub music: SourceReceiver,
    pub mic: SourceReceiver,
}

/// Builds the station's four source channels.
pub fn source_channels() -> (SourceSet, SourceTaps) {
    let (beacon_tx, beacon_rx) = channel("beacon");
    let (timed_tx, timed_rx) = channel("timed");
    let (music_tx, music_rx) = channel("music");
    let (mic_tx, mic_rx) = channel("mic");
    (
        SourceSet {
            beacon: beacon_tx,
            timed: timed_tx,
            music: music_tx,
            mic: mic_tx,
        },
        SourceTaps {
            beacon: beacon_rx,
            timed: timed_rx,
            music: music_rx,
            mic: mic_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol_constants::FRAME_SAMPLES;

    #[tokio::test]
    async fn push_drops_newest_on_full() {
        let (set, mut taps) = source_channels();
        for i in 0..SOURCE_CHANNEL_CAPACITY {
            assert!(set.mic.push([i as i32; FRAME_SAMPLES]));
        }
        assert!(!set.mic.push([99; FRAME_SAMPLES]));

        // FIFO order preserved, the overflow frame is gone
        for i in 0..SOURCE_CHANNEL_CAPACITY {
            assert_eq!(taps.mic.poll().unwrap()[0], i as i32);
        }
        assert!(taps.mic.poll().is_none());
    }

    #[tokio::test]
    async fn feed_waits_for_drain() {
        let (set, mut taps) = source_channels();
        for _ in 0..SOURCE_CHANNEL_CAPACITY {
            assert!(set.beacon.feed([1; FRAME_SAMPLES]).await);
        }

        let sender = set.beacon.clone();
        let feeder = tokio::spawn(async move { sender.feed([2; FRAME_SAMPLES]).await });
        tokio::task::yield_now().await;
        assert!(!feeder.is_finished(), "feed should block on a full queue");

        assert!(taps.beacon.poll().is_some());
        assert!(feeder.await.unwrap());
    }
}
