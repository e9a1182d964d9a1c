//! Fixed-cadence mixer: fuses the four PCM sources into the outbound
//! A-law stream.
//!
//! A free-running 20 ms metronome drives the loop. Each tick drains at most
//! one frame per source (never blocking), applies ducking, and - when the
//! accumulator carries any signal - compands and ships one NRL21 voice
//! packet. An all-silent tick emits nothing, so the radio is not keyed by
//! dead air.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::audio::sources::SourceTaps;
use crate::codec::{g711, nrl21};
use crate::protocol_constants::{DEV_MODEL, FRAME_SAMPLES, PKT_VOICE, TICK_MS};
use crate::state::StationState;

/// The outbound mixing element. One per station.
pub struct Mixer {
    taps: SourceTaps,
    socket: Arc<UdpSocket>,
    state: Arc<StationState>,
    identity: nrl21::Identity,
}

impl Mixer {
    pub fn new(
        taps: SourceTaps,
        socket: Arc<UdpSocket>,
        state: Arc<StationState>,
        identity: nrl21::Identity,
    ) -> Self {
        Self {
            taps,
            socket,
            state,
            identity,
        }
    }

    /// Runs the metronome until cancelled.
    ///
    /// The interval is free-running with Burst catch-up, so scheduling
    /// jitter does not accumulate into drift.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = interval(Duration::from_millis(TICK_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        log::info!("[Mixer] Started, {} ms tick", TICK_MS);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Some(packet) = self.render_tick() {
                        // Best effort: a send the OS buffer cannot take this
                        // tick is dropped rather than stalling the metronome.
                        if let Err(e) = self.socket.try_send(&packet) {
                            log::debug!("[Mixer] Tick dropped, UDP send failed: {}", e);
                        }
                    }
                }
            }
        }
        log::info!("[Mixer] Stopped");
    }

    /// Produces this tick's packet, or `None` for a silent tick.
    fn render_tick(&mut self) -> Option<Bytes> {
        let mut acc = [0i32; FRAME_SAMPLES];
        let mut beacon_active = false;

        if let Some(frame) = self.taps.beacon.poll() {
            add(&mut acc, &frame, 1.0);
            beacon_active = true;
        }
        if let Some(frame) = self.taps.timed.poll() {
            add(&mut acc, &frame, 1.0);
            beacon_active = true;
        }
        if let Some(frame) = self.taps.music.poll() {
            let scale = if beacon_active && self.state.duck_music {
                self.state.duck_scale
            } else {
                1.0
            };
            add(&mut acc, &frame, scale);
        }
        if let Some(frame) = self.taps.mic.poll() {
            let scale = if beacon_active && self.state.duck_mic {
                self.state.duck_scale
            } else {
                1.0
            };
            add(&mut acc, &frame, scale);
        }

        if acc.iter().all(|&s| s == 0) {
            return None;
        }

        let payload = g711::encode(&acc, self.state.volume.get());
        match nrl21::encode(&self.identity, PKT_VOICE, DEV_MODEL, &payload) {
            Ok(packet) => Some(packet),
            Err(e) => {
                log::warn!("[Mixer] Voice packet encode failed: {}", e);
                None
            }
        }
    }
}

fn add(acc: &mut [i32; FRAME_SAMPLES], frame: &[i32; FRAME_SAMPLES], scale: f64) {
    if (scale - 1.0).abs() < f64::EPSILON {
        for (slot, &s) in acc.iter_mut().zip(frame.iter()) {
            *slot += s;
        }
    } else {
        for (slot, &s) in acc.iter_mut().zip(frame.iter()) {
            *slot += (f64::from(s) * scale).round() as i32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::sources::{source_channels, SourceSet};
    use crate::codec::nrl21::Identity;
    use crate::protocol_constants::NRL21_HEADER_LEN;
    use crate::state::StationConfig;

    fn test_state(duck_scale: f64, duck_music: bool, duck_mic: bool) -> Arc<StationState> {
        let config = StationConfig {
            server: "127.0.0.1".into(),
            callsign: "N0CALL".into(),
            duck_scale,
            duck_music,
            duck_mic,
            ..StationConfig::default()
        };
        Arc::new(StationState::new(&config))
    }

    async fn test_mixer(state: Arc<StationState>) -> (Mixer, SourceSet, UdpSocket) {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(peer.local_addr().unwrap()).await.unwrap();
        let (set, taps) = source_channels();
        let mixer = Mixer::new(taps, Arc::new(socket), state, Identity::new("N0CALL", 1));
        (mixer, set, peer)
    }

    #[tokio::test]
    async fn silent_tick_emits_nothing() {
        let (mut mixer, _set, _peer) = test_mixer(test_state(0.3, true, false)).await;
        assert!(mixer.render_tick().is_none());
    }

    #[tokio::test]
    async fn all_zero_frames_are_suppressed() {
        let (mut mixer, set, _peer) = test_mixer(test_state(0.3, true, false)).await;
        set.music.push([0; FRAME_SAMPLES]);
        assert!(mixer.render_tick().is_none());
    }

    #[tokio::test]
    async fn music_alone_passes_unducked() {
        let (mut mixer, set, _peer) = test_mixer(test_state(0.25, true, false)).await;
        set.music.push([10000; FRAME_SAMPLES]);
        let packet = mixer.render_tick().unwrap();
        let payload = &packet[NRL21_HEADER_LEN..];
        assert_eq!(payload.len(), FRAME_SAMPLES);
        for &code in payload {
            let back = i32::from(g711::alaw_to_linear(code));
            assert!((back - 10000).abs() <= 1024, "decoded {}", back);
        }
    }

    #[tokio::test]
    async fn beacon_ducks_music_within_the_same_tick() {
        let (mut mixer, set, _peer) = test_mixer(test_state(0.25, true, false)).await;
        set.beacon.push([2000; FRAME_SAMPLES]);
        set.music.push([10000; FRAME_SAMPLES]);
        let packet = mixer.render_tick().unwrap();
        let payload = &packet[NRL21_HEADER_LEN..];
        // 10000 * 0.25 + 2000 = 4500, within one quantization step
        for &code in payload {
            let back = i32::from(g711::alaw_to_linear(code));
            assert!((back - 4500).abs() <= 256, "decoded {}", back);
        }
    }

    #[tokio::test]
    async fn mic_duck_honors_its_own_flag() {
        let (mut mixer, set, _peer) = test_mixer(test_state(0.25, true, false)).await;
        set.beacon.push([2000; FRAME_SAMPLES]);
        set.mic.push([10000; FRAME_SAMPLES]);
        let packet = mixer.render_tick().unwrap();
        let payload = &packet[NRL21_HEADER_LEN..];
        // duck_mic is off: 10000 + 2000 = 12000
        for &code in payload {
            let back = i32::from(g711::alaw_to_linear(code));
            assert!((back - 12000).abs() <= 1024, "decoded {}", back);
        }
    }

    #[tokio::test]
    async fn tick_reads_at_most_one_frame_per_source() {
        let (mut mixer, set, _peer) = test_mixer(test_state(0.3, true, false)).await;
        set.music.push([100; FRAME_SAMPLES]);
        set.music.push([200; FRAME_SAMPLES]);
        let first = mixer.render_tick().unwrap();
        let second = mixer.render_tick().unwrap();
        let sample = |p: &Bytes| i32::from(g711::alaw_to_linear(p[NRL21_HEADER_LEN]));
        assert!(sample(&first) < sample(&second));
        assert!(mixer.render_tick().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cadence_holds_under_continuous_input() {
        let (mixer, set, peer) = test_mixer(test_state(0.3, true, false)).await;
        let cancel = CancellationToken::new();
        let run = tokio::spawn(mixer.run(cancel.clone()));

        // Keep the music channel saturated while one second of ticks elapses.
        let feeder = tokio::spawn(async move {
            loop {
                if !set.music.feed([5000; FRAME_SAMPLES]).await {
                    break;
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(1000 + TICK_MS / 2)).await;
        cancel.cancel();
        run.await.unwrap();
        feeder.abort();

        let mut count = 0;
        let mut buf = [0u8; 2048];
        while let Ok(n) = peer.try_recv(&mut buf) {
            assert_eq!(n, NRL21_HEADER_LEN + FRAME_SAMPLES);
            count += 1;
        }
        // 50 ticks nominal over 1 s; allow scheduling slack at the edges.
        assert!((48..=52).contains(&count), "got {} packets", count);
    }
}
