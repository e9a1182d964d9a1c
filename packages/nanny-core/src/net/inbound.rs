//! Inbound packet router.
//!
//! Voice payloads are decoded once and teed to the recorder and the live
//! hub. The router also derives voice-activity edges per `(callsign, ssid)`
//! speaker: the first frame of a call raises voice-start, and a watchdog
//! raises voice-end after two seconds of silence. Text messages are logged;
//! AT blocks drive the music player and the volume register and are
//! answered with a status block.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::codec::nrl21::{Identity, Nrl21Packet};
use crate::codec::{at, g711, nrl21};
use crate::live::LiveHub;
use crate::protocol_constants::{
    DEV_MODEL, PKT_AT, PKT_HEARTBEAT, PKT_TEXT, PKT_VOICE, SILENCE_GAP_SECS,
};
use crate::recorder::Recorder;
use crate::sched::music::{MusicCommand, MusicControl};
use crate::state::StationState;

struct VoiceTracker {
    active: bool,
    callsign: String,
    ssid: u8,
    last_frame: Instant,
}

/// Routes decoded packets to the station's services.
pub struct InboundRouter {
    socket: Arc<UdpSocket>,
    identity: Identity,
    state: Arc<StationState>,
    recorder: Arc<Recorder>,
    hub: Arc<LiveHub>,
    music: MusicControl,
    voice: Mutex<Option<VoiceTracker>>,
}

impl InboundRouter {
    pub fn new(
        socket: Arc<UdpSocket>,
        identity: Identity,
        state: Arc<StationState>,
        recorder: Arc<Recorder>,
        hub: Arc<LiveHub>,
        music: MusicControl,
    ) -> Self {
        Self {
            socket,
            identity,
            state,
            recorder,
            hub,
            music,
            voice: Mutex::new(None),
        }
    }

    pub async fn dispatch(&self, packet: Nrl21Packet) {
        match packet.packet_type {
            PKT_VOICE => self.handle_voice(&packet),
            PKT_HEARTBEAT => {
                log::trace!("[UDP] Heartbeat from {}", packet.speaker());
            }
            PKT_TEXT => {
                log::info!(
                    "[UDP] Message from {}: {}",
                    packet.speaker(),
                    String::from_utf8_lossy(&packet.payload)
                );
            }
            PKT_AT => self.handle_at(&packet).await,
            // Remaining types are accepted but carry nothing for a relay
            // station.
            0 | 3 | 4 | 6..=10 => {
                log::trace!("[UDP] Ignoring type {} from {}", packet.packet_type, packet.speaker());
            }
            other => {
                log::debug!("[UDP] Unknown packet type {} from {}", other, packet.speaker());
            }
        }
    }

    fn handle_voice(&self, packet: &Nrl21Packet) {
        let pcm = g711::decode_to_pcm_bytes(&packet.payload);
        let speaker = packet.speaker();

        let is_new_call = {
            let mut voice = self.voice.lock();
            let gap = Duration::from_secs(SILENCE_GAP_SECS);
            let new_call = match voice.as_ref() {
                Some(t) => {
                    !t.active
                        || t.callsign != packet.callsign
                        || t.ssid != packet.ssid
                        || t.last_frame.elapsed() > gap
                }
                None => true,
            };
            *voice = Some(VoiceTracker {
                active: true,
                callsign: packet.callsign.clone(),
                ssid: packet.ssid,
                last_frame: Instant::now(),
            });
            new_call
        };

        if is_new_call {
            log::info!("[UDP] Voice from {}", speaker);
            self.hub.notify_voice_start(&packet.callsign, packet.ssid);
        }

        if self.state.toggles.record_voice.get() {
            self.recorder.push(&speaker, &pcm);
        }
        self.hub.broadcast_audio(&packet.callsign, packet.ssid, &pcm);
    }

    async fn handle_at(&self, packet: &Nrl21Packet) {
        let Some(command) = at::decode(&packet.payload) else {
            log::warn!("[UDP] Dropping malformed AT block from {}", packet.speaker());
            return;
        };
        log::info!(
            "[UDP] AT from {}: {}={}",
            packet.speaker(),
            command.command,
            command.value
        );

        match command.command.as_str() {
            "AT+PLAY_ID" => {
                match command.value.parse::<u32>() {
                    Ok(id) if id <= 9999 => {
                        self.music.send(MusicCommand::PlayId(id));
                    }
                    _ => log::warn!("[UDP] Bad AT+PLAY_ID value {:?}", command.value),
                }
            }
            "AT+PAUSE" => {
                self.music.send(MusicCommand::PauseToggle);
            }
            "AT+NEXT" => {
                self.music.send(MusicCommand::Next);
            }
            "AT+PREW" => {
                self.music.send(MusicCommand::Prev);
            }
            "AT+VOLUME" => match command.value.parse::<u8>() {
                Ok(percent) if percent <= 100 => self.state.volume.set_percent(percent),
                _ => log::warn!("[UDP] Bad AT+VOLUME value {:?}", command.value),
            },
            other => {
                log::debug!("[UDP] Unsupported AT command {}", other);
            }
        }

        self.send_at_status().await;
    }

    /// Answers with the supported command set and the current volume.
    async fn send_at_status(&self) {
        let lines = vec![
            "AT+PLAY_ID=1".to_string(),
            "AT+PAUSE=1".to_string(),
            "AT+NEXT=1".to_string(),
            "AT+PREW=1".to_string(),
            format!("AT+VOLUME={}", self.state.volume.percent()),
        ];
        let payload = at::encode_status(&lines);
        match nrl21::encode(&self.identity, PKT_AT, DEV_MODEL, &payload) {
            Ok(reply) => {
                if let Err(e) = self.socket.send(&reply).await {
                    log::warn!("[UDP] AT status send failed: {}", e);
                }
            }
            Err(e) => log::warn!("[UDP] AT status encode failed: {}", e),
        }
    }

    /// Whether a call is currently considered active.
    fn voice_active(&self) -> Option<(String, u8)> {
        let voice = self.voice.lock();
        voice
            .as_ref()
            .filter(|t| t.active)
            .map(|t| (t.callsign.clone(), t.ssid))
    }

    /// Marks the call over once the gap has elapsed; returns the speaker
    /// whose call ended.
    fn expire_voice(&self) -> Option<(String, u8)> {
        let mut voice = self.voice.lock();
        match voice.as_mut() {
            Some(t) if t.active && t.last_frame.elapsed() > Duration::from_secs(SILENCE_GAP_SECS) => {
                t.active = false;
                Some((t.callsign.clone(), t.ssid))
            }
            _ => None,
        }
    }

    #[cfg(test)]
    fn age_voice(&self, by: Duration) {
        if let Some(t) = self.voice.lock().as_mut() {
            t.last_frame -= by;
        }
    }
}

/// Background check that raises voice-end after the silence gap.
pub async fn run_voice_watchdog(router: Arc<InboundRouter>, cancel: CancellationToken) {
    let mut ticker = interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Some((callsign, ssid)) = router.expire_voice() {
                    log::info!("[UDP] Voice ended: {}-{}", callsign, ssid);
                    router.hub.notify_voice_end(&callsign, ssid);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::music::MusicPlayer;
    use crate::state::StationConfig;
    use std::path::PathBuf;

    struct Fixture {
        router: Arc<InboundRouter>,
        peer: UdpSocket,
        _recordings: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(peer.local_addr().unwrap()).await.unwrap();

        let state = Arc::new(StationState::new(&StationConfig {
            server: "127.0.0.1".into(),
            callsign: "N0CALL".into(),
            ..StationConfig::default()
        }));
        let recordings = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::new(recordings.path().to_path_buf()));
        let hub = Arc::new(LiveHub::new());
        let (_player, control) = MusicPlayer::new(
            PathBuf::from("unused"),
            crate::audio::sources::source_channels().0.music,
            Arc::clone(&state),
            true,
        );

        Fixture {
            router: Arc::new(InboundRouter::new(
                Arc::new(socket),
                Identity::new("N0CALL", 1),
                state,
                recorder,
                hub,
                control,
            )),
            peer,
            _recordings: recordings,
        }
    }

    fn voice_packet(callsign: &str, ssid: u8, samples: usize) -> Nrl21Packet {
        let payload: Vec<u8> = (0..samples)
            .map(|_| g711::linear_to_alaw(1000))
            .collect();
        let raw = nrl21::encode(&Identity::new(callsign, ssid), PKT_VOICE, DEV_MODEL, &payload)
            .unwrap();
        nrl21::decode(&raw).unwrap()
    }

    #[tokio::test]
    async fn first_frame_starts_a_call() {
        let f = fixture().await;
        f.router.dispatch(voice_packet("K1ABC", 2, 160)).await;
        assert_eq!(f.router.voice_active(), Some(("K1ABC".to_string(), 2)));
    }

    #[tokio::test]
    async fn speaker_change_is_a_new_call() {
        let f = fixture().await;
        f.router.dispatch(voice_packet("K1ABC", 2, 160)).await;
        f.router.dispatch(voice_packet("W2DEF", 3, 160)).await;
        assert_eq!(f.router.voice_active(), Some(("W2DEF".to_string(), 3)));
    }

    #[tokio::test]
    async fn silence_expires_the_call_once() {
        let f = fixture().await;
        f.router.dispatch(voice_packet("K1ABC", 2, 160)).await;
        assert!(f.router.expire_voice().is_none());

        f.router.age_voice(Duration::from_millis(2500));
        assert_eq!(f.router.expire_voice(), Some(("K1ABC".to_string(), 2)));
        assert!(f.router.expire_voice().is_none(), "voice-end fires once");
    }

    #[tokio::test]
    async fn late_hub_joiner_sees_active_call() {
        let f = fixture().await;
        f.router.dispatch(voice_packet("K1ABC", 2, 160)).await;

        let (_id, mut rx) = f.router.hub.register();
        let msg = rx.recv().await.unwrap();
        if let axum::extract::ws::Message::Binary(frame) = msg {
            assert_eq!(frame[0], crate::protocol_constants::MSG_VOICE_START);
        } else {
            panic!("expected binary frame");
        }
    }

    #[tokio::test]
    async fn at_command_is_answered_with_status_block() {
        let f = fixture().await;

        let mut payload = vec![0x01];
        payload.extend_from_slice(b"AT+VOLUME=80\r\n");
        let raw = nrl21::encode(&Identity::new("K1ABC", 2), PKT_AT, DEV_MODEL, &payload).unwrap();
        f.router.dispatch(nrl21::decode(&raw).unwrap()).await;

        // Volume register took the new value
        assert_eq!(f.router.state.volume.percent(), 80);

        // And the reply is a type-11 status block
        let mut buf = [0u8; 512];
        let n = f.peer.recv(&mut buf).await.unwrap();
        let reply = nrl21::decode(&buf[..n]).unwrap();
        assert_eq!(reply.packet_type, PKT_AT);
        assert_eq!(reply.payload[0], 0x02);
        let text = String::from_utf8_lossy(&reply.payload[1..]);
        assert!(text.starts_with("NRLNANNY V2.0\r\n"));
        assert!(text.contains("AT+VOLUME=80"));
    }

    #[tokio::test]
    async fn malformed_at_block_is_dropped() {
        let f = fixture().await;
        let raw = nrl21::encode(
            &Identity::new("K1ABC", 2),
            PKT_AT,
            DEV_MODEL,
            &[0x07, 0x08],
        )
        .unwrap();
        f.router.dispatch(nrl21::decode(&raw).unwrap()).await;

        let mut buf = [0u8; 64];
        assert!(f.peer.try_recv(&mut buf).is_err(), "no reply to garbage");
    }

    #[tokio::test]
    async fn voice_payload_reaches_recorder_and_hub() {
        let f = fixture().await;
        let (_id, mut rx) = f.router.hub.register();

        f.router.dispatch(voice_packet("K1ABC", 2, 500)).await;

        // The hub client sees the voice-start edge then the audio frame
        let first = rx.recv().await.unwrap();
        let axum::extract::ws::Message::Binary(first) = first else {
            panic!("expected binary");
        };
        assert_eq!(first[0], crate::protocol_constants::MSG_VOICE_START);
        let second = rx.recv().await.unwrap();
        let axum::extract::ws::Message::Binary(second) = second else {
            panic!("expected binary");
        };
        assert_eq!(second[0], crate::protocol_constants::MSG_AUDIO);
        assert_eq!(second.len(), 8 + 1000, "500 samples as i16 LE");
    }
}
