//! Live broadcast hub: fans inbound audio out to browser listeners.
//!
//! The hub never writes to a socket itself. Every client owns a dedicated
//! writer task fed by a bounded queue; broadcasting builds one frame and
//! enqueues it per client, non-blocking. A full queue drops the frame for
//! that client only, so one stalled browser cannot slow the rest.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use bytes::{BufMut, Bytes, BytesMut};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::protocol_constants::{LIVE_CLIENT_QUEUE, MSG_AUDIO, MSG_VOICE_END, MSG_VOICE_START};

#[derive(Default)]
struct VoiceState {
    active: bool,
    callsign: String,
    ssid: u8,
}

struct ClientHandle {
    tx: mpsc::Sender<Message>,
}

/// The station's fan-out hub. One per station.
pub struct LiveHub {
    clients: DashMap<u64, ClientHandle>,
    next_id: AtomicU64,
    voice: Mutex<VoiceState>,
}

/// Builds one framed live message: type byte, 6-byte zero-padded callsign,
/// SSID, then the payload (linear i16 LE samples for audio frames).
pub fn build_frame(msg_type: u8, callsign: &str, ssid: u8, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(8 + payload.len());
    frame.put_u8(msg_type);
    let mut field = [0u8; 6];
    let bytes = callsign.as_bytes();
    let n = bytes.len().min(6);
    field[..n].copy_from_slice(&bytes[..n]);
    frame.put_slice(&field);
    frame.put_u8(ssid);
    frame.put_slice(payload);
    frame.freeze()
}

impl LiveHub {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            next_id: AtomicU64::new(1),
            voice: Mutex::new(VoiceState::default()),
        }
    }

    /// Registers a listener and returns its id plus the queue its writer
    /// task drains. A client joining mid-call is seeded with a synthetic
    /// voice-start so its UI state is consistent before the next audio
    /// frame.
    pub fn register(&self) -> (u64, mpsc::Receiver<Message>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(LIVE_CLIENT_QUEUE);

        {
            let voice = self.voice.lock();
            if voice.active {
                let frame = build_frame(MSG_VOICE_START, &voice.callsign, voice.ssid, &[]);
                let _ = tx.try_send(Message::Binary(frame));
            }
        }

        self.clients.insert(id, ClientHandle { tx });
        log::info!(
            "[Live] Client {} connected (total: {})",
            id,
            self.clients.len()
        );
        (id, rx)
    }

    /// Removes a client. Idempotent; the writer task calls this on every
    /// exit path.
    pub fn unregister(&self, id: u64) {
        if self.clients.remove(&id).is_some() {
            log::info!(
                "[Live] Client {} disconnected (remaining: {})",
                id,
                self.clients.len()
            );
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Fans one audio frame out to every listener.
    pub fn broadcast_audio(&self, callsign: &str, ssid: u8, pcm: &[u8]) {
        if self.clients.is_empty() {
            return;
        }
        self.broadcast(build_frame(MSG_AUDIO, callsign, ssid, pcm));
    }

    /// Marks a call active and announces it.
    pub fn notify_voice_start(&self, callsign: &str, ssid: u8) {
        {
            let mut voice = self.voice.lock();
            voice.active = true;
            voice.callsign = callsign.to_string();
            voice.ssid = ssid;
        }
        self.broadcast(build_frame(MSG_VOICE_START, callsign, ssid, &[]));
    }

    /// Marks the call over and announces it.
    pub fn notify_voice_end(&self, callsign: &str, ssid: u8) {
        self.voice.lock().active = false;
        self.broadcast(build_frame(MSG_VOICE_END, callsign, ssid, &[]));
    }

    fn broadcast(&self, frame: Bytes) {
        for entry in self.clients.iter() {
            // Overflow drops this frame for this client only.
            if entry.value().tx.try_send(Message::Binary(frame.clone())).is_err() {
                log::trace!("[Live] Client {} queue full, frame dropped", entry.key());
            }
        }
    }
}

impl Default for LiveHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_of(msg: &Message) -> Bytes {
        match msg {
            Message::Binary(b) => b.clone(),
            other => panic!("expected binary frame, got {:?}", other),
        }
    }

    #[test]
    fn frame_layout_is_eight_byte_header_plus_payload() {
        let frame = build_frame(MSG_AUDIO, "N0CALL", 7, &[1, 2, 3, 4]);
        assert_eq!(frame.len(), 12);
        assert_eq!(frame[0], MSG_AUDIO);
        assert_eq!(&frame[1..7], b"N0CALL");
        assert_eq!(frame[7], 7);
        assert_eq!(&frame[8..], &[1, 2, 3, 4]);
    }

    #[test]
    fn short_callsign_is_zero_padded() {
        let frame = build_frame(MSG_VOICE_START, "K1A", 2, &[]);
        assert_eq!(&frame[1..7], b"K1A\x00\x00\x00");
        assert_eq!(frame.len(), 8);
    }

    #[tokio::test]
    async fn late_joiner_receives_synthetic_voice_start() {
        let hub = LiveHub::new();
        hub.notify_voice_start("N0CALL", 7);

        let (_id, mut rx) = hub.register();
        let first = payload_of(&rx.recv().await.unwrap());
        assert_eq!(first[0], MSG_VOICE_START);
        assert_eq!(&first[1..7], b"N0CALL");

        // Audio broadcast after subscribe arrives after the synthetic start
        hub.broadcast_audio("N0CALL", 7, &[0, 0]);
        let second = payload_of(&rx.recv().await.unwrap());
        assert_eq!(second[0], MSG_AUDIO);
    }

    #[tokio::test]
    async fn idle_joiner_gets_no_synthetic_start() {
        let hub = LiveHub::new();
        hub.notify_voice_start("N0CALL", 7);
        hub.notify_voice_end("N0CALL", 7);

        let (_id, mut rx) = hub.register();
        hub.broadcast_audio("N0CALL", 7, &[0, 0]);
        let first = payload_of(&rx.recv().await.unwrap());
        assert_eq!(first[0], MSG_AUDIO);
    }

    #[tokio::test]
    async fn slow_client_loses_frames_but_not_its_peers() {
        let hub = LiveHub::new();
        let (_slow, mut slow_rx) = hub.register();
        let (_fast, mut fast_rx) = hub.register();

        // The slow client never reads; overflow its queue.
        for i in 0..(LIVE_CLIENT_QUEUE + 100) {
            hub.broadcast_audio("N0CALL", 7, &(i as u16).to_le_bytes());
        }

        // Fast client drains everything that was sent while its queue had
        // room; the first LIVE_CLIENT_QUEUE frames arrive gap-free.
        let mut fast_count = 0;
        while let Ok(msg) = fast_rx.try_recv() {
            let frame = payload_of(&msg);
            if fast_count < LIVE_CLIENT_QUEUE {
                let seq = u16::from_le_bytes([frame[8], frame[9]]);
                assert_eq!(usize::from(seq), fast_count, "gap in fast client stream");
            }
            fast_count += 1;
        }
        assert!(fast_count >= LIVE_CLIENT_QUEUE);

        let mut slow_count = 0;
        while slow_rx.try_recv().is_ok() {
            slow_count += 1;
        }
        assert_eq!(slow_count, LIVE_CLIENT_QUEUE, "slow queue is bounded");

        // The slow client is still registered: slowness alone never evicts.
        assert_eq!(hub.client_count(), 2);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let hub = LiveHub::new();
        let (id, _rx) = hub.register();
        hub.unregister(id);
        hub.unregister(id);
        assert_eq!(hub.client_count(), 0);
    }
}
