//! UDP session with the central server.
//!
//! There is no handshake: the station dials the server, a heartbeat task
//! announces it every two seconds, and the receive loop dispatches whatever
//! arrives. Payload decode errors never tear the session down; only a
//! persistently failing socket does.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use super::inbound::InboundRouter;
use crate::codec::nrl21::{self, Identity};
use crate::error::{NannyError, NannyResult};
use crate::protocol_constants::{DEV_MODEL, HEARTBEAT_SECS, MAX_DATAGRAM, PKT_HEARTBEAT};

/// Consecutive receive failures tolerated before the socket is declared
/// dead and the station shuts down.
const MAX_CONSECUTIVE_RECV_ERRORS: u32 = 50;

/// Dials the server. A failure here is fatal at startup.
pub async fn connect(server: &str, port: u16) -> NannyResult<Arc<UdpSocket>> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(NannyError::SocketFatal)?;
    socket
        .connect((server, port))
        .await
        .map_err(NannyError::SocketFatal)?;
    log::info!("[UDP] Connected to {}:{}", server, port);
    Ok(Arc::new(socket))
}

/// Emits a type-2 heartbeat with an empty payload every two seconds.
pub async fn run_heartbeat(socket: Arc<UdpSocket>, identity: Identity, cancel: CancellationToken) {
    let packet = match nrl21::encode(&identity, PKT_HEARTBEAT, DEV_MODEL, &[]) {
        Ok(p) => p,
        Err(e) => {
            log::error!("[UDP] Heartbeat encode failed: {}", e);
            return;
        }
    };
    let mut ticker = interval(Duration::from_secs(HEARTBEAT_SECS));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = socket.send(&packet).await {
                    log::warn!("[UDP] Heartbeat send failed: {}", e);
                }
            }
        }
    }
}

/// Receive loop: reads up to one MTU per datagram, decodes, and hands the
/// packet to the router. Returns an error only when the socket itself has
/// failed beyond retry; the caller treats that as fatal.
pub async fn run_receive(
    socket: Arc<UdpSocket>,
    router: Arc<InboundRouter>,
    cancel: CancellationToken,
) -> NannyResult<()> {
    let mut buf = [0u8; MAX_DATAGRAM];
    let mut consecutive_errors = 0u32;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            received = socket.recv(&mut buf) => {
                let n = match received {
                    Ok(n) => {
                        consecutive_errors = 0;
                        n
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        if consecutive_errors >= MAX_CONSECUTIVE_RECV_ERRORS {
                            log::error!("[UDP] Socket failed {} times in a row: {}", consecutive_errors, e);
                            return Err(NannyError::SocketFatal(e));
                        }
                        log::warn!("[UDP] Receive failed, retrying: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                };
                match nrl21::decode(&buf[..n]) {
                    Ok(packet) => router.dispatch(packet).await,
                    // A bad datagram is logged and dropped; the session stays up.
                    Err(e) => log::warn!("[UDP] Dropping datagram: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn heartbeat_fires_every_two_seconds() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.connect(peer.local_addr().unwrap()).await.unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_heartbeat(
            Arc::new(socket),
            Identity::new("N0CALL", 1),
            cancel.clone(),
        ));

        // Six seconds: the immediate first tick plus three more.
        tokio::time::sleep(Duration::from_millis(6100)).await;
        cancel.cancel();
        task.await.unwrap();

        let mut count = 0;
        let mut buf = [0u8; 256];
        while let Ok(n) = peer.try_recv(&mut buf) {
            let packet = nrl21::decode(&buf[..n]).unwrap();
            assert_eq!(packet.packet_type, PKT_HEARTBEAT);
            assert!(packet.payload.is_empty());
            count += 1;
        }
        assert_eq!(count, 4);
    }
}
