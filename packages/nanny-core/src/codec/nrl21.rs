//! NRL21 packet codec.
//!
//! Every datagram on the network carries a fixed 48-byte header followed by
//! the payload:
//!
//! | Offset | Bytes | Field |
//! |---|---|---|
//! | 0  | 4 | magic `"NRL2"` |
//! | 4  | 2 | total length, big-endian (`48 + payload`) |
//! | 6  | 4 | CPUID (fold32 hash of `callsign-ssid`) |
//! | 10 | 3 | password |
//! | 13 | 7 | reserved |
//! | 20 | 1 | packet type |
//! | 21 | 1 | status |
//! | 22 | 2 | count, big-endian |
//! | 24 | 6 | callsign, right-trimmed of `\r` / `\0` |
//! | 30 | 1 | SSID |
//! | 31 | 1 | device model |
//! | 32 | 16 | reserved |

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{NannyError, NannyResult};
use crate::protocol_constants::{MAX_DATAGRAM, NRL21_HEADER_LEN, NRL21_MAGIC};

/// A decoded NRL21 packet.
#[derive(Debug, Clone)]
pub struct Nrl21Packet {
    /// Total length as carried on the wire.
    pub length: u16,
    pub cpuid: [u8; 4],
    pub password: [u8; 3],
    pub packet_type: u8,
    pub status: u8,
    /// Packet counter. Emitted as 0 and not validated on receive.
    pub count: u16,
    pub callsign: String,
    pub ssid: u8,
    pub dev_model: u8,
    pub payload: Bytes,
}

impl Nrl21Packet {
    /// `CALLSIGN-SSID` form used as the speaker key for inbound voice.
    pub fn speaker(&self) -> String {
        format!("{}-{}", self.callsign, self.ssid)
    }
}

/// The station's outbound identity, stamped on every packet it sends.
#[derive(Debug, Clone)]
pub struct Identity {
    pub callsign: String,
    pub ssid: u8,
    pub cpuid: [u8; 4],
}

impl Identity {
    /// Derives the CPUID from the callsign/SSID pair.
    pub fn new(callsign: &str, ssid: u8) -> Self {
        Self {
            callsign: callsign.to_string(),
            ssid,
            cpuid: cpu_id(callsign, ssid),
        }
    }
}

/// fold32 hash of the ASCII `callsign-ssid` tag, emitted big-endian.
pub fn cpu_id(callsign: &str, ssid: u8) -> [u8; 4] {
    let tag = format!("{callsign}-{ssid}");
    let mut hash: u32 = 0;
    for b in tag.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(u32::from(b));
    }
    hash.to_be_bytes()
}

/// Encodes one packet. The callsign occupies a 6-byte zero-padded field, so
/// a 5-character callsign is naturally null-terminated. The password field
/// is left zeroed; the network does not challenge this station.
pub fn encode(
    identity: &Identity,
    packet_type: u8,
    dev_model: u8,
    payload: &[u8],
) -> NannyResult<Bytes> {
    let total = NRL21_HEADER_LEN + payload.len();
    if total > MAX_DATAGRAM {
        return Err(NannyError::WireDecode(format!(
            "payload of {} bytes exceeds the {} byte datagram limit",
            payload.len(),
            MAX_DATAGRAM
        )));
    }

    let mut packet = BytesMut::with_capacity(total);
    packet.put_slice(NRL21_MAGIC);
    packet.put_u16(total as u16);
    packet.put_slice(&identity.cpuid);
    packet.put_bytes(0, 3); // password
    packet.put_bytes(0, 7); // reserved
    packet.put_u8(packet_type);
    packet.put_u8(1); // status
    packet.put_u16(0); // count

    let mut callsign = [0u8; 6];
    let bytes = identity.callsign.as_bytes();
    let n = bytes.len().min(6);
    callsign[..n].copy_from_slice(&bytes[..n]);
    packet.put_slice(&callsign);

    packet.put_u8(identity.ssid);
    packet.put_u8(dev_model);
    packet.put_bytes(0, 16); // reserved
    packet.put_slice(payload);

    Ok(packet.freeze())
}

/// Decodes one datagram. Rejects anything shorter than the fixed header or
/// not starting with the NRL21 magic.
pub fn decode(data: &[u8]) -> NannyResult<Nrl21Packet> {
    if data.len() < NRL21_HEADER_LEN {
        return Err(NannyError::WireDecode(format!(
            "packet too short: {} bytes",
            data.len()
        )));
    }
    if &data[0..4] != NRL21_MAGIC {
        return Err(NannyError::WireDecode("not an NRL21 packet".into()));
    }

    let length = u16::from_be_bytes([data[4], data[5]]);
    let mut cpuid = [0u8; 4];
    cpuid.copy_from_slice(&data[6..10]);
    let mut password = [0u8; 3];
    password.copy_from_slice(&data[10..13]);

    let callsign_raw = &data[24..30];
    let trimmed = callsign_raw
        .iter()
        .rposition(|&b| b != 0x0d && b != 0x00)
        .map_or(&callsign_raw[..0], |end| &callsign_raw[..=end]);
    let callsign = String::from_utf8_lossy(trimmed).into_owned();

    Ok(Nrl21Packet {
        length,
        cpuid,
        password,
        packet_type: data[20],
        status: data[21],
        count: u16::from_be_bytes([data[22], data[23]]),
        callsign,
        ssid: data[30],
        dev_model: data[31],
        payload: Bytes::copy_from_slice(&data[NRL21_HEADER_LEN..]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol_constants::{DEV_MODEL, PKT_HEARTBEAT, PKT_VOICE};

    fn identity() -> Identity {
        Identity::new("BG7XYZ", 6)
    }

    #[test]
    fn length_field_is_header_plus_payload() {
        let payload = vec![0x55u8; 160];
        let packet = encode(&identity(), PKT_VOICE, DEV_MODEL, &payload).unwrap();
        assert_eq!(packet.len(), NRL21_HEADER_LEN + 160);
        let decoded = decode(&packet).unwrap();
        assert_eq!(usize::from(decoded.length), packet.len());
    }

    #[test]
    fn round_trip_preserves_fields() {
        let packet = encode(&identity(), PKT_VOICE, DEV_MODEL, b"abc").unwrap();
        let decoded = decode(&packet).unwrap();
        assert_eq!(decoded.callsign, "BG7XYZ");
        assert_eq!(decoded.ssid, 6);
        assert_eq!(decoded.packet_type, PKT_VOICE);
        assert_eq!(decoded.dev_model, DEV_MODEL);
        assert_eq!(decoded.count, 0);
        assert_eq!(decoded.cpuid, cpu_id("BG7XYZ", 6));
        assert_eq!(&decoded.payload[..], b"abc");
    }

    #[test]
    fn five_char_callsign_is_null_terminated() {
        let packet = encode(&Identity::new("N0CAL", 7), PKT_HEARTBEAT, DEV_MODEL, &[]).unwrap();
        assert_eq!(packet[29], 0);
        let decoded = decode(&packet).unwrap();
        assert_eq!(decoded.callsign, "N0CAL");
    }

    #[test]
    fn rejects_short_packets() {
        assert!(decode(&[0u8; 47]).is_err());
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut packet = encode(&identity(), PKT_HEARTBEAT, DEV_MODEL, &[]).unwrap().to_vec();
        packet[0] = b'X';
        assert!(decode(&packet).is_err());
    }

    #[test]
    fn rejects_oversized_payload() {
        let payload = vec![0u8; MAX_DATAGRAM];
        assert!(encode(&identity(), PKT_VOICE, DEV_MODEL, &payload).is_err());
    }

    #[test]
    fn cpu_id_folds_ascii() {
        // hash = hash * 31 + byte over "A-0"
        let expected: u32 = (u32::from(b'A') * 31 + u32::from(b'-')) * 31 + u32::from(b'0');
        assert_eq!(cpu_id("A", 0), expected.to_be_bytes());
    }

    #[test]
    fn callsign_trailing_cr_and_nul_are_trimmed() {
        let mut packet = encode(&identity(), PKT_HEARTBEAT, DEV_MODEL, &[]).unwrap().to_vec();
        packet[24..30].copy_from_slice(b"N0CL\x0d\x00");
        let decoded = decode(&packet).unwrap();
        assert_eq!(decoded.callsign, "N0CL");
    }
}
