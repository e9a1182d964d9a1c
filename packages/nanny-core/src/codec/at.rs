//! AT command codec for NRL21 type-11 control blocks.
//!
//! A command payload is `0x01` followed by one `KEY=VALUE\r\n` line. The
//! station answers with a status block: `0x02`, the device banner, then
//! newline-joined `KEY=VALUE` lines.

use crate::protocol_constants::AT_BANNER;

/// One decoded AT command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCommand {
    pub command: String,
    pub value: String,
}

/// Decodes a command payload. Returns `None` for anything that is not a
/// single well-formed `KEY=VALUE` line behind the `0x01` marker.
pub fn decode(data: &[u8]) -> Option<AtCommand> {
    if data.len() < 2 || data[0] != 0x01 {
        return None;
    }
    let text = std::str::from_utf8(&data[1..]).ok()?;
    let mut parts = text.split('=');
    let command = parts.next()?;
    let value = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    Some(AtCommand {
        command: command.to_string(),
        value: value.trim_end_matches("\r\n").to_string(),
    })
}

/// Builds the status reply payload from `KEY=VALUE` lines.
pub fn encode_status(lines: &[String]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + AT_BANNER.len() + lines.len() * 16);
    out.push(0x02);
    out.extend_from_slice(AT_BANNER.as_bytes());
    out.extend_from_slice(lines.join("\r\n").as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_key_value_line() {
        let mut payload = vec![0x01];
        payload.extend_from_slice(b"AT+VOLUME=80\r\n");
        let at = decode(&payload).unwrap();
        assert_eq!(at.command, "AT+VOLUME");
        assert_eq!(at.value, "80");
    }

    #[test]
    fn rejects_wrong_marker_and_shape() {
        assert!(decode(&[0x02, b'A']).is_none());
        assert!(decode(&[0x01]).is_none());
        let mut no_eq = vec![0x01];
        no_eq.extend_from_slice(b"AT+NEXT\r\n");
        assert!(decode(&no_eq).is_none());
        let mut two_eq = vec![0x01];
        two_eq.extend_from_slice(b"AT+X=1=2\r\n");
        assert!(decode(&two_eq).is_none());
    }

    #[test]
    fn status_block_carries_banner_and_lines() {
        let payload = encode_status(&["AT+PAUSE=1".into(), "AT+VOLUME=50".into()]);
        assert_eq!(payload[0], 0x02);
        let text = std::str::from_utf8(&payload[1..]).unwrap();
        assert!(text.starts_with("NRLNANNY V2.0\r\n"));
        assert!(text.contains("AT+PAUSE=1\r\nAT+VOLUME=50\r\n"));
    }
}
