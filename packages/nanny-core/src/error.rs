//! Centralized error types for the NRL Nanny core library.

use std::path::PathBuf;

use thiserror::Error;

/// Application-wide error type for the station.
///
/// Policy lives with the callers: configuration and dial failures are fatal
/// at startup, wire and WAV decode failures are logged and dropped, slow
/// live clients only lose frames. See the individual services for how each
/// kind is handled.
#[derive(Debug, Error)]
pub enum NannyError {
    /// Configuration file could not be found or read.
    #[error("configuration missing: {0}")]
    ConfigMissing(PathBuf),

    /// Configuration was read but a value is unusable.
    #[error("configuration invalid: {0}")]
    ConfigInvalid(String),

    /// UDP socket could not be created or dialed, or died unrecoverably.
    #[error("socket failure: {0}")]
    SocketFatal(std::io::Error),

    /// Inbound datagram or AT block failed to decode.
    #[error("wire decode failed: {0}")]
    WireDecode(String),

    /// WAV file is not 8 kHz / 16-bit / mono PCM, or its header is broken.
    #[error("WAV format rejected: {0}")]
    WavFormat(String),

    /// Scheduler input (cron expression, scheduled filename) did not parse.
    #[error("scheduler parse failed: {0}")]
    SchedulerParse(String),

    /// A live client's send queue overflowed.
    #[error("live client too slow: {0}")]
    ClientSlow(String),

    /// File I/O failed (recording flush, playlist read).
    #[error("file I/O failed: {0}")]
    FileIo(String),
}

impl NannyError {
    /// Returns a machine-readable error code for the status surface.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigMissing(_) => "config_missing",
            Self::ConfigInvalid(_) => "config_invalid",
            Self::SocketFatal(_) => "socket_fatal",
            Self::WireDecode(_) => "wire_decode",
            Self::WavFormat(_) => "wav_format",
            Self::SchedulerParse(_) => "scheduler_parse",
            Self::ClientSlow(_) => "client_slow",
            Self::FileIo(_) => "file_io",
        }
    }
}

impl From<std::io::Error> for NannyError {
    fn from(err: std::io::Error) -> Self {
        Self::FileIo(err.to_string())
    }
}

/// Convenient Result alias for station-wide operations.
pub type NannyResult<T> = Result<T, NannyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = NannyError::WireDecode("too short".into());
        assert_eq!(err.code(), "wire_decode");
        let err = NannyError::ConfigMissing(PathBuf::from("nrlnanny.yaml"));
        assert_eq!(err.code(), "config_missing");
    }

    #[test]
    fn io_errors_become_file_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: NannyError = io.into();
        assert_eq!(err.code(), "file_io");
    }
}
