//! WAV file I/O.
//!
//! Everything the station produces and consumes is 8 kHz / 16-bit / mono
//! little-endian PCM in a RIFF container. Non-conforming files are rejected
//! with a log line upstream; this module only reports the mismatch.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::{NannyError, NannyResult};
use crate::protocol_constants::SAMPLE_RATE;

/// The canonical spec for every WAV the station touches.
pub fn canonical_spec() -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Reads a clip into mixer-ready samples, rejecting any format other than
/// the canonical one.
pub fn read_clip(path: &Path) -> NannyResult<Vec<i32>> {
    let reader = WavReader::open(path)
        .map_err(|e| NannyError::WavFormat(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();
    if spec != canonical_spec() {
        return Err(NannyError::WavFormat(format!(
            "{}: expected 8000 Hz / 16-bit / mono PCM, got {} Hz / {}-bit / {} ch",
            path.display(),
            spec.sample_rate,
            spec.bits_per_sample,
            spec.channels
        )));
    }
    reader
        .into_samples::<i16>()
        .map(|s| {
            s.map(i32::from)
                .map_err(|e| NannyError::WavFormat(format!("{}: {}", path.display(), e)))
        })
        .collect()
}

/// Writes little-endian PCM bytes as a canonical WAV file.
pub fn write_recording(path: &Path, pcm: &[u8]) -> NannyResult<()> {
    let mut writer = WavWriter::create(path, canonical_spec())
        .map_err(|e| NannyError::FileIo(format!("{}: {}", path.display(), e)))?;
    for chunk in pcm.chunks_exact(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        writer
            .write_sample(sample)
            .map_err(|e| NannyError::FileIo(format!("{}: {}", path.display(), e)))?;
    }
    writer
        .finalize()
        .map_err(|e| NannyError::FileIo(format!("{}: {}", path.display(), e)))?;
    Ok(())
}
