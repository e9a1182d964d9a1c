//! PCM plumbing: the 20 ms frame unit, the bounded source channels feeding
//! the mixer, and WAV file I/O.

pub mod sources;
pub mod wav;

use crate::protocol_constants::FRAME_SAMPLES;

/// One 20 ms block of 8 kHz mono audio. Samples are widened to `i32` so the
/// mixer can sum sources without premature clipping; partial frames never
/// cross component boundaries.
pub type Frame = [i32; FRAME_SAMPLES];

/// Splits decoded samples into full frames, dropping any partial tail.
pub fn frames(samples: &[i32]) -> impl Iterator<Item = Frame> + '_ {
    samples.chunks_exact(FRAME_SAMPLES).map(|chunk| {
        let mut frame = [0i32; FRAME_SAMPLES];
        frame.copy_from_slice(chunk);
        frame
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tail_is_dropped() {
        let samples = vec![7i32; FRAME_SAMPLES * 2 + 30];
        let collected: Vec<Frame> = frames(&samples).collect();
        assert_eq!(collected.len(), 2);
        assert!(collected.iter().all(|f| f.iter().all(|&s| s == 7)));
    }
}
