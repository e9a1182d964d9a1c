//! Sample conditioning between the capture device and the canonical
//! 8 kHz mono stream.
//!
//! Host capture formats vary; the chain reduces whatever the device
//! delivers, in order: channel downmix by arithmetic mean, DC-offset
//! removal (first-order high-pass, coefficient 0.995), anti-alias
//! low-pass at 3400 Hz (63-tap windowed sinc, Blackman-Harris window),
//! and cubic-interpolation resampling to 8 kHz. Every stage carries its
//! state across buffers so chunk boundaries are inaudible.

use std::f32::consts::PI;

use crate::protocol_constants::{DC_BLOCK_COEF, LOWPASS_CUTOFF_HZ, LOWPASS_TAPS, SAMPLE_RATE};

/// First-order DC-blocking high-pass: `y[n] = x[n] - x[n-1] + R*y[n-1]`.
struct DcBlocker {
    prev_in: f32,
    prev_out: f32,
}

impl DcBlocker {
    fn new() -> Self {
        Self {
            prev_in: 0.0,
            prev_out: 0.0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let y = x - self.prev_in + DC_BLOCK_COEF * self.prev_out;
        self.prev_in = x;
        self.prev_out = y;
        y
    }
}

/// FIR low-pass with the filter tail preserved between buffers.
struct LowPass {
    taps: Vec<f32>,
    /// Last `taps.len() - 1` input samples from the previous buffer.
    tail: Vec<f32>,
}

impl LowPass {
    fn new(input_rate: u32) -> Self {
        Self {
            taps: design_lowpass(LOWPASS_CUTOFF_HZ / input_rate as f32, LOWPASS_TAPS),
            tail: vec![0.0; LOWPASS_TAPS - 1],
        }
    }

    fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        let order = self.taps.len() - 1;
        let mut extended = Vec::with_capacity(order + input.len());
        extended.extend_from_slice(&self.tail);
        extended.extend_from_slice(input);

        output.clear();
        output.reserve(input.len());
        for i in 0..input.len() {
            let mut acc = 0.0f32;
            for (k, &tap) in self.taps.iter().enumerate() {
                acc += tap * extended[i + order - k];
            }
            output.push(acc);
        }

        self.tail.copy_from_slice(&extended[extended.len() - order..]);
    }
}

/// Windowed-sinc low-pass taps, Blackman-Harris windowed, unity DC gain.
fn design_lowpass(normalized_cutoff: f32, taps: usize) -> Vec<f32> {
    let mid = (taps - 1) as f32 / 2.0;
    let mut coefs: Vec<f32> = (0..taps)
        .map(|n| {
            let m = n as f32 - mid;
            let sinc = if m.abs() < f32::EPSILON {
                2.0 * normalized_cutoff
            } else {
                (2.0 * PI * normalized_cutoff * m).sin() / (PI * m)
            };
            let t = n as f32 / (taps - 1) as f32;
            let window = 0.35875 - 0.48829 * (2.0 * PI * t).cos() + 0.14128 * (4.0 * PI * t).cos()
                - 0.01168 * (6.0 * PI * t).cos();
            sinc * window
        })
        .collect();

    let sum: f32 = coefs.iter().sum();
    for c in &mut coefs {
        *c /= sum;
    }
    coefs
}

/// Cubic (Catmull-Rom) resampler with fractional phase carried across
/// buffers.
struct CubicResampler {
    /// Input samples consumed per output sample.
    step: f64,
    /// Read position into the virtual stream `history ++ input`.
    phase: f64,
    /// Last three input samples from the previous buffer.
    history: [f32; 3],
}

impl CubicResampler {
    fn new(input_rate: u32) -> Self {
        Self {
            step: f64::from(input_rate) / f64::from(SAMPLE_RATE),
            phase: 1.0,
            history: [0.0; 3],
        }
    }

    fn process(&mut self, input: &[f32], output: &mut Vec<f32>) {
        let mut stream = Vec::with_capacity(3 + input.len());
        stream.extend_from_slice(&self.history);
        stream.extend_from_slice(input);

        output.clear();
        // Interpolation needs the point after the read position, so stop
        // two samples short of the end.
        while (self.phase + 2.0) < stream.len() as f64 {
            let i = self.phase as usize;
            let frac = (self.phase - i as f64) as f32;
            let p0 = stream[i - 1];
            let p1 = stream[i];
            let p2 = stream[i + 1];
            let p3 = stream[i + 2];
            output.push(catmull_rom(p0, p1, p2, p3, frac));
            self.phase += self.step;
        }

        if stream.len() >= 3 {
            self.history.copy_from_slice(&stream[stream.len() - 3..]);
            self.phase -= (stream.len() - 3) as f64;
        }
    }
}

fn catmull_rom(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    p1 + 0.5
        * t
        * (p2 - p0 + t * (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3 + t * (3.0 * (p1 - p2) + p3 - p0)))
}

/// The full conditioning chain from device format to canonical samples.
///
/// When the device already delivers 8 kHz mono the chain is a pass-through;
/// a foreign rate engages DC removal, the anti-alias filter and the
/// resampler.
pub struct ConditioningChain {
    channels: usize,
    mono: Vec<f32>,
    converting: Option<Converting>,
    filtered: Vec<f32>,
    resampled: Vec<f32>,
}

struct Converting {
    dc: DcBlocker,
    lowpass: LowPass,
    resampler: CubicResampler,
}

impl ConditioningChain {
    pub fn new(input_rate: u32, channels: u16) -> Self {
        let converting = (input_rate != SAMPLE_RATE).then(|| Converting {
            dc: DcBlocker::new(),
            lowpass: LowPass::new(input_rate),
            resampler: CubicResampler::new(input_rate),
        });
        Self {
            channels: usize::from(channels.max(1)),
            mono: Vec::new(),
            converting,
            filtered: Vec::new(),
            resampled: Vec::new(),
        }
    }

    /// Reduces one interleaved buffer (samples in int16 range, any channel
    /// count) to canonical 8 kHz mono samples. The returned slice is only
    /// valid until the next call.
    pub fn process(&mut self, interleaved: &[f32]) -> &[f32] {
        self.mono.clear();
        if self.channels == 1 {
            self.mono.extend_from_slice(interleaved);
        } else {
            self.mono.reserve(interleaved.len() / self.channels);
            for frame in interleaved.chunks_exact(self.channels) {
                self.mono.push(frame.iter().sum::<f32>() / self.channels as f32);
            }
        }

        let Some(conv) = self.converting.as_mut() else {
            return &self.mono;
        };

        for s in &mut self.mono {
            *s = conv.dc.process(*s);
        }
        conv.lowpass.process(&self.mono, &mut self.filtered);
        conv.resampler.process(&self.filtered, &mut self.resampled);
        &self.resampled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowpass_taps_sum_to_unity() {
        let taps = design_lowpass(3400.0 / 48000.0, LOWPASS_TAPS);
        assert_eq!(taps.len(), LOWPASS_TAPS);
        let sum: f32 = taps.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        // Symmetric (linear phase)
        for k in 0..LOWPASS_TAPS / 2 {
            assert!((taps[k] - taps[LOWPASS_TAPS - 1 - k]).abs() < 1e-6);
        }
    }

    #[test]
    fn canonical_input_passes_through() {
        let mut chain = ConditioningChain::new(SAMPLE_RATE, 1);
        let input: Vec<f32> = (0..160).map(|i| i as f32).collect();
        assert_eq!(chain.process(&input), input.as_slice());
    }

    #[test]
    fn downmix_averages_channels() {
        let mut chain = ConditioningChain::new(SAMPLE_RATE, 2);
        let out = chain.process(&[100.0, 300.0, -50.0, 50.0]);
        assert_eq!(out, &[200.0, 0.0]);
    }

    #[test]
    fn resample_ratio_is_honored_across_buffers() {
        let mut chain = ConditioningChain::new(48000, 1);
        let mut produced = 0usize;
        let buffers = 50;
        let chunk = vec![1000.0f32; 480]; // 10 ms at 48 kHz
        for _ in 0..buffers {
            produced += chain.process(&chunk).len();
        }
        // 500 ms of input must come out as ~500 ms at 8 kHz.
        let expected = buffers * 80;
        assert!(
            (produced as i64 - expected as i64).unsigned_abs() < 8,
            "produced {} samples, expected ~{}",
            produced,
            expected
        );
    }

    #[test]
    fn dc_offset_is_removed() {
        let mut chain = ConditioningChain::new(48000, 1);
        let chunk = vec![5000.0f32; 480];
        let mut last_mean = f32::MAX;
        for _ in 0..100 {
            let out = chain.process(&chunk);
            if !out.is_empty() {
                last_mean = out.iter().sum::<f32>() / out.len() as f32;
            }
        }
        // A constant input decays toward zero through the high-pass.
        assert!(last_mean.abs() < 50.0, "residual DC {}", last_mean);
    }

    #[test]
    fn tone_below_cutoff_survives_conversion() {
        let mut chain = ConditioningChain::new(48000, 1);
        // 1 kHz tone at 48 kHz, amplitude 10000
        let chunk: Vec<f32> = (0..4800)
            .map(|i| 10000.0 * (2.0 * PI * 1000.0 * i as f32 / 48000.0).sin())
            .collect();
        let mut peak = 0.0f32;
        for _ in 0..10 {
            for s in chain.process(&chunk) {
                peak = peak.max(s.abs());
            }
        }
        assert!(peak > 8000.0, "1 kHz tone attenuated to {}", peak);
    }
}
