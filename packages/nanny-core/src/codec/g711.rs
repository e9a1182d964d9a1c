//! G.711 A-law codec with precomputed lookup tables.
//!
//! Both directions are table-driven: a 256-entry A-law-to-linear table and a
//! 65536-entry linear-to-A-law table, built once on first use. Encoding
//! applies the station's linear volume gain before companding, clipping to
//! the int16 range.

use std::sync::OnceLock;

struct Tables {
    alaw_to_linear: [i16; 256],
    linear_to_alaw: Box<[u8; 65536]>,
}

static TABLES: OnceLock<Tables> = OnceLock::new();

fn tables() -> &'static Tables {
    TABLES.get_or_init(|| {
        let mut alaw_to_linear = [0i16; 256];
        for (code, slot) in alaw_to_linear.iter_mut().enumerate() {
            *slot = expand(code as u8);
        }
        let mut linear_to_alaw = vec![0u8; 65536].into_boxed_slice();
        for raw in 0..=u16::MAX {
            linear_to_alaw[raw as usize] = compress(raw as i16);
        }
        let linear_to_alaw: Box<[u8; 65536]> = linear_to_alaw.try_into().expect("table size");
        Tables {
            alaw_to_linear,
            linear_to_alaw,
        }
    })
}

fn expand(code: u8) -> i16 {
    let code = code ^ 0x55;
    let iexp = i16::from((code & 0x70) >> 4);
    let mut mant = i16::from(code & 0x0f);
    if iexp > 0 {
        mant += 16;
    }
    mant = (mant << 4) + 0x08;
    if iexp > 1 {
        mant <<= iexp - 1;
    }
    if code & 0x80 != 0 {
        mant
    } else {
        -mant
    }
}

fn compress(sample: i16) -> u8 {
    let sign: u8;
    let mut ix: i16;
    if sample < 0 {
        sign = 0x80;
        ix = !sample >> 4;
    } else {
        sign = 0;
        ix = sample >> 4;
    }

    if ix > 15 {
        let mut iexp: u8 = 1;
        while ix > 31 {
            ix >>= 1;
            iexp += 1;
        }
        ix -= 16;
        ix += i16::from(iexp) << 4;
    }

    if sign == 0 {
        ix |= 0x80;
    }

    ix as u8 ^ 0x55
}

/// Expands one A-law byte to a linear 16-bit sample.
#[inline]
pub fn alaw_to_linear(code: u8) -> i16 {
    tables().alaw_to_linear[usize::from(code)]
}

/// Compands one linear 16-bit sample to an A-law byte.
#[inline]
pub fn linear_to_alaw(sample: i16) -> u8 {
    tables().linear_to_alaw[sample as u16 as usize]
}

/// Scales a mixed sample by a linear gain, clipping to the int16 range.
#[inline]
pub fn scale_sample(sample: i32, volume: f64) -> i16 {
    let scaled = f64::from(sample) * volume;
    scaled.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Encodes mixed samples to A-law, applying the volume gain to each one.
pub fn encode(samples: &[i32], volume: f64) -> Vec<u8> {
    samples
        .iter()
        .map(|&s| linear_to_alaw(scale_sample(s, volume)))
        .collect()
}

/// Decodes an A-law payload to linear 16-bit samples.
pub fn decode(data: &[u8]) -> Vec<i16> {
    data.iter().map(|&b| alaw_to_linear(b)).collect()
}

/// Decodes an A-law payload straight to little-endian PCM bytes, the form
/// the recorder and the live hub consume.
pub fn decode_to_pcm_bytes(data: &[u8]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(data.len() * 2);
    for &b in data {
        pcm.extend_from_slice(&alaw_to_linear(b).to_le_bytes());
    }
    pcm
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A-law quantization step for the segment holding `sample`.
    fn step(sample: i16) -> i16 {
        let code = linear_to_alaw(sample) ^ 0x55;
        let iexp = i16::from((code & 0x70) >> 4);
        if iexp <= 1 {
            16
        } else {
            16 << (iexp - 1)
        }
    }

    #[test]
    fn round_trip_stays_within_one_quantization_step() {
        for raw in 0..=u16::MAX {
            let s = raw as i16;
            let back = alaw_to_linear(linear_to_alaw(s));
            let diff = (i32::from(back) - i32::from(s)).unsigned_abs() as i16;
            assert!(
                diff <= step(s),
                "sample {} decoded to {} (step {})",
                s,
                back,
                step(s)
            );
        }
    }

    #[test]
    fn volume_scales_before_companding() {
        let payload = encode(&[10000; 4], 0.5);
        for &code in &payload {
            let back = i32::from(alaw_to_linear(code));
            assert!((back - 5000).abs() <= i32::from(step(5000)));
        }
    }

    #[test]
    fn gain_clips_to_int16_range() {
        assert_eq!(scale_sample(30000, 2.0), i16::MAX);
        assert_eq!(scale_sample(-30000, 2.0), i16::MIN);
        assert_eq!(scale_sample(1000, 1.0), 1000);
    }

    #[test]
    fn pcm_bytes_are_little_endian() {
        let code = linear_to_alaw(1000);
        let pcm = decode_to_pcm_bytes(&[code]);
        let sample = i16::from_le_bytes([pcm[0], pcm[1]]);
        assert_eq!(sample, alaw_to_linear(code));
    }
}
