/// Linear resampler from a per-bin colour sequence to exactly one sample per pixel.
///
/// Sample positions are fixed for a given `(source_len, target_len)` pair, so
/// they are computed once: target sample `i` reads source position
/// `i * source_len / target_len`, i.e. `target_len` evenly spaced points over
/// `[0, source_len)`. Positions past the last source index hold its value.
#[derive(Debug, Clone)]
pub struct Interpolator {
    source_len: usize,
    taps: Vec<Tap>,
    output: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tap {
    index: usize,
    frac: f64,
}

impl Interpolator {
    pub fn new(source_len: usize, target_len: usize) -> Self {
        let last = source_len.saturating_sub(1);
        let taps = (0..target_len)
            .map(|i| {
                let x = i as f64 * source_len as f64 / target_len as f64;
                let index = x.floor() as usize;
                if index >= last {
                    Tap {
                        index: last,
                        frac: 0.0,
                    }
                } else {
                    Tap {
                        index,
                        frac: x - index as f64,
                    }
                }
            })
            .collect();

        Self {
            source_len,
            taps,
            output: vec![0; target_len],
        }
    }

    pub fn source_len(&self) -> usize {
        self.source_len
    }

    pub fn target_len(&self) -> usize {
        self.output.len()
    }

    /// Resamples `source` and returns the interpolated sequence. The values are
    /// blended numerically and truncated back to `u16`. An empty source yields
    /// zeros.
    pub fn resample(&mut self, source: &[u16]) -> &[u16] {
        if source.is_empty() {
            self.output.fill(0);
            return &self.output;
        }

        let last = source.len() - 1;
        for (out, tap) in self.output.iter_mut().zip(&self.taps) {
            let index = tap.index.min(last);
            let lo = source[index] as f64;
            let value = if tap.frac > 0.0 && index < last {
                let hi = source[index + 1] as f64;
                lo + (hi - lo) * tap.frac
            } else {
                lo
            };
            *out = value as u16;
        }

        &self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_source_value_fills_target() {
        let mut interp = Interpolator::new(1, 100);
        let out = interp.resample(&[0xBEEF]);
        assert_eq!(out.len(), 100);
        assert!(out.iter().all(|v| *v == 0xBEEF));
    }

    #[test]
    fn equal_lengths_are_identity() {
        let source: Vec<u16> = (0..64).map(|i| (i * 997 % 65_536) as u16).collect();
        let mut interp = Interpolator::new(64, 64);
        assert_eq!(interp.resample(&source), source.as_slice());
    }

    #[test]
    fn upsampling_interpolates_linearly() {
        let mut interp = Interpolator::new(2, 4);
        // Positions 0.0, 0.5, 1.0, 1.5; the tail clamps to the last value.
        assert_eq!(interp.resample(&[0, 100]), &[0, 50, 100, 100]);
    }

    #[test]
    fn downsampling_truncates_fractions() {
        let mut interp = Interpolator::new(9, 2);
        // Positions 0.0 and 4.5.
        assert_eq!(interp.resample(&[0, 1, 2, 3, 4, 5, 6, 7, 8]), &[0, 4]);
        let mut interp = Interpolator::new(3, 2);
        // Position 1.5 between 10 and 15.
        assert_eq!(interp.resample(&[0, 10, 15]), &[0, 12]);
    }

    #[test]
    fn output_length_is_fixed() {
        let mut interp = Interpolator::new(257, 16);
        assert_eq!(interp.resample(&[7; 257]).len(), 16);
        assert_eq!(interp.resample(&[]).len(), 16);
    }
}
