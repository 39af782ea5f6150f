//! Packed RGB565 colours and the hue lookup table used to colour intensities.

/// Number of hue steps in [`HueLut`].
pub const HUE_STEPS: usize = 360;

const RED_MASK: u16 = 0x1F;
const GREEN_MASK: u16 = 0x3F;
const BLUE_MASK: u16 = 0x1F;

/// Packs 5-6-5 channel values, masking each to its bit width.
#[inline]
pub fn pack_rgb565(r: u16, g: u16, b: u16) -> u16 {
    ((r & RED_MASK) << 11) | ((g & GREEN_MASK) << 5) | (b & BLUE_MASK)
}

/// Splits a packed colour into its 5-6-5 channel values.
#[inline]
pub fn unpack_rgb565(color: u16) -> (u16, u16, u16) {
    ((color >> 11) & RED_MASK, (color >> 5) & GREEN_MASK, color & BLUE_MASK)
}

/// Fully saturated hue colours, one per degree. Built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HueLut {
    entries: [u16; HUE_STEPS],
}

impl HueLut {
    pub fn new() -> Self {
        let mut entries = [0u16; HUE_STEPS];
        for (degree, entry) in entries.iter_mut().enumerate() {
            *entry = hue_to_rgb565(degree as f64 / HUE_STEPS as f64);
        }
        Self { entries }
    }

    /// Base colour for a hue index; out-of-range indices saturate at the last entry.
    #[inline]
    pub fn get(&self, index: usize) -> u16 {
        self.entries[index.min(HUE_STEPS - 1)]
    }

    pub fn entries(&self) -> &[u16; HUE_STEPS] {
        &self.entries
    }
}

impl Default for HueLut {
    fn default() -> Self {
        Self::new()
    }
}

/// Full saturation and value HSV to RGB565 for a hue in `[0, 1)`.
///
/// Computed in `f64`: in single precision a few channels land one step off
/// (hue 220 gets green 21 instead of 20).
fn hue_to_rgb565(hue: f64) -> u16 {
    let scaled = hue * 6.0;
    let sector = scaled.floor();
    let f = scaled - sector;
    let (p, q, t) = (0.0, 1.0 - f, f);
    let (r, g, b) = match (sector as i32).rem_euclid(6) {
        0 => (1.0, t, p),
        1 => (q, 1.0, p),
        2 => (p, 1.0, t),
        3 => (p, q, 1.0),
        4 => (t, p, 1.0),
        _ => (1.0, p, q),
    };
    pack_rgb565((r * 31.0) as u16, (g * 63.0) as u16, (b * 31.0) as u16)
}

/// Maps `(position, intensity)` pairs to packed colours.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    lut: HueLut,
    black_and_white: bool,
}

impl ColorMapper {
    pub fn new(black_and_white: bool) -> Self {
        Self::with_lut(HueLut::new(), black_and_white)
    }

    pub fn with_lut(lut: HueLut, black_and_white: bool) -> Self {
        Self {
            lut,
            black_and_white,
        }
    }

    /// Colour for one bin. `position` is the bin index divided by the
    /// sequence length; `intensity` is expected in `[0, 1]`.
    #[inline]
    pub fn map(&self, position: f32, intensity: f32) -> u16 {
        if self.black_and_white {
            let gray = (intensity * 31.0) as u16 & RED_MASK;
            return (gray << 11) | (((gray << 1) & GREEN_MASK) << 5) | gray;
        }

        let hue = (position.rem_euclid(1.0) * HUE_STEPS as f32) as usize;
        let (r, g, b) = unpack_rgb565(self.lut.get(hue));
        pack_rgb565(
            (r as f32 * intensity) as u16,
            (g as f32 * intensity) as u16,
            (b as f32 * intensity) as u16,
        )
    }

    /// Colours a whole intensity sequence into `out`, which must be at least
    /// as long as `intensities`.
    pub fn map_into(&self, intensities: &[f32], out: &mut [u16]) {
        let len = intensities.len() as f32;
        for (index, (slot, intensity)) in out.iter_mut().zip(intensities).enumerate() {
            *slot = self.map(index as f32 / len, *intensity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lut_starts_red_and_hits_primaries() {
        let lut = HueLut::new();
        assert_eq!(lut.get(0), 0xF800);
        assert_eq!(lut.get(120), pack_rgb565(0, 63, 0));
        assert_eq!(lut.get(240), pack_rgb565(0, 0, 31));
        assert_eq!(lut.get(10_000), lut.get(359));
    }

    #[test]
    fn lut_matches_double_precision_hsv() {
        let lut = HueLut::new();
        let expected = [
            (0, 0xF800),
            (59, 65440),
            (60, 65504),
            (61, 63456),
            (119, 2016),
            (180, 2047),
            (220, 0x029F),
            (239, 63),
            (300, 63519),
            (359, 63488),
        ];
        for (hue, color) in expected {
            assert_eq!(lut.entries()[hue], color, "hue {hue}");
        }
        assert_eq!(unpack_rgb565(lut.get(220)), (0, 20, 31));
    }

    #[test]
    fn zero_intensity_is_black() {
        let mapper = ColorMapper::new(false);
        for position in [0.0, 0.25, 0.5, 0.999] {
            assert_eq!(mapper.map(position, 0.0), 0);
        }
        assert_eq!(ColorMapper::new(true).map(0.3, 0.0), 0);
    }

    #[test]
    fn full_intensity_returns_base_hue() {
        let mapper = ColorMapper::new(false);
        let lut = HueLut::new();
        assert_eq!(mapper.map(0.5, 1.0), lut.get(180));
        assert_eq!(mapper.map(1.25, 1.0), lut.get(90));
    }

    #[test]
    fn intensity_scales_each_channel() {
        let mapper = ColorMapper::new(false);
        // Hue 0 is pure red: r = 31.
        assert_eq!(mapper.map(0.0, 0.5), pack_rgb565(15, 0, 0));
    }

    #[test]
    fn black_and_white_stays_neutral() {
        let mapper = ColorMapper::new(true);
        assert_eq!(mapper.map(0.7, 1.0), pack_rgb565(31, 62, 31));
        let (r, g, b) = unpack_rgb565(mapper.map(0.1, 0.5));
        assert_eq!((r, g, b), (15, 30, 15));
    }

    #[test]
    fn mapping_is_deterministic() {
        let a = ColorMapper::new(false);
        let b = ColorMapper::new(false);
        for step in 0..200 {
            let position = step as f32 / 200.0;
            let intensity = (step % 17) as f32 / 16.0;
            assert_eq!(a.map(position, intensity), b.map(position, intensity));
            assert_eq!(a.map(position, intensity), a.map(position, intensity));
        }
    }

    #[test]
    fn maps_sequences_by_relative_position() {
        let mapper = ColorMapper::new(false);
        let mut out = [0u16; 4];
        mapper.map_into(&[1.0, 1.0, 1.0, 1.0], &mut out);
        let lut = HueLut::new();
        assert_eq!(out, [lut.get(0), lut.get(90), lut.get(180), lut.get(270)]);
    }
}
