//! Color space conversions and 3-D color histograms.
//!
//! Conversions follow the usual 8-bit conventions of vision libraries:
//! HSV hue is halved into `[0, 180)`, LAB lightness is scaled to `[0, 255]`
//! and the a/b channels are offset by 128.

use image::RgbImage;
use palette::{Clamp, FromColor, Hsv, IntoColor, Lab, Srgb};
use serde::{Deserialize, Serialize};

/// Bins per channel.
pub const HIST_BINS: usize = 8;

/// Color space a histogram is computed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorSpace {
    Hsv,
    Lab,
}

impl ColorSpace {
    /// Upper (exclusive) range of each channel.
    fn ranges(self) -> [u32; 3] {
        match self {
            ColorSpace::Hsv => [180, 256, 256],
            ColorSpace::Lab => [256, 256, 256],
        }
    }

    fn convert(self, rgb: [u8; 3]) -> [u8; 3] {
        match self {
            ColorSpace::Hsv => rgb_to_hsv(rgb),
            ColorSpace::Lab => rgb_to_lab(rgb),
        }
    }
}

fn quantize(v: f32, max: f32) -> u8 {
    v.round().clamp(0.0, max) as u8
}

pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let hsv: Hsv = Srgb::new(r, g, b).into_format::<f32>().into_color();
    [
        quantize(hsv.hue.into_positive_degrees() / 2.0, 179.0),
        quantize(hsv.saturation * 255.0, 255.0),
        quantize(hsv.value * 255.0, 255.0),
    ]
}

pub fn rgb_to_lab([r, g, b]: [u8; 3]) -> [u8; 3] {
    let lab: Lab = Srgb::new(r, g, b).into_format::<f32>().into_color();
    [
        quantize(lab.l * 255.0 / 100.0, 255.0),
        quantize(lab.a + 128.0, 255.0),
        quantize(lab.b + 128.0, 255.0),
    ]
}

pub fn lab_to_rgb([l, a, b]: [u8; 3]) -> [u8; 3] {
    let lab: Lab = Lab::new(l as f32 * 100.0 / 255.0, a as f32 - 128.0, b as f32 - 128.0);
    let rgb = Srgb::<f32>::from_color(lab).clamp();
    let rgb: Srgb<u8> = rgb.into_format();
    [rgb.red, rgb.green, rgb.blue]
}

/// Normalized `8 x 8 x 8` color histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorHistogram {
    pub space: ColorSpace,
    pub bins: Vec<f32>,
}

impl ColorHistogram {
    /// Count every pixel of `img` into the histogram and L2-normalize.
    pub fn compute(img: &RgbImage, space: ColorSpace) -> Self {
        let ranges = space.ranges();
        let mut counts = vec![0f64; HIST_BINS * HIST_BINS * HIST_BINS];

        for px in img.pixels() {
            let c = space.convert(px.0);
            let bin = |i: usize| (c[i] as usize * HIST_BINS / ranges[i] as usize).min(HIST_BINS - 1);
            counts[(bin(0) * HIST_BINS + bin(1)) * HIST_BINS + bin(2)] += 1.0;
        }

        let norm = counts.iter().map(|c| c * c).sum::<f64>().sqrt();
        let bins = counts
            .iter()
            .map(|&c| if norm > 0.0 { (c / norm) as f32 } else { 0.0 })
            .collect();

        Self { space, bins }
    }

    /// Pearson correlation between the two histograms, in `[-1, 1]`.
    /// Returns 1.0 when either side is constant across bins.
    pub fn correlation(&self, other: &ColorHistogram) -> f64 {
        debug_assert_eq!(self.bins.len(), other.bins.len());
        let n = self.bins.len().min(other.bins.len());
        if n == 0 {
            return 0.0;
        }

        let mean_a = self.bins[..n].iter().map(|&v| v as f64).sum::<f64>() / n as f64;
        let mean_b = other.bins[..n].iter().map(|&v| v as f64).sum::<f64>() / n as f64;

        let (mut num, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
        for (&a, &b) in self.bins[..n].iter().zip(&other.bins[..n]) {
            let da = a as f64 - mean_a;
            let db = b as f64 - mean_b;
            num += da * db;
            var_a += da * da;
            var_b += db * db;
        }

        let denom = var_a * var_b;
        if denom.abs() > f64::EPSILON {
            num / denom.sqrt()
        } else {
            1.0
        }
    }
}
