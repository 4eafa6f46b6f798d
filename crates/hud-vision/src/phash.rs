use image::imageops::{self, FilterType};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Side of the grayscale thumbnail the DCT runs on.
const HASH_INPUT: usize = 32;
/// Side of the low-frequency block kept from the DCT.
const HASH_BLOCK: usize = 8;

/// 64-bit DCT perceptual hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerceptualHash(pub u64);

impl PerceptualHash {
    /// Hash a grayscale image of any size.
    pub fn compute(gray: &GrayImage) -> Self {
        if gray.width() == 0 || gray.height() == 0 {
            return Self(0);
        }
        let small = imageops::resize(
            gray,
            HASH_INPUT as u32,
            HASH_INPUT as u32,
            FilterType::Triangle,
        );
        let low = dct_low_block(&small);

        // Median over the block with the DC row and column removed.
        let mut ac: Vec<f64> = (1..HASH_BLOCK)
            .flat_map(|u| (1..HASH_BLOCK).map(move |v| (u, v)))
            .map(|(u, v)| low[u][v])
            .collect();
        ac.sort_by(|a, b| a.total_cmp(b));
        let median = ac[ac.len() / 2];

        let mut bits = 0u64;
        for row in &low {
            for &coef in row {
                bits = (bits << 1) | u64::from(coef > median);
            }
        }
        Self(bits)
    }

    /// Number of differing bits.
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

/// Orthonormal 2-D DCT-II of a 32x32 image, keeping only the 8x8 top-left block.
/// Rows index vertical frequency, columns horizontal frequency.
fn dct_low_block(img: &GrayImage) -> [[f64; HASH_BLOCK]; HASH_BLOCK] {
    let n = HASH_INPUT;
    let basis: Vec<Vec<f64>> = (0..HASH_BLOCK)
        .map(|k| {
            let scale = if k == 0 {
                (1.0 / n as f64).sqrt()
            } else {
                (2.0 / n as f64).sqrt()
            };
            (0..n)
                .map(|i| scale * ((2 * i + 1) as f64 * k as f64 * PI / (2 * n) as f64).cos())
                .collect()
        })
        .collect();

    // Vertical pass: tmp[u][x] = sum_y basis[u][y] * img(x, y)
    let mut tmp = vec![vec![0f64; n]; HASH_BLOCK];
    for (u, row) in tmp.iter_mut().enumerate() {
        for (x, out) in row.iter_mut().enumerate() {
            *out = (0..n)
                .map(|y| basis[u][y] * img.get_pixel(x as u32, y as u32)[0] as f64)
                .sum();
        }
    }

    let mut low = [[0f64; HASH_BLOCK]; HASH_BLOCK];
    for u in 0..HASH_BLOCK {
        for v in 0..HASH_BLOCK {
            low[u][v] = (0..n).map(|x| tmp[u][x] * basis[v][x]).sum();
        }
    }
    low
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Smooth pattern defined in normalized coordinates, so any size shows the same picture.
    fn smooth(w: u32) -> GrayImage {
        let wf = w as f64;
        GrayImage::from_fn(w, w, |x, y| {
            let (x, y) = (x as f64, y as f64);
            let v = 128.0
                + 60.0 * (x * 6.0 / wf).sin()
                + 50.0 * (y * 9.0 / wf).cos()
                + 30.0 * ((x + y) * 4.0 / wf).sin();
            Luma([v as u8])
        })
    }

    fn blob(w: u32, cx: f64, cy: f64) -> GrayImage {
        let sigma = w as f64 / 6.0;
        GrayImage::from_fn(w, w, |x, y| {
            let d2 = (x as f64 - cx).powi(2) + (y as f64 - cy).powi(2);
            Luma([(255.0 * (-d2 / (2.0 * sigma * sigma)).exp()) as u8])
        })
    }

    #[test]
    fn test_identical_images_hash_equal() {
        let img = smooth(64);
        let a = PerceptualHash::compute(&img);
        let b = PerceptualHash::compute(&img.clone());
        assert_eq!(a, b);
        assert_eq!(a.distance(&b), 0);
    }

    #[test]
    fn test_hash_survives_rescale() {
        let d = PerceptualHash::compute(&smooth(128)).distance(&PerceptualHash::compute(&smooth(96)));
        assert!(d <= 10, "rescaled image should hash close, distance {}", d);
    }

    #[test]
    fn test_different_structure_hashes_apart() {
        let a = PerceptualHash::compute(&blob(64, 16.0, 20.0));
        let b = PerceptualHash::compute(&blob(64, 46.0, 44.0));
        assert!(a.distance(&b) > 10, "moved blob should differ, distance {}", a.distance(&b));
    }

    #[test]
    fn test_empty_image() {
        assert_eq!(PerceptualHash::compute(&GrayImage::new(0, 0)), PerceptualHash(0));
    }
}
