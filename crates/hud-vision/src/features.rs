//! Keypoint detection and binary descriptors.
//!
//! Matchers only talk to [`FeatureBackend`]; the default [`OrbBackend`]
//! pairs FAST-9 corners with rotation-steered BRIEF descriptors.

use image::GrayImage;
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::homography::{find_homography, HomographyEstimate, RansacParams};

/// Radius of the disk used for the orientation moment.
const ORIENTATION_RADIUS: i32 = 15;
/// Radius of the disk BRIEF test points are drawn from.
const PATTERN_RADIUS: i32 = 12;
/// Keypoints closer than this to the border have no complete patch.
const EDGE_MARGIN: u32 = 16;
/// Minimum spacing between kept corners.
const NMS_RADIUS: i32 = 3;
const DESCRIPTOR_BITS: usize = 256;
const PATTERN_SEED: u64 = 0x0b5e_ed00;

/// Detected interest point in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Dominant orientation in radians.
    pub angle: f32,
    pub response: f32,
}

/// 256-bit binary descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor(pub [u8; 32]);

impl Descriptor {
    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Keypoints with their descriptors; both vectors are index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Everything the matchers need from a feature implementation.
pub trait FeatureBackend {
    /// Detect up to `max_features` keypoints and describe them.
    fn detect(&self, gray: &GrayImage, max_features: usize) -> FeatureSet;

    fn distance(&self, a: &Descriptor, b: &Descriptor) -> u32 {
        a.hamming(b)
    }

    /// Robustly fit a homography mapping `src` onto `dst`.
    fn estimate_homography(
        &self,
        src: &[(f32, f32)],
        dst: &[(f32, f32)],
        reproj_threshold: f64,
    ) -> Option<HomographyEstimate> {
        let params = RansacParams {
            reproj_threshold,
            ..RansacParams::default()
        };
        find_homography(src, dst, &params)
    }
}

/// FAST-9 corners + steered BRIEF, in the spirit of ORB.
#[derive(Debug, Clone)]
pub struct OrbBackend {
    fast_threshold: u8,
    blur_sigma: f32,
    pattern: Vec<[(i32, i32); 2]>,
}

impl OrbBackend {
    pub fn new(fast_threshold: u8) -> Self {
        Self {
            fast_threshold,
            blur_sigma: 2.0,
            pattern: sampling_pattern(),
        }
    }

    fn orientation(gray: &GrayImage, cx: u32, cy: u32) -> f32 {
        let (mut m01, mut m10) = (0f64, 0f64);
        for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
                if dx * dx + dy * dy > ORIENTATION_RADIUS * ORIENTATION_RADIUS {
                    continue;
                }
                let v = gray.get_pixel((cx as i32 + dx) as u32, (cy as i32 + dy) as u32)[0] as f64;
                m10 += dx as f64 * v;
                m01 += dy as f64 * v;
            }
        }
        m01.atan2(m10) as f32
    }

    fn describe(&self, smooth: &GrayImage, kp: &Keypoint) -> Descriptor {
        let (sin, cos) = kp.angle.sin_cos();
        let sample = |(x, y): (i32, i32)| {
            let rx = (x as f32 * cos - y as f32 * sin).round() as i32;
            let ry = (x as f32 * sin + y as f32 * cos).round() as i32;
            smooth.get_pixel((kp.x as i32 + rx) as u32, (kp.y as i32 + ry) as u32)[0]
        };

        let mut bits = [0u8; 32];
        for (i, [p, q]) in self.pattern.iter().enumerate() {
            if sample(*p) < sample(*q) {
                bits[i / 8] |= 1 << (i % 8);
            }
        }
        Descriptor(bits)
    }
}

impl Default for OrbBackend {
    fn default() -> Self {
        Self::new(20)
    }
}

impl FeatureBackend for OrbBackend {
    fn detect(&self, gray: &GrayImage, max_features: usize) -> FeatureSet {
        let (w, h) = gray.dimensions();
        if w <= 2 * EDGE_MARGIN || h <= 2 * EDGE_MARGIN || max_features == 0 {
            return FeatureSet::default();
        }

        let mut corners: Vec<_> = corners_fast9(gray, self.fast_threshold)
            .into_iter()
            .filter(|c| {
                c.x >= EDGE_MARGIN
                    && c.y >= EDGE_MARGIN
                    && c.x < w - EDGE_MARGIN
                    && c.y < h - EDGE_MARGIN
            })
            .collect();
        corners.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });

        // Strongest-first suppression of neighbours within NMS_RADIUS.
        let mut taken = vec![false; (w * h) as usize];
        let mut keypoints = Vec::new();
        for c in corners {
            if taken[(c.y * w + c.x) as usize] {
                continue;
            }
            for dy in -NMS_RADIUS..=NMS_RADIUS {
                for dx in -NMS_RADIUS..=NMS_RADIUS {
                    let (nx, ny) = (c.x as i32 + dx, c.y as i32 + dy);
                    if nx >= 0 && ny >= 0 && (nx as u32) < w && (ny as u32) < h {
                        taken[(ny as u32 * w + nx as u32) as usize] = true;
                    }
                }
            }
            keypoints.push(Keypoint {
                x: c.x as f32,
                y: c.y as f32,
                angle: Self::orientation(gray, c.x, c.y),
                response: c.score,
            });
            if keypoints.len() >= max_features {
                break;
            }
        }

        let smooth = gaussian_blur_f32(gray, self.blur_sigma);
        let descriptors = keypoints.iter().map(|kp| self.describe(&smooth, kp)).collect();
        FeatureSet {
            keypoints,
            descriptors,
        }
    }
}

/// Fixed BRIEF test pairs drawn uniformly from a disk. Seeded so every run
/// (and every index build) describes points identically.
fn sampling_pattern() -> Vec<[(i32, i32); 2]> {
    let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
    let mut point = move || loop {
        let x = rng.gen_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
        let y = rng.gen_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
        if x * x + y * y <= PATTERN_RADIUS * PATTERN_RADIUS {
            return (x, y);
        }
    };

    let mut pattern = Vec::with_capacity(DESCRIPTOR_BITS);
    while pattern.len() < DESCRIPTOR_BITS {
        let p = point();
        let q = point();
        if p != q {
            pattern.push([p, q]);
        }
    }
    pattern
}
