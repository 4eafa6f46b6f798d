//! Planar homography estimation with RANSAC.

use nalgebra::{DMatrix, DVector, Matrix3, SMatrix, SVector, Vector3};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;

const MIN_POINTS: usize = 4;

#[derive(Debug, Clone)]
pub struct RansacParams {
    /// Max reprojection error (pixels) for a correspondence to count as inlier.
    pub reproj_threshold: f64,
    pub max_iters: usize,
    /// Desired probability of drawing at least one all-inlier sample.
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            reproj_threshold: 5.0,
            max_iters: 2000,
            confidence: 0.995,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HomographyEstimate {
    pub matrix: Matrix3<f64>,
    /// Per-correspondence inlier flags, aligned with the input points.
    pub inliers: Vec<bool>,
}

impl HomographyEstimate {
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&i| i).count()
    }

    pub fn project(&self, (x, y): (f32, f32)) -> Option<(f64, f64)> {
        project(&self.matrix, (x as f64, y as f64))
    }
}

/// Fit `dst ~ H * src`. Returns `None` with fewer than four correspondences
/// or when no non-degenerate sample could be solved.
pub fn find_homography(
    src: &[(f32, f32)],
    dst: &[(f32, f32)],
    params: &RansacParams,
) -> Option<HomographyEstimate> {
    let n = src.len().min(dst.len());
    if n < MIN_POINTS {
        return None;
    }
    let src: Vec<(f64, f64)> = src[..n].iter().map(|&(x, y)| (x as f64, y as f64)).collect();
    let dst: Vec<(f64, f64)> = dst[..n].iter().map(|&(x, y)| (x as f64, y as f64)).collect();
    let threshold_sq = params.reproj_threshold * params.reproj_threshold;

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<(Matrix3<f64>, Vec<bool>, usize)> = None;
    let mut iters_needed = params.max_iters;
    let mut iter = 0;

    while iter < iters_needed.min(params.max_iters) {
        iter += 1;
        let idx: Vec<usize> = sample(&mut rng, n, MIN_POINTS).into_vec();
        let s: Vec<(f64, f64)> = idx.iter().map(|&i| src[i]).collect();
        let d: Vec<(f64, f64)> = idx.iter().map(|&i| dst[i]).collect();
        if is_degenerate(&s) || is_degenerate(&d) {
            continue;
        }
        let Some(h) = solve_minimal(&s, &d) else {
            continue;
        };

        let (mask, count) = inlier_mask(&h, &src, &dst, threshold_sq);
        if best.as_ref().map_or(true, |(_, _, c)| count > *c) {
            best = Some((h, mask, count));
            iters_needed = update_iterations(params.confidence, count as f64 / n as f64, iters_needed);
        }
    }

    let (mut matrix, mut inliers, mut count) = best?;

    // Refit on the consensus set and keep it when it does not lose support.
    if count > MIN_POINTS {
        let s: Vec<(f64, f64)> = (0..n).filter(|&i| inliers[i]).map(|i| src[i]).collect();
        let d: Vec<(f64, f64)> = (0..n).filter(|&i| inliers[i]).map(|i| dst[i]).collect();
        if let Some(refit) = solve_least_squares(&s, &d) {
            let (mask, refit_count) = inlier_mask(&refit, &src, &dst, threshold_sq);
            if refit_count >= count {
                matrix = refit;
                inliers = mask;
                count = refit_count;
            }
        }
    }

    tracing::trace!("Homography: {}/{} inliers after {} iterations", count, n, iter);
    Some(HomographyEstimate { matrix, inliers })
}

fn update_iterations(confidence: f64, inlier_ratio: f64, current: usize) -> usize {
    let p_good = inlier_ratio.powi(MIN_POINTS as i32);
    if p_good >= 1.0 {
        return 1;
    }
    if p_good <= 0.0 {
        return current;
    }
    let needed = (1.0 - confidence).ln() / (1.0 - p_good).ln();
    if needed.is_finite() && needed >= 0.0 {
        (needed.ceil() as usize).min(current).max(1)
    } else {
        current
    }
}

fn project(h: &Matrix3<f64>, (x, y): (f64, f64)) -> Option<(f64, f64)> {
    let p = h * Vector3::new(x, y, 1.0);
    if p.z.abs() < 1e-12 {
        return None;
    }
    Some((p.x / p.z, p.y / p.z))
}

fn inlier_mask(
    h: &Matrix3<f64>,
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
    threshold_sq: f64,
) -> (Vec<bool>, usize) {
    let mask: Vec<bool> = src
        .iter()
        .zip(dst)
        .map(|(&s, &(dx, dy))| match project(h, s) {
            Some((px, py)) => (px - dx).powi(2) + (py - dy).powi(2) <= threshold_sq,
            None => false,
        })
        .collect();
    let count = mask.iter().filter(|&&m| m).count();
    (mask, count)
}

/// Any three of the four sample points (nearly) collinear.
fn is_degenerate(pts: &[(f64, f64)]) -> bool {
    for i in 0..pts.len() {
        for j in (i + 1)..pts.len() {
            for k in (j + 1)..pts.len() {
                let (a, b, c) = (pts[i], pts[j], pts[k]);
                let area = (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0);
                if area.abs() < 1e-6 {
                    return true;
                }
            }
        }
    }
    false
}

/// Two DLT rows per correspondence with `h33` fixed to 1.
fn dlt_rows((x, y): (f64, f64), (u, v): (f64, f64)) -> ([f64; 8], f64, [f64; 8], f64) {
    (
        [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y],
        u,
        [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y],
        v,
    )
}

fn to_matrix(h: &[f64]) -> Matrix3<f64> {
    Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0)
}

fn solve_minimal(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (i, (&s, &d)) in src.iter().zip(dst).enumerate().take(MIN_POINTS) {
        let (r1, b1, r2, b2) = dlt_rows(s, d);
        for c in 0..8 {
            a[(2 * i, c)] = r1[c];
            a[(2 * i + 1, c)] = r2[c];
        }
        b[2 * i] = b1;
        b[2 * i + 1] = b2;
    }
    let h = a.lu().solve(&b)?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(to_matrix(h.as_slice()))
}

fn solve_least_squares(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Matrix3<f64>> {
    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 8);
    let mut b = DVector::<f64>::zeros(2 * n);
    for (i, (&s, &d)) in src.iter().zip(dst).enumerate() {
        let (r1, b1, r2, b2) = dlt_rows(s, d);
        for c in 0..8 {
            a[(2 * i, c)] = r1[c];
            a[(2 * i + 1, c)] = r2[c];
        }
        b[2 * i] = b1;
        b[2 * i + 1] = b2;
    }
    let h = a.svd(true, true).solve(&b, 1e-12).ok()?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(to_matrix(h.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> Vec<(f32, f32)> {
        (0..6)
            .flat_map(|i| (0..5).map(move |j| (10.0 + i as f32 * 37.0, 12.0 + j as f32 * 41.0)))
            .collect()
    }

    fn apply(h: &Matrix3<f64>, pts: &[(f32, f32)]) -> Vec<(f32, f32)> {
        pts.iter()
            .map(|&(x, y)| {
                let (u, v) = project(h, (x as f64, y as f64)).unwrap();
                (u as f32, v as f32)
            })
            .collect()
    }

    #[test]
    fn test_recovers_known_homography() {
        let truth = Matrix3::new(1.1, 0.05, 12.0, -0.03, 0.95, -7.0, 0.0004, -0.0002, 1.0);
        let src = grid();
        let dst = apply(&truth, &src);

        let est = find_homography(&src, &dst, &RansacParams::default()).unwrap();
        assert_eq!(est.inlier_count(), src.len());
        let (u, v) = est.project((100.0, 100.0)).unwrap();
        let (tu, tv) = project(&truth, (100.0, 100.0)).unwrap();
        assert!((u - tu).abs() < 0.5 && (v - tv).abs() < 0.5);
    }

    #[test]
    fn test_rejects_outliers() {
        let src = grid();
        let mut dst: Vec<(f32, f32)> = src.iter().map(|&(x, y)| (x + 20.0, y - 5.0)).collect();
        for (k, p) in dst.iter_mut().enumerate().filter(|(k, _)| k % 5 == 0) {
            *p = (300.0 - k as f32 * 13.0, 17.0 * k as f32);
        }

        let est = find_homography(&src, &dst, &RansacParams::default()).unwrap();
        assert_eq!(est.inlier_count(), 24);
        for (k, inlier) in est.inliers.iter().enumerate() {
            assert_eq!(*inlier, k % 5 != 0, "point {}", k);
        }
    }

    #[test]
    fn test_too_few_points() {
        let pts = vec![(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)];
        assert!(find_homography(&pts, &pts, &RansacParams::default()).is_none());
    }

    #[test]
    fn test_repeatable() {
        let src = grid();
        let dst: Vec<(f32, f32)> = src
            .iter()
            .enumerate()
            .map(|(k, &(x, y))| if k % 3 == 0 { (y, x) } else { (x * 0.9, y * 1.1) })
            .collect();
        let a = find_homography(&src, &dst, &RansacParams::default()).unwrap();
        let b = find_homography(&src, &dst, &RansacParams::default()).unwrap();
        assert_eq!(a.inliers, b.inliers);
    }
}
