use hud_data::MatcherConfig;
use image::RgbImage;
use tracing::debug;

use crate::assets::{AssetIndex, AssetProfile};
use crate::matching::knn_ratio_matches;
use crate::{Identification, SharedBackend};

/// Identifies champion portrait crops against loading-splash assets.
///
/// Two phases: a cheap hash/histogram ranking picks a shortlist, then each
/// shortlisted asset is verified with ratio-tested descriptor matches and a
/// RANSAC homography. Variants sharing a label are aggregated by maximum.
pub struct PortraitMatcher {
    profile: AssetProfile,
    config: MatcherConfig,
    backend: SharedBackend,
}

impl PortraitMatcher {
    pub fn new(config: &MatcherConfig, backend: SharedBackend) -> Self {
        Self {
            profile: AssetProfile::portraits(config),
            config: config.clone(),
            backend,
        }
    }

    pub fn profile(&self) -> &AssetProfile {
        &self.profile
    }

    pub fn identify(&self, crop: &RgbImage, index: &AssetIndex) -> Identification {
        if index.is_empty() {
            return Identification::unmatched();
        }
        let Some(sig) = self.profile.signature(crop, &*self.backend) else {
            debug!("Portrait crop {:?} is empty", crop.dimensions());
            return Identification::unmatched();
        };
        let cfg = &self.config;

        // Phase 1: rank everything by histogram agreement minus hash distance.
        let mut ranked: Vec<(f64, usize)> = index
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let corr = sig.histogram.correlation(&entry.signature.histogram);
                let ham = sig.hash.distance(&entry.signature.hash) as f64;
                (corr * 100.0 - ham * cfg.prefilter_hamming_weight, i)
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        ranked.truncate(cfg.shortlist_size);

        // Phase 2: geometric verification of the shortlist.
        if sig.features.is_empty() {
            debug!("No features on portrait crop");
            return Identification::unmatched();
        }

        let mut per_label: Vec<(&str, f64)> = Vec::new();
        for &(prelim, i) in &ranked {
            let entry = &index.entries[i];
            let asset = &entry.signature;
            if asset.features.is_empty() {
                continue;
            }

            let good = knn_ratio_matches(
                &*self.backend,
                &sig.features.descriptors,
                &asset.features.descriptors,
                cfg.ratio_test,
            );
            if good.len() < cfg.min_good_matches {
                debug!("  {}: {} good matches, skipped", entry.path.display(), good.len());
                continue;
            }

            let (src, dst): (Vec<(f32, f32)>, Vec<(f32, f32)>) = good
                .iter()
                .map(|m| {
                    let q = &sig.features.keypoints[m.query_idx];
                    let t = &asset.features.keypoints[m.train_idx];
                    ((q.x, q.y), (t.x, t.y))
                })
                .unzip();
            let inliers = self
                .backend
                .estimate_homography(&src, &dst, cfg.ransac_reproj_threshold)
                .map_or(0, |h| h.inlier_count());
            let inlier_ratio = inliers as f64 / good.len() as f64;

            let corr = sig.histogram.correlation(&asset.histogram);
            let score = cfg.inlier_weight * inlier_ratio * 100.0
                + cfg.histogram_weight * (corr + 1.0) * 50.0;
            debug!(
                "  {}: prelim {:.1}, {}/{} inliers, hist {:.3} -> {:.1}",
                entry.path.display(),
                prelim,
                inliers,
                good.len(),
                corr,
                score
            );

            match per_label.iter_mut().find(|(label, _)| *label == entry.label) {
                Some((_, best)) => *best = best.max(score),
                None => per_label.push((entry.label.as_str(), score)),
            }
        }

        // First label reaching the maximum wins ties.
        let mut best: Option<(&str, f64)> = None;
        for &(label, score) in &per_label {
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((label, score));
            }
        }
        let Some((label, score)) = best else {
            return Identification::unmatched();
        };

        let confidence = (score * 10.0).round() / 10.0;
        if confidence < cfg.acceptance_threshold {
            debug!("Best portrait {} at {:.1} is below threshold", label, confidence);
            return Identification {
                label: None,
                confidence,
            };
        }
        Identification {
            label: Some(label.to_string()),
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetEntry, AssetKind};
    use crate::features::OrbBackend;
    use image::imageops::{self, FilterType};
    use image::Rgb;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    /// Scatter of random colored rectangles; each seed gives a distinct picture.
    fn splash(seed: u64) -> RgbImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut img = RgbImage::from_pixel(200, 250, Rgb([110, 110, 120]));
        for _ in 0..60 {
            let (w, h) = (rng.gen_range(8..50), rng.gen_range(8..50));
            let (x0, y0) = (rng.gen_range(0..200 - w), rng.gen_range(0..250 - h));
            let color = Rgb([rng.gen(), rng.gen(), rng.gen()]);
            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    img.put_pixel(x, y, color);
                }
            }
        }
        img
    }

    fn write_splashes(dir: &Path) {
        splash(1).save(dir.join("Ekko_0.png")).unwrap();
        splash(2).save(dir.join("Jinx_0.png")).unwrap();
        splash(3).save(dir.join("Jinx_1.png")).unwrap();
    }

    fn matcher(config: &MatcherConfig) -> PortraitMatcher {
        PortraitMatcher::new(config, Arc::new(OrbBackend::default()))
    }

    fn index_of(dir: &Path, m: &PortraitMatcher) -> AssetIndex {
        AssetIndex::build(dir, m.profile(), &*m.backend)
    }

    fn entry(m: &PortraitMatcher, file: &str, label: &str, img: &RgbImage) -> AssetEntry {
        AssetEntry {
            path: PathBuf::from(file),
            label: label.to_string(),
            signature: m.profile().signature(img, &*m.backend).unwrap(),
        }
    }

    fn index_from(entries: Vec<AssetEntry>) -> AssetIndex {
        AssetIndex {
            kind: AssetKind::Portrait,
            entries,
        }
    }

    #[test]
    fn test_identical_splash_matches() {
        let dir = tempfile::tempdir().unwrap();
        write_splashes(dir.path());
        let m = matcher(&MatcherConfig::default());
        let index = index_of(dir.path(), &m);
        assert_eq!(index.len(), 3);

        let id = m.identify(&splash(3), &index);
        assert_eq!(id.label.as_deref(), Some("Jinx"));
        assert!(id.confidence >= 75.0, "confidence {}", id.confidence);
    }

    #[test]
    fn test_rescaled_splash_matches() {
        let dir = tempfile::tempdir().unwrap();
        write_splashes(dir.path());
        let m = matcher(&MatcherConfig::default());
        let index = index_of(dir.path(), &m);

        let crop = imageops::resize(&splash(1), 240, 300, FilterType::Triangle);
        let id = m.identify(&crop, &index);
        assert_eq!(id.label.as_deref(), Some("Ekko"));
    }

    #[test]
    fn test_below_threshold_reports_score() {
        let dir = tempfile::tempdir().unwrap();
        write_splashes(dir.path());
        let config = MatcherConfig {
            acceptance_threshold: 101.0,
            ..MatcherConfig::default()
        };
        let m = matcher(&config);
        let index = index_of(dir.path(), &m);

        let id = m.identify(&splash(1), &index);
        assert_eq!(id.label, None);
        assert!(id.confidence > 0.0 && id.confidence <= 100.0, "confidence {}", id.confidence);
    }

    #[test]
    fn test_label_takes_best_variant() {
        let m = matcher(&MatcherConfig::default());
        let query = splash(5);
        let strong = entry(&m, "Jinx_1.png", "Jinx", &query);
        // Same keypoints, but the colors of another picture.
        let mut weak = entry(&m, "Jinx_0.png", "Jinx", &query);
        weak.signature.histogram = entry(&m, "Ekko_0.png", "Ekko", &splash(6)).signature.histogram;

        let weak_only = m.identify(&query, &index_from(vec![weak.clone()]));
        let strong_only = m.identify(&query, &index_from(vec![strong.clone()]));
        assert!(
            weak_only.confidence < strong_only.confidence,
            "weak {} strong {}",
            weak_only.confidence,
            strong_only.confidence
        );

        let id = m.identify(&query, &index_from(vec![weak, strong]));
        assert_eq!(id.label.as_deref(), Some("Jinx"));
        assert_eq!(id.confidence, strong_only.confidence);
    }

    #[test]
    fn test_tie_goes_to_first_label() {
        let m = matcher(&MatcherConfig::default());
        let query = splash(5);
        let index = index_from(vec![
            entry(&m, "Zed_0.png", "Zed", &query),
            entry(&m, "Ahri_0.png", "Ahri", &query),
        ]);

        let id = m.identify(&query, &index);
        assert_eq!(id.label.as_deref(), Some("Zed"));
    }

    #[test]
    fn test_too_few_matches_skips_candidate() {
        let m = matcher(&MatcherConfig::default());
        let query = splash(5);
        let mut sparse = entry(&m, "Ekko_0.png", "Ekko", &query);
        sparse.signature.features.keypoints.truncate(3);
        sparse.signature.features.descriptors.truncate(3);

        let alone = m.identify(&query, &index_from(vec![sparse.clone()]));
        assert_eq!(alone, Identification::unmatched());

        let full = entry(&m, "Jinx_0.png", "Jinx", &query);
        let id = m.identify(&query, &index_from(vec![sparse, full]));
        assert_eq!(id.label.as_deref(), Some("Jinx"));
    }

    #[test]
    fn test_inconsistent_geometry_below_default_threshold() {
        let m = matcher(&MatcherConfig::default());
        let query = splash(5);
        // Descriptors still match one to one, but their positions no longer
        // agree on any homography.
        let mut scrambled = entry(&m, "Jinx_0.png", "Jinx", &query);
        scrambled.signature.features.keypoints.reverse();

        let id = m.identify(&query, &index_from(vec![scrambled]));
        assert_eq!(id.label, None);
        assert!(id.confidence > 0.0 && id.confidence < 75.0, "confidence {}", id.confidence);
    }

    #[test]
    fn test_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        write_splashes(dir.path());
        let m = matcher(&MatcherConfig::default());
        let index = index_of(dir.path(), &m);

        let crop = imageops::resize(&splash(2), 180, 225, FilterType::Triangle);
        let a = m.identify(&crop, &index);
        let b = m.identify(&crop, &index);
        assert_eq!(a.label, b.label);
        assert!((a.confidence - b.confidence).abs() < 1e-9);
    }

    #[test]
    fn test_empty_corpus_and_degenerate_crop() {
        let dir = tempfile::tempdir().unwrap();
        let m = matcher(&MatcherConfig::default());
        let empty = index_of(dir.path(), &m);
        assert_eq!(m.identify(&splash(1), &empty), Identification::unmatched());

        write_splashes(dir.path());
        let index = index_of(dir.path(), &m);
        assert_eq!(m.identify(&RgbImage::new(0, 0), &index), Identification::unmatched());
        let flat = RgbImage::from_pixel(60, 80, Rgb([40, 40, 40]));
        assert_eq!(m.identify(&flat, &index), Identification::unmatched());
    }
}
