use image::RgbImage;
use tracing::debug;

use crate::assets::{AssetIndex, AssetProfile};
use crate::matching::{cross_check_matches, mean_distance};
use crate::{Identification, SharedBackend};

/// Weight of the descriptor term; the histogram term gets the rest.
const DESCRIPTOR_WEIGHT: f64 = 0.5;

/// Identifies small ability-icon crops.
///
/// Every asset with descriptors is scored by fusing the mean distance of
/// mutually nearest descriptor pairs with LAB histogram correlation. No
/// acceptance threshold is applied here.
pub struct IconMatcher {
    profile: AssetProfile,
    backend: SharedBackend,
}

impl IconMatcher {
    pub fn new(profile: AssetProfile, backend: SharedBackend) -> Self {
        Self { profile, backend }
    }

    pub fn profile(&self) -> &AssetProfile {
        &self.profile
    }

    pub fn identify(&self, crop: &RgbImage, index: &AssetIndex) -> Identification {
        let Some(sig) = self.profile.signature(crop, &*self.backend) else {
            debug!("Icon crop {:?} is empty", crop.dimensions());
            return Identification::unmatched();
        };
        if sig.features.is_empty() {
            debug!("No features on icon crop");
            return Identification::unmatched();
        }

        let mut best: Option<(usize, f64)> = None;
        for (i, entry) in index.entries.iter().enumerate() {
            let asset = &entry.signature;
            if asset.features.is_empty() {
                continue;
            }
            let matches = cross_check_matches(
                &*self.backend,
                &sig.features.descriptors,
                &asset.features.descriptors,
            );
            let Some(mean) = mean_distance(&matches) else {
                continue;
            };
            let corr = sig.histogram.correlation(&asset.histogram);
            let score = DESCRIPTOR_WEIGHT * (100.0 - mean) + (1.0 - DESCRIPTOR_WEIGHT) * corr * 100.0;
            debug!(
                "  {}: {} pairs, mean {:.1}, hist {:.3} -> {:.1}",
                entry.label,
                matches.len(),
                mean,
                corr,
                score
            );

            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        match best {
            Some((i, score)) => Identification {
                label: Some(index.entries[i].label.clone()),
                confidence: score,
            },
            None => Identification::unmatched(),
        }
    }
}
