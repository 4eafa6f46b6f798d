//! Reference asset corpora and their precomputed matching signals.

use hud_data::MatcherConfig;
use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::color::{ColorHistogram, ColorSpace};
use crate::contrast::normalize_lightness;
use crate::features::{FeatureBackend, FeatureSet};
use crate::phash::PerceptualHash;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Which corpus an index holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Icon,
    Portrait,
}

/// How images of one corpus are canonicalized before computing signals.
/// Crops are passed through the same profile as the assets they are
/// compared against.
#[derive(Debug, Clone)]
pub struct AssetProfile {
    pub kind: AssetKind,
    pub size: u32,
    pub max_features: usize,
    pub histogram_space: ColorSpace,
    /// Horizontal and vertical fractions kept before resizing.
    pub focus: Option<((f64, f64), (f64, f64))>,
    /// CLAHE clip limit and tile count for the lightness channel.
    pub contrast: Option<(f64, u32)>,
}

impl AssetProfile {
    pub fn icons(config: &MatcherConfig) -> Self {
        Self {
            kind: AssetKind::Icon,
            size: config.icon_size,
            max_features: config.icon_max_features,
            histogram_space: ColorSpace::Lab,
            focus: None,
            contrast: None,
        }
    }

    pub fn portraits(config: &MatcherConfig) -> Self {
        Self {
            kind: AssetKind::Portrait,
            size: config.portrait_size,
            max_features: config.portrait_max_features,
            histogram_space: ColorSpace::Hsv,
            focus: Some((config.portrait_focus_x, config.portrait_focus_y)),
            contrast: Some((config.clahe_clip_limit, config.clahe_tiles)),
        }
    }

    /// Bring an image to the profile's canonical form. `None` when the
    /// input (or its focus window) has no pixels.
    pub fn canonicalize(&self, img: &RgbImage) -> Option<RgbImage> {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 || self.size == 0 {
            return None;
        }

        let focused = match self.focus {
            Some(((fx0, fx1), (fy0, fy1))) => {
                let x0 = (w as f64 * fx0) as u32;
                let x1 = ((w as f64 * fx1) as u32).min(w);
                let y0 = (h as f64 * fy0) as u32;
                let y1 = ((h as f64 * fy1) as u32).min(h);
                if x1 <= x0 || y1 <= y0 {
                    return None;
                }
                imageops::crop_imm(img, x0, y0, x1 - x0, y1 - y0).to_image()
            }
            None => img.clone(),
        };

        let resized = imageops::resize(&focused, self.size, self.size, FilterType::Triangle);
        Some(match self.contrast {
            Some((clip, tiles)) => normalize_lightness(&resized, clip, tiles),
            None => resized,
        })
    }

    /// Compute every matching signal for an image.
    pub fn signature<B: FeatureBackend + ?Sized>(
        &self,
        img: &RgbImage,
        backend: &B,
    ) -> Option<ImageSignature> {
        let normalized = self.canonicalize(img)?;
        let gray: GrayImage = imageops::grayscale(&normalized);
        Some(ImageSignature {
            hash: PerceptualHash::compute(&gray),
            histogram: ColorHistogram::compute(&normalized, self.histogram_space),
            features: backend.detect(&gray, self.max_features),
            normalized,
        })
    }

    /// Label an asset file: the whole stem for icons, the part before the
    /// first `_` for portraits (variant splashes share a label).
    pub fn label_for(&self, path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?;
        let label = match self.kind {
            AssetKind::Icon => stem,
            AssetKind::Portrait => stem.split('_').next().unwrap_or(stem),
        };
        (!label.is_empty()).then(|| label.to_string())
    }
}

/// Canonical image plus the signals derived from it.
#[derive(Debug, Clone)]
pub struct ImageSignature {
    pub normalized: RgbImage,
    pub hash: PerceptualHash,
    pub histogram: ColorHistogram,
    pub features: FeatureSet,
}

/// One decoded reference image.
#[derive(Debug, Clone)]
pub struct AssetEntry {
    pub path: PathBuf,
    pub label: String,
    pub signature: ImageSignature,
}

/// Ordered set of reference entries built from one directory.
#[derive(Debug, Clone)]
pub struct AssetIndex {
    pub kind: AssetKind,
    pub entries: Vec<AssetEntry>,
}

impl AssetIndex {
    pub fn empty(kind: AssetKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    /// Index every image in `dir`, ordered by file name. A missing
    /// directory or undecodable files only shrink the index.
    pub fn build<B: FeatureBackend + ?Sized>(dir: &Path, profile: &AssetProfile, backend: &B) -> Self {
        let mut index = Self::empty(profile.kind);

        let read_dir = match std::fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => {
                warn!("Asset directory {} unavailable: {}", dir.display(), e);
                return index;
            }
        };

        let mut files: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        for path in files {
            let Some(label) = profile.label_for(&path) else {
                debug!("Skipping unlabeled asset {}", path.display());
                continue;
            };
            let img = match image::open(&path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    warn!("Skipping undecodable asset {}: {}", path.display(), e);
                    continue;
                }
            };
            let Some(signature) = profile.signature(&img, backend) else {
                warn!("Skipping empty asset {}", path.display());
                continue;
            };
            debug!(
                "Indexed {} as '{}' ({} features)",
                path.display(),
                label,
                signature.features.len()
            );
            index.entries.push(AssetEntry {
                path,
                label,
                signature,
            });
        }

        info!(
            "Built {:?} index with {} entries from {}",
            profile.kind,
            index.entries.len(),
            dir.display()
        );
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Process-lifetime cache of built indices keyed by directory and kind.
///
/// Indices are handed out as `Arc`s; rebuilding swaps in a fresh index and
/// leaves earlier handles untouched.
#[derive(Debug, Default)]
pub struct IndexCache {
    indices: HashMap<(PathBuf, AssetKind), Arc<AssetIndex>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dir: &Path, kind: AssetKind) -> Option<Arc<AssetIndex>> {
        self.indices.get(&(dir.to_path_buf(), kind)).cloned()
    }

    pub fn get_or_build<B: FeatureBackend + ?Sized>(
        &mut self,
        dir: &Path,
        profile: &AssetProfile,
        backend: &B,
    ) -> Arc<AssetIndex> {
        self.indices
            .entry((dir.to_path_buf(), profile.kind))
            .or_insert_with(|| Arc::new(AssetIndex::build(dir, profile, backend)))
            .clone()
    }

    pub fn rebuild<B: FeatureBackend + ?Sized>(
        &mut self,
        dir: &Path,
        profile: &AssetProfile,
        backend: &B,
    ) -> Arc<AssetIndex> {
        let fresh = Arc::new(AssetIndex::build(dir, profile, backend));
        self.replace(dir, fresh.clone());
        fresh
    }

    /// Install an index built elsewhere unless one is already cached for its
    /// directory, and return whichever index the cache now holds.
    pub fn insert_if_absent(&mut self, dir: &Path, index: Arc<AssetIndex>) -> Arc<AssetIndex> {
        self.indices
            .entry((dir.to_path_buf(), index.kind))
            .or_insert(index)
            .clone()
    }

    /// Install an already built index, returning the one it replaces.
    pub fn replace(&mut self, dir: &Path, index: Arc<AssetIndex>) -> Option<Arc<AssetIndex>> {
        self.indices.insert((dir.to_path_buf(), index.kind), index)
    }

    pub fn invalidate(&mut self, dir: &Path, kind: AssetKind) -> bool {
        self.indices.remove(&(dir.to_path_buf(), kind)).is_some()
    }

    pub fn clear(&mut self) {
        self.indices.clear();
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::features::OrbBackend;
    use image::Rgb;

    /// Solid square of `color` on white, covering the middle half.
    pub(crate) fn square_icon(size: u32, color: [u8; 3]) -> RgbImage {
        let (lo, hi) = (size / 4, size * 3 / 4);
        RgbImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                Rgb(color)
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    pub(crate) fn write_icons(dir: &Path) {
        square_icon(96, [20, 40, 230]).save(dir.join("flash.png")).unwrap();
        square_icon(96, [255, 140, 0]).save(dir.join("ignite.png")).unwrap();
    }

    #[test]
    fn test_labels() {
        let config = MatcherConfig::default();
        let icons = AssetProfile::icons(&config);
        let portraits = AssetProfile::portraits(&config);
        assert_eq!(icons.label_for(Path::new("a/flash.png")).as_deref(), Some("flash"));
        assert_eq!(
            icons.label_for(Path::new("a/teleport_unleashed.png")).as_deref(),
            Some("teleport_unleashed")
        );
        assert_eq!(
            portraits.label_for(Path::new("a/Ekko_12.jpg")).as_deref(),
            Some("Ekko")
        );
        assert_eq!(portraits.label_for(Path::new("a/Ekko.jpg")).as_deref(), Some("Ekko"));
        assert_eq!(portraits.label_for(Path::new("a/_x.jpg")), None);
    }

    #[test]
    fn test_canonicalize() {
        let config = MatcherConfig::default();
        let icons = AssetProfile::icons(&config);
        let portraits = AssetProfile::portraits(&config);
        let img = square_icon(40, [10, 200, 10]);

        assert_eq!(icons.canonicalize(&img).unwrap().dimensions(), (96, 96));
        assert_eq!(portraits.canonicalize(&img).unwrap().dimensions(), (256, 256));
        assert!(icons.canonicalize(&RgbImage::new(0, 5)).is_none());
        // A single pixel has no focus window left.
        assert!(portraits.canonicalize(&RgbImage::new(1, 1)).is_none());
    }

    #[test]
    fn test_build_orders_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        write_icons(dir.path());
        std::fs::write(dir.path().join("broken.png"), b"definitely not a png").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let profile = AssetProfile::icons(&MatcherConfig::default());
        let index = AssetIndex::build(dir.path(), &profile, &OrbBackend::default());

        let labels: Vec<&str> = index.entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["flash", "ignite"]);
        for entry in &index.entries {
            assert_eq!(entry.signature.normalized.dimensions(), (96, 96));
            assert_eq!(entry.signature.histogram.bins.len(), 512);
        }
    }

    #[test]
    fn test_build_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_icons(dir.path());
        let profile = AssetProfile::icons(&MatcherConfig::default());
        let backend = OrbBackend::default();

        let a = AssetIndex::build(dir.path(), &profile, &backend);
        let b = AssetIndex::build(dir.path(), &profile, &backend);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.entries.iter().zip(&b.entries) {
            assert_eq!(x.signature.hash, y.signature.hash);
            assert_eq!(x.signature.histogram, y.signature.histogram);
            assert_eq!(x.signature.features, y.signature.features);
        }
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let profile = AssetProfile::portraits(&MatcherConfig::default());
        let index = AssetIndex::build(Path::new("/nonexistent/loading"), &profile, &OrbBackend::default());
        assert!(index.is_empty());
        assert_eq!(index.kind, AssetKind::Portrait);
    }

    #[test]
    fn test_cache_rebuild_swaps() {
        let dir = tempfile::tempdir().unwrap();
        let profile = AssetProfile::icons(&MatcherConfig::default());
        let backend = OrbBackend::default();
        let mut cache = IndexCache::new();

        let first = cache.get_or_build(dir.path(), &profile, &backend);
        assert!(first.is_empty());
        assert!(Arc::ptr_eq(&first, &cache.get_or_build(dir.path(), &profile, &backend)));

        write_icons(dir.path());
        let rebuilt = cache.rebuild(dir.path(), &profile, &backend);
        assert_eq!(rebuilt.len(), 2);
        // Earlier handle still sees the old index.
        assert!(first.is_empty());
        assert!(Arc::ptr_eq(&rebuilt, &cache.get(dir.path(), AssetKind::Icon).unwrap()));

        assert!(cache.invalidate(dir.path(), AssetKind::Icon));
        assert!(cache.get(dir.path(), AssetKind::Icon).is_none());
        cache.get_or_build(dir.path(), &profile, &backend);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_if_absent_keeps_existing() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = IndexCache::new();
        let installed = Arc::new(AssetIndex::empty(AssetKind::Icon));
        let late = Arc::new(AssetIndex::empty(AssetKind::Icon));

        assert!(Arc::ptr_eq(&cache.insert_if_absent(dir.path(), installed.clone()), &installed));
        assert!(Arc::ptr_eq(&cache.insert_if_absent(dir.path(), late), &installed));

        let portraits = Arc::new(AssetIndex::empty(AssetKind::Portrait));
        assert!(Arc::ptr_eq(&cache.insert_if_absent(dir.path(), portraits.clone()), &portraits));
        assert_eq!(cache.len(), 2);
    }
}
