use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the optional configuration file inside the data directory.
pub const CONFIG_FILE: &str = "scan.json";

/// Proportional layout of the captured scoreboard strip.
///
/// Panels sit left to right; every other ratio is relative to the panel's
/// own width/height so the layout scales with the capture resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub panel_count: usize,
    pub panel_width_ratio: f64,
    pub panel_gap_ratio: f64,
    /// Vertical band holding the ability icons (top, bottom).
    pub spell_band: (f64, f64),
    /// Vertical band holding the portrait splash (top, bottom).
    pub portrait_band: (f64, f64),
    /// Horizontal ranges of the ability icons inside the spell band.
    pub spell_boxes: Vec<(f64, f64)>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            panel_count: 5,
            panel_width_ratio: 0.176,
            panel_gap_ratio: 0.030,
            spell_band: (0.82, 0.88),
            portrait_band: (0.025, 0.79),
            spell_boxes: vec![(0.680, 0.790), (0.810, 0.930)],
        }
    }
}

/// Tuning for both matchers. The pre-filter weights, shortlist size and
/// acceptance threshold are empirical and may need re-tuning per backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub icon_size: u32,
    pub icon_max_features: usize,
    pub portrait_size: u32,
    pub portrait_max_features: usize,
    /// Horizontal focus window applied to portraits before resizing.
    pub portrait_focus_x: (f64, f64),
    /// Vertical focus window applied to portraits before resizing.
    pub portrait_focus_y: (f64, f64),
    pub clahe_clip_limit: f64,
    pub clahe_tiles: u32,
    pub prefilter_hamming_weight: f64,
    pub shortlist_size: usize,
    pub ratio_test: f64,
    pub min_good_matches: usize,
    pub ransac_reproj_threshold: f64,
    pub inlier_weight: f64,
    pub histogram_weight: f64,
    pub acceptance_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            icon_size: 96,
            icon_max_features: 500,
            portrait_size: 256,
            portrait_max_features: 1200,
            portrait_focus_x: (0.15, 0.85),
            portrait_focus_y: (0.05, 0.80),
            clahe_clip_limit: 2.0,
            clahe_tiles: 8,
            prefilter_hamming_weight: 1.4,
            shortlist_size: 20,
            ratio_test: 0.75,
            min_good_matches: 8,
            ransac_reproj_threshold: 5.0,
            inlier_weight: 0.8,
            histogram_weight: 0.2,
            acceptance_threshold: 75.0,
        }
    }
}

/// Top-level scan configuration, read from `scan.json` in the data directory.
/// Relative paths are resolved against the data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub icons_dir: PathBuf,
    /// Searched in order; the first existing directory wins.
    pub portraits_dir_candidates: Vec<PathBuf>,
    pub champion_icons_dir: PathBuf,
    pub output_dir: PathBuf,
    pub save_diagnostics: bool,
    pub layout: LayoutConfig,
    pub matcher: MatcherConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            icons_dir: PathBuf::from("assets/icons"),
            portraits_dir_candidates: vec![
                PathBuf::from("assets/loading"),
                PathBuf::from("loading"),
            ],
            champion_icons_dir: PathBuf::from("champion"),
            output_dir: PathBuf::from("spells_output"),
            save_diagnostics: true,
            layout: LayoutConfig::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Load `scan.json` from the data directory, falling back to defaults
    /// when the file does not exist.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            tracing::warn!(
                "No {} found at {}, using default scan settings",
                CONFIG_FILE,
                path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: ScanConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded scan settings from {}", path.display());
        Ok(config)
    }

    /// Resolve every configured directory against `data_dir`.
    pub fn paths(&self, data_dir: &Path) -> AssetPaths {
        let portraits_dir = self
            .portraits_dir_candidates
            .iter()
            .map(|p| data_dir.join(p))
            .find(|p| p.is_dir());
        if portraits_dir.is_none() {
            tracing::warn!("No portrait directory found. Tried:");
            for candidate in &self.portraits_dir_candidates {
                tracing::warn!("    {}", data_dir.join(candidate).display());
            }
        }

        AssetPaths {
            icons_dir: data_dir.join(&self.icons_dir),
            portraits_dir,
            champion_icons_dir: data_dir.join(&self.champion_icons_dir),
            output_dir: data_dir.join(&self.output_dir),
        }
    }
}

/// Concrete asset locations after resolving a [`ScanConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct AssetPaths {
    pub icons_dir: PathBuf,
    pub portraits_dir: Option<PathBuf>,
    pub champion_icons_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl AssetPaths {
    /// Display icon for a spell label (`{spell}.png`, or the doubled
    /// extension some asset dumps ship with).
    pub fn spell_icon(&self, spell: &str) -> Option<PathBuf> {
        [format!("{}.png", spell), format!("{}.png.png", spell)]
            .iter()
            .map(|name| self.icons_dir.join(name))
            .find(|p| p.exists())
    }

    /// Base portrait icon shown for a recognised champion.
    pub fn champion_icon(&self, champion: &str) -> Option<PathBuf> {
        let path = self.champion_icons_dir.join(format!("{}.png", champion));
        path.exists().then_some(path)
    }
}
