pub mod assets;
pub mod color;
pub mod contrast;
pub mod diagnostics;
pub mod features;
pub mod homography;
pub mod icon_matcher;
pub mod layout;
pub mod matching;
pub mod phash;
pub mod pipeline;
pub mod portrait_matcher;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use assets::{AssetEntry, AssetIndex, AssetKind, AssetProfile, IndexCache};
pub use diagnostics::DiagnosticsWriter;
pub use features::{FeatureBackend, OrbBackend};
pub use icon_matcher::IconMatcher;
pub use layout::{PanelRegions, RegionSegmenter};
pub use pipeline::MatchPipeline;
pub use portrait_matcher::PortraitMatcher;

/// Shown in place of a label when nothing matched.
pub const UNMATCHED_LABEL: &str = "?";

/// Confidence reported when no candidate could be scored at all.
pub const NO_SCORE: f64 = -1.0;

/// Feature backend shared between index builds and matchers.
pub type SharedBackend = Arc<dyn FeatureBackend + Send + Sync>;

/// Outcome of matching one crop against one corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    /// `None` when unmatched.
    pub label: Option<String>,
    pub confidence: f64,
}

impl Identification {
    pub fn unmatched() -> Self {
        Self {
            label: None,
            confidence: NO_SCORE,
        }
    }

    pub fn is_match(&self) -> bool {
        self.label.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotKind {
    Icon,
    Portrait,
}

/// Match for one slot of one panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub label: Option<String>,
    pub confidence: f64,
    pub slot_kind: SlotKind,
    pub panel_index: usize,
    /// Ability slot index for icons; always 0 for portraits.
    pub slot_index: usize,
}

impl MatchResult {
    pub fn new(id: Identification, slot_kind: SlotKind, panel_index: usize, slot_index: usize) -> Self {
        Self {
            label: id.label,
            confidence: id.confidence,
            slot_kind,
            panel_index,
            slot_index,
        }
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(UNMATCHED_LABEL)
    }
}
