use hud_capture::crop_region;
use hud_data::ScanConfig;
use image::RgbImage;
use std::sync::Arc;
use tracing::{debug, info};

use crate::assets::{AssetIndex, AssetProfile};
use crate::diagnostics::DiagnosticsWriter;
use crate::icon_matcher::IconMatcher;
use crate::layout::RegionSegmenter;
use crate::portrait_matcher::PortraitMatcher;
use crate::{MatchResult, SharedBackend, SlotKind};

/// Segment a capture and identify every slot of every panel.
///
/// Indices are shared read-only; a rebuilt index is picked up by
/// constructing a new pipeline around it.
pub struct MatchPipeline {
    segmenter: RegionSegmenter,
    icons: IconMatcher,
    portraits: PortraitMatcher,
    icon_index: Arc<AssetIndex>,
    portrait_index: Arc<AssetIndex>,
    diagnostics: Option<DiagnosticsWriter>,
}

impl MatchPipeline {
    pub fn new(
        config: &ScanConfig,
        backend: SharedBackend,
        icon_index: Arc<AssetIndex>,
        portrait_index: Arc<AssetIndex>,
    ) -> Self {
        Self {
            segmenter: RegionSegmenter::new(config.layout.clone()),
            icons: IconMatcher::new(AssetProfile::icons(&config.matcher), backend.clone()),
            portraits: PortraitMatcher::new(&config.matcher, backend),
            icon_index,
            portrait_index,
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, writer: DiagnosticsWriter) -> Self {
        self.diagnostics = Some(writer);
        self
    }

    /// One result per spell slot and one per portrait, panel by panel:
    /// spells in slot order, then the portrait.
    pub fn run(&self, screenshot: &RgbImage) -> Vec<MatchResult> {
        let (w, h) = screenshot.dimensions();
        let regions = self.segmenter.segment_default(w, h);
        let mut results = Vec::with_capacity(regions.len() * 3);

        for panel in &regions {
            for (slot, rect) in panel.spells.iter().enumerate() {
                let crop = crop_region(screenshot, rect);
                if let Some(d) = &self.diagnostics {
                    d.save_spell(panel.index, slot, &crop);
                }
                let id = self.icons.identify(&crop, &self.icon_index);
                debug!(
                    "char{}_spell{} -> {} ({:.1})",
                    panel.index + 1,
                    slot + 1,
                    id.label.as_deref().unwrap_or(crate::UNMATCHED_LABEL),
                    id.confidence
                );
                results.push(MatchResult::new(id, SlotKind::Icon, panel.index, slot));
            }

            let crop = crop_region(screenshot, &panel.portrait);
            if let Some(d) = &self.diagnostics {
                d.save_portrait(panel.index, &crop);
            }
            let id = self.portraits.identify(&crop, &self.portrait_index);
            debug!(
                "char{}_splash -> {} ({:.1})",
                panel.index + 1,
                id.label.as_deref().unwrap_or(crate::UNMATCHED_LABEL),
                id.confidence
            );
            results.push(MatchResult::new(id, SlotKind::Portrait, panel.index, 0));
        }

        if let Some(d) = &self.diagnostics {
            d.save_overview(screenshot, &regions);
        }

        info!(
            "Scan of {}x{} capture: {}/{} slots matched",
            w,
            h,
            results.iter().filter(|r| r.label.is_some()).count(),
            results.len()
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::tests::write_icons;
    use crate::assets::AssetKind;
    use crate::features::OrbBackend;
    use image::{imageops, Rgb};

    fn strip_with_flash(config: &ScanConfig) -> RgbImage {
        let mut frame = RgbImage::from_pixel(1000, 500, Rgb([30, 30, 30]));
        let seg = RegionSegmenter::new(config.layout.clone());
        let regions = seg.segment(1000, 500, 5);
        // Paint a blue-on-white icon into panel 0, spell slot 0.
        let r = regions[0].spells[0];
        let icon = imageops::resize(
            &crate::assets::tests::square_icon(96, [20, 40, 230]),
            r.width,
            r.height,
            imageops::FilterType::Triangle,
        );
        imageops::replace(&mut frame, &icon, r.x as i64, r.y as i64);
        frame
    }

    #[test]
    fn test_full_result_sequence() {
        let dir = tempfile::tempdir().unwrap();
        write_icons(dir.path());
        let config = ScanConfig::default();
        let backend: SharedBackend = Arc::new(OrbBackend::default());
        let icons = Arc::new(AssetIndex::build(
            dir.path(),
            &AssetProfile::icons(&config.matcher),
            &*backend,
        ));
        let portraits = Arc::new(AssetIndex::empty(AssetKind::Portrait));

        let out = dir.path().join("spells_output");
        let pipeline = MatchPipeline::new(&config, backend, icons, portraits)
            .with_diagnostics(DiagnosticsWriter::new(&out).unwrap());
        let results = pipeline.run(&strip_with_flash(&config));

        assert_eq!(results.len(), 15);
        let kinds: Vec<(usize, SlotKind, usize)> = results
            .iter()
            .take(3)
            .map(|r| (r.panel_index, r.slot_kind, r.slot_index))
            .collect();
        assert_eq!(
            kinds,
            vec![(0, SlotKind::Icon, 0), (0, SlotKind::Icon, 1), (0, SlotKind::Portrait, 0)]
        );
        assert_eq!(results[14].panel_index, 4);

        // Empty portrait corpus: every portrait is unmatched at -1.
        for r in results.iter().filter(|r| r.slot_kind == SlotKind::Portrait) {
            assert_eq!(r.label, None);
            assert_eq!(r.confidence, -1.0);
            assert_eq!(r.display_label(), "?");
        }

        assert!(out.join("char1_spell1.png").exists());
        assert!(out.join("char5_splash.png").exists());
        assert!(out.join("debug_full.png").exists());
    }

    #[test]
    fn test_tiny_capture_never_fails() {
        let config = ScanConfig::default();
        let backend: SharedBackend = Arc::new(OrbBackend::default());
        let pipeline = MatchPipeline::new(
            &config,
            backend,
            Arc::new(AssetIndex::empty(AssetKind::Icon)),
            Arc::new(AssetIndex::empty(AssetKind::Portrait)),
        );
        for (w, h) in [(0, 0), (3, 2), (40, 12)] {
            let results = pipeline.run(&RgbImage::new(w, h));
            assert_eq!(results.len(), 15);
            assert!(results.iter().all(|r| r.label.is_none() && r.confidence == -1.0));
        }
    }
}
