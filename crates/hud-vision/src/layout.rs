use hud_capture::PixelRect;
use hud_data::LayoutConfig;
use tracing::debug;

/// Pixel rectangles for one character panel of the captured strip.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRegions {
    pub index: usize,
    pub panel: PixelRect,
    /// Horizontal band of the panel holding the ability icons.
    pub spell_band: PixelRect,
    /// One rectangle per ability slot, left to right.
    pub spells: Vec<PixelRect>,
    pub portrait: PixelRect,
}

/// Splits a capture into panels and slots using fixed proportional ratios.
#[derive(Debug, Clone, Default)]
pub struct RegionSegmenter {
    layout: LayoutConfig,
}

impl RegionSegmenter {
    pub fn new(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Compute the regions of `panel_count` panels in a `width` x `height`
    /// capture. Ratio-to-pixel conversions truncate and every rectangle is
    /// clamped to the capture, so small captures give empty rectangles
    /// rather than out-of-bounds ones.
    pub fn segment(&self, width: u32, height: u32, panel_count: usize) -> Vec<PanelRegions> {
        let l = &self.layout;
        let (w, h) = (width as f64, height as f64);
        let step = l.panel_width_ratio + l.panel_gap_ratio;

        (0..panel_count)
            .map(|i| {
                let offset = i as f64 * step;
                let x0 = ((w * offset) as u32).min(width);
                let x1 = ((w * (offset + l.panel_width_ratio)) as u32).min(width);
                let panel = PixelRect::from_edges(x0, 0, x1, height).clamp_to(width, height);
                let pw = panel.width as f64;

                // Bands are measured against the panel, which spans the full height.
                let band = |(top, bottom): (f64, f64)| {
                    PixelRect::from_edges(x0, (h * top) as u32, x1, (h * bottom) as u32)
                        .clamp_to(width, height)
                };
                let spell_band = band(l.spell_band);
                let portrait = band(l.portrait_band);

                let spells = l
                    .spell_boxes
                    .iter()
                    .map(|&(f0, f1)| {
                        let sx0 = ((pw * f0) as u32).min(panel.width);
                        let sx1 = ((pw * f1) as u32).min(panel.width);
                        PixelRect::from_edges(
                            panel.x + sx0,
                            spell_band.y,
                            panel.x + sx1,
                            spell_band.bottom(),
                        )
                        .clamp_to(width, height)
                    })
                    .collect();

                let regions = PanelRegions {
                    index: i,
                    panel,
                    spell_band,
                    spells,
                    portrait,
                };
                debug!("Panel {}: {:?}", i, regions);
                regions
            })
            .collect()
    }

    /// Segment using the configured panel count.
    pub fn segment_default(&self, width: u32, height: u32) -> Vec<PanelRegions> {
        self.segment(width, height, self.layout.panel_count)
    }
}
