use anyhow::{Context, Result};
use hud_capture::PixelRect;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::layout::PanelRegions;

const PANEL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BAND_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const SPELL_COLOR: Rgb<u8> = Rgb([255, 165, 0]);
const OVERVIEW_FILE: &str = "debug_full.png";

/// Writes intermediate crops and an annotated overview for debugging.
/// Failures are logged; they never interrupt a scan.
#[derive(Debug, Clone)]
pub struct DiagnosticsWriter {
    dir: PathBuf,
}

impl DiagnosticsWriter {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create diagnostics dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `panel` and `slot` are zero-based; file names are one-based.
    pub fn save_spell(&self, panel: usize, slot: usize, crop: &RgbImage) {
        self.save(&format!("char{}_spell{}.png", panel + 1, slot + 1), crop);
    }

    pub fn save_portrait(&self, panel: usize, crop: &RgbImage) {
        self.save(&format!("char{}_splash.png", panel + 1), crop);
    }

    /// Draw every panel, spell band and spell box on a copy of the capture.
    pub fn save_overview(&self, frame: &RgbImage, regions: &[PanelRegions]) {
        let mut canvas = frame.clone();
        for r in regions {
            draw_thick_rect(&mut canvas, &r.panel, PANEL_COLOR);
            draw_thick_rect(&mut canvas, &r.spell_band, BAND_COLOR);
            for spell in &r.spells {
                draw_thick_rect(&mut canvas, spell, SPELL_COLOR);
            }
        }
        if self.save(OVERVIEW_FILE, &canvas) {
            info!("Debug overview saved: {}", self.dir.join(OVERVIEW_FILE).display());
        }
    }

    fn save(&self, name: &str, img: &RgbImage) -> bool {
        let path = self.dir.join(name);
        if img.width() == 0 || img.height() == 0 {
            warn!("Not writing empty image {}", path.display());
            return false;
        }
        match img.save(&path) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to write {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// Two-pixel outline drawn inward from the rectangle's edge.
fn draw_thick_rect(canvas: &mut RgbImage, r: &PixelRect, color: Rgb<u8>) {
    for inset in 0..2u32 {
        if r.width <= 2 * inset || r.height <= 2 * inset {
            break;
        }
        let rect = Rect::at((r.x + inset) as i32, (r.y + inset) as i32)
            .of_size(r.width - 2 * inset, r.height - 2 * inset);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_named_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("spells_output");
        let writer = DiagnosticsWriter::new(&out).unwrap();

        let crop = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        writer.save_spell(0, 1, &crop);
        writer.save_portrait(4, &crop);
        writer.save_spell(2, 0, &RgbImage::new(0, 0));

        assert!(out.join("char1_spell2.png").exists());
        assert!(out.join("char5_splash.png").exists());
        assert!(!out.join("char3_spell1.png").exists());
    }

    #[test]
    fn test_overview_outlines() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DiagnosticsWriter::new(dir.path()).unwrap();
        let frame = RgbImage::new(100, 50);
        let regions = vec![PanelRegions {
            index: 0,
            panel: PixelRect::new(0, 0, 40, 50),
            spell_band: PixelRect::new(0, 30, 40, 10),
            spells: vec![PixelRect::new(20, 30, 10, 10), PixelRect::new(0, 0, 0, 0)],
            portrait: PixelRect::new(0, 2, 40, 20),
        }];
        writer.save_overview(&frame, &regions);

        let saved = image::open(dir.path().join(OVERVIEW_FILE)).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (100, 50));
        assert_eq!(*saved.get_pixel(0, 10), PANEL_COLOR);
        assert_eq!(*saved.get_pixel(1, 10), PANEL_COLOR);
        assert_eq!(*saved.get_pixel(25, 30), SPELL_COLOR);
        assert_eq!(*saved.get_pixel(60, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_unwritable_dir_does_not_panic() {
        let writer = DiagnosticsWriter {
            dir: PathBuf::from("/nonexistent/diagnostics"),
        };
        writer.save_spell(0, 0, &RgbImage::from_pixel(4, 4, Rgb([9, 9, 9])));
    }
}
