use anyhow::{bail, Context, Result};
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use xcap::Monitor;

/// Pixel rectangle inside a captured image (origin top-left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a rectangle from half-open edges `[x0, x1) x [y0, y1)`.
    /// Inverted edges collapse to zero size.
    pub fn from_edges(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self {
            x: x0,
            y: y0,
            width: x1.saturating_sub(x0),
            height: y1.saturating_sub(y0),
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clamp the rectangle so it never reaches outside a `w` x `h` image.
    pub fn clamp_to(&self, w: u32, h: u32) -> Self {
        let x = self.x.min(w.saturating_sub(1));
        let y = self.y.min(h.saturating_sub(1));
        let width = self.width.min(w.saturating_sub(x));
        let height = self.height.min(h.saturating_sub(y));
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Crop a rectangle out of a captured frame, clamped to the frame bounds.
/// A rectangle that falls outside the frame yields an empty image.
pub fn crop_region(frame: &RgbImage, rect: &PixelRect) -> RgbImage {
    let r = rect.clamp_to(frame.width(), frame.height());
    if r.is_empty() {
        return RgbImage::new(0, 0);
    }
    image::imageops::crop_imm(frame, r.x, r.y, r.width, r.height).to_image()
}

/// Absolute screen rectangle chosen by the user (virtual desktop coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Size of the default selection box shown over the game client.
pub const DEFAULT_SELECTION_SIZE: (u32, u32) = (1392, 448);

/// Screen point the default selection box is centred on.
pub const DEFAULT_SELECTION_CENTER: (i32, i32) = (960, 540);

impl CaptureRect {
    /// Rectangle of the given size centred on `(cx, cy)`.
    pub fn centered(cx: i32, cy: i32, width: u32, height: u32) -> Self {
        Self {
            x: cx.saturating_sub((width / 2) as i32),
            y: cy.saturating_sub((height / 2) as i32),
            width,
            height,
        }
    }

    /// Parse `x,y,w,h`.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            bail!("expected x,y,width,height, got '{}'", s);
        }
        let x = parts[0].parse().with_context(|| format!("bad x in '{}'", s))?;
        let y = parts[1].parse().with_context(|| format!("bad y in '{}'", s))?;
        let width = parts[2]
            .parse()
            .with_context(|| format!("bad width in '{}'", s))?;
        let height = parts[3]
            .parse()
            .with_context(|| format!("bad height in '{}'", s))?;
        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    pub fn contains(&self, px: i32, py: i32) -> bool {
        let (px, py) = (px as i64, py as i64);
        px >= self.x as i64
            && py >= self.y as i64
            && px < self.x as i64 + self.width as i64
            && py < self.y as i64 + self.height as i64
    }

    /// Centre point, saturated into screen coordinates.
    pub fn center(&self) -> (i32, i32) {
        let cx = self.x as i64 + (self.width / 2) as i64;
        let cy = self.y as i64 + (self.height / 2) as i64;
        (saturate_i32(cx), saturate_i32(cy))
    }
}

impl Default for CaptureRect {
    fn default() -> Self {
        let (cx, cy) = DEFAULT_SELECTION_CENTER;
        let (w, h) = DEFAULT_SELECTION_SIZE;
        Self::centered(cx, cy, w, h)
    }
}

fn saturate_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Monitor-local rectangle for a selection on a monitor whose origin is
/// `origin`. Pixels left of or above the monitor are clipped off.
fn local_rect(rect: &CaptureRect, origin: (i32, i32)) -> PixelRect {
    let local_x = rect.x as i64 - origin.0 as i64;
    let local_y = rect.y as i64 - origin.1 as i64;
    let to_u32 = |v: i64| v.clamp(0, u32::MAX as i64) as u32;
    PixelRect {
        x: to_u32(local_x),
        y: to_u32(local_y),
        width: rect.width.saturating_sub(to_u32(-local_x)),
        height: rect.height.saturating_sub(to_u32(-local_y)),
    }
}

/// Capture the screen area under `rect` from the monitor containing its centre.
pub fn capture_rect(rect: &CaptureRect) -> Result<RgbImage> {
    let (cx, cy) = rect.center();
    let monitor = Monitor::from_point(cx, cy)
        .with_context(|| format!("No monitor contains point ({}, {})", cx, cy))?;
    let origin_x = monitor.x().context("Failed to read monitor origin")?;
    let origin_y = monitor.y().context("Failed to read monitor origin")?;

    let frame = monitor
        .capture_image()
        .context("Failed to capture monitor image")?;
    let frame = DynamicImage::ImageRgba8(frame).to_rgb8();
    debug!(
        "Captured monitor at ({}, {}) size {}x{}",
        origin_x,
        origin_y,
        frame.width(),
        frame.height()
    );

    let local = local_rect(rect, (origin_x, origin_y));
    let crop = crop_region(&frame, &local);
    if crop.width() == 0 || crop.height() == 0 {
        bail!("Selection {:?} lies outside the captured monitor", rect);
    }
    info!(
        "Captured selection {}x{} at ({}, {})",
        crop.width(),
        crop.height(),
        rect.x,
        rect.y
    );
    Ok(crop)
}
