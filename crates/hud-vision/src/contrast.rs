use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::color::{lab_to_rgb, rgb_to_lab};

const LEVELS: usize = 256;

/// Contrast-limited adaptive histogram equalization on a grayscale image.
///
/// The image is split into `tiles x tiles` regions; each gets a clipped,
/// equalizing lookup table and pixels blend the four nearest tables
/// bilinearly.
pub fn clahe(gray: &GrayImage, clip_limit: f64, tiles: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 || tiles == 0 {
        return gray.clone();
    }
    let tiles_x = tiles.min(w);
    let tiles_y = tiles.min(h);
    let tile_w = w.div_ceil(tiles_x);
    let tile_h = h.div_ceil(tiles_y);

    let mut luts = vec![[0u8; LEVELS]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = (tx * tile_w).min(w);
            let y0 = (ty * tile_h).min(h);
            let x1 = ((tx + 1) * tile_w).min(w);
            let y1 = ((ty + 1) * tile_h).min(h);
            luts[(ty * tiles_x + tx) as usize] = tile_lut(gray, x0, y0, x1, y1, clip_limit);
        }
    }

    let lut_at = |tx: u32, ty: u32, v: u8| luts[(ty * tiles_x + tx) as usize][v as usize] as f64;

    GrayImage::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y)[0];

        let txf = x as f64 / tile_w as f64 - 0.5;
        let tx1 = txf.floor();
        let xa = txf - tx1;
        let tx2 = ((tx1 + 1.0) as i64).min(tiles_x as i64 - 1) as u32;
        let tx1 = tx1.max(0.0) as u32;

        let tyf = y as f64 / tile_h as f64 - 0.5;
        let ty1 = tyf.floor();
        let ya = tyf - ty1;
        let ty2 = ((ty1 + 1.0) as i64).min(tiles_y as i64 - 1) as u32;
        let ty1 = ty1.max(0.0) as u32;

        let top = lut_at(tx1, ty1, v) * (1.0 - xa) + lut_at(tx2, ty1, v) * xa;
        let bottom = lut_at(tx1, ty2, v) * (1.0 - xa) + lut_at(tx2, ty2, v) * xa;
        Luma([(top * (1.0 - ya) + bottom * ya).round().clamp(0.0, 255.0) as u8])
    })
}

fn tile_lut(gray: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f64) -> [u8; LEVELS] {
    let mut lut = [0u8; LEVELS];
    let area = ((x1 - x0) * (y1 - y0)) as usize;
    if area == 0 {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }

    let mut hist = [0usize; LEVELS];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f64 / LEVELS as f64) as usize).max(1);
        let mut clipped = 0;
        for bin in hist.iter_mut() {
            if *bin > limit {
                clipped += *bin - limit;
                *bin = limit;
            }
        }

        let batch = clipped / LEVELS;
        let mut residual = clipped - batch * LEVELS;
        for bin in hist.iter_mut() {
            *bin += batch;
        }
        if residual > 0 {
            let step = (LEVELS / residual).max(1);
            let mut i = 0;
            while i < LEVELS && residual > 0 {
                hist[i] += 1;
                residual -= 1;
                i += step;
            }
        }
    }

    let scale = (LEVELS - 1) as f64 / area as f64;
    let mut sum = 0usize;
    for (i, bin) in hist.iter().enumerate() {
        sum += bin;
        lut[i] = (sum as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Equalize the lightness channel of a color image in LAB space, leaving
/// chroma untouched.
pub fn normalize_lightness(img: &RgbImage, clip_limit: f64, tiles: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let lab: Vec<[u8; 3]> = img.pixels().map(|p| rgb_to_lab(p.0)).collect();
    let lightness = GrayImage::from_fn(w, h, |x, y| Luma([lab[(y * w + x) as usize][0]]));
    let equalized = clahe(&lightness, clip_limit, tiles);

    RgbImage::from_fn(w, h, |x, y| {
        let [_, a, b] = lab[(y * w + x) as usize];
        Rgb(lab_to_rgb([equalized.get_pixel(x, y)[0], a, b]))
    })
}
