//! Colour → luma conversion shared by the grayscale filter and the detectors.

use image::{GrayImage, Luma, RgbaImage};

// BT.601 luma weights in 14-bit fixed point (0.299, 0.587, 0.114).
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// Luma of one RGB triple, rounded to nearest.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B + (1 << (LUMA_SHIFT - 1));
    (y >> LUMA_SHIFT) as u8
}

/// Convert an RGBA raster to single-channel luma. Alpha is ignored.
pub fn to_grayscale(src: &RgbaImage) -> GrayImage {
    let (width, height) = src.dimensions();
    let mut gray = GrayImage::new(width, height);
    for (dst, px) in gray.pixels_mut().zip(src.pixels()) {
        *dst = Luma([luma(px[0], px[1], px[2])]);
    }
    gray
}
