use std::time::Duration;

use eframe::egui::ColorImage;
use image::imageops::FilterType;

use crate::error::FetchError;

/// Downloads a preview image and scales it to `size` for display.
///
/// Blocking; run it off the UI thread.
pub fn fetch_thumbnail(url: &str, size: [u32; 2], timeout: Duration) -> Result<ColorImage, FetchError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| FetchError::Thumbnail(e.to_string()))?;
    let bytes = client
        .get(url)
        .send()
        .and_then(|resp| resp.error_for_status())
        .and_then(|resp| resp.bytes())
        .map_err(|e| FetchError::Thumbnail(e.to_string()))?;
    decode_thumbnail(&bytes, size)
}

/// Decodes image bytes into an egui image of exactly `size` pixels.
pub fn decode_thumbnail(bytes: &[u8], size: [u32; 2]) -> Result<ColorImage, FetchError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| FetchError::Thumbnail(e.to_string()))?
        .resize_exact(size[0], size[1], FilterType::Lanczos3)
        .to_rgba8();
    let dims = [img.width() as usize, img.height() as usize];
    Ok(ColorImage::from_rgba_unmultiplied(dims, img.as_raw()))
}
