//! Test fixtures: minimal images and canned service responses

#![allow(dead_code)]

use mangama_client::models::translation::{BoundingBox, DetectedText};
use mangama_client::{ImagePayload, TranslationResult};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF\xE0";

/// A payload that passes client-side validation as a PNG page.
pub fn png_page(name: &str) -> ImagePayload {
    let mut bytes = PNG_MAGIC.to_vec();
    bytes.extend_from_slice(&[0u8; 120]);
    ImagePayload::new(name, "image/png", bytes)
}

pub fn jpeg_page(name: &str) -> ImagePayload {
    let mut bytes = JPEG_MAGIC.to_vec();
    bytes.extend_from_slice(&[0u8; 120]);
    ImagePayload::new(name, "image/jpeg", bytes)
}

pub fn gif_page(name: &str) -> ImagePayload {
    ImagePayload::new(name, "image/gif", b"GIF89a\x01\x00\x01\x00".to_vec())
}

/// Service response with `regions` detected and translated text regions.
pub fn translation(file_id: &str, regions: u32) -> TranslationResult {
    let detected_texts = (0..regions)
        .map(|i| DetectedText {
            text: format!("LINE {i}"),
            translated_text: Some(format!("SATIR {i}")),
            language: "en".to_string(),
            bbox: BoundingBox {
                x: 10.0 * f64::from(i),
                y: 20.0,
                width: 80.0,
                height: 30.0,
                confidence: 0.9,
            },
        })
        .collect();

    TranslationResult {
        original_image_url: format!("/static/{file_id}_original.png"),
        translated_image_url: format!("/static/{file_id}_translated.png"),
        detected_texts,
        processing_time: 3.5,
        timestamp: "2026-03-14T09:26:53.589793".to_string(),
        total_text_regions: regions,
    }
}

/// The same response as JSON, as the service would send it.
pub fn translation_json(file_id: &str, regions: u32) -> serde_json::Value {
    serde_json::to_value(translation(file_id, regions)).expect("fixture serializes")
}
