use garde::Validate;
use serde::{Deserialize, Serialize};

/// Bounding box of a detected text region, in source image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct BoundingBox {
    #[garde(skip)]
    pub x: f64,
    #[garde(skip)]
    pub y: f64,
    #[garde(range(min = 0.0))]
    pub width: f64,
    #[garde(range(min = 0.0))]
    pub height: f64,
    #[garde(range(min = 0.0, max = 1.0))]
    pub confidence: f64,
}

/// A text region found by the service, with its translation when one was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DetectedText {
    #[garde(skip)]
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub translated_text: Option<String>,

    #[serde(default = "default_language")]
    #[garde(skip)]
    pub language: String,

    #[garde(dive)]
    pub bbox: BoundingBox,
}

fn default_language() -> String {
    "en".to_string()
}

/// Successful response of `POST /translate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TranslationResult {
    #[garde(length(min = 1))]
    pub original_image_url: String,

    #[garde(length(min = 1))]
    pub translated_image_url: String,

    #[garde(dive)]
    pub detected_texts: Vec<DetectedText>,

    /// Server-side processing time in seconds.
    #[garde(range(min = 0.0))]
    pub processing_time: f64,

    #[garde(skip)]
    pub timestamp: String,

    #[garde(skip)]
    pub total_text_regions: u32,
}

impl TranslationResult {
    /// Identifier used by `DELETE /cleanup/{id}`.
    ///
    /// The service names its artifacts `{id}_original.{ext}` / `{id}_translated.{ext}`.
    pub fn file_id(&self) -> Option<&str> {
        let name = self.original_image_url.rsplit('/').next()?;
        let (id, _) = name.split_once("_original")?;
        (!id.is_empty()).then_some(id)
    }

    /// Regions that came back with a non-empty translation.
    pub fn translated_regions(&self) -> impl Iterator<Item = &DetectedText> {
        self.detected_texts.iter().filter(|t| {
            t.translated_text
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty())
        })
    }
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> serde_json::Value {
        serde_json::json!({
            "original_image_url": "/static/3f2a9c_original.png",
            "translated_image_url": "/static/3f2a9c_translated.png",
            "detected_texts": [
                {
                    "text": "WHAT?!",
                    "translated_text": "NE?!",
                    "language": "en",
                    "bbox": {"x": 10, "y": 20, "width": 80, "height": 40, "confidence": 0.93}
                },
                {
                    "text": "...",
                    "bbox": {"x": 200, "y": 20, "width": 30, "height": 12, "confidence": 0.41}
                }
            ],
            "processing_time": 4.21,
            "timestamp": "2026-01-12T10:31:02.118842",
            "total_text_regions": 2
        })
    }

    #[test]
    fn test_parse_and_validate() {
        let result: TranslationResult = serde_json::from_value(sample_json()).unwrap();
        assert!(result.validate().is_ok());
        assert_eq!(result.total_text_regions, 2);
        assert_eq!(result.detected_texts[1].language, "en");
        assert_eq!(result.translated_regions().count(), 1);
    }

    #[test]
    fn test_empty_image_url_is_invalid() {
        let mut json = sample_json();
        json["translated_image_url"] = serde_json::json!("");
        let result: TranslationResult = serde_json::from_value(json).unwrap();
        assert!(result.validate().is_err());
    }

    #[test]
    fn test_confidence_out_of_range_is_invalid() {
        let mut json = sample_json();
        json["detected_texts"][0]["bbox"]["confidence"] = serde_json::json!(1.5);
        let result: TranslationResult = serde_json::from_value(json).unwrap();
        assert!(result.validate().is_err());
    }

    #[test]
    fn test_file_id() {
        let result: TranslationResult = serde_json::from_value(sample_json()).unwrap();
        assert_eq!(result.file_id(), Some("3f2a9c"));

        let mut other = result.clone();
        other.original_image_url = "/static/whatever.png".to_string();
        assert_eq!(other.file_id(), None);
    }
}
