use std::io::Cursor;

use anyhow::Context;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DetectionError;
use crate::models::{BoundingBox, CurrencyType};
use crate::pipeline::PipelineOutput;

/// Response body handed to the API layer
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResponse {
    pub success: bool,
    #[serde(rename = "type")]
    pub currency_type: CurrencyType,
    pub message: String,
    pub detections: Vec<ItemResponse>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemResponse {
    pub id: usize,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// `data:image/png;base64,...` URL of the extracted item
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl DetectionResponse {
    /// Build the response for a finished request. An empty result is reported
    /// with `success = false` and type `none`, as the API always did.
    pub fn from_output(output: &PipelineOutput, include_images: bool) -> anyhow::Result<Self> {
        let set = &output.detections;

        if set.is_empty() {
            return Ok(Self {
                success: false,
                currency_type: CurrencyType::None,
                message: "No currency detected".to_string(),
                detections: Vec::new(),
                count: 0,
                request_id: Some(output.request_id),
            });
        }

        let mut detections = Vec::with_capacity(set.len());
        for (id, detection) in set.detections().iter().enumerate() {
            let image = match output.items.get(id) {
                Some(item) if include_images => Some(
                    png_data_url(&item.image).with_context(|| format!("Failed to encode item {}", id))?,
                ),
                _ => None,
            };
            detections.push(ItemResponse {
                id,
                label: detection.label.clone(),
                confidence: detection.confidence,
                bbox: detection.bbox,
                image,
            });
        }

        Ok(Self {
            success: true,
            currency_type: set.currency_type(),
            message: format!("Detected {} {} item(s)", set.len(), set.currency_type()),
            count: detections.len(),
            detections,
            request_id: Some(output.request_id),
        })
    }

    pub fn from_error(error: &DetectionError) -> Self {
        Self::failure(error.to_string())
    }

    /// Failed request with a human-readable reason
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            currency_type: CurrencyType::None,
            message: message.into(),
            detections: Vec::new(),
            count: 0,
            request_id: None,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize detection response")
    }
}

/// Encode an image as PNG, keeping its alpha channel if it has one
pub fn encode_png(image: &DynamicImage) -> anyhow::Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| anyhow::anyhow!("Failed to encode PNG: {}", e))?;
    Ok(buffer.into_inner())
}

pub fn png_data_url(image: &DynamicImage) -> anyhow::Result<String> {
    let bytes = encode_png(image)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(bytes)))
}
