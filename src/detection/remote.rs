//! HTTP-backed implementations of the service contracts.
//!
//! These clients stay deliberately thin: they post an image, map transport
//! and status failures onto [`ServiceError`], and validate the response
//! shape. Retry and concurrency policy live in
//! [`crate::invoke::ResilientInvoker`], not here.

use crate::detection::record::{DetectionRecord, DetectionShape};
use crate::detection::service::{DetectionService, TranscriptionService};
use crate::geometry::Point;
use crate::invoke::ServiceError;
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

impl From<reqwest::Error> for ServiceError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ServiceError::Timeout
        } else if error.is_connect() {
            ServiceError::Connect {
                message: error.to_string(),
            }
        } else if let Some(status) = error.status() {
            ServiceError::from_status(status.as_u16())
        } else if error.is_decode() {
            ServiceError::Malformed {
                message: error.to_string(),
            }
        } else {
            ServiceError::Connect {
                message: error.to_string(),
            }
        }
    }
}

/// One prediction in the hosted detector's response.
#[derive(Debug, Deserialize)]
struct WirePrediction {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    class: String,
    confidence: f32,
    #[serde(default)]
    points: Option<Vec<WirePoint>>,
}

#[derive(Debug, Deserialize)]
struct WirePoint {
    x: f32,
    y: f32,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    predictions: Vec<WirePrediction>,
}

impl From<WirePrediction> for DetectionRecord {
    fn from(p: WirePrediction) -> Self {
        match p.points {
            Some(points) if points.len() >= 3 => DetectionRecord {
                label: p.class,
                confidence: p.confidence,
                shape: DetectionShape::Polygon {
                    points: points.into_iter().map(|w| Point::new(w.x, w.y)).collect(),
                },
            },
            // The wire box is center-anchored, matching our box form.
            _ => DetectionRecord {
                label: p.class,
                confidence: p.confidence,
                shape: DetectionShape::Box {
                    cx: p.x,
                    cy: p.y,
                    width: p.width,
                    height: p.height,
                },
            },
        }
    }
}

/// Client for a hosted object-detection endpoint.
#[derive(Debug, Clone)]
pub struct HostedDetector {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HostedDetector {
    /// Creates a detector client for a model endpoint, e.g.
    /// `https://detect.example.com/drawer-trays/3`.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl DetectionService for HostedDetector {
    async fn detect(
        &self,
        image: &[u8],
        confidence: f32,
        overlap: Option<f32>,
    ) -> Result<Vec<DetectionRecord>, ServiceError> {
        let mut query: Vec<(&str, String)> = vec![
            ("api_key", self.api_key.clone()),
            ("confidence", confidence.to_string()),
        ];
        if let Some(overlap) = overlap {
            query.push(("overlap", overlap.to_string()));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .query(&query)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::from_status(status.as_u16()));
        }

        let wire: WireResponse = response.json().await.map_err(|e| ServiceError::Malformed {
            message: e.to_string(),
        })?;
        Ok(wire.predictions.into_iter().map(Into::into).collect())
    }
}

/// Client for a vision-model transcription endpoint.
#[derive(Debug, Clone)]
pub struct VisionTranscriber {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: Option<String>,
}

impl VisionTranscriber {
    /// Creates a transcription client against a vision-model endpoint.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl TranscriptionService for VisionTranscriber {
    async fn transcribe(&self, image: &[u8], prompt: &str) -> Result<String, ServiceError> {
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(image);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "image": image_b64,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::from_status(status.as_u16()));
        }

        let parsed: TranscriptionResponse =
            response.json().await.map_err(|e| ServiceError::Malformed {
                message: e.to_string(),
            })?;
        parsed.text.ok_or_else(|| ServiceError::Malformed {
            message: "response carried no text field".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_prediction_maps_to_box() {
        let wire = WirePrediction {
            x: 100.0,
            y: 50.0,
            width: 40.0,
            height: 20.0,
            class: "tray".into(),
            confidence: 0.91,
            points: None,
        };
        let record: DetectionRecord = wire.into();
        assert_eq!(record.label, "tray");
        assert!(matches!(
            record.shape,
            DetectionShape::Box { cx, cy, .. } if cx == 100.0 && cy == 50.0
        ));
    }

    #[test]
    fn wire_prediction_with_points_maps_to_polygon() {
        let wire = WirePrediction {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            class: "outline".into(),
            confidence: 0.8,
            points: Some(vec![
                WirePoint { x: 1.0, y: 1.0 },
                WirePoint { x: 5.0, y: 1.0 },
                WirePoint { x: 3.0, y: 4.0 },
            ]),
        };
        let record: DetectionRecord = wire.into();
        assert!(record.is_polygon());
    }

    #[test]
    fn degenerate_point_list_falls_back_to_box() {
        let wire = WirePrediction {
            x: 10.0,
            y: 10.0,
            width: 4.0,
            height: 4.0,
            class: "outline".into(),
            confidence: 0.8,
            points: Some(vec![WirePoint { x: 1.0, y: 1.0 }]),
        };
        let record: DetectionRecord = wire.into();
        assert!(!record.is_polygon());
    }

    #[test]
    fn response_json_parses() {
        let json = r#"{
            "predictions": [
                { "x": 10.0, "y": 20.0, "width": 5.0, "height": 6.0,
                  "class": "tray", "confidence": 0.9 }
            ]
        }"#;
        let wire: WireResponse = serde_json::from_str(json).unwrap();
        assert_eq!(wire.predictions.len(), 1);
    }
}
