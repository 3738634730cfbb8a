//! Image-recognition client

use crate::error::RemoteError;
use crate::gate::RequestGate;
use crate::http::{build_client, check_status, json_body};
use async_trait::async_trait;
use brickscan_core::{Category, ItemType, Prediction, ServiceConfig, ServiceReply};
use brickscan_eye::Crop;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Anything that can rank catalog candidates for a crop
#[async_trait]
pub trait Identifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ranked candidates for `crop`, never an error
    async fn identify(&self, crop: &Crop, category: Category) -> ServiceReply<Vec<Prediction>>;
}

/// Client for the Brickognize recognition API
pub struct BrickognizeClient {
    client: Client,
    base_url: String,
    gate: Arc<RequestGate>,
    top_n: usize,
}

impl BrickognizeClient {
    pub fn new(config: &ServiceConfig, top_n: usize) -> Result<Self, RemoteError> {
        let gate = Arc::new(RequestGate::for_service("brickognize", config));
        Self::with_gate(config, gate, top_n)
    }

    pub fn with_gate(
        config: &ServiceConfig,
        gate: Arc<RequestGate>,
        top_n: usize,
    ) -> Result<Self, RemoteError> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.endpoint().to_string(),
            gate,
            top_n: top_n.max(1),
        })
    }

    pub fn gate(&self) -> &Arc<RequestGate> {
        &self.gate
    }

    async fn send_predict(
        &self,
        image: &[u8],
        file_name: &str,
        category: Category,
    ) -> Result<Value, RemoteError> {
        let part = Part::bytes(image.to_vec())
            .file_name(file_name.to_string())
            .mime_str("image/jpeg")?;
        let form = Form::new().part("query_image", part);

        let url = format!("{}/predict/{}/", self.base_url, category.as_str());
        debug!("POST {} ({} bytes)", url, image.len());

        let response = self
            .client
            .post(&url)
            .header("accept", "application/json")
            .multipart(form)
            .send()
            .await?;
        let response = check_status(response).await?;
        json_body(response).await
    }
}

#[async_trait]
impl Identifier for BrickognizeClient {
    fn name(&self) -> &'static str {
        "brickognize"
    }

    async fn identify(&self, crop: &Crop, category: Category) -> ServiceReply<Vec<Prediction>> {
        let image = match crop.encode_jpeg() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot encode {}: {}", crop.label, e);
                return ServiceReply::Failed(RemoteError::Encoding(e.to_string()).failure_reason());
            }
        };
        let file_name = crop.upload_name();

        let outcome = self
            .gate
            .execute(|| self.send_predict(&image, &file_name, category))
            .await
            .and_then(|body| parse_predictions(&body, category, self.top_n));

        match outcome {
            Ok(predictions) if predictions.is_empty() => {
                debug!("No candidates for {}", crop.label);
                ServiceReply::Empty
            }
            Ok(predictions) => ServiceReply::Data(predictions),
            Err(e) => {
                warn!("Identification failed for {}: {}", crop.label, e);
                ServiceReply::Failed(e.failure_reason())
            }
        }
    }
}

/// Normalize a `/predict` response body into at most `top_n` predictions
///
/// Items keep the service's order. If scores are not non-increasing the
/// list is stably sorted by score, so ties keep their service order.
pub fn parse_predictions(
    body: &Value,
    category: Category,
    top_n: usize,
) -> Result<Vec<Prediction>, RemoteError> {
    let items = body
        .get("items")
        .and_then(|i| i.as_array())
        .ok_or_else(|| RemoteError::InvalidResponse("no items array".to_string()))?;

    let mut predictions = Vec::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        let item_id = match item.get("id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(RemoteError::InvalidResponse(format!(
                    "item {} has no id",
                    position
                )))
            }
        };
        let score = item
            .get("score")
            .and_then(|s| s.as_f64())
            .ok_or_else(|| {
                RemoteError::InvalidResponse(format!("item '{}' has no numeric score", item_id))
            })?;
        let item_type = item
            .get("type")
            .and_then(|t| t.as_str())
            .and_then(ItemType::from_service)
            .unwrap_or_else(|| category.default_item_type());

        predictions.push(Prediction {
            rank: 0,
            item_id,
            item_type,
            score: score.clamp(0.0, 1.0) as f32,
            name: non_empty_str(item, "name"),
            category_name: non_empty_str(item, "category"),
            catalog: None,
        });
    }

    if predictions.windows(2).any(|w| w[0].score < w[1].score) {
        warn!("Service returned predictions out of score order, re-sorting");
        predictions.sort_by(|a, b| b.score.total_cmp(&a.score));
    }
    predictions.truncate(top_n);
    for (i, prediction) in predictions.iter_mut().enumerate() {
        prediction.rank = i as u32 + 1;
    }
    Ok(predictions)
}

fn non_empty_str(item: &Value, key: &str) -> Option<String> {
    item.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
