//! TensorFlow-Serving compatible REST classifier client
//!
//! Startup: `GET {url}/v1/models/{model}/metadata`, read the serving
//! signature's first input shape.
//! Inference: `POST {url}/v1/models/{model}:predict` with
//! `{"instances": [sequence]}`, score = `predictions[0][0]`.

use super::Classifier;
use crate::error::{Error, Result};
use crate::pipeline::frame::Sequence;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};
use vigil_common::config::ClassifierConfig;

pub struct ServingClassifier {
    client: reqwest::Client,
    predict_url: String,
    input_shape: [usize; 4],
}

impl ServingClassifier {
    /// Connect to the model server and read the model's input shape
    ///
    /// Any failure here is a startup configuration error.
    pub async fn connect(config: &ClassifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {}", e)))?;

        let base = config.url.trim_end_matches('/');
        let metadata_url = format!("{}/v1/models/{}/metadata", base, config.model);

        let response = client
            .get(&metadata_url)
            .send()
            .await
            .map_err(|e| Error::Config(format!("classifier unreachable at {}: {}", metadata_url, e)))?;
        if !response.status().is_success() {
            return Err(Error::Config(format!(
                "classifier metadata request returned {}",
                response.status()
            )));
        }
        let metadata: Value = response
            .json()
            .await
            .map_err(|e| Error::Config(format!("invalid classifier metadata: {}", e)))?;

        let input_shape = parse_input_shape(&metadata)?;
        info!(
            "Classifier '{}' at {} accepts input {:?}",
            config.model, base, input_shape
        );

        Ok(Self {
            client,
            predict_url: format!("{}/v1/models/{}:predict", base, config.model),
            input_shape,
        })
    }
}

#[async_trait]
impl Classifier for ServingClassifier {
    fn input_shape(&self) -> [usize; 4] {
        self.input_shape
    }

    async fn classify(&self, sequence: &Sequence) -> Result<f32> {
        let body = json!({ "instances": [sequence.to_nested()] });

        let response = self
            .client
            .post(&self.predict_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Classifier(format!("predict request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Classifier(format!(
                "predict returned {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::Classifier(format!("invalid predict response: {}", e)))?;

        let score = parse_prediction(&payload)?;
        debug!("Classifier score {:.4}", score);
        Ok(score)
    }
}

/// Dimension sizes arrive as strings ("-1", "20") or numbers
fn dim_size(dim: &Value) -> Option<i64> {
    let size = dim.get("size")?;
    match size {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Per-sample input shape from serving metadata
///
/// The batch dimension must be variable (-1) or 1.
pub fn parse_input_shape(metadata: &Value) -> Result<[usize; 4]> {
    let signatures = &metadata["metadata"]["signature_def"]["signature_def"];
    let signature = signatures
        .get("serving_default")
        .or_else(|| signatures.as_object().and_then(|m| m.values().next()))
        .ok_or_else(|| Error::Config("classifier metadata has no signature".into()))?;

    let input = signature["inputs"]
        .as_object()
        .and_then(|inputs| inputs.values().next())
        .ok_or_else(|| Error::Config("classifier signature has no inputs".into()))?;

    let dims: Vec<i64> = input["tensor_shape"]["dim"]
        .as_array()
        .ok_or_else(|| Error::Config("classifier input has no shape".into()))?
        .iter()
        .map(|d| dim_size(d).ok_or_else(|| Error::Config("unreadable input dimension".into())))
        .collect::<Result<_>>()?;

    match dims.as_slice() {
        [batch, rest @ ..] if (*batch == -1 || *batch == 1) && rest.len() == 4 => {
            let mut shape = [0usize; 4];
            for (slot, value) in shape.iter_mut().zip(rest) {
                *slot = usize::try_from(*value).map_err(|_| {
                    Error::Config(format!("variable classifier input dimensions {:?}", dims))
                })?;
            }
            Ok(shape)
        }
        _ => Err(Error::Config(format!(
            "classifier input must be [batch, frames, height, width, channels], got {:?}",
            dims
        ))),
    }
}

/// Score from `predictions[0][0]` (or `predictions[0]` for scalar outputs)
pub fn parse_prediction(payload: &Value) -> Result<f32> {
    let first = &payload["predictions"][0];
    let score = first
        .get(0)
        .and_then(Value::as_f64)
        .or_else(|| first.as_f64())
        .ok_or_else(|| Error::Classifier(format!("no score in response: {}", payload)))?;
    Ok(score as f32)
}
