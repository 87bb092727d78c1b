//! Remote batch engine speaking the inference server's HTTP/JSON protocol.
//!
//! Construction fetches and negotiates the model contract; failure leaves
//! no engine behind. The engine owns its HTTP client for its whole
//! lifetime, plus two reusable request-shaping handles built once from the
//! descriptor: the input assembly (reset and refilled per batch, never
//! reallocated) and the requested-output selection. The input assembly is
//! mutated in place, so it lives behind a mutex owned by this instance;
//! concurrent `infer` calls on one engine serialize on it.

use std::sync::Mutex;

use serde::Deserialize;
use tracing::{debug, info};

use super::{validate_requests, InferenceEngine, InferenceRequest, InferenceResult};
use crate::core::batch_plan::plan_batches;
use crate::core::descriptor::ModelDescriptor;
use crate::core::dtype::ElementType;
use crate::core::errors::{ServeError, ServeResult};
use crate::core::negotiate::{negotiate, ModelConfigDoc, ModelMetadata};

/// Connection settings for a remote inference server.
#[derive(Debug, Clone, Deserialize)]
pub struct TritonClientConfig {
    /// Base URL of the server, e.g. `http://localhost:8000`.
    pub url: String,
    /// Name of the model to serve.
    pub model_name: String,
    /// Model version; empty selects the server's default version.
    #[serde(default)]
    pub model_version: String,
}

impl Default for TritonClientConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            model_name: String::new(),
            model_version: String::new(),
        }
    }
}

/// Reusable input assembly: name/shape/datatype fixed at construction, the
/// data buffer cleared and refilled for every batch.
#[derive(Debug)]
struct InferInputSlot {
    name: String,
    datatype: String,
    shape: Vec<i64>,
    data: Vec<f32>,
}

impl InferInputSlot {
    fn from_descriptor(descriptor: &ModelDescriptor) -> Self {
        let capacity = descriptor.input_byte_size / descriptor.input_dtype.byte_width();
        Self {
            name: descriptor.input_name.clone(),
            datatype: descriptor.input_dtype.as_str().to_string(),
            shape: descriptor.input_shape.clone(),
            data: Vec::with_capacity(capacity),
        }
    }

    fn reset(&mut self) {
        self.data.clear();
    }

    fn append_sample(&mut self, sample: &[f32]) {
        self.data.extend_from_slice(sample);
    }
}

/// Output-selection handle, fixed at construction.
#[derive(Debug, Clone)]
struct RequestedOutput {
    name: String,
}

/// One output tensor in an inference response.
#[derive(Debug, Deserialize)]
struct InferOutput {
    name: String,
    datatype: String,
    #[serde(default)]
    shape: Vec<i64>,
    #[serde(default)]
    data: Vec<f32>,
}

/// The inference response body.
#[derive(Debug, Deserialize)]
struct InferResponse {
    #[serde(default)]
    outputs: Vec<InferOutput>,
}

fn model_url(config: &TritonClientConfig, suffix: &str) -> String {
    if config.model_version.is_empty() {
        format!("{}/v2/models/{}{}", config.url, config.model_name, suffix)
    } else {
        format!(
            "{}/v2/models/{}/versions/{}{}",
            config.url, config.model_name, config.model_version, suffix
        )
    }
}

fn build_infer_body(
    slot: &InferInputSlot,
    output: &RequestedOutput,
    request_id: &str,
) -> serde_json::Value {
    serde_json::json!({
        "id": request_id,
        "inputs": [{
            "name": slot.name,
            "shape": slot.shape,
            "datatype": slot.datatype,
            "data": slot.data,
        }],
        "outputs": [{ "name": output.name }],
    })
}

fn convert_output(output: InferOutput) -> ServeResult<InferenceResult> {
    let dtype: ElementType = output.datatype.parse().map_err(|_| {
        ServeError::inference(format!(
            "inference response carries unexpected datatype '{}'",
            output.datatype
        ))
    })?;
    let byte_size = output.data.len() * dtype.byte_width();
    Ok(InferenceResult {
        data: output.data,
        dtype,
        shape: output.shape,
        output_name: output.name,
        byte_size,
        status: true,
    })
}

/// Remote batch engine over a live connection to a networked inference
/// server.
pub struct TritonEngine {
    http: reqwest::blocking::Client,
    config: TritonClientConfig,
    batch_size: usize,
    descriptor: ModelDescriptor,
    input_slot: Mutex<InferInputSlot>,
    requested_output: RequestedOutput,
}

impl std::fmt::Debug for TritonEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TritonEngine")
            .field("url", &self.config.url)
            .field("model_name", &self.config.model_name)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl TritonEngine {
    /// Connects to the server, fetches the model's metadata and
    /// configuration, and negotiates the descriptor for the requested
    /// batch size.
    pub fn new(config: TritonClientConfig, batch_size: usize) -> ServeResult<Self> {
        let http = reqwest::blocking::Client::new();

        let metadata: ModelMetadata =
            fetch_json(&http, &model_url(&config, "")).map_err(|e| match e {
                ServeError::Transport(t) => {
                    ServeError::internal_with("failed to get model metadata", t)
                }
                other => other,
            })?;
        let config_doc: ModelConfigDoc =
            fetch_json(&http, &model_url(&config, "/config")).map_err(|e| match e {
                ServeError::Transport(t) => {
                    ServeError::internal_with("failed to get model config", t)
                }
                other => other,
            })?;

        let descriptor = negotiate(&metadata, &config_doc, batch_size)?;
        info!(
            model = %config.model_name,
            url = %config.url,
            batch_size,
            "negotiated remote model contract"
        );

        let input_slot = Mutex::new(InferInputSlot::from_descriptor(&descriptor));
        let requested_output = RequestedOutput {
            name: descriptor.output_name.clone(),
        };

        Ok(Self {
            http,
            config,
            batch_size,
            descriptor,
            input_slot,
            requested_output,
        })
    }
}

fn fetch_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::blocking::Client,
    url: &str,
) -> ServeResult<T> {
    let response = http.get(url).send()?.error_for_status()?;
    Ok(response.json()?)
}

impl InferenceEngine for TritonEngine {
    fn is_ready(&self) -> bool {
        match self.http.get(model_url(&self.config, "/ready")).send() {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    fn infer(&self, requests: &[InferenceRequest]) -> ServeResult<Vec<InferenceResult>> {
        validate_requests(requests, &self.descriptor, self.batch_size)?;
        let plan = plan_batches(requests.len(), self.batch_size)?;

        let mut slot = self
            .input_slot
            .lock()
            .map_err(|_| ServeError::internal("failed to acquire input assembly lock"))?;

        let mut results = Vec::with_capacity(plan.len());
        for (sent_count, batch) in plan.iter().enumerate() {
            slot.reset();
            for &sample_idx in batch {
                slot.append_sample(&requests[sample_idx].data);
            }

            let request_id = sent_count.to_string();
            debug!(
                request_id = %request_id,
                batch_size = self.batch_size,
                model = %self.config.model_name,
                "dispatching inference batch"
            );

            let body = build_infer_body(&slot, &self.requested_output, &request_id);
            let response = self
                .http
                .post(model_url(&self.config, "/infer"))
                .json(&body)
                .send()
                .map_err(|e| {
                    ServeError::inference_with(
                        format!("failed sending synchronous infer request {request_id}"),
                        e,
                    )
                })?;

            if !response.status().is_success() {
                let status = response.status();
                let detail = response.text().unwrap_or_default();
                return Err(ServeError::inference(format!(
                    "inference server returned {status} for request {request_id}: {detail}"
                )));
            }

            let parsed: InferResponse = response.json().map_err(|e| {
                ServeError::inference_with(
                    format!("could not parse inference response for request {request_id}"),
                    e,
                )
            })?;
            let output = parsed
                .outputs
                .into_iter()
                .find(|o| o.name == self.requested_output.name)
                .ok_or_else(|| {
                    ServeError::inference(format!(
                        "response for request {} is missing output '{}'",
                        request_id, self.requested_output.name
                    ))
                })?;

            results.push(convert_output(output)?);
        }
        Ok(results)
    }
}
