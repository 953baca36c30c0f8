//! Stable Diffusion WebUI `txt2img` client and the style to checkpoint table.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tracing::instrument;

use crate::upstream::{ensure_success, json_body, RetryPolicy, UpstreamError};

pub const SUPPORTED_MODELS: [&str; 6] = [
    "anythingAnd_anythingAndEverything.safetensors",
    "chilloutmix_NiPrunedFp32Fix.safetensors",
    "CounterfeitV30_v30.safetensors",
    "cyberrealistic_v40.safetensors",
    "GuoFeng3-non-ema-fp16.safetensors",
    "ipDESIGN3D_v31.safetensors",
];

/// Unknown styles fall back to the general-purpose checkpoint.
pub fn model_for_style(style: &str) -> &'static str {
    match style.trim() {
        "古风" | "ancient" => SUPPORTED_MODELS[4],
        "现代" | "modern" | "写真" | "portrait" => SUPPORTED_MODELS[1],
        "2次元" | "anime" => SUPPORTED_MODELS[2],
        "卡通" | "cartoon" | "万能" | "general" => SUPPORTED_MODELS[0],
        "赛博" | "cyber" => SUPPORTED_MODELS[3],
        "3D" | "3d" => SUPPORTED_MODELS[5],
        _ => SUPPORTED_MODELS[0],
    }
}

#[derive(Debug, Clone)]
pub struct Txt2ImgRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub checkpoint: String,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns the encoded image bytes.
    async fn txt2img(&self, req: &Txt2ImgRequest) -> Result<Vec<u8>, UpstreamError>;
}

pub struct SdWebUiClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl SdWebUiClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            retry,
        }
    }
}

fn payload(req: &Txt2ImgRequest) -> Value {
    json!({
        "prompt": req.prompt,
        "negative_prompt": req.negative_prompt,
        "width": 512,
        "height": 512,
        "steps": req.steps,
        "cfg_scale": 7.5,
        "sampler_index": "DPM++ 2M Karras",
        "override_settings": { "sd_model_checkpoint": req.checkpoint },
    })
}

fn decode_image(body: &Value) -> Result<Vec<u8>, UpstreamError> {
    if let Some(err) = body.get("error").filter(|e| !e.is_null()) {
        return Err(UpstreamError::Format(format!("image api error: {err}")));
    }
    let raw = body
        .pointer("/images/0")
        .and_then(Value::as_str)
        .ok_or_else(|| UpstreamError::Format("no image in txt2img response".into()))?;
    let data = raw.rsplit_once("base64,").map(|(_, d)| d).unwrap_or(raw);
    let data: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(data)
        .map_err(|e| UpstreamError::Format(format!("image is not base64: {e}")))
}

#[async_trait]
impl ImageGenerator for SdWebUiClient {
    #[instrument(skip_all, fields(steps = req.steps, checkpoint = %req.checkpoint))]
    async fn txt2img(&self, req: &Txt2ImgRequest) -> Result<Vec<u8>, UpstreamError> {
        let url = format!("{}/sdapi/v1/txt2img", self.base_url.trim_end_matches('/'));
        let body = payload(req);
        let (url, body) = (&url, &body);

        let resp: Value = self
            .retry
            .run("txt2img", move || async move {
                let resp = ensure_success(self.http.post(url).json(body).send().await?).await?;
                json_body(resp).await
            })
            .await?;
        decode_image(&resp)
    }
}
