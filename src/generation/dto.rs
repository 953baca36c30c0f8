use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    #[serde(rename = "targetLang", default)]
    pub target_lang: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TranslateResponse {
    pub translation: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct StableRequest {
    pub text: String,
    /// Style selector, mapped to a checkpoint.
    #[serde(default)]
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedImage {
    pub image_url: String,
    pub prompt: String,
    pub negative_prompt: String,
}

#[derive(Debug, Serialize)]
pub struct GalleryItem {
    pub image_url: String,
    pub prompt: String,
    pub negative_prompt: String,
    /// Unix seconds.
    pub date: f64,
}
