use anyhow::{anyhow, Context};
use bytes::Bytes;
use rand::Rng;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::{
    dto::{GalleryItem, GeneratedImage, TranslateResponse},
    naming::{
        artifact_name, gallery_dir, image_key, is_image, parse_artifact_timestamp, prompt_keys,
    },
    sd::{model_for_style, Txt2ImgRequest},
};
use crate::{auth::repo_types::User, state::AppState, upstream::UpstreamError};

const DEFAULT_TARGET_LANG: &str = "English";
const UNKNOWN_PROMPT: &str = "unknown prompt";
const UNKNOWN_NEGATIVE_PROMPT: &str = "unknown negative prompt";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("text must not be empty")]
    EmptyText,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// How many images a request produces and the sampler steps for each.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub steps: Vec<u32>,
}

impl BatchPlan {
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let count = rng.gen_range(3..=6);
        Self {
            steps: (0..count).map(|_| rng.gen_range(20..=30)).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PromptPair {
    positive: String,
    negative: String,
}

fn translate_prompt(target_lang: &str, text: &str) -> String {
    format!(
        "You are a professional translator. Translate the input text into accurate, fluent \
         {target_lang} and extract 1-5 core keywords in the language of the input.\n\
         Reply with JSON only, no other content, in exactly this shape:\n\
         {{\"translation\": \"<the text translated into {target_lang}>\", \"keywords\": [\"<keyword>\"]}}\n\
         Input text: \u{300c}{text}\u{300d}"
    )
}

fn sd_prompt(text: &str) -> String {
    format!(
        "You are an expert at writing Stable Diffusion prompts. Break the short input down into \
         its core elements and produce a precise positive prompt and negative prompt. If the \
         input lacks key information such as style or detail, add some at random.\n\
         Reply with JSON only, no other content, in exactly this shape:\n\
         {{\"Positive\": \"<positive prompt for {text}>\", \"Reverse\": \"<negative prompt for {text}>\"}}"
    )
}

fn string_field(value: &Value, field: &str) -> Result<String, UpstreamError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| UpstreamError::Format(format!("model reply is missing `{field}`")))
}

fn non_blank(text: &str) -> Result<&str, GenerationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(GenerationError::EmptyText);
    }
    Ok(text)
}

#[instrument(skip(st, text))]
pub async fn translate(
    st: &AppState,
    target_lang: &str,
    text: &str,
) -> Result<TranslateResponse, GenerationError> {
    let text = non_blank(text)?;
    let target_lang = match target_lang.trim() {
        "" => DEFAULT_TARGET_LANG,
        lang => lang,
    };

    let reply = st.llm.complete_json(&translate_prompt(target_lang, text)).await?;
    let translation = string_field(&reply, "translation")?;
    let keywords = reply
        .get("keywords")
        .and_then(Value::as_array)
        .ok_or_else(|| UpstreamError::Format("model reply is missing `keywords`".into()))?
        .iter()
        .filter_map(|k| k.as_str().map(str::to_string))
        .collect();
    Ok(TranslateResponse {
        translation,
        keywords,
    })
}

pub async fn generate_images(
    st: &AppState,
    user: &User,
    text: &str,
    style: &str,
) -> Result<GeneratedImage, GenerationError> {
    generate_with_plan(st, user, text, style, BatchPlan::random()).await
}

/// Runs the batch sequentially. Every success is persisted; the last one is
/// returned. Fails only when no call in the batch succeeded.
#[instrument(skip(st, user, text), fields(user_id = user.id, count = plan.steps.len()))]
pub async fn generate_with_plan(
    st: &AppState,
    user: &User,
    text: &str,
    style: &str,
    plan: BatchPlan,
) -> Result<GeneratedImage, GenerationError> {
    let text = non_blank(text)?;

    let reply = st.llm.complete_json(&sd_prompt(text)).await?;
    let prompts = PromptPair {
        positive: string_field(&reply, "Positive")?,
        negative: string_field(&reply, "Reverse")?,
    };

    let dir = gallery_dir(&user.email);
    let checkpoint = model_for_style(style);
    let mut last_ok = None;
    let mut last_err = None;

    for (index, steps) in plan.steps.into_iter().enumerate() {
        let req = Txt2ImgRequest {
            prompt: prompts.positive.clone(),
            negative_prompt: prompts.negative.clone(),
            steps,
            checkpoint: checkpoint.to_string(),
        };
        match generate_one(st, &dir, &req).await {
            Ok(image) => last_ok = Some(image),
            Err(e) => {
                warn!(index, steps, error = %e, "image generation failed; continuing batch");
                last_err = Some(e);
            }
        }
    }

    info!(
        succeeded = last_ok.is_some(),
        failed = last_err.is_some(),
        "generation batch finished"
    );
    match (last_ok, last_err) {
        (Some(image), _) => Ok(image),
        (None, Some(e)) => Err(e),
        (None, None) => Err(anyhow!("empty generation batch").into()),
    }
}

async fn generate_one(
    st: &AppState,
    dir: &str,
    req: &Txt2ImgRequest,
) -> Result<GeneratedImage, GenerationError> {
    let png = st.images.txt2img(req).await?;

    let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
    let name = artifact_name(OffsetDateTime::now_utc(), suffix).context("format artifact name")?;
    let key = image_key(dir, &name);
    let (prompt_key, neg_key) = prompt_keys(dir, &name);

    // prompts first: a listed image always has its prompt files
    st.storage
        .put_object(&prompt_key, Bytes::from(req.prompt.clone()))
        .await?;
    st.storage
        .put_object(&neg_key, Bytes::from(req.negative_prompt.clone()))
        .await?;
    st.storage.put_object(&key, Bytes::from(png)).await?;
    info!(%key, "artifact stored");

    Ok(GeneratedImage {
        image_url: st.storage.public_url(&key),
        prompt: req.prompt.clone(),
        negative_prompt: req.negative_prompt.clone(),
    })
}

/// Newest first. Names that do not carry a parseable timestamp sort by mtime.
#[instrument(skip_all, fields(user_id = user.id))]
pub async fn gallery(st: &AppState, user: &User) -> Result<Vec<GalleryItem>, GenerationError> {
    let dir = gallery_dir(&user.email);
    let objects = st.storage.list_objects(&dir).await?;

    let mut items = Vec::new();
    for obj in objects.into_iter().filter(|o| is_image(&o.name)) {
        let (prompt_key, neg_key) = prompt_keys(&dir, &obj.name);
        let prompt = read_prompt(st, &prompt_key, UNKNOWN_PROMPT).await;
        let negative_prompt = read_prompt(st, &neg_key, UNKNOWN_NEGATIVE_PROMPT).await;

        let date = parse_artifact_timestamp(&obj.name)
            .or(obj.modified)
            .map(unix_seconds)
            .unwrap_or_default();
        items.push(GalleryItem {
            image_url: st.storage.public_url(&obj.key),
            prompt,
            negative_prompt,
            date,
        });
    }

    items.sort_by(|a, b| b.date.total_cmp(&a.date));
    Ok(items)
}

async fn read_prompt(st: &AppState, key: &str, fallback: &str) -> String {
    match st.storage.read_text(key).await {
        Ok(Some(text)) => text.trim().to_string(),
        Ok(None) => fallback.to_string(),
        Err(e) => {
            warn!(%key, error = %e, "unreadable prompt file");
            fallback.to_string()
        }
    }
}

fn unix_seconds(t: OffsetDateTime) -> f64 {
    t.unix_timestamp_nanos() as f64 / 1e9
}
