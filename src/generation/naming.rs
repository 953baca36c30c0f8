//! Storage layout for generated artifacts.
//!
//! Images are named `sd_image_<YYYYMMDD>_<HHMMSS>_<micro6>_<rand>.png` (UTC) and
//! live under `gallery/<email local part>/`, apart from `avatar/`; prompt text
//! sits next to them in `prompts/`.

use time::{macros::format_description, OffsetDateTime, PrimitiveDateTime};

const PREFIX: &str = "sd_image_";
const IMAGE_EXT: &str = "png";
const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];

macro_rules! stamp_format {
    () => {
        format_description!("[year][month][day]_[hour][minute][second]_[subsecond digits:6]")
    };
}

pub fn artifact_name(now: OffsetDateTime, suffix: u16) -> Result<String, time::error::Format> {
    let stamp = now.to_offset(time::UtcOffset::UTC).format(stamp_format!())?;
    Ok(format!("{PREFIX}{stamp}_{suffix}.{IMAGE_EXT}"))
}

/// Inverse of [`artifact_name`]; `None` for anything not produced by it.
pub fn parse_artifact_timestamp(name: &str) -> Option<OffsetDateTime> {
    let rest = name.strip_prefix(PREFIX)?;
    let (stem, _ext) = rest.rsplit_once('.')?;
    let (stamp, suffix) = stem.rsplit_once('_')?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    PrimitiveDateTime::parse(stamp, stamp_format!())
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

const GALLERY_ROOT: &str = "gallery";

/// Per-user storage prefix derived from the local part of the email.
pub fn gallery_dir(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    let mut dir: String = local
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if dir.chars().all(|c| c == '.') {
        dir = "_".repeat(dir.len().max(1));
    }
    format!("{GALLERY_ROOT}/{dir}")
}

pub fn image_key(dir: &str, name: &str) -> String {
    format!("{dir}/{name}")
}

/// Keys of the positive and negative prompt files for an image.
pub fn prompt_keys(dir: &str, image_name: &str) -> (String, String) {
    let stem = image_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(image_name);
    (
        format!("{dir}/prompts/{stem}_prompt.txt"),
        format!("{dir}/prompts/{stem}_neg_prompt.txt"),
    )
}

pub fn is_image(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
