//! SD-WebUI freeform parameter text parsing.
//!
//! The format is loosely:
//!
//! ```text
//! masterpiece, best quality
//! Negative prompt: blurry
//! Steps: 20, Sampler: Euler a, CFG scale: 7.5, Seed: 12345, Model: foo
//! ```
//!
//! Parsing applies ordered rules, each filling a field only if it is still
//! unset. Fields that cannot be recovered stay `None`.

use std::sync::LazyLock;

use regex::Regex;

use crate::config::ExtractorConfig;
use crate::lora;
use crate::record::{GenerationSource, ParameterRecord, MODEL_HASH_PREFIX};

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// Keys that start a parameter entry rather than prompt text.
const KEYWORDS: &str = "negative prompt|steps|sampler|schedule type|scheduler|cfg scale|cfg|\
    distilled cfg scale|seed|size|model hash|model|checkpoint|model name|denoising strength|\
    clip skip|vae hash|vae|rng|lora hashes|lora hash|lora weight|lora|ti hashes|version|\
    hires [a-z ]+|face restoration|emphasis";

/// A line that begins with a known `Key:` (optionally numbered, `Lora 1:`).
static KEYWORD_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)^\s*(?:{KEYWORDS})\s*\d*\s*:")).expect("valid regex")
});

static NEGATIVE_PROMPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)negative prompt\s*:\s*(.*?)(?:[\s,]*\b(?:{KEYWORDS})\s*\d*\s*:|\z)"
    ))
    .expect("valid regex")
});

static STEPS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)(?:^|,)\s*steps\s*:?\s*(\d+)").expect("valid regex"));

static CFG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(?:^|,)\s*cfg(?:\s*scale)?\s*:?\s*(\d+(?:\.\d+)?)").expect("valid regex")
});

static SEED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)(?:^|,)\s*seed\s*:?\s*(\d+)").expect("valid regex"));

static SAMPLER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)(?:^|,)\s*sampler\s*:\s*([^,\n]+)").expect("valid regex"));

static SCHEDULER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(?:^|,)\s*(?:schedule type|scheduler)\s*:\s*([^,\n]+)").expect("valid regex")
});

static MODEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)(?:^|,)\s*model\s*:\s*([^\n]+)").expect("valid regex"));

/// Where a captured `Model:` value stops: a trailing marker or the next key.
static MODEL_TRAILER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[,\s]+(?:denoising|rng|lora|vae_name)\b|,\s*[a-z][a-z0-9 _]*:")
        .expect("valid regex")
});

static CHECKPOINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(?:^|,)\s*(?:checkpoint|model name)\s*:\s*([^,\n]+)").expect("valid regex")
});

static MODEL_HASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(?:^|,)\s*model hash\s*:\s*([^,\n]+)").expect("valid regex")
});

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(?:^|,)\s*size\s*:\s*(\d+)\s*x\s*(\d+)").expect("valid regex")
});

static DENOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(?:^|,)\s*denoising strength\s*:\s*(\d+(?:\.\d+)?)").expect("valid regex")
});

static CLIP_SKIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)(?:^|,)\s*clip skip\s*:\s*(\d+)").expect("valid regex"));

static VAE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)(?:^|,)\s*vae\s*:\s*([^,\n]+)").expect("valid regex"));

/// Keywords whose presence attributes the text to SD-WebUI.
static SOURCE_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(?:^|,)\s*(?:steps|sampler|cfg scale|seed)\s*:").expect("valid regex")
});

static CJK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{Han}\p{Hiragana}\p{Katakana}\p{Hangul}]").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/// Parse SD-WebUI parameter text with the default configuration.
pub fn parse(raw: &str) -> Option<ParameterRecord> {
    parse_with(raw, &ExtractorConfig::default())
}

/// Parse SD-WebUI parameter text.
///
/// Returns `None` only for empty or whitespace-only input. Non-empty input
/// that matches no rule becomes the prompt, so content is never discarded.
pub fn parse_with(raw: &str, config: &ExtractorConfig) -> Option<ParameterRecord> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    let mut record = ParameterRecord::default();

    // 1. Prompt: first line that is not a `Key:` entry.
    record.prompt = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !KEYWORD_LINE_RE.is_match(line))
        .map(str::to_string);

    // 2. Negative prompt, bounded by the next keyword.
    record.negative_prompt = NEGATIVE_PROMPT_RE
        .captures(text)
        .map(|caps| clean_value(&caps[1]));

    // 3. Scalar parameters.
    record.steps = capture(&STEPS_RE, text).and_then(|s| s.parse().ok());
    record.cfg_scale = capture(&CFG_RE, text).and_then(|s| s.parse().ok());
    record.seed = capture(&SEED_RE, text).and_then(|s| s.parse().ok());
    record.sampler = capture(&SAMPLER_RE, text).map(clean_value).filter(|s| !s.is_empty());
    record.scheduler = capture(&SCHEDULER_RE, text)
        .map(clean_value)
        .filter(|s| !s.is_empty());

    record.model_hash = capture(&MODEL_HASH_RE, text)
        .map(clean_value)
        .filter(|s| !s.is_empty());
    if let Some(caps) = SIZE_RE.captures(text) {
        record.width = caps[1].parse().ok();
        record.height = caps[2].parse().ok();
    }
    record.denoise = capture(&DENOISE_RE, text).and_then(|s| s.parse().ok());
    record.clip_skip = capture(&CLIP_SKIP_RE, text).and_then(|s| s.parse().ok());
    record.vae = capture(&VAE_RE, text).map(clean_value).filter(|s| !s.is_empty());

    // 4. Model name disambiguation.
    record.model = resolve_model_name(text, record.model_hash.as_deref(), config);

    // 5. LoRAs.
    let loras = lora::extract_from_text(text);
    record.loras = loras.loras;
    record.raw_lora_text = loras.raw_lora_text;

    // 6. Source attribution.
    let has_webui_keywords = SOURCE_KEYWORD_RE.is_match(text)
        || record.steps.is_some()
        || record.sampler.is_some()
        || record.cfg_scale.is_some()
        || record.seed.is_some();
    record.generation_source = if has_webui_keywords {
        GenerationSource::SdWebui
    } else {
        GenerationSource::Unknown
    };

    // 7. Never silently discard content.
    if !record.has_content() {
        tracing::debug!("No parameter rules matched, keeping whole text as prompt");
        record.prompt = Some(text.to_string());
    }

    Some(record)
}

/// Whether a `Model:` value looks like a real checkpoint name rather than a
/// truncated label: a `.safetensors` file, CJK text, or long enough.
pub fn looks_like_model_name(name: &str, config: &ExtractorConfig) -> bool {
    name.to_lowercase().ends_with(".safetensors")
        || CJK_RE.is_match(name)
        || name.chars().count() > config.model_name_min_len
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// `Model:` if it looks real, else `checkpoint:`/`model name:`, else the
/// `Model hash:` as a `Hash:` surrogate, else the short `Model:` value.
fn resolve_model_name(
    text: &str,
    model_hash: Option<&str>,
    config: &ExtractorConfig,
) -> Option<String> {
    let model = capture(&MODEL_RE, text)
        .map(strip_model_trailer)
        .filter(|m| !m.is_empty());

    if let Some(name) = model.as_deref() {
        if looks_like_model_name(name, config) {
            return model;
        }
    }

    if let Some(checkpoint) = capture(&CHECKPOINT_RE, text)
        .map(clean_value)
        .filter(|c| !c.is_empty())
    {
        return Some(checkpoint);
    }

    if let Some(hash) = model_hash {
        return Some(format!("{MODEL_HASH_PREFIX}{hash}"));
    }

    model
}

fn strip_model_trailer(raw: &str) -> String {
    let end = MODEL_TRAILER_RE
        .find(raw)
        .map(|m| m.start())
        .unwrap_or(raw.len());
    clean_value(&raw[..end])
}

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn clean_value(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(',')
        .trim()
        .trim_matches('"')
        .trim()
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
