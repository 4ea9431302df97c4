//! Fallback for JSON metadata that is not a node graph.
//!
//! Tools such as NovelAI, InvokeAI and various web front-ends store flat or
//! nested objects with their own field names. Each record field has a list
//! of aliases; the first alias found breadth-first wins, so a top-level
//! `prompt` beats one nested inside a history entry.

use std::collections::VecDeque;

use serde_json::Value;

use crate::config::ExtractorConfig;
use crate::lora;
use crate::record::{GenerationSource, LoraReference, ParameterRecord, DEFAULT_LORA_WEIGHT};
use crate::value::{json_f64, json_scalar_string, json_str, json_u32, json_u64};

const PROMPT_KEYS: &[&str] = &["prompt", "Prompt", "positive_prompt", "description", "caption"];
const NEGATIVE_KEYS: &[&str] = &[
    "negative_prompt",
    "negativePrompt",
    "negative",
    "uc",
    "Negative prompt",
];
const STEPS_KEYS: &[&str] = &["steps", "num_inference_steps"];
const SAMPLER_KEYS: &[&str] = &["sampler", "sampler_name", "samplerName"];
const SCHEDULER_KEYS: &[&str] = &["scheduler", "schedule_type"];
const CFG_KEYS: &[&str] = &["cfg_scale", "cfg", "guidance_scale"];
/// NovelAI's bare `scale`, too generic to trust below the top level.
const ROOT_CFG_KEYS: &[&str] = &["scale"];
const GUIDANCE_KEYS: &[&str] = &["guidance", "distilled_cfg_scale"];
const SEED_KEYS: &[&str] = &["seed", "noise_seed"];
const MODEL_KEYS: &[&str] = &["model", "model_name", "checkpoint", "ckpt_name", "unet_name"];
const MODEL_HASH_KEYS: &[&str] = &["model_hash", "modelHash"];
const WIDTH_KEYS: &[&str] = &["width"];
const HEIGHT_KEYS: &[&str] = &["height"];
const LORAS_KEYS: &[&str] = &["loras", "lora"];

/// Normalize with the default configuration.
pub fn normalize(value: &Value) -> Option<ParameterRecord> {
    normalize_with(value, &ExtractorConfig::default())
}

/// Map an arbitrary JSON document onto a [`ParameterRecord`].
///
/// Returns `None` when no alias matched anything.
pub fn normalize_with(value: &Value, config: &ExtractorConfig) -> Option<ParameterRecord> {
    let config = config.sanitized();
    let search = AliasSearch {
        root: value,
        max_depth: config.max_json_depth,
    };

    let mut record = ParameterRecord::from_source(GenerationSource::Unknown);
    record.prompt = search.first(PROMPT_KEYS, |v| json_str(v).map(str::to_string));
    // An explicit empty negative prompt is kept.
    record.negative_prompt = search.first(NEGATIVE_KEYS, |v| {
        v.as_str().map(|s| s.trim().to_string())
    });
    record.steps = search.first(STEPS_KEYS, json_u32);
    record.sampler = search.first(SAMPLER_KEYS, |v| json_str(v).map(str::to_string));
    record.scheduler = search.first(SCHEDULER_KEYS, |v| json_str(v).map(str::to_string));
    record.cfg_scale = search
        .first(CFG_KEYS, json_f64)
        .or_else(|| search.at_root(ROOT_CFG_KEYS, json_f64));
    record.guidance = search.first(GUIDANCE_KEYS, json_f64);
    record.seed = search.first(SEED_KEYS, json_u64);
    record.model = search.first(MODEL_KEYS, |v| json_str(v).map(str::to_string));
    record.model_hash = search.first(MODEL_HASH_KEYS, json_scalar_string);
    record.width = search.first(WIDTH_KEYS, json_u32);
    record.height = search.first(HEIGHT_KEYS, json_u32);

    record.loras = search
        .first(LORAS_KEYS, |v| {
            let loras = lora_array(v);
            (!loras.is_empty()).then_some(loras)
        })
        .unwrap_or_default();
    if record.loras.is_empty() {
        if let Some(prompt) = record.prompt.as_deref() {
            record.loras = lora::extract_from_text(prompt).loras;
        }
    }

    if !record.has_content() {
        tracing::debug!("No known generation fields in JSON metadata");
        return None;
    }

    Some(record)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

struct AliasSearch<'a> {
    root: &'a Value,
    max_depth: usize,
}

impl<'a> AliasSearch<'a> {
    /// First value accepted by `read` under any of `keys`, breadth-first.
    /// Within one object, earlier aliases win.
    fn first<T>(&self, keys: &[&str], read: impl Fn(&'a Value) -> Option<T>) -> Option<T> {
        let mut queue: VecDeque<(&'a Value, usize)> = VecDeque::from([(self.root, 0)]);

        while let Some((value, depth)) = queue.pop_front() {
            let children: Box<dyn Iterator<Item = &'a Value>> = match value {
                Value::Object(obj) => {
                    if let Some(found) = keys
                        .iter()
                        .filter_map(|key| obj.get(*key))
                        .find_map(&read)
                    {
                        return Some(found);
                    }
                    Box::new(obj.values())
                }
                Value::Array(items) => Box::new(items.iter()),
                _ => continue,
            };

            if depth >= self.max_depth {
                continue;
            }
            queue.extend(
                children
                    .filter(|v| v.is_object() || v.is_array())
                    .map(|v| (v, depth + 1)),
            );
        }

        None
    }

    /// Like [`AliasSearch::first`], restricted to the root object.
    fn at_root<T>(&self, keys: &[&str], read: impl Fn(&'a Value) -> Option<T>) -> Option<T> {
        let obj = self.root.as_object()?;
        keys.iter().filter_map(|key| obj.get(*key)).find_map(read)
    }
}

/// `[{"name": .., "weight": ..}]` or `["name", ..]`.
fn lora_array(value: &Value) -> Vec<LoraReference> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match item {
            Value::String(_) => json_str(item).map(LoraReference::named),
            Value::Object(obj) => {
                let name = ["name", "model_name", "lora_name"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(json_str))?;
                let weight = ["weight", "strength", "strength_model"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(json_f64))
                    .unwrap_or(DEFAULT_LORA_WEIGHT);
                let mut lora = LoraReference::named(name).with_weight(weight);
                lora.hash = obj.get("hash").and_then(json_scalar_string);
                Some(lora)
            }
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
