//! Entry point: route a raw image metadata map to the right parser.
//!
//! The map comes from a PNG/JPEG decoder owned by the caller. Keys are the
//! text chunk or EXIF tag names, values are either already decoded JSON or
//! plain strings.

use std::collections::HashMap;

use serde_json::Value;

use crate::config::ExtractorConfig;
use crate::error::CoreError;
use crate::record::ParameterRecord;
use crate::{generic_json, text_params, workflow_parser};

/// Keys that carry ComfyUI graphs or other JSON payloads, in priority order.
pub const JSON_KEYS: &[&str] = &["prompt", "workflow", "Workflow", "ComfyUI_Workflow"];

/// Keys that carry SD-WebUI style text, in priority order. `0x9286` is the
/// EXIF UserComment tag.
pub const TEXT_KEYS: &[&str] = &[
    "parameters",
    "Parameters",
    "UserComment",
    "0x9286",
    "Comment",
    "Description",
];

/// A single metadata entry as handed over by the image decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Text(String),
    Json(Value),
}

impl From<String> for MetadataValue {
    fn from(text: String) -> Self {
        MetadataValue::Text(text)
    }
}

impl From<&str> for MetadataValue {
    fn from(text: &str) -> Self {
        MetadataValue::Text(text.to_string())
    }
}

impl From<Value> for MetadataValue {
    fn from(value: Value) -> Self {
        MetadataValue::Json(value)
    }
}

/// Which parser a payload should go to.
#[derive(Debug, Clone, PartialEq)]
pub enum ParserTarget {
    Graph(Value),
    GenericJson(Value),
    Text(String),
    NoMetadata,
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Best single target for `metadata`.
pub fn sniff(metadata: &HashMap<String, MetadataValue>) -> ParserTarget {
    sniff_candidates(metadata)
        .into_iter()
        .next()
        .unwrap_or(ParserTarget::NoMetadata)
}

/// Every viable target, best first.
///
/// JSON under the JSON keys comes first, then text keys. Strings under JSON
/// keys that are not valid JSON are kept as a last resort.
pub fn sniff_candidates(metadata: &HashMap<String, MetadataValue>) -> Vec<ParserTarget> {
    let mut candidates = Vec::new();
    let mut last_resort = Vec::new();

    for key in JSON_KEYS {
        let Some(value) = metadata.get(*key) else {
            continue;
        };
        match value {
            MetadataValue::Json(json) => push_json(&mut candidates, key, json.clone()),
            MetadataValue::Text(text) => match decode_json_text(text) {
                Ok(Some(json)) => push_json(&mut candidates, key, json),
                Ok(None) => push_text(&mut last_resort, text),
                Err(e) => {
                    tracing::debug!(key = *key, error = %e, "Recovering malformed JSON as text");
                    push_text(&mut last_resort, text);
                }
            },
        }
    }

    for key in TEXT_KEYS {
        let Some(value) = metadata.get(*key) else {
            continue;
        };
        match value {
            MetadataValue::Json(json) => push_json(&mut candidates, key, json.clone()),
            MetadataValue::Text(text) => match decode_json_text(text) {
                Ok(Some(json)) => push_json(&mut candidates, key, json),
                Ok(None) => push_text(&mut candidates, text),
                Err(e) => {
                    tracing::debug!(key = *key, error = %e, "Recovering malformed JSON as text");
                    push_text(&mut candidates, text);
                }
            },
        }
    }

    candidates.extend(last_resort);
    candidates
}

/// Numeric-keyed objects are node graphs; any other JSON is generic.
///
/// The ComfyUI editor layout (`nodes` + `links` arrays) holds widget values
/// positionally and canvas state under `extra`, so it maps to
/// [`ParserTarget::NoMetadata`] rather than to the generic normalizer.
pub fn classify_json(json: Value) -> ParserTarget {
    let Some(obj) = json.as_object() else {
        return ParserTarget::GenericJson(json);
    };
    if !obj.is_empty() && obj.keys().all(|k| is_numeric_id(k)) {
        return ParserTarget::Graph(json);
    }
    if is_ui_workflow(obj) {
        return ParserTarget::NoMetadata;
    }
    ParserTarget::GenericJson(json)
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract parameters with the default configuration.
pub fn extract_parameters(metadata: &HashMap<String, MetadataValue>) -> Option<ParameterRecord> {
    extract_parameters_with(metadata, &ExtractorConfig::default())
}

/// Try each candidate in order and return the first record with content.
///
/// A graph with no recognizable anchors yields an empty `UNKNOWN` record;
/// it is returned only when no later candidate does better.
pub fn extract_parameters_with(
    metadata: &HashMap<String, MetadataValue>,
    config: &ExtractorConfig,
) -> Option<ParameterRecord> {
    let config = config.sanitized();
    let mut fallback = None;

    for target in sniff_candidates(metadata) {
        let Some(record) = parse_target(&target, &config) else {
            continue;
        };
        if record.has_content() {
            return Some(record);
        }
        fallback.get_or_insert(record);
    }

    if fallback.is_none() {
        tracing::debug!(keys = metadata.len(), "No generation metadata found");
    }
    fallback
}

/// Run the parser for a single target.
pub fn parse_target(target: &ParserTarget, config: &ExtractorConfig) -> Option<ParameterRecord> {
    match target {
        ParserTarget::Graph(json) => workflow_parser::parse_with(json, config),
        ParserTarget::GenericJson(json) => generic_json::normalize_with(json, config),
        ParserTarget::Text(text) => text_params::parse_with(text, config),
        ParserTarget::NoMetadata => None,
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// `Ok(None)` when the text does not look like JSON at all.
fn decode_json_text(text: &str) -> Result<Option<Value>, CoreError> {
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| CoreError::MalformedJson(e.to_string()))
}

fn push_json(targets: &mut Vec<ParserTarget>, key: &str, json: Value) {
    match classify_json(json) {
        ParserTarget::NoMetadata => {
            tracing::debug!(key, "Skipping ComfyUI editor layout payload");
        }
        target => targets.push(target),
    }
}

fn is_ui_workflow(obj: &serde_json::Map<String, Value>) -> bool {
    obj.get("nodes").is_some_and(Value::is_array) && obj.get("links").is_some_and(Value::is_array)
}

fn push_text(targets: &mut Vec<ParserTarget>, text: &str) {
    if !text.trim().is_empty() {
        targets.push(ParserTarget::Text(text.to_string()));
    }
}

fn is_numeric_id(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
