//! Common output type for every parser in the crate.
//!
//! A [`ParameterRecord`] is produced fresh per extraction call. Every field
//! that a parser could not recover stays `None`; callers rely on the
//! distinction between "absent" and "empty", so nothing is ever defaulted to
//! `0` or `""`.

use serde::{Deserialize, Serialize};

/// Default LoRA weight when the source does not state one.
pub const DEFAULT_LORA_WEIGHT: f64 = 1.0;

/// Prefix marking a model value that is only a surrogate hash.
pub const MODEL_HASH_PREFIX: &str = "Hash:";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Tool that generated the metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GenerationSource {
    SdWebui,
    Comfyui,
    #[default]
    Unknown,
}

/// ComfyUI graph dialect. `None` unless the record came from a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowType {
    Flux,
    Sdxl,
    Standard,
    #[default]
    None,
}

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// A LoRA applied on top of the base model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoraReference {
    pub name: String,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl LoraReference {
    /// Reference with the default weight and no hash.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: DEFAULT_LORA_WEIGHT,
            hash: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Generation parameters recovered from one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub model: Option<String>,
    pub sampler: Option<String>,
    pub scheduler: Option<String>,
    pub steps: Option<u32>,
    pub cfg_scale: Option<f64>,
    /// Flux guidance (the distilled CFG analogue).
    pub guidance: Option<f64>,
    pub seed: Option<u64>,
    pub loras: Vec<LoraReference>,
    pub generation_source: GenerationSource,
    pub workflow_type: WorkflowType,
    /// Original node graph, passed through untouched for re-export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_workflow: Option<serde_json::Value>,

    pub model_hash: Option<String>,
    pub vae: Option<String>,
    /// CLIP encoder names. Flux dual-clip loaders are joined with `" + "`.
    pub clip: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub denoise: Option<f64>,
    pub clip_skip: Option<u32>,
    /// LoRA mentions that could not be parsed into references.
    pub raw_lora_text: Option<String>,
}

impl ParameterRecord {
    /// Empty record attributed to the given source.
    pub fn from_source(generation_source: GenerationSource) -> Self {
        Self {
            generation_source,
            ..Default::default()
        }
    }

    /// Whether the model value is a `Hash:` surrogate rather than a name.
    pub fn model_is_hash_surrogate(&self) -> bool {
        self.model
            .as_deref()
            .is_some_and(|m| m.starts_with(MODEL_HASH_PREFIX))
    }

    /// Whether any generation field was recovered.
    pub fn has_content(&self) -> bool {
        self.prompt.is_some()
            || self.negative_prompt.is_some()
            || self.model.is_some()
            || self.sampler.is_some()
            || self.scheduler.is_some()
            || self.steps.is_some()
            || self.cfg_scale.is_some()
            || self.guidance.is_some()
            || self.seed.is_some()
            || !self.loras.is_empty()
            || self.model_hash.is_some()
            || self.vae.is_some()
            || self.clip.is_some()
            || self.width.is_some()
            || self.height.is_some()
            || self.denoise.is_some()
            || self.clip_skip.is_some()
            || self.raw_lora_text.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enums_serialize_screaming_snake_case() {
        assert_eq!(
            serde_json::to_value(GenerationSource::SdWebui).unwrap(),
            json!("SD_WEBUI")
        );
        assert_eq!(
            serde_json::to_value(GenerationSource::Comfyui).unwrap(),
            json!("COMFYUI")
        );
        assert_eq!(
            serde_json::to_value(WorkflowType::Standard).unwrap(),
            json!("STANDARD")
        );
        assert_eq!(serde_json::to_value(WorkflowType::None).unwrap(), json!("NONE"));
    }

    #[test]
    fn default_record_is_empty_and_unknown() {
        let record = ParameterRecord::default();
        assert!(!record.has_content());
        assert_eq!(record.generation_source, GenerationSource::Unknown);
        assert_eq!(record.workflow_type, WorkflowType::None);
    }

    #[test]
    fn unset_fields_serialize_as_null() {
        let record = ParameterRecord::from_source(GenerationSource::SdWebui);
        let value = serde_json::to_value(&record).unwrap();
        assert!(value["steps"].is_null());
        assert!(value["prompt"].is_null());
        assert!(value.get("raw_workflow").is_none());
    }

    #[test]
    fn hash_surrogate_detected() {
        let record = ParameterRecord {
            model: Some("Hash:abc123".to_string()),
            ..Default::default()
        };
        assert!(record.model_is_hash_surrogate());
    }

    #[test]
    fn lora_reference_defaults_to_unit_weight() {
        let lora = LoraReference::named("detailTweaker");
        assert_eq!(lora.weight, DEFAULT_LORA_WEIGHT);
        assert!(lora.hash.is_none());
    }
}
