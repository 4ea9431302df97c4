//! Typed view of a ComfyUI API-format node graph.
//!
//! The expected format is an object where each key is a node ID and each
//! value is an object with `class_type` and `inputs` fields:
//!
//! ```json
//! {
//!   "3": {
//!     "class_type": "KSampler",
//!     "inputs": { "seed": 42, "positive": ["6", 0] }
//!   }
//! }
//! ```
//!
//! Input values are either literals or links encoded as
//! `[source_node_id, output_index]`. Nodes live in an index-addressed arena
//! ordered by numeric node id, so "first seen" means "lowest id".

use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::CoreError;
use crate::types::{NodeId, NodeIndex};
use crate::value::{json_f64, json_str, json_u64};

// ---------------------------------------------------------------------------
// ComfyUI node class types
// ---------------------------------------------------------------------------

pub const CHECKPOINT_LOADER_SIMPLE_CLASS: &str = "CheckpointLoaderSimple";
pub const CHECKPOINT_LOADER_CLASS: &str = "CheckpointLoader";
pub const UNET_LOADER_CLASS: &str = "UNETLoader";
pub const DUAL_CLIP_LOADER_CLASS: &str = "DualCLIPLoader";
pub const VAE_LOADER_CLASS: &str = "VAELoader";
pub const FLUX_GUIDANCE_CLASS: &str = "FluxGuidance";
pub const KSAMPLER_CLASS: &str = "KSampler";
pub const KSAMPLER_ADVANCED_CLASS: &str = "KSamplerAdvanced";
pub const SAMPLER_CUSTOM_ADVANCED_CLASS: &str = "SamplerCustomAdvanced";
pub const KSAMPLER_SELECT_CLASS: &str = "KSamplerSelect";
pub const RANDOM_NOISE_CLASS: &str = "RandomNoise";
pub const BASIC_SCHEDULER_CLASS: &str = "BasicScheduler";
pub const CLIP_TEXT_ENCODE_CLASS: &str = "CLIPTextEncode";
pub const LORA_LOADER_CLASS: &str = "LoraLoader";
pub const LORA_LOADER_MODEL_ONLY_CLASS: &str = "LoraLoaderModelOnly";

/// Guider nodes feeding `SamplerCustomAdvanced.guider`.
const GUIDER_CLASSES: &[&str] = &["BasicGuider", "CFGGuider", "DualCFGGuider"];

/// SDXL-specific text encoders.
const SDXL_ENCODER_CLASSES: &[&str] = &["CLIPTextEncodeSDXL", "CLIPTextEncodeSDXLRefiner"];

/// Custom nodes that forward or rewrite prompt text.
const TEXT_PASS_THROUGH_CLASSES: &[&str] = &["DeepTranslatorTextNode", "StringFunction|pysssss"];

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// Reference to another node's output slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeLink {
    pub source: NodeId,
    pub output_index: u32,
}

/// A node input: inline literal or link to an upstream node.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Literal(Value),
    Link(NodeLink),
}

impl InputValue {
    pub fn as_link(&self) -> Option<&NodeLink> {
        match self {
            InputValue::Link(link) => Some(link),
            InputValue::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            InputValue::Literal(value) => Some(value),
            InputValue::Link(_) => None,
        }
    }
}

/// Recognized node kinds. Anything else is `Other` with its raw class type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    CheckpointLoader,
    UnetLoader,
    DualClipLoader,
    VaeLoader,
    FluxGuidance,
    KSampler,
    KSamplerAdvanced,
    SamplerCustomAdvanced,
    KSamplerSelect,
    RandomNoise,
    BasicScheduler,
    Guider,
    ClipTextEncode,
    ClipTextEncodeSdxl,
    LoraLoader,
    LoraLoaderModelOnly,
    TextPassThrough,
    Other(String),
}

impl NodeKind {
    pub fn from_class_type(class_type: &str) -> Self {
        match class_type {
            CHECKPOINT_LOADER_SIMPLE_CLASS | CHECKPOINT_LOADER_CLASS => NodeKind::CheckpointLoader,
            UNET_LOADER_CLASS => NodeKind::UnetLoader,
            DUAL_CLIP_LOADER_CLASS => NodeKind::DualClipLoader,
            VAE_LOADER_CLASS => NodeKind::VaeLoader,
            FLUX_GUIDANCE_CLASS => NodeKind::FluxGuidance,
            KSAMPLER_CLASS => NodeKind::KSampler,
            KSAMPLER_ADVANCED_CLASS => NodeKind::KSamplerAdvanced,
            SAMPLER_CUSTOM_ADVANCED_CLASS => NodeKind::SamplerCustomAdvanced,
            KSAMPLER_SELECT_CLASS => NodeKind::KSamplerSelect,
            RANDOM_NOISE_CLASS => NodeKind::RandomNoise,
            BASIC_SCHEDULER_CLASS => NodeKind::BasicScheduler,
            CLIP_TEXT_ENCODE_CLASS => NodeKind::ClipTextEncode,
            LORA_LOADER_CLASS => NodeKind::LoraLoader,
            LORA_LOADER_MODEL_ONLY_CLASS => NodeKind::LoraLoaderModelOnly,
            other if GUIDER_CLASSES.contains(&other) => NodeKind::Guider,
            other if SDXL_ENCODER_CLASSES.contains(&other) => NodeKind::ClipTextEncodeSdxl,
            other if TEXT_PASS_THROUGH_CLASSES.contains(&other) => NodeKind::TextPassThrough,
            other => NodeKind::Other(other.to_string()),
        }
    }

    /// Classic samplers that carry steps/cfg/seed inline.
    pub fn is_classic_sampler(&self) -> bool {
        matches!(self, NodeKind::KSampler | NodeKind::KSamplerAdvanced)
    }

    /// Any node that consumes conditioning and produces latents.
    pub fn is_sampler(&self) -> bool {
        matches!(
            self,
            NodeKind::KSampler | NodeKind::KSamplerAdvanced | NodeKind::SamplerCustomAdvanced
        )
    }

    pub fn is_text_encoder(&self) -> bool {
        matches!(self, NodeKind::ClipTextEncode | NodeKind::ClipTextEncodeSdxl)
    }
}

/// A single node in a decoded workflow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub class_type: String,
    pub kind: NodeKind,
    pub inputs: IndexMap<String, InputValue>,
}

impl Node {
    pub fn input(&self, name: &str) -> Option<&InputValue> {
        self.inputs.get(name)
    }

    pub fn literal(&self, name: &str) -> Option<&Value> {
        self.input(name).and_then(InputValue::as_literal)
    }

    pub fn link(&self, name: &str) -> Option<&NodeLink> {
        self.input(name).and_then(InputValue::as_link)
    }

    /// Non-empty trimmed string literal.
    pub fn str_input(&self, name: &str) -> Option<&str> {
        self.literal(name).and_then(json_str)
    }

    pub fn f64_input(&self, name: &str) -> Option<f64> {
        self.literal(name).and_then(json_f64)
    }

    pub fn u64_input(&self, name: &str) -> Option<u64> {
        self.literal(name).and_then(json_u64)
    }

    /// Links in input order.
    pub fn links(&self) -> impl Iterator<Item = (&str, &NodeLink)> {
        self.inputs
            .iter()
            .filter_map(|(name, value)| value.as_link().map(|link| (name.as_str(), link)))
    }

    /// SDXL indicator: a dedicated SDXL encoder or any class naming SDXL.
    pub fn is_sdxl_indicator(&self) -> bool {
        match &self.kind {
            NodeKind::ClipTextEncodeSdxl => true,
            NodeKind::Other(class_type) => class_type.to_ascii_uppercase().contains("SDXL"),
            _ => false,
        }
    }

    /// ComfyUI's `KSampler*` family by class name prefix.
    pub fn is_ksampler_family(&self) -> bool {
        self.class_type.starts_with(KSAMPLER_CLASS)
    }
}

/// Decoded node graph. Cycles are possible; traversals must guard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowGraph {
    nodes: IndexMap<NodeId, Node>,
}

impl WorkflowGraph {
    /// Decode a ComfyUI API-format graph.
    ///
    /// Only a non-object payload is an error. Individual nodes without a
    /// `class_type` are skipped; missing `inputs` become an empty map.
    pub fn from_json(json: &Value) -> Result<Self, CoreError> {
        let obj = json.as_object().ok_or_else(|| {
            CoreError::UnrecognizedGraph("Workflow JSON must be an object".to_string())
        })?;

        let known_ids: HashSet<&str> = obj.keys().map(String::as_str).collect();

        let mut decoded = Vec::with_capacity(obj.len());
        for (node_id, node_value) in obj {
            match decode_node(node_id, node_value, &known_ids) {
                Ok(node) => decoded.push(node),
                Err(e) => tracing::debug!(error = %e, "Skipping undecodable node"),
            }
        }

        decoded.sort_by(|a, b| node_id_sort_key(&a.id).cmp(&node_id_sort_key(&b.id)));

        Ok(Self {
            nodes: decoded.into_iter().map(|n| (n.id.clone(), n)).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.nodes.get_index_of(id)
    }

    pub fn node_at(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get_index(index).map(|(_, node)| node)
    }

    /// Nodes in arena order (ascending numeric id).
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn indexed_nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.nodes.values().enumerate()
    }

    /// First node (lowest id) satisfying `pred`.
    pub fn find(&self, pred: impl Fn(&Node) -> bool) -> Option<&Node> {
        self.nodes.values().find(|n| pred(n))
    }

    pub fn find_kind(&self, kind: &NodeKind) -> Option<&Node> {
        self.find(|n| &n.kind == kind)
    }

    pub fn contains_kind(&self, kind: &NodeKind) -> bool {
        self.find_kind(kind).is_some()
    }

    /// Target of a link. Dangling links resolve to `None`.
    pub fn follow(&self, link: &NodeLink) -> Option<(NodeIndex, &Node)> {
        self.nodes
            .get_full(link.source.as_str())
            .map(|(index, _, node)| (index, node))
    }

    /// Node linked from `node.inputs[name]`, one hop.
    pub fn linked_node(&self, node: &Node, name: &str) -> Option<&Node> {
        node.link(name)
            .and_then(|link| self.follow(link))
            .map(|(_, target)| target)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn decode_node(
    node_id: &str,
    node_value: &Value,
    known_ids: &HashSet<&str>,
) -> Result<Node, CoreError> {
    let class_type = node_value
        .get("class_type")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::InvalidNode {
            node_id: node_id.to_string(),
            reason: "missing required 'class_type' field".to_string(),
        })?
        .to_string();

    let inputs: IndexMap<String, InputValue> = node_value
        .get("inputs")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .map(|(name, value)| (name.clone(), decode_input(value, known_ids)))
                .collect()
        })
        .unwrap_or_default();

    Ok(Node {
        id: node_id.to_string(),
        kind: NodeKind::from_class_type(&class_type),
        class_type,
        inputs,
    })
}

/// ComfyUI encodes links as `[source_node_id, output_index]`. String ids are
/// always links; numeric ids only when the id exists, so literal pairs such
/// as `[512, 512]` stay literals.
fn decode_input(value: &Value, known_ids: &HashSet<&str>) -> InputValue {
    if let Some([source, slot]) = value.as_array().map(Vec::as_slice) {
        if let Some(output_index) = slot.as_u64().and_then(|n| u32::try_from(n).ok()) {
            let source_id = match source {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => n
                    .as_u64()
                    .map(|n| n.to_string())
                    .filter(|id| known_ids.contains(id.as_str())),
                _ => None,
            };
            if let Some(source) = source_id {
                return InputValue::Link(NodeLink {
                    source,
                    output_index,
                });
            }
        }
    }
    InputValue::Literal(value.clone())
}

/// Numeric ids sort numerically and before non-numeric ids.
fn node_id_sort_key(id: &str) -> (u8, u64, &str) {
    match id.parse::<u64>() {
        Ok(n) => (0, n, ""),
        Err(_) => (1, 0, id),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
