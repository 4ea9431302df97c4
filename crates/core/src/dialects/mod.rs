//! ComfyUI graph dialect detection and shared anchor-node readers.
//!
//! Scalar parameters live inline on a handful of anchor nodes (loaders,
//! samplers, schedulers), so dialect extractors read them directly instead of
//! walking the graph. A scalar that is itself a link (a seed driven by a
//! primitive node, a sampler name chosen by `KSamplerSelect`) is resolved
//! one hop.

pub mod checkpoint;
pub mod flux;

use serde_json::Value;

use crate::graph::{InputValue, Node, NodeKind, WorkflowGraph};
use crate::record::{ParameterRecord, WorkflowType};
use crate::value::{json_f64, json_str, json_u32, json_u64};

/// Keys checked on the far side of a one-hop scalar link, after the
/// original key name.
const LINKED_SCALAR_KEYS: &[&str] = &["value", "seed", "noise_seed", "int", "float", "string"];

/// Graph architecture, decided from characteristic node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Flux,
    Sdxl,
    Standard,
    Unknown,
}

impl Dialect {
    pub fn workflow_type(self) -> WorkflowType {
        match self {
            Dialect::Flux => WorkflowType::Flux,
            Dialect::Sdxl => WorkflowType::Sdxl,
            Dialect::Standard => WorkflowType::Standard,
            Dialect::Unknown => WorkflowType::None,
        }
    }
}

/// Classify a graph.
///
/// Flux markers win over everything else, so a stray checkpoint loader does
/// not demote a Flux graph. SDXL needs a checkpoint loader plus either an
/// SDXL-specific node or an "xl" checkpoint filename. `CheckpointLoader` and
/// `CheckpointLoaderSimple` both count as checkpoint loaders.
pub fn detect(graph: &WorkflowGraph) -> Dialect {
    let is_flux = graph.nodes().any(|n| {
        matches!(
            n.kind,
            NodeKind::UnetLoader | NodeKind::DualClipLoader | NodeKind::FluxGuidance
        )
    });
    if is_flux {
        return Dialect::Flux;
    }

    if graph.contains_kind(&NodeKind::CheckpointLoader) {
        let xl_checkpoint = graph
            .nodes()
            .filter(|n| n.kind == NodeKind::CheckpointLoader)
            .filter_map(|n| n.str_input("ckpt_name"))
            .any(|name| name.to_lowercase().contains("xl"));
        if xl_checkpoint || graph.nodes().any(Node::is_sdxl_indicator) {
            return Dialect::Sdxl;
        }
        return Dialect::Standard;
    }

    if graph.nodes().any(Node::is_ksampler_family) {
        return Dialect::Standard;
    }

    Dialect::Unknown
}

// ---------------------------------------------------------------------------
// Shared readers
// ---------------------------------------------------------------------------

/// Read `key` off `node`, following a link one hop if needed.
pub(crate) fn scalar<T>(
    graph: &WorkflowGraph,
    node: &Node,
    key: &str,
    read: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    match node.input(key)? {
        InputValue::Literal(value) => read(value),
        InputValue::Link(link) => {
            let (_, source) = graph.follow(link)?;
            std::iter::once(key)
                .chain(LINKED_SCALAR_KEYS.iter().copied())
                .find_map(|k| source.literal(k).and_then(&read))
        }
    }
}

pub(crate) fn scalar_string(graph: &WorkflowGraph, node: &Node, key: &str) -> Option<String> {
    scalar(graph, node, key, |v| json_str(v).map(str::to_string))
}

pub(crate) fn scalar_f64(graph: &WorkflowGraph, node: &Node, key: &str) -> Option<f64> {
    scalar(graph, node, key, json_f64)
}

pub(crate) fn scalar_u64(graph: &WorkflowGraph, node: &Node, key: &str) -> Option<u64> {
    scalar(graph, node, key, json_u64)
}

pub(crate) fn scalar_u32(graph: &WorkflowGraph, node: &Node, key: &str) -> Option<u32> {
    scalar(graph, node, key, json_u32)
}

/// Steps, cfg, sampler, scheduler, seed and denoise off a classic
/// `KSampler`/`KSamplerAdvanced`. Only unset fields are filled.
pub(crate) fn read_classic_sampler(
    graph: &WorkflowGraph,
    sampler: &Node,
    record: &mut ParameterRecord,
) {
    record.steps = record.steps.or_else(|| scalar_u32(graph, sampler, "steps"));
    record.cfg_scale = record.cfg_scale.or_else(|| scalar_f64(graph, sampler, "cfg"));
    record.seed = record.seed.or_else(|| {
        scalar_u64(graph, sampler, "seed").or_else(|| scalar_u64(graph, sampler, "noise_seed"))
    });
    record.denoise = record.denoise.or_else(|| scalar_f64(graph, sampler, "denoise"));
    if record.sampler.is_none() {
        record.sampler = scalar_string(graph, sampler, "sampler_name");
    }
    if record.scheduler.is_none() {
        record.scheduler = scalar_string(graph, sampler, "scheduler");
    }
}

/// `VAELoader.vae_name`, shared by every dialect.
pub(crate) fn read_vae(graph: &WorkflowGraph, record: &mut ParameterRecord) {
    if record.vae.is_none() {
        record.vae = graph
            .find_kind(&NodeKind::VaeLoader)
            .and_then(|n| n.str_input("vae_name"))
            .map(str::to_string);
    }
}

/// Output size from the first `Empty*LatentImage` node.
pub(crate) fn read_latent_size(graph: &WorkflowGraph, record: &mut ParameterRecord) {
    let Some(latent) = graph.find(|n| {
        n.class_type.starts_with("Empty") && n.class_type.ends_with("LatentImage")
    }) else {
        return;
    };
    record.width = record.width.or_else(|| scalar_u32(graph, latent, "width"));
    record.height = record.height.or_else(|| scalar_u32(graph, latent, "height"));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
