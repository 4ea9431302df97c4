//! Flux graphs: a UNET loader with a dual CLIP loader, sampled either by a
//! classic `KSampler` or by the decomposed `SamplerCustomAdvanced` chain
//! (`KSamplerSelect` + `RandomNoise` + `BasicScheduler` + guider).

use crate::graph::{Node, NodeKind, WorkflowGraph};
use crate::record::ParameterRecord;

use super::{read_classic_sampler, read_vae, scalar_f64, scalar_string, scalar_u32, scalar_u64};

/// Separator between the two encoder names of a `DualCLIPLoader`.
pub const CLIP_NAME_SEPARATOR: &str = " + ";

/// Fill `record` from Flux anchor nodes and return the primary sampler.
pub fn extract<'g>(graph: &'g WorkflowGraph, record: &mut ParameterRecord) -> Option<&'g Node> {
    record.model = graph
        .find_kind(&NodeKind::UnetLoader)
        .and_then(|n| n.str_input("unet_name"))
        .or_else(|| {
            graph
                .find_kind(&NodeKind::CheckpointLoader)
                .and_then(|n| n.str_input("ckpt_name"))
        })
        .map(str::to_string);

    record.clip = graph.find_kind(&NodeKind::DualClipLoader).and_then(|n| {
        let names: Vec<&str> = ["clip_name1", "clip_name2"]
            .iter()
            .filter_map(|key| n.str_input(key))
            .collect();
        (!names.is_empty()).then(|| names.join(CLIP_NAME_SEPARATOR))
    });

    read_vae(graph, record);

    let sampler = graph.find(|n| n.kind.is_sampler());
    match sampler.map(|s| (s, &s.kind)) {
        Some((s, NodeKind::KSampler | NodeKind::KSamplerAdvanced)) => {
            read_classic_sampler(graph, s, record);
        }
        Some((s, NodeKind::SamplerCustomAdvanced)) => read_custom_sampler(graph, s, record),
        Some((s, _)) => {
            tracing::debug!(node_id = %s.id, class_type = %s.class_type, "Unhandled Flux sampler");
        }
        None => {
            tracing::debug!("Flux graph without a sampler node");
        }
    }

    record.guidance = graph
        .find_kind(&NodeKind::FluxGuidance)
        .and_then(|n| scalar_f64(graph, n, "guidance"))
        .or_else(|| {
            sampler.and_then(|s| {
                scalar_f64(graph, s, "cfg").or_else(|| scalar_f64(graph, s, "guidance"))
            })
        });

    sampler
}

/// Decomposed sampling chain. Each component is found through the
/// sampler's own input first, then by the first node of its type.
fn read_custom_sampler(graph: &WorkflowGraph, sampler: &Node, record: &mut ParameterRecord) {
    let select = component(graph, sampler, "sampler", NodeKind::KSamplerSelect);
    record.sampler = select
        .and_then(|n| scalar_string(graph, n, "sampler_name"))
        .or_else(|| scalar_string(graph, sampler, "sampler_name"));

    if let Some(noise) = component(graph, sampler, "noise", NodeKind::RandomNoise) {
        record.seed =
            scalar_u64(graph, noise, "noise_seed").or_else(|| scalar_u64(graph, noise, "seed"));
    }

    if let Some(scheduler) = component(graph, sampler, "sigmas", NodeKind::BasicScheduler) {
        record.steps = scalar_u32(graph, scheduler, "steps");
        record.scheduler = scalar_string(graph, scheduler, "scheduler");
        record.denoise = scalar_f64(graph, scheduler, "denoise");
    }

    if let Some(guider) = component(graph, sampler, "guider", NodeKind::Guider) {
        record.cfg_scale = scalar_f64(graph, guider, "cfg");
    }
}

fn component<'g>(
    graph: &'g WorkflowGraph,
    sampler: &Node,
    input: &str,
    kind: NodeKind,
) -> Option<&'g Node> {
    graph
        .linked_node(sampler, input)
        .filter(|n| n.kind == kind)
        .or_else(|| graph.find_kind(&kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph(json: serde_json::Value) -> WorkflowGraph {
        WorkflowGraph::from_json(&json).unwrap()
    }

    #[test]
    fn decomposed_sampler_chain() {
        let g = graph(json!({
            "10": { "class_type": "UNETLoader", "inputs": { "unet_name": "flux1-dev.safetensors" } },
            "11": { "class_type": "DualCLIPLoader", "inputs": { "clip_name1": "t5xxl_fp16.safetensors", "clip_name2": "clip_l.safetensors", "type": "flux" } },
            "12": { "class_type": "VAELoader", "inputs": { "vae_name": "ae.safetensors" } },
            "16": { "class_type": "KSamplerSelect", "inputs": { "sampler_name": "euler" } },
            "17": { "class_type": "BasicScheduler", "inputs": { "scheduler": "simple", "steps": 20, "denoise": 1.0, "model": ["10", 0] } },
            "25": { "class_type": "RandomNoise", "inputs": { "noise_seed": 123456, "seed": 1 } },
            "26": { "class_type": "FluxGuidance", "inputs": { "guidance": 3.5, "conditioning": ["6", 0] } },
            "22": { "class_type": "BasicGuider", "inputs": { "model": ["10", 0], "conditioning": ["26", 0] } },
            "13": {
                "class_type": "SamplerCustomAdvanced",
                "inputs": { "noise": ["25", 0], "guider": ["22", 0], "sampler": ["16", 0], "sigmas": ["17", 0] }
            }
        }));

        let mut record = ParameterRecord::default();
        let sampler = extract(&g, &mut record).unwrap();

        assert_eq!(sampler.id, "13");
        assert_eq!(record.model.as_deref(), Some("flux1-dev.safetensors"));
        assert_eq!(
            record.clip.as_deref(),
            Some("t5xxl_fp16.safetensors + clip_l.safetensors")
        );
        assert_eq!(record.vae.as_deref(), Some("ae.safetensors"));
        assert_eq!(record.sampler.as_deref(), Some("euler"));
        assert_eq!(record.scheduler.as_deref(), Some("simple"));
        assert_eq!(record.steps, Some(20));
        assert_eq!(record.seed, Some(123456));
        assert_eq!(record.guidance, Some(3.5));
        assert_eq!(record.cfg_scale, None);
    }

    #[test]
    fn classic_sampler_guidance_falls_back_to_cfg() {
        let g = graph(json!({
            "1": { "class_type": "UNETLoader", "inputs": { "unet_name": "flux1-schnell.safetensors" } },
            "2": { "class_type": "KSampler", "inputs": { "cfg": 1.0, "steps": 4, "seed": 5, "sampler_name": "euler", "scheduler": "simple" } }
        }));

        let mut record = ParameterRecord::default();
        extract(&g, &mut record);

        assert_eq!(record.guidance, Some(1.0));
        assert_eq!(record.cfg_scale, Some(1.0));
        assert_eq!(record.steps, Some(4));
        assert_eq!(record.seed, Some(5));
    }

    #[test]
    fn single_clip_name_without_separator() {
        let g = graph(json!({
            "1": { "class_type": "DualCLIPLoader", "inputs": { "clip_name1": "t5xxl.safetensors", "clip_name2": ["9", 0] } }
        }));

        let mut record = ParameterRecord::default();
        assert!(extract(&g, &mut record).is_none());
        assert_eq!(record.clip.as_deref(), Some("t5xxl.safetensors"));
    }
}
