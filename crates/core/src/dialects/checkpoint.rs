//! SDXL and standard (SD1.x/2.x) graphs: a checkpoint loader feeding a
//! classic `KSampler`.

use crate::graph::{Node, NodeKind, WorkflowGraph};
use crate::record::ParameterRecord;

use super::{read_classic_sampler, read_vae, scalar_string};

/// Input names that carry a model filename on a loader node.
const MODEL_NAME_INPUTS: &[&str] = &["ckpt_name", "unet_name", "model_name"];

/// Fill `record` from the checkpoint loader and the first sampler, and
/// return the sampler for prompt resolution.
///
/// With `model_hop` set, a graph whose loader is not a recognized checkpoint
/// node still gets a model name by following the sampler's `model` input
/// one hop.
pub fn extract<'g>(
    graph: &'g WorkflowGraph,
    record: &mut ParameterRecord,
    model_hop: bool,
) -> Option<&'g Node> {
    record.model = graph
        .find_kind(&NodeKind::CheckpointLoader)
        .and_then(|n| n.str_input("ckpt_name"))
        .map(str::to_string);

    read_vae(graph, record);

    let sampler = graph
        .find(|n| n.kind.is_classic_sampler())
        .or_else(|| graph.find(|n| n.kind.is_sampler()));
    let Some(sampler) = sampler else {
        tracing::debug!("Checkpoint graph without a sampler node");
        return None;
    };

    read_classic_sampler(graph, sampler, record);

    if record.model.is_none() && model_hop {
        record.model = graph.linked_node(sampler, "model").and_then(|loader| {
            MODEL_NAME_INPUTS
                .iter()
                .find_map(|key| scalar_string(graph, loader, key))
        });
    }

    Some(sampler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_checkpoint_and_sampler() {
        let graph = WorkflowGraph::from_json(&json!({
            "3": { "class_type": "CheckpointLoaderSimple", "inputs": { "ckpt_name": "sd15.ckpt" } },
            "4": { "class_type": "VAELoader", "inputs": { "vae_name": "vae-ft-mse.pt" } },
            "2": {
                "class_type": "KSampler",
                "inputs": {
                    "model": ["3", 0], "steps": 30, "cfg": 6, "seed": 99,
                    "sampler_name": "dpmpp_2m", "scheduler": "karras", "denoise": 1.0
                }
            }
        }))
        .unwrap();

        let mut record = ParameterRecord::default();
        let sampler = extract(&graph, &mut record, true).unwrap();

        assert_eq!(sampler.id, "2");
        assert_eq!(record.model.as_deref(), Some("sd15.ckpt"));
        assert_eq!(record.vae.as_deref(), Some("vae-ft-mse.pt"));
        assert_eq!(record.steps, Some(30));
        assert_eq!(record.cfg_scale, Some(6.0));
        assert_eq!(record.seed, Some(99));
        assert_eq!(record.sampler.as_deref(), Some("dpmpp_2m"));
        assert_eq!(record.scheduler.as_deref(), Some("karras"));
        assert_eq!(record.denoise, Some(1.0));
    }

    #[test]
    fn model_hop_through_sampler_input() {
        let graph = WorkflowGraph::from_json(&json!({
            "1": { "class_type": "ImageOnlyCheckpointLoader", "inputs": { "ckpt_name": "svd.safetensors" } },
            "2": { "class_type": "KSampler", "inputs": { "model": ["1", 0], "steps": 20 } }
        }))
        .unwrap();

        let mut record = ParameterRecord::default();
        extract(&graph, &mut record, true);
        assert_eq!(record.model.as_deref(), Some("svd.safetensors"));

        let mut without_hop = ParameterRecord::default();
        extract(&graph, &mut without_hop, false);
        assert_eq!(without_hop.model, None);
    }

    #[test]
    fn no_sampler_keeps_loader_fields() {
        let graph = WorkflowGraph::from_json(&json!({
            "1": { "class_type": "CheckpointLoaderSimple", "inputs": { "ckpt_name": "base.ckpt" } }
        }))
        .unwrap();

        let mut record = ParameterRecord::default();
        assert!(extract(&graph, &mut record, true).is_none());
        assert_eq!(record.model.as_deref(), Some("base.ckpt"));
        assert_eq!(record.steps, None);
    }
}
