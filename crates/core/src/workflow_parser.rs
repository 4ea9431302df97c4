//! ComfyUI graph → [`ParameterRecord`].
//!
//! Decodes the graph, picks a dialect, lets the dialect extractor read the
//! anchor nodes, then resolves prompts and LoRAs from the graph structure.

use serde_json::Value;

use crate::config::ExtractorConfig;
use crate::dialects::{self, checkpoint, flux, Dialect};
use crate::graph::WorkflowGraph;
use crate::lora;
use crate::prompt_resolver::PromptResolver;
use crate::record::{GenerationSource, ParameterRecord};

/// Parse a graph with the default configuration.
pub fn parse(json: &Value) -> Option<ParameterRecord> {
    parse_with(json, &ExtractorConfig::default())
}

/// Parse a graph.
///
/// Returns `None` for a graph with no nodes. A value that is not a graph at
/// all yields a record with only `generation_source = UNKNOWN`.
pub fn parse_with(json: &Value, config: &ExtractorConfig) -> Option<ParameterRecord> {
    let graph = match WorkflowGraph::from_json(json) {
        Ok(graph) => graph,
        Err(e) => {
            tracing::debug!(error = %e, "Not a workflow graph");
            return Some(ParameterRecord::from_source(GenerationSource::Unknown));
        }
    };

    if graph.is_empty() {
        return None;
    }

    Some(parse_graph(&graph, json, config))
}

/// Extract parameters from an already decoded graph. `raw` is copied into
/// `raw_workflow` untouched.
pub fn parse_graph(graph: &WorkflowGraph, raw: &Value, config: &ExtractorConfig) -> ParameterRecord {
    let dialect = dialects::detect(graph);
    tracing::debug!(?dialect, nodes = graph.len(), "Detected workflow dialect");

    if dialect == Dialect::Unknown {
        let mut record = ParameterRecord::from_source(GenerationSource::Unknown);
        record.raw_workflow = Some(raw.clone());
        return record;
    }

    let mut record = ParameterRecord::from_source(GenerationSource::Comfyui);
    record.workflow_type = dialect.workflow_type();

    let sampler = match dialect {
        Dialect::Flux => flux::extract(graph, &mut record),
        Dialect::Sdxl => checkpoint::extract(graph, &mut record, false),
        Dialect::Standard => checkpoint::extract(graph, &mut record, true),
        Dialect::Unknown => None,
    };

    dialects::read_latent_size(graph, &mut record);

    let config = config.sanitized();
    let prompts = PromptResolver::new(graph, &config).resolve_prompts(sampler);
    record.prompt = prompts.prompt;
    record.negative_prompt = prompts.negative_prompt;

    record.loras = lora::extract_from_graph(graph);
    record.raw_workflow = Some(raw.clone());

    record
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
