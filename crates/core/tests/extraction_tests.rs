//! End-to-end extraction through the public API.
//!
//! Each test builds the metadata map an image decoder would hand over and
//! checks the resulting [`ParameterRecord`].

use std::collections::HashMap;

use assert_matches::assert_matches;
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genmeta_core::{
    extract_parameters, sniff, text_params, workflow_parser, GenerationSource, LoraReference,
    MetadataValue, ParserTarget, WorkflowType,
};

/// Route degrade-path logs to the test output. Set `RUST_LOG=genmeta_core=debug`
/// to see them.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

fn text_metadata(key: &str, text: &str) -> HashMap<String, MetadataValue> {
    HashMap::from([(key.to_string(), MetadataValue::from(text))])
}

fn graph_metadata(graph: Value) -> HashMap<String, MetadataValue> {
    HashMap::from([("prompt".to_string(), MetadataValue::from(graph))])
}

// ---------------------------------------------------------------------------
// SD-WebUI text
// ---------------------------------------------------------------------------

#[test]
fn webui_text_block() {
    let meta = text_metadata(
        "parameters",
        "masterpiece, best quality\nNegative prompt: blurry\nSteps: 20, Sampler: Euler a, \
         CFG scale: 7.5, Seed: 12345, Model: realisticVision_v5.safetensors",
    );

    let record = extract_parameters(&meta).expect("text metadata should parse");

    assert_eq!(record.prompt.as_deref(), Some("masterpiece, best quality"));
    assert_eq!(record.negative_prompt.as_deref(), Some("blurry"));
    assert_eq!(record.steps, Some(20));
    assert_eq!(record.sampler.as_deref(), Some("Euler a"));
    assert_eq!(record.cfg_scale, Some(7.5));
    assert_eq!(record.seed, Some(12345));
    assert_eq!(
        record.model.as_deref(),
        Some("realisticVision_v5.safetensors")
    );
    assert_eq!(record.generation_source, GenerationSource::SdWebui);
    assert_eq!(record.workflow_type, WorkflowType::None);
}

#[test]
fn inline_lora_tag_in_text() {
    let meta = text_metadata(
        "parameters",
        "portrait of a knight <lora:detailTweaker:0.6>\nSteps: 25, Seed: 1",
    );

    let record = extract_parameters(&meta).unwrap();
    assert_eq!(
        record.loras,
        vec![LoraReference::named("detailTweaker").with_weight(0.6)]
    );
}

#[test]
fn steps_always_recovered_from_text() {
    for steps in [1u32, 20, 150, 4096] {
        let raw = format!("a prompt\nSteps: {steps}, Sampler: DPM++ 2M");
        let record = text_params::parse(&raw).unwrap();
        assert_eq!(record.steps, Some(steps));
    }
}

#[test]
fn exif_user_comment_is_read() {
    let meta = text_metadata("0x9286", "a fox in snow\nSteps: 12, CFG scale: 4");
    let record = extract_parameters(&meta).unwrap();
    assert_eq!(record.prompt.as_deref(), Some("a fox in snow"));
    assert_eq!(record.cfg_scale, Some(4.0));
}

// ---------------------------------------------------------------------------
// ComfyUI graphs
// ---------------------------------------------------------------------------

#[test]
fn standard_graph() {
    let graph = json!({
        "1": { "class_type": "CLIPTextEncode", "inputs": { "text": "a cat" } },
        "2": {
            "class_type": "KSampler",
            "inputs": {
                "positive": ["1", 0], "negative": ["1", 0],
                "steps": 30, "cfg": 6, "seed": 99, "sampler_name": "dpmpp_2m"
            }
        },
        "3": { "class_type": "CheckpointLoaderSimple", "inputs": { "ckpt_name": "sd15.ckpt" } }
    });

    let record = extract_parameters(&graph_metadata(graph.clone())).unwrap();

    assert_eq!(record.generation_source, GenerationSource::Comfyui);
    assert_eq!(record.workflow_type, WorkflowType::Standard);
    assert_eq!(record.prompt.as_deref(), Some("a cat"));
    assert_eq!(record.steps, Some(30));
    assert_eq!(record.cfg_scale, Some(6.0));
    assert_eq!(record.seed, Some(99));
    assert_eq!(record.sampler.as_deref(), Some("dpmpp_2m"));
    assert_eq!(record.model.as_deref(), Some("sd15.ckpt"));
    assert_eq!(record.raw_workflow, Some(graph));
}

#[test]
fn flux_graph_with_decomposed_sampler() {
    init_tracing();

    let graph = json!({
        "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "neon city at night", "clip": ["11", 0] } },
        "10": { "class_type": "UNETLoader", "inputs": { "unet_name": "flux1-dev.safetensors", "weight_dtype": "default" } },
        "11": { "class_type": "DualCLIPLoader", "inputs": { "clip_name1": "t5xxl_fp8.safetensors", "clip_name2": "clip_l.safetensors", "type": "flux" } },
        "13": {
            "class_type": "SamplerCustomAdvanced",
            "inputs": { "noise": ["25", 0], "guider": ["22", 0], "sampler": ["16", 0], "sigmas": ["17", 0], "latent_image": ["27", 0] }
        },
        "16": { "class_type": "KSamplerSelect", "inputs": { "sampler_name": "euler" } },
        "17": { "class_type": "BasicScheduler", "inputs": { "scheduler": "beta", "steps": 28, "denoise": 1, "model": ["10", 0] } },
        "22": { "class_type": "BasicGuider", "inputs": { "model": ["10", 0], "conditioning": ["26", 0] } },
        "25": { "class_type": "RandomNoise", "inputs": { "noise_seed": 884422 } },
        "26": { "class_type": "FluxGuidance", "inputs": { "guidance": 3.5, "conditioning": ["6", 0] } },
        "27": { "class_type": "EmptySD3LatentImage", "inputs": { "width": 896, "height": 1152, "batch_size": 1 } },
        "30": { "class_type": "LoraLoaderModelOnly", "inputs": { "lora_name": "flux_realism.safetensors", "strength_model": 0.8, "model": ["10", 0] } }
    });

    let record = extract_parameters(&graph_metadata(graph)).unwrap();

    assert_eq!(record.workflow_type, WorkflowType::Flux);
    assert_eq!(record.prompt.as_deref(), Some("neon city at night"));
    assert_eq!(record.negative_prompt, None);
    assert_eq!(record.model.as_deref(), Some("flux1-dev.safetensors"));
    assert_eq!(
        record.clip.as_deref(),
        Some("t5xxl_fp8.safetensors + clip_l.safetensors")
    );
    assert_eq!(record.sampler.as_deref(), Some("euler"));
    assert_eq!(record.scheduler.as_deref(), Some("beta"));
    assert_eq!(record.steps, Some(28));
    assert_eq!(record.seed, Some(884422));
    assert_eq!(record.guidance, Some(3.5));
    assert_eq!((record.width, record.height), (Some(896), Some(1152)));
    assert_eq!(
        record.loras,
        vec![LoraReference::named("flux_realism.safetensors").with_weight(0.8)]
    );
}

#[test]
fn unet_loader_wins_over_checkpoint_decoy() {
    let graph = json!({
        "1": { "class_type": "CheckpointLoaderSimple", "inputs": { "ckpt_name": "sd_xl_base.safetensors" } },
        "2": { "class_type": "CLIPTextEncodeSDXL", "inputs": { "text_g": "x", "text_l": "x" } },
        "3": { "class_type": "UNETLoader", "inputs": { "unet_name": "flux1-schnell.safetensors" } },
        "4": { "class_type": "KSampler", "inputs": { "steps": 4, "cfg": 1 } }
    });

    let record = workflow_parser::parse(&graph).unwrap();
    assert_eq!(record.workflow_type, WorkflowType::Flux);
    assert_eq!(record.model.as_deref(), Some("flux1-schnell.safetensors"));
}

#[test]
fn single_encoder_found_despite_decoys() {
    let graph = json!({
        "1": { "class_type": "CLIPTextEncode", "inputs": { "text": "the only prompt", "clip": ["4", 1] } },
        "2": { "class_type": "KSampler", "inputs": { "positive": ["9", 0], "steps": 8 } },
        "3": { "class_type": "ConditioningZeroOut", "inputs": { "conditioning": ["5", 0] } },
        "4": { "class_type": "CheckpointLoaderSimple", "inputs": { "ckpt_name": "model.safetensors" } },
        "5": { "class_type": "PreviewImage", "inputs": { "images": ["3", 0] } }
    });

    let record = workflow_parser::parse(&graph).unwrap();
    assert_eq!(record.prompt.as_deref(), Some("the only prompt"));
}

#[test]
fn text_link_cycle_leaves_prompt_unset() {
    init_tracing();

    let graph = json!({
        "1": { "class_type": "StringFunction|pysssss", "inputs": { "text_a": ["2", 0] } },
        "2": { "class_type": "StringFunction|pysssss", "inputs": { "text_a": ["1", 0] } },
        "3": { "class_type": "KSampler", "inputs": { "positive": ["1", 0], "steps": 20, "seed": 3 } }
    });

    let record = workflow_parser::parse(&graph).unwrap();
    assert_eq!(record.prompt, None);
    assert_eq!(record.steps, Some(20));
    assert_eq!(record.seed, Some(3));
}

#[test]
fn graph_parse_is_idempotent() {
    let graph = json!({
        "4": { "class_type": "CheckpointLoaderSimple", "inputs": { "ckpt_name": "dreamshaperXL.safetensors" } },
        "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "a red fox", "clip": ["4", 1] } },
        "7": { "class_type": "CLIPTextEncode", "inputs": { "text": "blurry, low quality", "clip": ["4", 1] } },
        "3": {
            "class_type": "KSampler",
            "inputs": { "model": ["4", 0], "positive": ["6", 0], "negative": ["7", 0], "seed": 5, "steps": 30, "cfg": 7 }
        }
    });

    let first = workflow_parser::parse(&graph);
    let second = workflow_parser::parse(&graph);
    assert!(first.is_some());
    assert_eq!(first, second);

    let record = first.unwrap();
    assert_eq!(record.workflow_type, WorkflowType::Sdxl);
    assert_eq!(record.negative_prompt.as_deref(), Some("blurry, low quality"));
}

// ---------------------------------------------------------------------------
// Routing and degraded input
// ---------------------------------------------------------------------------

#[test]
fn empty_inputs_yield_none() {
    assert_eq!(text_params::parse("   \n\t "), None);
    assert_eq!(workflow_parser::parse(&json!({})), None);
    assert_eq!(extract_parameters(&text_metadata("parameters", "  ")), None);
    assert_eq!(extract_parameters(&HashMap::new()), None);
}

#[test]
fn malformed_json_payload_is_parsed_as_text() {
    init_tracing();

    let meta = text_metadata("workflow", "{\"1\": {\"class_type\": truncated");
    assert_matches!(sniff(&meta), ParserTarget::Text(_));

    let record = extract_parameters(&meta).unwrap();
    assert_eq!(record.generation_source, GenerationSource::Unknown);
    assert!(record.prompt.is_some());
}

#[test]
fn generic_json_payload() {
    let meta = HashMap::from([(
        "Comment".to_string(),
        MetadataValue::from(
            r#"{"prompt": "watercolor harbor", "uc": "text, watermark", "steps": 28, "scale": 5, "seed": 42, "sampler": "k_euler"}"#,
        ),
    )]);

    let record = extract_parameters(&meta).unwrap();
    assert_eq!(record.prompt.as_deref(), Some("watercolor harbor"));
    assert_eq!(record.negative_prompt.as_deref(), Some("text, watermark"));
    assert_eq!(record.cfg_scale, Some(5.0));
    assert_eq!(record.generation_source, GenerationSource::Unknown);
    assert_eq!(record.workflow_type, WorkflowType::None);
}

#[test]
fn record_serializes_with_screaming_enums() {
    let record = text_params::parse("a cat\nSteps: 20").unwrap();
    let json = serde_json::to_value(&record).expect("serialization should succeed");
    assert_eq!(json["generation_source"], "SD_WEBUI");
    assert_eq!(json["workflow_type"], "NONE");
    assert_eq!(json["steps"], 20);
    assert!(json.get("raw_workflow").is_none());
}
