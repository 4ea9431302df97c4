//! Generation-parameter extraction for AI-generated images.
//!
//! Takes the raw metadata map decoded from a PNG/JPEG (text chunks, EXIF
//! comments) and recovers prompt, sampler, seed, model and LoRA information
//! from either SD-WebUI parameter text or a ComfyUI node graph. Pure and
//! synchronous: no I/O, no global state beyond compiled regexes, and no
//! error ever escapes to the caller. Malformed input degrades to a partial
//! [`ParameterRecord`] or `None`.

pub mod config;
pub mod dialects;
pub mod error;
pub mod generic_json;
pub mod graph;
pub mod lora;
pub mod prompt_resolver;
pub mod record;
pub mod sniffer;
pub mod text_params;
pub mod types;
pub mod value;
pub mod workflow_parser;

pub use config::ExtractorConfig;
pub use error::CoreError;
pub use record::{GenerationSource, LoraReference, ParameterRecord, WorkflowType};
pub use sniffer::{
    extract_parameters, extract_parameters_with, sniff, sniff_candidates, MetadataValue,
    ParserTarget,
};
