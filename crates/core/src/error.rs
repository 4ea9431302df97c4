use crate::types::NodeId;

/// Internal failure taxonomy for the extraction engine.
///
/// None of these escape the public entry points: callers of
/// [`crate::extract_parameters`] always receive a (possibly partial) record
/// or `None`. The variants exist so the degrade paths are explicit and
/// loggable.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Malformed JSON payload: {0}")]
    MalformedJson(String),

    #[error("Unrecognized workflow graph: {0}")]
    UnrecognizedGraph(String),

    #[error("Invalid node {node_id}: {reason}")]
    InvalidNode { node_id: NodeId, reason: String },

    #[error("Validation failed: {0}")]
    Validation(String),
}
