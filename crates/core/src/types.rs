/// ComfyUI node ids are the string keys of the graph object (`"3"`, `"12"`).
pub type NodeId = String;

/// Position of a node inside a [`crate::graph::WorkflowGraph`] arena.
pub type NodeIndex = usize;
