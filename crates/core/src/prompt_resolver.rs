//! Upstream prompt recovery over a workflow graph.
//!
//! Prompt text is never stored on the sampler itself: the sampler's
//! `positive`/`negative` inputs link to conditioning nodes, which may link to
//! translators, string functions, or other pass-through nodes before reaching
//! a literal `text`. The walk is an explicit loop over arena indices with an
//! owned visited set, so malformed graphs with cycles terminate.
//!
//! Entry strategies, first non-empty result wins:
//!
//! 1. the sampler's own `positive`/`negative` inputs
//! 2. a guider node one hop from the sampler (Flux `SamplerCustomAdvanced`)
//! 3. the only `CLIPTextEncode` node in the graph
//! 4. keyword classification of every `CLIPTextEncode` node (best effort)
//! 5. any node with a literal `text` input

use std::collections::HashSet;

use serde_json::Value;

use crate::config::ExtractorConfig;
use crate::graph::{InputValue, Node, NodeKind, NodeLink, WorkflowGraph};
use crate::types::NodeIndex;

/// Text fields on encoder nodes, in lookup order.
const ENCODER_TEXT_FIELDS: &[&str] = &["text", "text_g", "text_l"];

/// Text fields on translator / string-function nodes, in lookup order.
const PASS_THROUGH_TEXT_FIELDS: &[&str] = &["text", "input", "string", "prompt", "text_a"];

/// Inputs worth following first when hopping through an unknown node.
const PREFERRED_HOP_INPUTS: &[&str] = &["conditioning", "text", "string", "input", "prompt"];

/// Inputs that lead to model loaders rather than text.
const NON_TEXT_INPUTS: &[&str] = &["clip", "model", "vae", "control_net", "image", "mask"];

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

/// Which conditioning branch a walk follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    fn input_name(self) -> &'static str {
        match self {
            Polarity::Positive => "positive",
            Polarity::Negative => "negative",
        }
    }
}

/// Prompt pair recovered from a graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedPrompts {
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
}

impl ResolvedPrompts {
    fn is_empty(&self) -> bool {
        self.prompt.is_none() && self.negative_prompt.is_none()
    }
}

/// Outcome of inspecting one node during a walk.
enum Step<'g> {
    Found(String),
    Hop(&'g NodeLink),
    DeadEnd,
}

/// Resolves prompt text by walking links upstream.
pub struct PromptResolver<'g> {
    graph: &'g WorkflowGraph,
    config: &'g ExtractorConfig,
}

impl<'g> PromptResolver<'g> {
    pub fn new(graph: &'g WorkflowGraph, config: &'g ExtractorConfig) -> Self {
        Self { graph, config }
    }

    /// Follow `start` upstream until a literal text is found.
    ///
    /// Returns `None` on a dangling link, a dead end, a revisited node, or
    /// when the hop limit is reached.
    pub fn resolve(&self, start: &NodeLink) -> Option<String> {
        self.walk_link(start, None)
    }

    /// Recover prompt and negative prompt, trying each entry strategy in
    /// order. `sampler` is the dialect's primary sampler node, if any.
    pub fn resolve_prompts(&self, sampler: Option<&Node>) -> ResolvedPrompts {
        if let Some(sampler) = sampler {
            let found = self.from_conditioning_inputs(sampler);
            if !found.is_empty() {
                tracing::debug!(node_id = %sampler.id, "Prompts resolved from sampler inputs");
                return found;
            }
        }

        let guider = sampler
            .and_then(|s| self.graph.linked_node(s, "guider"))
            .or_else(|| self.graph.find_kind(&NodeKind::Guider));
        if let Some(guider) = guider {
            let found = self.from_conditioning_inputs(guider);
            if !found.is_empty() {
                tracing::debug!(node_id = %guider.id, "Prompts resolved from guider inputs");
                return found;
            }
        }

        let encoders: Vec<NodeIndex> = self
            .graph
            .indexed_nodes()
            .filter(|(_, n)| n.kind == NodeKind::ClipTextEncode)
            .map(|(i, _)| i)
            .collect();

        let found = match encoders.as_slice() {
            [] => ResolvedPrompts::default(),
            [only] => ResolvedPrompts {
                prompt: self.walk_from(*only, None).filter(|t| !t.is_empty()),
                negative_prompt: None,
            },
            many => self.classify_encoders(many),
        };
        if !found.is_empty() {
            tracing::debug!(encoders = encoders.len(), "Prompts resolved from text encoders");
            return found;
        }

        ResolvedPrompts {
            prompt: self
                .graph
                .nodes()
                .find_map(|n| n.str_input("text"))
                .map(str::to_string),
            negative_prompt: None,
        }
    }

    // -- entry strategies ------------------------------------------------------

    /// `positive`/`negative` inputs; a `BasicGuider` only has `conditioning`.
    fn from_conditioning_inputs(&self, node: &Node) -> ResolvedPrompts {
        let positive = node.link("positive").or_else(|| node.link("conditioning"));
        ResolvedPrompts {
            prompt: positive
                .and_then(|link| self.walk_link(link, Some(Polarity::Positive)))
                .filter(|t| !t.is_empty()),
            negative_prompt: node
                .link("negative")
                .and_then(|link| self.walk_link(link, Some(Polarity::Negative)))
                .filter(|t| !t.is_empty()),
        }
    }

    /// First encoder text per polarity, classified by negative keywords.
    fn classify_encoders(&self, encoders: &[NodeIndex]) -> ResolvedPrompts {
        let mut found = ResolvedPrompts::default();
        for &index in encoders {
            let Some(text) = self.walk_from(index, None).filter(|t| !t.is_empty()) else {
                continue;
            };
            let slot = if self.config.is_negative_text(&text) {
                &mut found.negative_prompt
            } else {
                &mut found.prompt
            };
            if slot.is_none() {
                *slot = Some(text);
            }
            if found.prompt.is_some() && found.negative_prompt.is_some() {
                break;
            }
        }
        found
    }

    // -- walk ------------------------------------------------------------------

    fn walk_link(&self, start: &NodeLink, role: Option<Polarity>) -> Option<String> {
        match self.graph.follow(start) {
            Some((index, _)) => self.walk_from(index, role),
            None => {
                tracing::debug!(source = %start.source, "Dangling prompt link");
                None
            }
        }
    }

    fn walk_from(&self, start: NodeIndex, role: Option<Polarity>) -> Option<String> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut current = start;

        for _ in 0..self.config.max_link_hops {
            if !visited.insert(current) {
                tracing::debug!(index = current, "Cycle in prompt links");
                return None;
            }
            let node = self.graph.node_at(current)?;

            let link = match self.step(node, role, &visited) {
                Step::Found(text) => return Some(text),
                Step::DeadEnd => return None,
                Step::Hop(link) => link,
            };

            match self.graph.follow(link) {
                Some((next, _)) => current = next,
                None => {
                    tracing::debug!(node_id = %node.id, source = %link.source, "Dangling prompt link");
                    return None;
                }
            }
        }

        tracing::debug!(max_link_hops = self.config.max_link_hops, "Prompt walk hop limit reached");
        None
    }

    fn step(&self, node: &'g Node, role: Option<Polarity>, visited: &HashSet<NodeIndex>) -> Step<'g> {
        let fields = match &node.kind {
            NodeKind::TextPassThrough => PASS_THROUGH_TEXT_FIELDS,
            kind if kind.is_text_encoder() || node.input("text").is_some() => ENCODER_TEXT_FIELDS,
            _ => return self.any_link(node, role, visited),
        };

        for field in fields {
            match node.input(field) {
                Some(InputValue::Literal(Value::String(text))) => {
                    return Step::Found(text.trim().to_string())
                }
                Some(InputValue::Link(link)) => return Step::Hop(link),
                Some(InputValue::Literal(_)) | None => {}
            }
        }

        self.any_link(node, role, visited)
    }

    /// Best-effort hop through a node that holds no text: prefer inputs named
    /// after the current polarity or carrying conditioning/text, then anything
    /// that is not a model input, then any link at all. Links into nodes
    /// already on the path are skipped.
    fn any_link(
        &self,
        node: &'g Node,
        role: Option<Polarity>,
        visited: &HashSet<NodeIndex>,
    ) -> Step<'g> {
        let unvisited: Vec<(&str, &'g NodeLink)> = node
            .links()
            .filter(|(_, link)| {
                self.graph
                    .follow(link)
                    .is_some_and(|(index, _)| !visited.contains(&index))
            })
            .collect();

        let preferred = role
            .map(Polarity::input_name)
            .into_iter()
            .chain(PREFERRED_HOP_INPUTS.iter().copied())
            .find_map(|wanted| unvisited.iter().find(|(name, _)| *name == wanted));

        let chosen = preferred
            .or_else(|| unvisited.iter().find(|(name, _)| !NON_TEXT_INPUTS.contains(name)))
            .or_else(|| unvisited.first());

        match chosen {
            Some(&(_, link)) => Step::Hop(link),
            None => {
                // A node whose only links point back into the path is a cycle.
                if node.links().next().is_some() {
                    tracing::debug!(node_id = %node.id, "Prompt walk closed a cycle");
                }
                Step::DeadEnd
            }
        }
    }
}

/// Resolve the text behind `start` with the default configuration.
pub fn resolve(graph: &WorkflowGraph, start: &NodeLink) -> Option<String> {
    let config = ExtractorConfig::default();
    PromptResolver::new(graph, &config).resolve(start)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
