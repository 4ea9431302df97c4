//! LoRA reference extraction from SD-WebUI text and ComfyUI graphs.
//!
//! Text mode tries three strategies in order and keeps the first non-empty
//! result: numbered `Lora N:` entries, inline `<lora:name:weight>` tags, and
//! finally any comma segment mentioning "lora", kept verbatim.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::graph::{NodeKind, WorkflowGraph};
use crate::record::{LoraReference, DEFAULT_LORA_WEIGHT};

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static NUMBERED_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blora\s*(\d+)\s*:\s*([^,\n]+)").expect("valid regex"));

static NUMBERED_HASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\blora\s*hash\s*(\d+)\s*:\s*([^,\n]+)").expect("valid regex")
});

static NUMBERED_WEIGHT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\blora\s*weight\s*(\d+)\s*:\s*(-?\d+(?:\.\d+)?)").expect("valid regex")
});

/// `<lora:name>`, `<lora:name:0.6>`, `<lora:name:0.6:0.4>` and the LyCORIS form.
static INLINE_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:lora|lyco):([^:>]+)(?::([^:>]*))?(?::[^>]*)?>").expect("valid regex")
});

/// `Lora hashes: "name: hash, name2: hash2"`.
static LORA_HASHES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)lora hashes\s*:\s*"([^"]*)""#).expect("valid regex"));

// ---------------------------------------------------------------------------
// Text mode
// ---------------------------------------------------------------------------

/// Result of text-mode extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLoras {
    pub loras: Vec<LoraReference>,
    /// Unparsed segments mentioning LoRAs, set only when nothing parsed.
    pub raw_lora_text: Option<String>,
}

/// Extract LoRA references from an SD-WebUI parameter block.
pub fn extract_from_text(raw: &str) -> TextLoras {
    let mut loras = numbered_loras(raw);
    if loras.is_empty() {
        loras = inline_tag_loras(raw);
    }

    if !loras.is_empty() {
        apply_hash_table(raw, &mut loras);
        return TextLoras {
            loras,
            raw_lora_text: None,
        };
    }

    TextLoras {
        loras,
        raw_lora_text: raw_lora_segments(raw),
    }
}

/// `Lora 1: name, Lora Hash 1: abc, Lora Weight 1: 0.8`, ordered by N.
fn numbered_loras(raw: &str) -> Vec<LoraReference> {
    let mut by_index: BTreeMap<u32, LoraReference> = BTreeMap::new();

    for caps in NUMBERED_NAME_RE.captures_iter(raw) {
        let Some(index) = caps[1].parse::<u32>().ok() else {
            continue;
        };
        let name = clean_name(&caps[2]);
        if name.is_empty() {
            continue;
        }
        by_index
            .entry(index)
            .or_insert_with(|| LoraReference::named(name));
    }

    for caps in NUMBERED_HASH_RE.captures_iter(raw) {
        let hash = clean_name(&caps[2]);
        if let Some(lora) = caps[1]
            .parse::<u32>()
            .ok()
            .and_then(|i| by_index.get_mut(&i))
        {
            if !hash.is_empty() {
                lora.hash = Some(hash);
            }
        }
    }

    for caps in NUMBERED_WEIGHT_RE.captures_iter(raw) {
        let weight = caps[2].parse::<f64>().ok();
        if let (Some(lora), Some(weight)) = (
            caps[1]
                .parse::<u32>()
                .ok()
                .and_then(|i| by_index.get_mut(&i)),
            weight,
        ) {
            lora.weight = weight;
        }
    }

    by_index.into_values().collect()
}

fn inline_tag_loras(raw: &str) -> Vec<LoraReference> {
    INLINE_TAG_RE
        .captures_iter(raw)
        .filter_map(|caps| {
            let name = clean_name(caps.get(1)?.as_str());
            if name.is_empty() {
                return None;
            }
            let weight = caps
                .get(2)
                .and_then(|m| m.as_str().trim().parse::<f64>().ok())
                .unwrap_or(DEFAULT_LORA_WEIGHT);
            Some(LoraReference::named(name).with_weight(weight))
        })
        .collect()
}

/// Fill missing hashes from a `Lora hashes: "..."` table, matched by name.
fn apply_hash_table(raw: &str, loras: &mut [LoraReference]) {
    let Some(caps) = LORA_HASHES_RE.captures(raw) else {
        return;
    };
    for entry in caps[1].split(',') {
        let Some((name, hash)) = entry.split_once(':') else {
            continue;
        };
        let (name, hash) = (name.trim(), hash.trim());
        if hash.is_empty() {
            continue;
        }
        for lora in loras.iter_mut().filter(|l| l.hash.is_none() && l.name == name) {
            lora.hash = Some(hash.to_string());
        }
    }
}

fn raw_lora_segments(raw: &str) -> Option<String> {
    let segments: Vec<&str> = raw
        .split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.to_lowercase().contains("lora"))
        .collect();
    (!segments.is_empty()).then(|| segments.join(", "))
}

fn clean_name(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_string()
}

// ---------------------------------------------------------------------------
// Graph mode
// ---------------------------------------------------------------------------

/// One reference per `LoraLoader` (or model-only loader), in node order.
pub fn extract_from_graph(graph: &WorkflowGraph) -> Vec<LoraReference> {
    graph
        .nodes()
        .filter(|n| matches!(n.kind, NodeKind::LoraLoader | NodeKind::LoraLoaderModelOnly))
        .filter_map(|node| {
            let Some(name) = node.str_input("lora_name") else {
                tracing::debug!(node_id = %node.id, "LoRA loader without literal lora_name");
                return None;
            };
            let weight = node
                .f64_input("strength_model")
                .unwrap_or(DEFAULT_LORA_WEIGHT);
            Some(LoraReference::named(name).with_weight(weight))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
