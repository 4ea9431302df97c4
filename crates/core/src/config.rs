//! Tunables for the extraction heuristics and their environment loader.

use std::borrow::Cow;

use serde::Deserialize;

use crate::error::CoreError;

/// Built-in keywords that mark a CLIP text as a negative prompt.
///
/// Vocabulary- and locale-specific: classification against this list is a
/// best-effort heuristic, not a guarantee.
pub const DEFAULT_NEGATIVE_KEYWORDS: &[&str] = &[
    "nsfw",
    "bad",
    "worst",
    "low quality",
    "blurry",
    "糟糕",
    "模糊",
    "低质量",
    "最差",
];

/// Minimum length (exclusive) for a `Model:` value to be accepted as a name.
pub const DEFAULT_MODEL_NAME_MIN_LEN: usize = 10;

/// Upper bound on link hops for a single prompt walk.
pub const DEFAULT_MAX_LINK_HOPS: usize = 256;

/// Depth limit for the aliased key search over generic JSON.
pub const DEFAULT_MAX_JSON_DEPTH: usize = 16;

/// Tunables for the extraction heuristics.
///
/// All fields have defaults matching the built-in behavior. Hosts can embed
/// this struct in their own configuration (it implements `Deserialize`) or
/// load it from environment variables with [`ExtractorConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Keywords classifying a CLIP text as negative (matched case-insensitively).
    pub negative_keywords: Vec<String>,
    /// A `Model:` value longer than this many characters counts as a name.
    pub model_name_min_len: usize,
    /// Maximum link hops a single prompt walk may take.
    pub max_link_hops: usize,
    /// Maximum nesting depth searched by the generic JSON normalizer.
    pub max_json_depth: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            negative_keywords: DEFAULT_NEGATIVE_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            model_name_min_len: DEFAULT_MODEL_NAME_MIN_LEN,
            max_link_hops: DEFAULT_MAX_LINK_HOPS,
            max_json_depth: DEFAULT_MAX_JSON_DEPTH,
        }
    }
}

impl ExtractorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                  |
    /// |------------------------------|--------------------------|
    /// | `GENMETA_NEGATIVE_KEYWORDS`  | built-in keyword list    |
    /// | `GENMETA_MODEL_NAME_MIN_LEN` | `10`                     |
    /// | `GENMETA_MAX_LINK_HOPS`      | `256`                    |
    /// | `GENMETA_MAX_JSON_DEPTH`     | `16`                     |
    ///
    /// Unparsable values are logged and replaced by the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let negative_keywords = std::env::var("GENMETA_NEGATIVE_KEYWORDS")
            .ok()
            .map(|raw| parse_keyword_list(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.negative_keywords);

        let config = Self {
            negative_keywords,
            model_name_min_len: env_usize(
                "GENMETA_MODEL_NAME_MIN_LEN",
                defaults.model_name_min_len,
            ),
            max_link_hops: env_usize("GENMETA_MAX_LINK_HOPS", defaults.max_link_hops),
            max_json_depth: env_usize("GENMETA_MAX_JSON_DEPTH", defaults.max_json_depth),
        };

        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid extractor configuration, using defaults");
                Self::default()
            }
        }
    }

    /// Reject settings that would disable traversal entirely.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_link_hops == 0 {
            return Err(CoreError::Validation(
                "max_link_hops must be at least 1".to_string(),
            ));
        }
        if self.max_json_depth == 0 {
            return Err(CoreError::Validation(
                "max_json_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// This configuration if it validates, otherwise a copy with the zero
    /// limits replaced by their defaults. Entry points taking a host-supplied
    /// config run through this first.
    pub fn sanitized(&self) -> Cow<'_, Self> {
        let Err(e) = self.validate() else {
            return Cow::Borrowed(self);
        };
        tracing::warn!(error = %e, "Invalid extractor configuration, restoring default limits");

        let mut fixed = self.clone();
        if fixed.max_link_hops == 0 {
            fixed.max_link_hops = DEFAULT_MAX_LINK_HOPS;
        }
        if fixed.max_json_depth == 0 {
            fixed.max_json_depth = DEFAULT_MAX_JSON_DEPTH;
        }
        Cow::Owned(fixed)
    }

    /// Whether `text` contains one of the negative keywords, ignoring case
    /// on both sides.
    pub fn is_negative_text(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.negative_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .any(|k| !k.is_empty() && lower.contains(&k))
    }
}

/// Split a comma-separated keyword list, lowercasing and dropping blanks.
fn parse_keyword_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_usize(name: &str, default: usize) -> usize {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, default, "Ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}
