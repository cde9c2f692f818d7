// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-processing of generated replies.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::{Captures, Regex};
use tracing::debug;

use aiko_config::model::RefinerConfig;
use aiko_core::types::{AdapterType, HealthStatus};
use aiko_core::{AikoError, Conversation, PluginAdapter, RefinerAdapter};

/// Returns replies unchanged.
#[derive(Debug, Default)]
pub struct PassthroughRefiner;

#[async_trait]
impl PluginAdapter for PassthroughRefiner {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Refiner
    }

    async fn health_check(&self) -> Result<HealthStatus, AikoError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl RefinerAdapter for PassthroughRefiner {
    async fn refine(&self, _conversation: &Conversation, reply: String) -> Result<String, AikoError> {
        Ok(reply)
    }
}

/// Replaces whole words from a table, each occurrence with a fixed
/// probability, keeping the original capitalization.
pub struct StyleRefiner {
    replacements: BTreeMap<String, String>,
    pattern: Regex,
    probability: f64,
    rng: Mutex<StdRng>,
}

impl StyleRefiner {
    pub fn new(
        replacements: &BTreeMap<String, String>,
        probability: f32,
        seed: Option<u64>,
    ) -> Result<Self, AikoError> {
        let replacements: BTreeMap<String, String> = replacements
            .iter()
            .filter(|(word, _)| !word.trim().is_empty())
            .map(|(word, replacement)| (word.trim().to_lowercase(), replacement.clone()))
            .collect();

        // Longest first so that "sleepy" wins over "sleep".
        let mut words: Vec<&str> = replacements.keys().map(String::as_str).collect();
        words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
        let pattern = Regex::new(&format!(r"(?i)\b(?:{alternation})\b"))
            .map_err(|e| AikoError::Config(format!("invalid refiner replacement table: {e}")))?;

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            replacements,
            pattern,
            probability: f64::from(probability.clamp(0.0, 1.0)),
            rng: Mutex::new(rng),
        })
    }

    pub fn apply(&self, text: &str) -> Result<String, AikoError> {
        if self.replacements.is_empty() || self.probability <= 0.0 {
            return Ok(text.to_string());
        }
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| AikoError::Internal("refiner rng lock poisoned".into()))?;

        let refined = self.pattern.replace_all(text, |caps: &Captures| {
            let word = &caps[0];
            match self.replacements.get(&word.to_lowercase()) {
                Some(replacement) if rng.gen_bool(self.probability) => match_case(word, replacement),
                _ => word.to_string(),
            }
        });
        Ok(refined.into_owned())
    }
}

/// Apply the capitalization pattern of `original` to `replacement`.
fn match_case(original: &str, replacement: &str) -> String {
    let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return replacement.to_uppercase();
    }
    if original.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = replacement.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
    }
    replacement.to_string()
}

#[async_trait]
impl PluginAdapter for StyleRefiner {
    fn name(&self) -> &str {
        "style"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Refiner
    }

    async fn health_check(&self) -> Result<HealthStatus, AikoError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl RefinerAdapter for StyleRefiner {
    async fn refine(&self, _conversation: &Conversation, reply: String) -> Result<String, AikoError> {
        let refined = self.apply(&reply)?;
        if refined != reply {
            debug!("reply restyled");
        }
        Ok(refined)
    }
}

/// The refiner described by `config`: passthrough unless a replacement table
/// and a non-zero probability are set.
pub fn refiner_from_config(config: &RefinerConfig) -> Result<Arc<dyn RefinerAdapter>, AikoError> {
    if config.probability <= 0.0 || config.replacements.is_empty() {
        return Ok(Arc::new(PassthroughRefiner));
    }
    Ok(Arc::new(StyleRefiner::new(
        &config.replacements,
        config.probability,
        config.seed,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> BTreeMap<String, String> {
        [("hello", "hewwo"), ("sleep", "sweep"), ("sleepy", "sweepy"), ("love", "wuv")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn replaces_whole_words_preserving_case() {
        let refiner = StyleRefiner::new(&table(), 1.0, Some(7)).unwrap();
        assert_eq!(
            refiner.apply("Hello! I LOVE to sleep, sleepy head. Lovely.").unwrap(),
            "Hewwo! I WUV to sweep, sweepy head. Lovely."
        );
    }

    #[test]
    fn zero_probability_changes_nothing() {
        let refiner = StyleRefiner::new(&table(), 0.0, Some(7)).unwrap();
        assert_eq!(refiner.apply("hello there").unwrap(), "hello there");
    }

    #[test]
    fn same_seed_same_output() {
        let text = "hello hello hello love love sleep sleepy hello";
        let a = StyleRefiner::new(&table(), 0.5, Some(42)).unwrap();
        let b = StyleRefiner::new(&table(), 0.5, Some(42)).unwrap();
        assert_eq!(a.apply(text).unwrap(), b.apply(text).unwrap());
    }

    #[test]
    fn config_selects_refiner() {
        let passthrough = refiner_from_config(&RefinerConfig::default()).unwrap();
        assert_eq!(passthrough.name(), "passthrough");

        let styled = refiner_from_config(&RefinerConfig {
            probability: 0.3,
            replacements: table(),
            seed: None,
        })
        .unwrap();
        assert_eq!(styled.name(), "style");
    }

    #[tokio::test]
    async fn passthrough_returns_reply() {
        let reply = PassthroughRefiner
            .refine(&Conversation::new(), "as is".into())
            .await
            .unwrap();
        assert_eq!(reply, "as is");
    }
}
