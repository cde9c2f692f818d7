// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::AikoConfig;

/// Validate a deserialized configuration.
///
/// Collects every violation instead of stopping at the first one.
pub fn validate_config(config: &AikoConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    if config.storage.embedding_dim == Some(0) {
        errors.push(ConfigError::validation(
            "storage.embedding_dim must be at least 1 when set",
        ));
    }

    if config.character.id.trim().is_empty() {
        errors.push(ConfigError::validation("character.id must not be empty"));
    }

    for (key, value) in [
        ("retrieval.relevance_threshold", config.retrieval.relevance_threshold),
        ("retrieval.min_local_similarity", config.retrieval.min_local_similarity),
        ("pipeline.reply_threshold", config.pipeline.reply_threshold),
        (
            "evaluator.default_reply_expectation",
            config.evaluator.default_reply_expectation,
        ),
        ("refiner.probability", config.refiner.probability),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ConfigError::validation(format!(
                "{key} must be between 0.0 and 1.0, got {value}"
            )));
        }
    }

    for (key, value) in [
        ("retrieval.top_k", config.retrieval.top_k),
        ("rerank.max_items", config.rerank.max_items),
        ("rerank.short_form_chars", config.rerank.short_form_chars),
        ("evaluator.max_queries", config.evaluator.max_queries),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{key} must be at least 1")));
        }
    }

    if config.retrieval.web_enabled {
        if config.retrieval.web_limit == 0 {
            errors.push(ConfigError::validation(
                "retrieval.web_limit must be at least 1 when web search is enabled",
            ));
        }
        if config.web.endpoint.trim().is_empty() {
            errors.push(ConfigError::validation(
                "web.endpoint must be set when retrieval.web_enabled is true",
            ));
        }
        if config.web.fetch_pages {
            if config.web.page_timeout_ms == 0 {
                errors.push(ConfigError::validation(
                    "web.page_timeout_ms must be positive when web.fetch_pages is true",
                ));
            }
            if config.web.max_page_chars == 0 {
                errors.push(ConfigError::validation(
                    "web.max_page_chars must be at least 1 when web.fetch_pages is true",
                ));
            }
        }
    }

    for (key, value) in [
        ("retrieval.local_timeout_ms", config.retrieval.local_timeout_ms),
        ("retrieval.web_timeout_ms", config.retrieval.web_timeout_ms),
        ("pipeline.generation_timeout_ms", config.pipeline.generation_timeout_ms),
    ] {
        if value == 0 {
            errors.push(ConfigError::validation(format!("{key} must be positive")));
        }
    }

    let pipeline = &config.pipeline;
    if pipeline.max_input_tokens > 0 {
        if pipeline.max_input_tokens < 128 {
            errors.push(ConfigError::validation(format!(
                "pipeline.max_input_tokens must be 0 or at least 128, got {}",
                pipeline.max_input_tokens
            )));
        }
        if pipeline.cut_off_window > pipeline.max_input_tokens {
            errors.push(ConfigError::validation(format!(
                "pipeline.cut_off_window ({}) must not exceed pipeline.max_input_tokens ({})",
                pipeline.cut_off_window, pipeline.max_input_tokens
            )));
        }
    }

    let resilience = &config.resilience;
    if resilience.max_attempts == 0 {
        errors.push(ConfigError::validation(
            "resilience.max_attempts must be at least 1",
        ));
    }
    if resilience.base_delay_ms > resilience.max_delay_ms {
        errors.push(ConfigError::validation(format!(
            "resilience.base_delay_ms ({}) must not exceed resilience.max_delay_ms ({})",
            resilience.base_delay_ms, resilience.max_delay_ms
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(errors: &[ConfigError]) -> Vec<String> {
        errors.iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&AikoConfig::default()).is_ok());
    }

    #[test]
    fn threshold_out_of_range_fails() {
        let mut config = AikoConfig::default();
        config.retrieval.relevance_threshold = 1.5;
        let errors = validate_config(&config).unwrap_err();
        assert!(messages(&errors)
            .iter()
            .any(|m| m.contains("retrieval.relevance_threshold")));
    }

    #[test]
    fn cut_off_window_larger_than_budget_fails() {
        let mut config = AikoConfig::default();
        config.pipeline.max_input_tokens = 512;
        config.pipeline.cut_off_window = 1024;
        let errors = validate_config(&config).unwrap_err();
        assert!(messages(&errors).iter().any(|m| m.contains("cut_off_window")));
    }

    #[test]
    fn zero_budget_disables_trimming_checks() {
        let mut config = AikoConfig::default();
        config.pipeline.max_input_tokens = 0;
        config.pipeline.cut_off_window = 9999;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn web_enabled_requires_endpoint() {
        let mut config = AikoConfig::default();
        config.web.endpoint = " ".into();
        assert!(validate_config(&config).is_err());
        config.retrieval.web_enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn page_fetching_needs_a_timeout() {
        let mut config = AikoConfig::default();
        config.web.page_timeout_ms = 0;
        assert_eq!(validate_config(&config).unwrap_err().len(), 1);
        config.web.fetch_pages = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = AikoConfig::default();
        config.storage.database_path = String::new();
        config.retrieval.top_k = 0;
        config.resilience.max_attempts = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
