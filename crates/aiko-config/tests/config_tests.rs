// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for configuration loading and diagnostics.

use aiko_config::diagnostic::ConfigError;
use aiko_config::model::ScorerKind;
use aiko_config::{load_and_validate_str, load_config_from_str};

#[test]
fn full_document_deserializes() {
    let toml = r#"
[agent]
name = "aiko-dev"
log_level = "debug"

[character]
id = "mika"
name = "Mika"
personality = "You are Mika."
eval_instruction = "Think about what Mika should look up."

[storage]
database_path = "/tmp/aiko-test.db"
embedding_dim = 256

[retrieval]
top_k = 4
web_enabled = false
max_depth = 1
relevance_threshold = 0.7

[rerank]
max_items = 5
scorer = "lexical"

[pipeline]
reply_threshold = 0.3
max_input_tokens = 1024
cut_off_window = 256

[provider]
base_url = "http://localhost:11434/v1"
chat_model = "llama3"

[refiner]
probability = 0.5
seed = 7

[refiner.replacements]
you = "ya"
"#;

    let config = load_and_validate_str(toml).expect("document should validate");
    assert_eq!(config.agent.name, "aiko-dev");
    assert_eq!(config.character.id, "mika");
    assert_eq!(config.storage.embedding_dim, Some(256));
    assert_eq!(config.retrieval.top_k, 4);
    assert!(!config.retrieval.web_enabled);
    assert_eq!(config.retrieval.max_depth, 1);
    assert_eq!(config.rerank.scorer, ScorerKind::Lexical);
    assert_eq!(config.pipeline.cut_off_window, 256);
    assert_eq!(config.provider.chat_model, "llama3");
    assert_eq!(config.refiner.replacements.get("you").map(String::as_str), Some("ya"));
    assert_eq!(config.refiner.seed, Some(7));

    let character = config.character.to_character();
    assert_eq!(character.eval_instruction(), "Think about what Mika should look up.");
}

#[test]
fn empty_document_uses_defaults() {
    let config = load_config_from_str("").expect("defaults should load");
    assert_eq!(config.character.id, "aiko");
    assert_eq!(config.retrieval.max_depth, 2);
    assert_eq!(config.evaluator.max_queries, 3);
    assert_eq!(config.pipeline.max_input_tokens, 4096);
    assert_eq!(config.rerank.scorer, ScorerKind::Embedding);
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = r#"
[retrieval]
max_dpeth = 3
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    let found = errors.iter().any(|e| {
        matches!(
            e,
            ConfigError::UnknownKey { key, suggestion: Some(s), .. }
                if key == "max_dpeth" && s == "max_depth"
        )
    });
    assert!(found, "expected unknown key with suggestion, got {errors:?}");
}

#[test]
fn unknown_section_is_rejected() {
    let errors = load_and_validate_str("[telemetry]\nenabled = true\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::UnknownKey { key, .. } if key == "telemetry"))
    );
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[retrieval]\ntop_k = \"many\"\n").unwrap_err();
    let rendered: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    assert!(
        rendered
            .iter()
            .any(|m| m.contains("invalid type") || m.contains("top_k")),
        "error should mention the type mismatch, got: {rendered:?}"
    );
}

#[test]
fn semantic_errors_surface_after_parse() {
    let errors = load_and_validate_str("[pipeline]\nreply_threshold = 2.0\n").unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("reply_threshold")))
    );
}
