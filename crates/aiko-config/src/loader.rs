// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order, later wins: compiled defaults, `/etc/aiko/aiko.toml`,
//! `$XDG_CONFIG_HOME/aiko/aiko.toml`, `./aiko.toml`, then `AIKO_*` variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::AikoConfig;

/// Top-level sections addressable through environment variables.
const ENV_SECTIONS: &[&str] = &[
    "agent",
    "character",
    "storage",
    "retrieval",
    "rerank",
    "evaluator",
    "pipeline",
    "provider",
    "web",
    "resilience",
    "refiner",
];

pub(crate) const SYSTEM_CONFIG_PATH: &str = "/etc/aiko/aiko.toml";
pub(crate) const LOCAL_CONFIG_PATH: &str = "aiko.toml";

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("aiko").join("aiko.toml"))
}

/// Build the full layered figment without extracting it.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(AikoConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Load configuration from the standard hierarchy with env overrides.
pub fn load_config() -> Result<AikoConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from an explicit file, skipping the hierarchy.
pub fn load_config_from_path(path: &Path) -> Result<AikoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AikoConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Load configuration from an inline TOML document over the defaults.
pub fn load_config_from_str(toml_content: &str) -> Result<AikoConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AikoConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// `AIKO_<SECTION>_<KEY>` maps to `<section>.<key>`.
///
/// Only the first underscore after a known section name is a separator, so
/// `AIKO_RETRIEVAL_MAX_DEPTH` becomes `retrieval.max_depth`.
fn env_provider() -> Env {
    Env::prefixed("AIKO_").map(|key| {
        let key_str = key.as_str();
        let mapped = ENV_SECTIONS
            .iter()
            .find_map(|section| {
                key_str
                    .strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or_else(|| key_str.to_string());
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_vars_map_to_sections() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("AIKO_RETRIEVAL_MAX_DEPTH", "4");
            jail.set_env("AIKO_CHARACTER_ID", "mika");
            jail.set_env("AIKO_PIPELINE_REPLY_THRESHOLD", "0.25");
            let config: AikoConfig = Figment::new()
                .merge(Serialized::defaults(AikoConfig::default()))
                .merge(env_provider())
                .extract()?;
            assert_eq!(config.retrieval.max_depth, 4);
            assert_eq!(config.character.id, "mika");
            assert!((config.pipeline.reply_threshold - 0.25).abs() < f32::EPSILON);
            Ok(())
        });
    }

    #[test]
    fn local_file_overrides_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                [rerank]
                max_items = 3
                scorer = "lexical"
                "#,
            )?;
            let config = load_config_from_path(Path::new("custom.toml"))?;
            assert_eq!(config.rerank.max_items, 3);
            assert_eq!(config.rerank.scorer, crate::model::ScorerKind::Lexical);
            assert_eq!(config.retrieval.top_k, 5);
            Ok(())
        });
    }
}
