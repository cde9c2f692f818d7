// SPDX-FileCopyrightText: 2026 Aiko Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aiko - a persona-driven conversational agent with long-term memory.
//!
//! This is the binary entry point.

mod chat;

use clap::{Parser, Subcommand};

use aiko_config::AikoConfig;

/// Aiko - a persona-driven conversational agent with long-term memory.
#[derive(Parser, Debug)]
#[command(name = "aiko", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Chat with the configured character in the terminal.
    Chat {
        /// Stable user identifier; memories are kept per user.
        #[arg(long)]
        user: String,
        /// Name shown in the prompt.
        #[arg(long)]
        name: Option<String>,
    },
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match aiko_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            aiko_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Chat { user, name }) => {
            init_tracing(&config.agent.log_level);
            if let Err(e) = chat::run_chat(config, user, name).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => match render_config(&config) {
            Ok(rendered) => print!("{rendered}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        },
        None => {
            println!("aiko: use --help for available commands");
        }
    }
}

/// The effective configuration as TOML, with the API key masked.
fn render_config(config: &AikoConfig) -> Result<String, toml::ser::Error> {
    let mut shown = config.clone();
    if shown.provider.api_key.is_some() {
        shown.provider.api_key = Some("********".to_string());
    }
    toml::to_string_pretty(&shown)
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("aiko={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_loads_config_defaults() {
        let config = aiko_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.agent.name, "aiko");
    }

    #[test]
    fn rendered_config_masks_api_key() {
        let mut config = AikoConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let rendered = render_config(&config).unwrap();
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[retrieval]"));
    }

    #[test]
    fn chat_requires_user() {
        assert!(Cli::try_parse_from(["aiko", "chat"]).is_err());
        let cli = Cli::try_parse_from(["aiko", "chat", "--user", "u1", "--name", "Sam"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Chat { ref user, name: Some(ref name) }) if user == "u1" && name == "Sam"
        ));
    }
}
