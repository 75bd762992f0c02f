use std::path::PathBuf;

use anyhow::Context;
use claude::ParserOptions;
use serde::Deserialize;

/// Overrides `projects_path` when set.
pub const PROJECTS_ENV: &str = "CLAUDE_HISTORY_PROJECTS";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub projects_path: PathBuf,
    pub extra_expected_attributes: Vec<String>,
    pub hidden_commands: Vec<String>,
    pub exclude_agent_files: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            projects_path: default_projects_path(),
            extra_expected_attributes: Vec::new(),
            hidden_commands: claude::default_hidden_commands(),
            exclude_agent_files: true,
        }
    }
}

fn default_projects_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".claude")
        .join("projects")
}

impl Config {
    /// Reads `<config_dir>/claude-history/config.toml`; a missing file yields defaults.
    pub fn load() -> anyhow::Result<Self> {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        let mut config = Self::load_from(&config_dir.join("claude-history").join("config.toml"))?;
        if let Ok(path) = std::env::var(PROJECTS_ENV)
            && !path.is_empty()
        {
            config.projects_path = PathBuf::from(path);
        }
        Ok(config)
    }

    pub fn load_from(config_path: &std::path::Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file at {}", config_path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("failed to parse config file")
    }

    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            extra_expected_attributes: self.extra_expected_attributes.clone(),
            hidden_commands: self.hidden_commands.clone(),
        }
    }
}
