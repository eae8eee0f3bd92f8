use serde::Deserialize;
use std::path::{Path, PathBuf};

use waveladder::{Downmix, LogicKind};

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_output_count")]
    pub output_count: usize,
    #[serde(default = "default_levels")]
    pub levels: usize,
    #[serde(default = "default_logics")]
    pub logics: Vec<LogicKind>,
    #[serde(default)]
    pub downmix: Downmix,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            output_count: default_output_count(),
            levels: default_levels(),
            logics: default_logics(),
            downmix: Downmix::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

pub fn default_output_count() -> usize { 1024 }
pub fn default_levels() -> usize { 10 }
pub fn default_logics() -> Vec<LogicKind> { LogicKind::ALL.to_vec() }
pub fn default_format() -> String { "text".into() }

/// Explicit path, then `./waveladder.toml`, then the user config locations.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("waveladder.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("waveladder").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("waveladder").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Option<Config> {
    match toml::from_str(content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.analysis.output_count, 1024);
        assert_eq!(config.analysis.levels, 10);
        assert_eq!(config.analysis.logics, vec![LogicKind::Max, LogicKind::Average]);
        assert_eq!(config.analysis.downmix, Downmix::First);
        assert_eq!(config.output.format, "text");
    }

    #[test]
    fn parses_all_sections() {
        let config = parse_config(
            r#"
            [analysis]
            output_count = 800
            levels = 6
            logics = ["avg"]
            downmix = "mono"

            [output]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.analysis.output_count, 800);
        assert_eq!(config.analysis.levels, 6);
        assert_eq!(config.analysis.logics, vec![LogicKind::Average]);
        assert_eq!(config.analysis.downmix, Downmix::Mono);
        assert_eq!(config.output.format, "json");
    }

    #[test]
    fn rejects_unknown_logic() {
        assert!(parse_config("[analysis]\nlogics = [\"median\"]\n").is_none());
    }
}
