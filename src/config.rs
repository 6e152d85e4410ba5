use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::masking::TokenSpacing;
use crate::pipeline::PipelineOptions;

pub const DEFAULT_CONFIG_NAME: &str = "glossary-mask.toml";

/// Overrides the config search when set.
pub const CONFIG_ENV: &str = "GLOSSARY_MASK_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub masking: MaskingSection,
    #[serde(default)]
    pub sentinels: SentinelsSection,
    #[serde(default)]
    pub normalization: NormalizationSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct MaskingSection {
    /// "disabled" or "isolated_segments".
    #[serde(default)]
    pub token_spacing: Option<TokenSpacing>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct SentinelsSection {
    /// Send tokens to the translator in sentinel form.
    #[serde(default)]
    pub encode: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct NormalizationSection {
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct LoggingSection {
    /// An env-filter directive, e.g. "info" or "glossary_mask=debug".
    #[serde(default)]
    pub level: Option<String>,
}

impl AppConfig {
    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        let defaults = PipelineOptions::default();
        PipelineOptions {
            token_spacing: self.masking.token_spacing.unwrap_or(defaults.token_spacing),
            encode_sentinels: self.sentinels.encode.unwrap_or(defaults.encode_sentinels),
            normalize: self.normalization.enabled.unwrap_or(defaults.normalize),
        }
    }

    pub fn log_filter(&self) -> Option<&str> {
        self.logging
            .level
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

/// Env override first, then upwards from the working directory, then next to the binary.
pub fn find_default_config(filename: &str) -> Option<PathBuf> {
    if let Some(p) = std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
        if !p.as_os_str().is_empty() {
            return Some(p);
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 4) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    parse_config(&text).with_context(|| format!("config: {}", path.display()))
}

pub fn parse_config(text: &str) -> anyhow::Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(text).context("parse config toml")?;
    Ok(cfg)
}

/// Loads the explicit path if given, else the first config found; no config means defaults.
pub fn resolve_config(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    match explicit {
        Some(p) => load_config(p),
        None => match find_default_config(DEFAULT_CONFIG_NAME) {
            Some(p) => load_config(&p),
            None => Ok(AppConfig::default()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.pipeline_options(), PipelineOptions::default());
        assert_eq!(cfg.log_filter(), None);
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = parse_config(
            r#"
[masking]
token_spacing = "isolated_segments"

[sentinels]
encode = false

[normalization]
enabled = false

[logging]
level = " glossary_mask=debug "
"#,
        )
        .unwrap();
        let opts = cfg.pipeline_options();
        assert_eq!(opts.token_spacing, TokenSpacing::IsolatedSegments);
        assert!(!opts.encode_sentinels);
        assert!(!opts.normalize);
        assert_eq!(cfg.log_filter(), Some("glossary_mask=debug"));
    }

    #[test]
    fn unknown_spacing_is_an_error() {
        let err = parse_config("[masking]\ntoken_spacing = \"always\"").unwrap_err();
        assert!(format!("{err:#}").contains("parse config toml"));
    }

    #[test]
    fn finds_config_in_parent_directory() {
        let root = std::env::temp_dir().join(format!("glossary-mask-cfg-{}", std::process::id()));
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(DEFAULT_CONFIG_NAME), "").unwrap();

        let found = find_file_upwards(&nested, DEFAULT_CONFIG_NAME, 4);
        assert_eq!(found, Some(root.join(DEFAULT_CONFIG_NAME)));
        assert_eq!(find_file_upwards(&nested, DEFAULT_CONFIG_NAME, 1), None);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/nonexistent/glossary-mask.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("read config: /nonexistent"));
    }
}
