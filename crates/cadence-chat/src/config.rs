//! Configuration for the chat runtime.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Fallback copy shown in place of a discarded response. Localized by the
/// embedding application via configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackStrings {
    /// Shown when generation completed without usable content
    pub empty_response: String,
    /// Shown when a response failed and its partial text was discarded
    pub generic: String,
}

impl Default for FallbackStrings {
    fn default() -> Self {
        Self {
            empty_response: "I couldn't come up with a response. Please try again.".to_string(),
            generic: "Something went wrong while generating a response. Please try again."
                .to_string(),
        }
    }
}

/// Configuration for the chat runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// System instructions handed to the session factory
    pub instructions: String,
    /// Above this many characters of streamed content, live parsing and
    /// rendering stop for the rest of the cycle and raw text is displayed
    pub live_markup_ceiling: usize,
    /// Above this many characters, the one-shot final render skips parsing
    /// entirely and wraps the raw text
    pub final_markup_ceiling: usize,
    /// How long the render worker waits to coalesce bursts, in milliseconds
    pub render_debounce_ms: u64,
    /// Fallback message copy
    pub fallback: FallbackStrings,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            instructions: String::new(),
            live_markup_ceiling: 20_000,
            final_markup_ceiling: 80_000,
            render_debounce_ms: 30,
            fallback: FallbackStrings::default(),
        }
    }
}

impl ChatConfig {
    /// The render worker's debounce interval
    pub fn render_debounce(&self) -> Duration {
        Duration::from_millis(self.render_debounce_ms)
    }

    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cadence")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for CADENCE_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("CADENCE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file, falling back to defaults on any problem
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file: {}", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.live_markup_ceiling, 20_000);
        assert_eq!(config.final_markup_ceiling, 80_000);
        assert_eq!(config.render_debounce(), Duration::from_millis(30));
        assert!(!config.fallback.generic.is_empty());
        assert!(!config.fallback.empty_response.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ChatConfig = toml::from_str("live_markup_ceiling = 5000").unwrap();
        assert_eq!(config.live_markup_ceiling, 5_000);
        assert_eq!(config.final_markup_ceiling, 80_000);
        assert_eq!(config.render_debounce_ms, 30);
    }

    #[test]
    fn test_fallback_strings_override() {
        let config: ChatConfig = toml::from_str(
            r#"
            [fallback]
            generic = "Es ist ein Fehler aufgetreten."
            "#,
        )
        .unwrap();
        assert_eq!(config.fallback.generic, "Es ist ein Fehler aufgetreten.");
        // Unset fields keep their defaults
        assert!(config.fallback.empty_response.contains("try again"));
    }
}
