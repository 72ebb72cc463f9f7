//! Prewarm configuration

use crate::{
    Result, DEFAULT_HOVER_DEBOUNCE_MS, DEFAULT_LOAD_TIMEOUT_MS, DEFAULT_ROOT_MARGIN_PX,
    DEFAULT_VISIBILITY_THRESHOLD, MIN_JANITOR_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Deferred module loader configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Per-attempt load timeout in ms (`None` waits forever)
    pub load_timeout_ms: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: Some(DEFAULT_LOAD_TIMEOUT_MS),
        }
    }
}

impl LoaderConfig {
    /// Set the load timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.load_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    /// Load timeout as a duration
    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_ms.map(Duration::from_millis)
    }
}

/// Viewport visibility configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisibilityConfig {
    /// Fire this many logical pixels before the element enters the viewport
    pub root_margin_px: u32,
    /// Visible fraction that counts as "in view" (0.0 - 1.0)
    pub threshold: f32,
}

impl Default for VisibilityConfig {
    fn default() -> Self {
        Self {
            root_margin_px: DEFAULT_ROOT_MARGIN_PX,
            threshold: DEFAULT_VISIBILITY_THRESHOLD,
        }
    }
}

impl VisibilityConfig {
    /// Set root margin
    pub fn with_root_margin(mut self, px: u32) -> Self {
        self.root_margin_px = px;
        self
    }

    /// Set threshold, clamped to 0.0 - 1.0
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }
}

/// Hover-triggered preload configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoverConfig {
    /// Delay between pointer-enter and warm-up (ms)
    pub debounce_ms: u64,
}

impl Default for HoverConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_HOVER_DEBOUNCE_MS,
        }
    }
}

impl HoverConfig {
    /// Debounce delay as a duration
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Cache janitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfig {
    /// Sweep interval (ms)
    pub interval_ms: u64,
    /// Used/limit ratio above which caches are cleared (0.0 - 1.0)
    pub pressure_threshold: f32,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5 * 60 * 1000, // 5 minutes
            pressure_threshold: 0.9,
        }
    }
}

impl JanitorConfig {
    /// Sweep interval as a duration, never shorter than the minimum
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(MIN_JANITOR_INTERVAL_MS))
    }

    /// Set sweep interval, clamped to the minimum
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = (interval.as_millis() as u64).max(MIN_JANITOR_INTERVAL_MS);
        self
    }

    /// Reject intervals below the minimum
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms < MIN_JANITOR_INTERVAL_MS {
            return Err(crate::PrewarmError::Configuration(format!(
                "janitor interval_ms must be at least {}, got {}",
                MIN_JANITOR_INTERVAL_MS, self.interval_ms
            )));
        }
        Ok(())
    }

    /// Set pressure threshold
    pub fn with_pressure_threshold(mut self, threshold: f32) -> Self {
        self.pressure_threshold = threshold.clamp(0.0, 1.0);
        self
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrewarmConfig {
    /// Deferred module loader, applied per module via `DeferredModule::with_config`
    pub loader: LoaderConfig,
    /// Viewport visibility loader
    pub visibility: VisibilityConfig,
    /// Hover debounce
    pub hover: HoverConfig,
    /// Cache janitor
    pub janitor: JanitorConfig,
}

impl PrewarmConfig {
    /// Parse from JSON; missing sections fall back to defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.janitor.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            crate::PrewarmError::Configuration(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PrewarmConfig::default();

        assert_eq!(config.loader.load_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.visibility.root_margin_px, 50);
        assert!((config.visibility.threshold - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.hover.debounce(), Duration::from_millis(100));
        assert_eq!(config.janitor.interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_json() {
        let config = PrewarmConfig::from_json(
            r#"{ "hover": { "debounce_ms": 250 }, "loader": { "load_timeout_ms": null } }"#,
        )
        .unwrap();

        assert_eq!(config.hover.debounce_ms, 250);
        assert_eq!(config.loader.load_timeout(), None);
        assert_eq!(config.visibility, VisibilityConfig::default());
    }

    #[test]
    fn test_threshold_clamped() {
        let config = VisibilityConfig::default().with_threshold(4.0);
        assert_eq!(config.threshold, 1.0);
    }

    #[test]
    fn test_zero_janitor_interval_rejected() {
        let err = PrewarmConfig::from_json(r#"{ "janitor": { "interval_ms": 0 } }"#).unwrap_err();
        assert!(matches!(err, crate::PrewarmError::Configuration(_)));
    }

    #[test]
    fn test_zero_janitor_interval_clamped() {
        let config = JanitorConfig::default().with_interval(Duration::ZERO);
        assert_eq!(config.interval(), Duration::from_millis(MIN_JANITOR_INTERVAL_MS));
        assert!(config.validate().is_ok());

        // Built by hand, bypassing the builder
        let raw = JanitorConfig {
            interval_ms: 0,
            ..JanitorConfig::default()
        };
        assert_eq!(raw.interval(), Duration::from_millis(MIN_JANITOR_INTERVAL_MS));
    }

    #[test]
    fn test_missing_file() {
        let err = PrewarmConfig::from_path("/nonexistent/prewarm.json").unwrap_err();
        assert!(matches!(err, crate::PrewarmError::Configuration(_)));
    }
}
