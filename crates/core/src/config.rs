//! Editor configuration
//!
//! Defaults for newly placed balloons and editing-surface limits. A config
//! can be built programmatically, read from a JSON file, or overlaid from
//! environment variables.

use crate::annotation::{BalloonStyle, DEFAULT_DIAMETER};
use crate::command::DEFAULT_UNDO_LIMIT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::ops::RangeInclusive;
use std::path::Path;
use thiserror::Error;

pub const ENV_DEFAULT_STYLE: &str = "BALLOONER_DEFAULT_STYLE";
pub const ENV_DEFAULT_DIAMETER: &str = "BALLOONER_DEFAULT_DIAMETER";
pub const ENV_DEFAULT_FONT_SIZE: &str = "BALLOONER_DEFAULT_FONT_SIZE";
pub const ENV_UNDO_LIMIT: &str = "BALLOONER_UNDO_LIMIT";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key `{key}`: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("configuration is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue { key: key.to_string(), reason: reason.into() }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for the balloon editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Style given to newly placed balloons
    pub default_style: BalloonStyle,
    /// Diameter of newly placed balloons, in points
    pub default_diameter: f64,
    /// Label size of newly placed balloons; `0.0` sizes from the radius
    pub default_font_size: f64,
    /// Smallest diameter the editing surface allows
    pub min_diameter: f64,
    /// Largest diameter the editing surface allows
    pub max_diameter: f64,
    /// Circle centre offset from the target for styles with a leader
    pub leader_offset: [f64; 2],
    /// Undo history length
    pub undo_limit: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            default_style: BalloonStyle::Default,
            default_diameter: DEFAULT_DIAMETER,
            default_font_size: 0.0,
            min_diameter: 4.0,
            max_diameter: 200.0,
            leader_offset: [40.0, 40.0],
            undo_limit: DEFAULT_UNDO_LIMIT,
        }
    }
}

impl EditorConfig {
    pub fn with_default_style(mut self, style: BalloonStyle) -> Self {
        self.default_style = style;
        self
    }

    pub fn with_default_diameter(mut self, diameter: f64) -> Self {
        self.default_diameter = diameter;
        self
    }

    pub fn with_default_font_size(mut self, size: f64) -> Self {
        self.default_font_size = size;
        self
    }

    pub fn with_leader_offset(mut self, dx: f64, dy: f64) -> Self {
        self.leader_offset = [dx, dy];
        self
    }

    pub fn with_undo_limit(mut self, limit: usize) -> Self {
        self.undo_limit = limit;
        self
    }

    pub fn diameter_range(&self) -> RangeInclusive<f64> {
        self.min_diameter..=self.max_diameter
    }

    /// Clamp a requested diameter into the editing range.
    pub fn clamp_diameter(&self, diameter: f64) -> f64 {
        if diameter.is_nan() {
            return self.default_diameter;
        }
        diameter.clamp(self.min_diameter, self.max_diameter)
    }

    /// Reject settings that would make placement or editing misbehave.
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.min_diameter > 0.0 && self.min_diameter <= self.max_diameter) {
            return Err(ConfigError::invalid(
                "min_diameter",
                format!("range {}..={} is empty or not positive", self.min_diameter, self.max_diameter),
            ));
        }
        if !self.diameter_range().contains(&self.default_diameter) {
            return Err(ConfigError::invalid("default_diameter", "outside the diameter range"));
        }
        if !(self.default_font_size.is_finite() && self.default_font_size >= 0.0) {
            return Err(ConfigError::invalid("default_font_size", "must be zero or positive"));
        }
        if !self.leader_offset.iter().all(|v| v.is_finite()) {
            return Err(ConfigError::invalid("leader_offset", "must be finite"));
        }
        if self.undo_limit == 0 {
            return Err(ConfigError::invalid("undo_limit", "must be at least 1"));
        }
        Ok(())
    }

    /// Load from a JSON file. Missing keys keep their defaults; unknown keys
    /// are ignored.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Defaults overlaid with environment variables.
    ///
    /// - `BALLOONER_DEFAULT_STYLE`: `default`, `red`, `outline` or `no_arrow`
    /// - `BALLOONER_DEFAULT_DIAMETER`: points
    /// - `BALLOONER_DEFAULT_FONT_SIZE`: points, `0` for automatic
    /// - `BALLOONER_UNDO_LIMIT`: number of commands
    pub fn from_env() -> ConfigResult<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by the `BALLOONER_*` names.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        if let Some(value) = lookup(ENV_DEFAULT_STYLE) {
            self.default_style = match BalloonStyle::ALL.into_iter().find(|s| s.as_str() == value.trim()) {
                Some(style) => style,
                None => return Err(ConfigError::invalid(ENV_DEFAULT_STYLE, format!("unknown style {value:?}"))),
            };
        }
        if let Some(value) = lookup(ENV_DEFAULT_DIAMETER) {
            self.default_diameter = parse_number(ENV_DEFAULT_DIAMETER, &value)?;
        }
        if let Some(value) = lookup(ENV_DEFAULT_FONT_SIZE) {
            self.default_font_size = parse_number(ENV_DEFAULT_FONT_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_UNDO_LIMIT) {
            self.undo_limit = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(ENV_UNDO_LIMIT, format!("{value:?} is not a count")))?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_number(key: &str, value: &str) -> ConfigResult<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConfigError::invalid(key, format!("{value:?} is not a number")))
}
