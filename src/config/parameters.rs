//! Key-value parameters and the buffering policy they control
//!
//! Commands such as `Init` and `ChangeParameters` carry a [`ParametersMap`]
//! of string keys and values. The coordinator recognizes the buffering keys
//! below and forwards the whole map to the mapping engine.

use crate::error::{MappingError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// String-keyed parameter set
pub type ParametersMap = BTreeMap<String, String>;

/// Maximum number of entries in the data queue (0 = unbounded)
pub const KEY_IMAGE_BUFFER_SIZE: &str = "Mapping/ImageBufferSize";

/// Target detection rate in Hz (0 = unlimited)
pub const KEY_DETECTION_RATE: &str = "Mapping/DetectionRate";

/// Whether rate-limited frames become pose-only intermediate nodes
pub const KEY_CREATE_INTERMEDIATE_NODES: &str = "Mapping/CreateIntermediateNodes";

/// Database used by the mapping engine
pub const KEY_DATABASE_PATH: &str = "Mapping/DatabasePath";

/// Default data queue size
pub const DEFAULT_IMAGE_BUFFER_SIZE: usize = 1;

/// Default detection rate in Hz
pub const DEFAULT_DETECTION_RATE: f64 = 1.0;

/// Parse `key` from `parameters` if present
///
/// Returns `Ok(None)` when the key is absent.
pub fn parse_parameter<T: FromStr>(parameters: &ParametersMap, key: &str) -> Result<Option<T>> {
    match parameters.get(key) {
        None => Ok(None),
        Some(value) => parse_value(value)
            .map(Some)
            .ok_or_else(|| MappingError::Parameter {
                key: key.to_string(),
                value: value.clone(),
            }),
    }
}

fn parse_value<T: FromStr>(value: &str) -> Option<T> {
    let trimmed = value.trim();
    if let Ok(v) = trimmed.parse::<T>() {
        return Some(v);
    }
    // Accept the usual boolean spellings
    match trimmed.to_ascii_lowercase().as_str() {
        "1" | "yes" | "on" => "true".parse().ok(),
        "0" | "no" | "off" => "false".parse().ok(),
        _ => None,
    }
}

/// Buffering and throttling policy of the data queue
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
    /// Maximum queue size, 0 = unbounded
    pub max_size: usize,
    /// Target rate in Hz, 0 = unlimited
    pub detection_rate: f64,
    /// Keep rate-limited frames as pose-only nodes
    pub create_intermediate_nodes: bool,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_IMAGE_BUFFER_SIZE,
            detection_rate: DEFAULT_DETECTION_RATE,
            create_intermediate_nodes: false,
        }
    }
}

impl BufferSettings {
    /// Unbounded queue without rate limiting
    pub fn unlimited() -> Self {
        Self {
            max_size: 0,
            detection_rate: 0.0,
            create_intermediate_nodes: false,
        }
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_detection_rate(mut self, rate: f64) -> Self {
        self.detection_rate = rate;
        self
    }

    pub fn with_intermediate_nodes(mut self, enabled: bool) -> Self {
        self.create_intermediate_nodes = enabled;
        self
    }

    /// Apply the buffering keys present in `parameters`
    ///
    /// Values that fail to parse are logged and leave the current setting
    /// untouched.
    ///
    /// # Panics
    ///
    /// Panics if the resulting detection rate is negative.
    pub fn apply_parameters(&mut self, parameters: &ParametersMap) {
        match parse_parameter::<usize>(parameters, KEY_IMAGE_BUFFER_SIZE) {
            Ok(Some(size)) => self.max_size = size,
            Ok(None) => {}
            Err(e) => tracing::warn!("{}", e),
        }
        match parse_parameter::<f64>(parameters, KEY_DETECTION_RATE) {
            Ok(Some(rate)) => self.detection_rate = rate,
            Ok(None) => {}
            Err(e) => tracing::warn!("{}", e),
        }
        match parse_parameter::<bool>(parameters, KEY_CREATE_INTERMEDIATE_NODES) {
            Ok(Some(enabled)) => self.create_intermediate_nodes = enabled,
            Ok(None) => {}
            Err(e) => tracing::warn!("{}", e),
        }
        assert!(
            self.detection_rate >= 0.0,
            "detection rate must be non-negative (got {})",
            self.detection_rate
        );
    }

    /// Render these settings as parameters
    pub fn to_parameters(&self) -> ParametersMap {
        let mut parameters = ParametersMap::new();
        parameters.insert(KEY_IMAGE_BUFFER_SIZE.to_string(), self.max_size.to_string());
        parameters.insert(KEY_DETECTION_RATE.to_string(), self.detection_rate.to_string());
        parameters.insert(
            KEY_CREATE_INTERMEDIATE_NODES.to_string(),
            self.create_intermediate_nodes.to_string(),
        );
        parameters
    }

    /// Minimum interval between two full frames, if rate limited
    pub fn min_frame_interval_secs(&self) -> Option<f64> {
        (self.detection_rate > 0.0).then(|| 1.0 / self.detection_rate)
    }
}
