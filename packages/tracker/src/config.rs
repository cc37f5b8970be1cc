use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whether edits are tracked, passed through, or refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackingStatus {
    #[default]
    Enabled,
    Disabled,
    ViewOnly,
}

/// Host-supplied tracker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackConfig {
    /// Author stamped on every change this tracker records
    #[serde(rename = "authorID", default)]
    pub author_id: String,

    #[serde(default)]
    pub initial_tracking_status: TrackingStatus,

    /// Edits carrying any of these metadata keys pass through untracked
    #[serde(default)]
    pub metas_to_skip_tracking: Vec<String>,
}

impl TrackConfig {
    pub fn new(author_id: impl Into<String>) -> Self {
        Self {
            author_id: author_id.into(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: TrackingStatus) -> Self {
        self.initial_tracking_status = status;
        self
    }

    pub fn skip_meta(mut self, key: impl Into<String>) -> Self {
        self.metas_to_skip_tracking.push(key.into());
        self
    }

    /// Load config from a JSON file, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(Self::from_json(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            author_id: "anonymous".to_string(),
            initial_tracking_status: TrackingStatus::Enabled,
            metas_to_skip_tracking: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "authorID": "alice",
            "initialTrackingStatus": "viewOnly",
            "metasToSkipTracking": ["history", "remote"]
        }"#;

        let config = TrackConfig::from_json(json).unwrap();
        assert_eq!(config.author_id, "alice");
        assert_eq!(config.initial_tracking_status, TrackingStatus::ViewOnly);
        assert_eq!(config.metas_to_skip_tracking, vec!["history", "remote"]);
    }

    #[test]
    fn test_default_config() {
        let config = TrackConfig::from_json("{}").unwrap();
        assert_eq!(config.initial_tracking_status, TrackingStatus::Enabled);
        assert!(config.metas_to_skip_tracking.is_empty());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = TrackConfig::load("/nonexistent/redline.config.json").unwrap();
        assert_eq!(config, TrackConfig::default());
    }
}
