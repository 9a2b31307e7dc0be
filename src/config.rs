use crate::error::ConfigError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

const CONFIG_FILE: &str = "config.json";
const CONFIG_DIR: &str = "playback-core";

/// One entry of the global house-ad pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PodAd {
    Mux {
        #[serde(rename = "playbackId")]
        playback_id: String,
        #[serde(default)]
        label: Option<String>,
    },
    Url {
        src: String,
        #[serde(default)]
        label: Option<String>,
    },
}

impl PodAd {
    pub fn label(&self) -> &str {
        match self {
            PodAd::Mux { label, .. } | PodAd::Url { label, .. } => {
                label.as_deref().unwrap_or("Advertisement")
            }
        }
    }
}

/// Site configuration read at session start. The playback core never
/// mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct PlayerConfig {
    /// Global fallback VAST tag.
    pub vast_tag: String,
    #[serde(deserialize_with = "pod_or_empty")]
    pub global_ads: Vec<PodAd>,
    pub play_global_ads_on_avod: bool,
    pub play_global_ads_on_live: bool,
    pub live_ad_frequency_mins_fallback: f64,
    pub ads_debug: bool,

    pub ad_timeout_secs: f64,
    pub ad_pod_item_timeout_secs: f64,
    pub media_lookup_attempts: u32,
    pub media_lookup_backoff_ms: u64,
    pub midroll_min_playback_secs: f64,
    pub live_min_playback_secs: f64,
    pub live_default_slot_secs: f64,
    pub live_preroll_delay_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig {
            vast_tag: String::new(),
            global_ads: Vec::new(),
            play_global_ads_on_avod: false,
            play_global_ads_on_live: false,
            live_ad_frequency_mins_fallback: 10.0,
            ads_debug: false,
            ad_timeout_secs: 20.0,
            ad_pod_item_timeout_secs: 45.0,
            media_lookup_attempts: 12,
            media_lookup_backoff_ms: 250,
            midroll_min_playback_secs: 15.0,
            live_min_playback_secs: 10.0,
            live_default_slot_secs: 1800.0,
            live_preroll_delay_ms: 350,
        }
    }
}

/// A malformed pod list reads as empty instead of failing the whole file.
fn pod_or_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<PodAd>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

impl PlayerConfig {
    pub fn from_json(json: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration from a specific file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&data, path)?;
        debug!(path = %path.display(), "loaded player config");
        Ok(config)
    }

    /// Search locations in order: `./config.json`, then the user config dir.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(CONFIG_DIR).join(CONFIG_FILE));
        }
        paths
    }

    /// Load from the first readable search path, or fall back to defaults.
    pub fn load_default() -> Self {
        for path in Self::search_paths() {
            if !path.exists() {
                continue;
            }
            match Self::load(&path) {
                Ok(config) => return config,
                Err(e) => warn!("ignoring config: {}", e),
            }
        }
        PlayerConfig::default()
    }

    pub fn fallback_tag(&self) -> Option<&str> {
        Some(self.vast_tag.trim()).filter(|t| !t.is_empty())
    }

    pub fn ad_timeout(&self) -> Duration {
        secs(self.ad_timeout_secs)
    }

    pub fn pod_item_timeout(&self) -> Duration {
        secs(self.ad_pod_item_timeout_secs)
    }

    pub fn media_lookup_backoff(&self) -> Duration {
        Duration::from_millis(self.media_lookup_backoff_ms)
    }

    pub fn live_default_slot(&self) -> Duration {
        secs(self.live_default_slot_secs)
    }

    pub fn live_preroll_delay(&self) -> Duration {
        Duration::from_millis(self.live_preroll_delay_ms)
    }
}

fn secs(value: f64) -> Duration {
    if value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = PlayerConfig::default();
        assert_eq!(config.ad_timeout(), Duration::from_secs(20));
        assert_eq!(config.media_lookup_attempts, 12);
        assert_eq!(config.media_lookup_backoff(), Duration::from_millis(250));
        assert_eq!(config.live_ad_frequency_mins_fallback, 10.0);
        assert!(config.fallback_tag().is_none());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = PlayerConfig::from_json(
            r##"{"VAST_TAG":" https://ads/tag ","ADS_DEBUG":true,"THEME":{"accent":"#fff"}}"##,
            Path::new("config.json"),
        )
        .unwrap();
        assert_eq!(config.fallback_tag(), Some("https://ads/tag"));
        assert!(config.ads_debug);
        assert_eq!(config.ad_timeout_secs, 20.0);
    }

    #[test]
    fn malformed_global_ads_read_as_empty() {
        let config =
            PlayerConfig::from_json(r#"{"GLOBAL_ADS":"nope"}"#, Path::new("config.json")).unwrap();
        assert!(config.global_ads.is_empty());

        let config = PlayerConfig::from_json(
            r#"{"GLOBAL_ADS":[{"type":"mux","playbackId":"p","label":"House"},{"type":"bogus"},{"type":"url","src":"https://cdn/ad.mp4"}]}"#,
            Path::new("config.json"),
        )
        .unwrap();
        assert_eq!(config.global_ads.len(), 2);
        assert_eq!(config.global_ads[0].label(), "House");
        assert_eq!(config.global_ads[1].label(), "Advertisement");
    }

    #[test]
    fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"PLAY_GLOBAL_ADS_ON_LIVE":true,"AD_TIMEOUT_SECS":5}}"#).unwrap();
        let config = PlayerConfig::load(file.path()).unwrap();
        assert!(config.play_global_ads_on_live);
        assert_eq!(config.ad_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = PlayerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PlayerConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
