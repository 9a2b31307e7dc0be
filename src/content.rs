//! Typed view of the catalog records the playback core reads.
//!
//! The upstream catalog is loosely typed: the same logical value can appear
//! under several field names, numbers may arrive as strings, and flags may be
//! any truthy value. Every variant is kept as its own field here and resolved
//! through an explicit, ordered precedence list in the accessor methods.

use serde::{Deserialize, Serialize};

/// What the core mounts into a player surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PlaybackRef {
    /// Opaque hosted-playback identifier.
    Mux(String),
    /// Direct media URL.
    Url(String),
}

impl std::fmt::Display for PlaybackRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackRef::Mux(id) => write!(f, "mux:{}", id),
            PlaybackRef::Url(url) => write!(f, "{}", url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamType {
    OnDemand,
    Live,
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamType::OnDemand => write!(f, "on-demand"),
            StreamType::Live => write!(f, "live"),
        }
    }
}

/// Transactional (rent/buy) descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TvodOffer {
    #[serde(default, deserialize_with = "loose::flag")]
    pub enabled: bool,
    #[serde(default, deserialize_with = "loose::number")]
    pub price: Option<f64>,
    #[serde(default, rename = "rentPrice", deserialize_with = "loose::number")]
    pub rent_price: Option<f64>,
    #[serde(default, rename = "buyPrice", deserialize_with = "loose::number")]
    pub buy_price: Option<f64>,
}

impl TvodOffer {
    pub fn is_offered(&self) -> bool {
        self.enabled || self.price.is_some() || self.rent_price.is_some() || self.buy_price.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Monetization {
    #[serde(default, deserialize_with = "loose::flag")]
    pub avod: bool,
    #[serde(default, deserialize_with = "loose::flag")]
    pub svod: bool,
    #[serde(default, deserialize_with = "loose::object", skip_serializing_if = "Option::is_none")]
    pub tvod: Option<TvodOffer>,
}

/// `monetization` is either a flag object or a free-form label such as `"AVOD"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MonetizationField {
    Flags(Monetization),
    Label(String),
}

/// Advertising override block, found on items, series, live channels and the
/// catalog root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvertisingBlock {
    #[serde(default, rename = "preRollVastTag", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub pre_roll_vast_tag: Option<String>,
    #[serde(default, rename = "preRollTag", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub pre_roll_tag: Option<String>,
    #[serde(default, rename = "prerollTag", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub preroll_tag: Option<String>,
    #[serde(default, rename = "preroll_vast", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub preroll_vast: Option<String>,
    #[serde(default, rename = "vastTag", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub vast_tag: Option<String>,
    #[serde(default, deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub vast: Option<String>,

    #[serde(default, rename = "midRollVastTag", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub mid_roll_vast_tag: Option<String>,
    #[serde(default, rename = "midRollTag", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub mid_roll_tag: Option<String>,
    #[serde(default, rename = "midrollTag", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub midroll_tag: Option<String>,
    #[serde(default, rename = "midroll_vast", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub midroll_vast: Option<String>,

    #[serde(default, rename = "midRollEveryMins", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub mid_roll_every_mins: Option<f64>,
    #[serde(default, rename = "midrollEveryMins", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub midroll_every_mins: Option<f64>,
    #[serde(default, rename = "midRollIntervalMins", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub mid_roll_interval_mins: Option<f64>,
    #[serde(default, rename = "midrollIntervalMins", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub midroll_interval_mins: Option<f64>,

    #[serde(default, rename = "midRollTimeSec", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub mid_roll_time_sec: Option<f64>,
    #[serde(default, rename = "midrollTimeSec", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub midroll_time_sec: Option<f64>,
    #[serde(default, rename = "midRollTimeMins", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub mid_roll_time_mins: Option<f64>,
    #[serde(default, rename = "midrollTimeMins", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub midroll_time_mins: Option<f64>,
    #[serde(default, rename = "midRollAtPercent", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub mid_roll_at_percent: Option<f64>,
    #[serde(default, rename = "midrollAtPercent", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub midroll_at_percent: Option<f64>,
    #[serde(default, rename = "midRollDurationSec", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub mid_roll_duration_sec: Option<f64>,
    #[serde(default, rename = "midrollDurationSec", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub midroll_duration_sec: Option<f64>,

    #[serde(default, rename = "adFrequencyMins", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub ad_frequency_mins: Option<f64>,
    #[serde(default, rename = "adFrequencyMinsMin", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub ad_frequency_mins_min: Option<f64>,
    #[serde(default, rename = "adFrequencyMinsMax", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub ad_frequency_mins_max: Option<f64>,
    #[serde(default, rename = "midRollEveryMinsMin", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub mid_roll_every_mins_min: Option<f64>,
    #[serde(default, rename = "midRollEveryMinsMax", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub mid_roll_every_mins_max: Option<f64>,
}

impl AdvertisingBlock {
    /// Pre-roll tag: `preRollVastTag`, `preRollTag`, `prerollTag`,
    /// `preroll_vast`, `vastTag`, `vast`.
    pub fn pre_roll(&self) -> Option<&str> {
        first_str([
            &self.pre_roll_vast_tag,
            &self.pre_roll_tag,
            &self.preroll_tag,
            &self.preroll_vast,
            &self.vast_tag,
            &self.vast,
        ])
    }

    /// Mid-roll tag: `midRollVastTag`, `midRollTag`, `midrollTag`, `midroll_vast`.
    pub fn mid_roll(&self) -> Option<&str> {
        first_str([
            &self.mid_roll_vast_tag,
            &self.mid_roll_tag,
            &self.midroll_tag,
            &self.midroll_vast,
        ])
    }

    /// Live channel tag: `vastTag`, `prerollTag`, `preRollVastTag`, `preRollTag`.
    pub fn live_tag(&self) -> Option<&str> {
        first_str([
            &self.vast_tag,
            &self.preroll_tag,
            &self.pre_roll_vast_tag,
            &self.pre_roll_tag,
        ])
    }

    /// Repeating cadence: `midRollEveryMins`, `midrollEveryMins`,
    /// `midRollIntervalMins`, `midrollIntervalMins`.
    pub fn mid_every_mins(&self) -> Option<f64> {
        first_positive([
            self.mid_roll_every_mins,
            self.midroll_every_mins,
            self.mid_roll_interval_mins,
            self.midroll_interval_mins,
        ])
    }

    pub fn mid_at_seconds(&self) -> Option<f64> {
        first_positive([self.mid_roll_time_sec, self.midroll_time_sec])
    }

    pub fn mid_at_minutes(&self) -> Option<f64> {
        first_positive([self.mid_roll_time_mins, self.midroll_time_mins])
    }

    pub fn mid_at_percent(&self) -> Option<f64> {
        first_positive([self.mid_roll_at_percent, self.midroll_at_percent])
    }

    pub fn mid_duration_secs(&self) -> Option<f64> {
        first_positive([self.mid_roll_duration_sec, self.midroll_duration_sec])
    }

    /// Lower bound of a randomized live cadence window.
    pub fn live_window_min(&self) -> Option<f64> {
        first_positive([self.ad_frequency_mins_min, self.mid_roll_every_mins_min])
    }

    pub fn live_window_max(&self) -> Option<f64> {
        first_positive([self.ad_frequency_mins_max, self.mid_roll_every_mins_max])
    }

    /// Fixed live cadence: `adFrequencyMins`, `midRollEveryMins`.
    pub fn live_fixed_mins(&self) -> Option<f64> {
        first_positive([self.ad_frequency_mins, self.mid_roll_every_mins])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Season {
    #[serde(default, deserialize_with = "loose::list")]
    pub episodes: Vec<ContentItem>,
}

/// A playable unit: movie, series, episode or live-rotation slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(default, deserialize_with = "loose::id")]
    pub id: String,
    #[serde(default, alias = "name", deserialize_with = "loose::string")]
    pub title: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "loose::string")]
    pub kind: Option<String>,

    #[serde(default, deserialize_with = "loose::object", skip_serializing_if = "Option::is_none")]
    pub monetization: Option<MonetizationField>,
    #[serde(default, deserialize_with = "loose::strict_true")]
    pub avod: bool,
    #[serde(default, deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub paywall: Option<String>,
    #[serde(default, deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,

    #[serde(default, deserialize_with = "loose::object", skip_serializing_if = "Option::is_none")]
    pub advertising: Option<AdvertisingBlock>,
    #[serde(default, deserialize_with = "loose::object", skip_serializing_if = "Option::is_none")]
    pub ads: Option<AdvertisingBlock>,
    /// Item-level legacy tag fields (`vastTag`, `preRollTag`, ... at the root).
    #[serde(flatten)]
    pub legacy: AdvertisingBlock,

    #[serde(default, rename = "runtimeMins", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub runtime_mins: Option<f64>,
    #[serde(default, deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub runtime: Option<f64>,
    #[serde(default, rename = "durationSec", deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
    #[serde(default, deserialize_with = "loose::number", skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    #[serde(default, rename = "contentPlaybackId", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub content_playback_id: Option<String>,
    #[serde(default, rename = "playbackId", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub playback_id: Option<String>,
    #[serde(default, rename = "livePlaybackId", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub live_playback_id: Option<String>,
    #[serde(default, rename = "muxPlaybackId", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub mux_playback_id: Option<String>,
    #[serde(default, rename = "trailerPlaybackId", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub trailer_playback_id: Option<String>,
    #[serde(default, rename = "streamUrl", deserialize_with = "loose::url", skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(default, rename = "videoUrl", deserialize_with = "loose::url", skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, deserialize_with = "loose::url", skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, deserialize_with = "loose::url", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, rename = "streamType", deserialize_with = "loose::string", skip_serializing_if = "Option::is_none")]
    pub stream_type: Option<String>,

    #[serde(default, rename = "isLive", deserialize_with = "loose::strict_true")]
    pub is_live: bool,
    #[serde(default, deserialize_with = "loose::strings")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "loose::list", skip_serializing_if = "Vec::is_empty")]
    pub seasons: Vec<Season>,
}

impl ContentItem {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().filter(|t| !t.trim().is_empty()).unwrap_or("Untitled")
    }

    pub fn monetization_flags(&self) -> Option<&Monetization> {
        match &self.monetization {
            Some(MonetizationField::Flags(m)) => Some(m),
            _ => None,
        }
    }

    pub fn monetization_label(&self) -> Option<&str> {
        match &self.monetization {
            Some(MonetizationField::Label(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn tvod_offer(&self) -> Option<&TvodOffer> {
        self.monetization_flags().and_then(|m| m.tvod.as_ref())
    }

    /// `advertising` wins over `ads`.
    pub fn advertising_block(&self) -> Option<&AdvertisingBlock> {
        self.advertising.as_ref().or(self.ads.as_ref())
    }

    /// Runtime in minutes from `runtimeMins`, then `runtime`.
    pub fn runtime_minutes(&self) -> Option<f64> {
        first_positive([self.runtime_mins, self.runtime])
    }

    /// Slot length for the live rotation: `durationSec`, `duration`, then runtime.
    pub fn duration_seconds(&self) -> Option<f64> {
        first_positive([self.duration_sec, self.duration])
            .or_else(|| self.runtime_minutes().map(|m| m * 60.0))
    }

    fn first_url(&self) -> Option<String> {
        first_str([&self.stream_url, &self.video_url, &self.src, &self.url]).map(str::to_string)
    }

    /// Main feature: `contentPlaybackId`, `playbackId`, `muxPlaybackId`, then a
    /// direct URL (`streamUrl`, `videoUrl`, `src`, `url`).
    pub fn content_playback(&self) -> Option<PlaybackRef> {
        first_str([&self.content_playback_id, &self.playback_id, &self.mux_playback_id])
            .map(|id| PlaybackRef::Mux(id.to_string()))
            .or_else(|| self.first_url().map(PlaybackRef::Url))
    }

    pub fn trailer_playback(&self) -> Option<PlaybackRef> {
        first_str([&self.trailer_playback_id]).map(|id| PlaybackRef::Mux(id.to_string()))
    }

    /// Live slot: `livePlaybackId`, `playbackId`, `contentPlaybackId`,
    /// `muxPlaybackId`, then a direct URL.
    pub fn live_playback(&self) -> Option<PlaybackRef> {
        first_str([
            &self.live_playback_id,
            &self.playback_id,
            &self.content_playback_id,
            &self.mux_playback_id,
        ])
        .map(|id| PlaybackRef::Mux(id.to_string()))
        .or_else(|| self.first_url().map(PlaybackRef::Url))
    }

    pub fn live_stream_type(&self) -> StreamType {
        match self.stream_type.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("live") => StreamType::Live,
            Some(_) => StreamType::OnDemand,
            None if self.is_live => StreamType::Live,
            None => StreamType::OnDemand,
        }
    }

    pub fn is_tagged_live(&self) -> bool {
        self.is_live || self.tags.iter().any(|t| t.to_lowercase().contains("live"))
    }

    /// Merge an episode over its series: the episode's own monetization,
    /// runtime and advertising win; the series fills the gaps.
    pub fn episode_view(series: &ContentItem, episode: &ContentItem) -> ContentItem {
        let mut merged = episode.clone();
        if merged.monetization.is_none() {
            merged.monetization = series.monetization.clone();
        }
        if merged.runtime_minutes().is_none() {
            merged.runtime_mins = series.runtime_minutes();
        }
        if merged.advertising_block().is_none() {
            merged.advertising = series.advertising_block().cloned();
        }
        merged
    }
}

fn first_str<const N: usize>(candidates: [&Option<String>; N]) -> Option<&str> {
    candidates
        .into_iter()
        .filter_map(|c| c.as_deref())
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn first_positive<const N: usize>(candidates: [Option<f64>; N]) -> Option<f64> {
    candidates.into_iter().flatten().find(|v| v.is_finite() && *v > 0.0)
}

/// Tolerant field deserializers. A value of the wrong shape reads as absent
/// instead of failing the whole record.
pub(crate) mod loose {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// A nested record; the wrong shape reads as absent.
    pub fn object<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(Option::<Value>::deserialize(d)?.and_then(|v| serde_json::from_value(v).ok()))
    }

    /// An array whose malformed entries are skipped one by one.
    pub fn list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Number(n)) => n.as_f64().filter(|v| v.is_finite()),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        })
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
    }

    /// Ids may be numeric in older catalogs.
    pub fn id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        })
    }

    /// A string, or an object carrying `url`, `src`, `href` or `publicUrl`.
    pub fn url<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Object(map)) => ["url", "src", "href", "publicUrl"]
                .iter()
                .filter_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::trim)
                .find(|s| !s.is_empty())
                .map(str::to_string),
            _ => None,
        })
    }

    /// Truthiness: any non-empty, non-zero, non-false value.
    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        })
    }

    pub fn strict_true<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(matches!(Option::<Value>::deserialize(d)?, Some(Value::Bool(true))))
    }

    pub fn strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        })
    }
}
