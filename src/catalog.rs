//! Read-only catalog boundary: titles, the catalog-wide advertising block and
//! the live channel block, indexed for id lookup.

use crate::content::{loose, AdvertisingBlock, ContentItem};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Live rotation channel block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveChannelBlock {
    #[serde(default, deserialize_with = "loose::object", skip_serializing_if = "Option::is_none")]
    pub advertising: Option<AdvertisingBlock>,
    #[serde(default, deserialize_with = "loose::object", skip_serializing_if = "Option::is_none")]
    pub ads: Option<AdvertisingBlock>,
    /// Tag and cadence fields placed directly on the channel.
    #[serde(flatten)]
    pub legacy: AdvertisingBlock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub titles: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shuffle: Option<bool>,
}

impl LiveChannelBlock {
    pub fn advertising_block(&self) -> Option<&AdvertisingBlock> {
        self.advertising.as_ref().or(self.ads.as_ref())
    }

    /// First of `queue`, `items`, `titles`, `playlist`.
    pub fn raw_queue(&self) -> Option<&[Value]> {
        [&self.queue, &self.items, &self.titles, &self.playlist]
            .into_iter()
            .find_map(|q| q.as_deref())
    }

    /// Shuffling is on unless explicitly disabled.
    pub fn should_shuffle(&self) -> bool {
        self.shuffle != Some(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ChannelMap {
    #[serde(default, deserialize_with = "object_or_none")]
    live: Option<LiveChannelBlock>,
    #[serde(default, rename = "LIVE", deserialize_with = "object_or_none")]
    live_upper: Option<LiveChannelBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCatalog {
    #[serde(default, deserialize_with = "title_list")]
    titles: Option<Vec<ContentItem>>,
    #[serde(default, rename = "publishedTitles", deserialize_with = "title_list")]
    published_titles: Option<Vec<ContentItem>>,
    #[serde(default, deserialize_with = "title_list")]
    items: Option<Vec<ContentItem>>,
    #[serde(default, deserialize_with = "object_or_none")]
    advertising: Option<AdvertisingBlock>,
    #[serde(default, deserialize_with = "object_or_none")]
    ads: Option<AdvertisingBlock>,
    #[serde(default, rename = "loopChannel", deserialize_with = "object_or_none")]
    loop_channel: Option<LiveChannelBlock>,
    #[serde(default, rename = "liveChannel", deserialize_with = "object_or_none")]
    live_channel: Option<LiveChannelBlock>,
    #[serde(default, deserialize_with = "object_or_none")]
    channels: Option<ChannelMap>,
    #[serde(default, deserialize_with = "object_or_none")]
    live: Option<LiveChannelBlock>,
    #[serde(default, rename = "LIVE", deserialize_with = "object_or_none")]
    live_upper: Option<LiveChannelBlock>,
    #[serde(default, rename = "loopQueue", deserialize_with = "object_or_none")]
    loop_queue: Option<Vec<Value>>,
    #[serde(default, rename = "liveQueue", deserialize_with = "object_or_none")]
    live_queue: Option<Vec<Value>>,
}

/// Deserialize when the shape matches, otherwise treat the field as absent.
fn object_or_none<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(d)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

/// Title arrays are parsed entry by entry; a malformed title is dropped
/// without taking its neighbours with it.
fn title_list<'de, D>(d: D) -> Result<Option<Vec<ContentItem>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| match serde_json::from_value(item) {
                    Ok(title) => Some(title),
                    Err(e) => {
                        warn!("skipping malformed catalog title: {}", e);
                        None
                    }
                })
                .collect(),
        ),
        _ => None,
    })
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub titles: Vec<ContentItem>,
    pub advertising: Option<AdvertisingBlock>,
    pub live_channel: Option<LiveChannelBlock>,
    /// Catalog-level live queue (`loopQueue`/`liveQueue`).
    pub live_queue: Vec<Value>,
    by_id: HashMap<String, ContentItem>,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: RawCatalog = serde_json::from_str(json)?;
        Ok(Self::from_raw(raw))
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let raw: RawCatalog = serde_json::from_value(value)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawCatalog) -> Self {
        let channels = raw.channels.unwrap_or_default();
        let live_channel = raw
            .loop_channel
            .or(raw.live_channel)
            .or(channels.live)
            .or(channels.live_upper)
            .or(raw.live)
            .or(raw.live_upper);

        let mut catalog = Catalog {
            titles: raw
                .titles
                .or(raw.published_titles)
                .or(raw.items)
                .unwrap_or_default(),
            advertising: raw.advertising.or(raw.ads),
            live_channel,
            live_queue: raw.loop_queue.or(raw.live_queue).unwrap_or_default(),
            by_id: HashMap::new(),
        };
        catalog.reindex();
        catalog
    }

    pub fn with_titles(titles: Vec<ContentItem>) -> Self {
        let mut catalog = Catalog {
            titles,
            ..Default::default()
        };
        catalog.reindex();
        catalog
    }

    /// Index titles and episodes by id. Episodes without an id get
    /// `<series>_s<season>e<episode>` (1-based).
    fn reindex(&mut self) {
        self.by_id.clear();
        for title in &mut self.titles {
            if title.id.is_empty() {
                continue;
            }
            for (si, season) in title.seasons.iter_mut().enumerate() {
                for (ei, episode) in season.episodes.iter_mut().enumerate() {
                    if episode.id.is_empty() {
                        episode.id = format!("{}_s{}e{}", title.id, si + 1, ei + 1);
                    }
                }
            }
        }
        for title in &self.titles {
            if title.id.is_empty() {
                continue;
            }
            self.by_id.insert(title.id.clone(), title.clone());
            for episode in title.seasons.iter().flat_map(|s| s.episodes.iter()) {
                self.by_id.insert(episode.id.clone(), episode.clone());
            }
        }
    }

    pub fn find(&self, id: &str) -> Option<&ContentItem> {
        self.by_id.get(id)
    }

    pub fn episode(&self, series_id: &str, season: usize, episode: usize) -> Option<(&ContentItem, &ContentItem)> {
        let series = self.titles.iter().find(|t| t.id == series_id)?;
        let ep = series.seasons.get(season)?.episodes.get(episode)?;
        Some((series, ep))
    }

    /// Raw live queue: the channel's own list, then the catalog-level one.
    pub fn raw_live_queue(&self) -> &[Value] {
        self.live_channel
            .as_ref()
            .and_then(LiveChannelBlock::raw_queue)
            .unwrap_or(self.live_queue.as_slice())
    }

    pub fn live_tagged_titles(&self) -> impl Iterator<Item = &ContentItem> {
        self.titles.iter().filter(|t| t.is_tagged_live())
    }

    pub fn len(&self) -> usize {
        self.titles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.titles.is_empty()
    }
}
