//! Seam to the external VAST-capable ad SDK.

use crate::error::AdError;
use crate::media::MediaElement;
use async_trait::async_trait;
use std::sync::Arc;

/// One ad request: the tag and the display surface size in pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdRequest {
    pub tag_url: String,
    pub slot_width: u32,
    pub slot_height: u32,
}

/// Lifecycle events of one ad request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdEvent {
    ManagerLoaded,
    Started,
    AllAdsCompleted,
    ContentResumeRequested,
    Error(String),
}

#[async_trait]
pub trait AdSdk: Send + Sync {
    /// Load the SDK script if needed. `false` when it cannot be loaded.
    async fn ensure_loaded(&self) -> bool;

    /// Register the display container against `media` and request ads.
    async fn request_ads(
        &self,
        request: AdRequest,
        media: Arc<dyn MediaElement>,
    ) -> Result<Box<dyn AdSession>, AdError>;
}

/// One in-flight ad request. Dropping it tears the SDK session down.
#[async_trait]
pub trait AdSession: Send {
    /// Next lifecycle event; `None` once the SDK closed the session.
    async fn next_event(&mut self) -> Option<AdEvent>;

    /// Initialize the ads manager at the given size and start display.
    fn start(&mut self, width: u32, height: u32) -> Result<(), AdError>;
}
