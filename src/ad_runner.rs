//! Drives one ad SDK session end-to-end.
//!
//! ```text
//! Idle -> Requesting -> AdsManagerLoaded -> DisplayingAd -> Completed
//!              \______________\_________________\_______-> Failed
//! ```
//!
//! Every run is bounded by a fail-safe ceiling and settles exactly once.

use crate::ad_sdk::{AdEvent, AdRequest, AdSdk};
use crate::config::PlayerConfig;
use crate::error::AdError;
use crate::media::{self, AudioSnapshot, MediaElement, PlayerSurface};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdRunState {
    Idle,
    Requesting,
    AdsManagerLoaded,
    DisplayingAd,
    Completed,
    Failed,
}

impl AdRunState {
    pub fn is_settled(self) -> bool {
        matches!(self, AdRunState::Completed | AdRunState::Failed)
    }
}

pub type BeforeAd = Box<dyn FnOnce() + Send>;
pub type OnComplete = Box<dyn FnOnce(bool) + Send>;

/// Callbacks around one ad session.
#[derive(Default)]
pub struct AdHooks {
    /// Runs once the display container is ready, before the ad is requested.
    pub on_before_ad: Option<BeforeAd>,
    /// Runs exactly once with the outcome.
    pub on_complete: Option<OnComplete>,
}

impl AdHooks {
    /// Hooks that silence the surface's content for the ad and hand it back
    /// afterwards.
    ///
    /// Content is not resumed when `cancel` fired: the session it belongs
    /// to is gone.
    pub fn for_content(surface: Arc<dyn PlayerSurface>, cancel: CancellationToken) -> Self {
        let held: Arc<Mutex<Option<(Arc<dyn MediaElement>, AudioSnapshot)>>> = Arc::new(Mutex::new(None));
        let hold_surface = surface.clone();
        let hold_slot = held.clone();
        AdHooks {
            on_before_ad: Some(Box::new(move || {
                if let Some(media) = hold_surface.media() {
                    let snapshot = AudioSnapshot::hold(media.as_ref());
                    *hold_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some((media, snapshot));
                }
            })),
            on_complete: Some(Box::new(move |_ok| {
                if cancel.is_cancelled() {
                    return;
                }
                let held = held.lock().unwrap_or_else(PoisonError::into_inner).take();
                match held {
                    Some((media, snapshot)) => snapshot.restore(media.as_ref(), surface.as_ref()),
                    // Ad never took over; content may still be held for it.
                    None => {
                        if let Some(media) = surface.media() {
                            media::resume_or_prompt(media.as_ref(), surface.as_ref());
                        }
                    }
                }
            })),
        }
    }

    pub fn on_complete(mut self, f: impl FnOnce(bool) + Send + 'static) -> Self {
        let inner = self.on_complete.take();
        self.on_complete = Some(Box::new(move |ok| {
            if let Some(inner) = inner {
                inner(ok);
            }
            f(ok);
        }));
        self
    }
}

/// State of one run plus its one-shot completion guard.
pub struct AdRun {
    state: AdRunState,
    on_before_ad: Option<BeforeAd>,
    on_complete: Option<OnComplete>,
}

impl AdRun {
    pub fn new(hooks: AdHooks) -> Self {
        AdRun {
            state: AdRunState::Idle,
            on_before_ad: hooks.on_before_ad,
            on_complete: hooks.on_complete,
        }
    }

    pub fn state(&self) -> AdRunState {
        self.state
    }

    fn transition(&mut self, next: AdRunState) {
        if self.state.is_settled() {
            return;
        }
        debug!(target: "ads", "ad run {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn before_ad(&mut self) {
        if let Some(f) = self.on_before_ad.take() {
            f();
        }
    }

    /// Settle the run. Only the first call has any effect; returns whether
    /// this call was it.
    pub fn settle(&mut self, ok: bool) -> bool {
        if self.state.is_settled() {
            return false;
        }
        self.transition(if ok { AdRunState::Completed } else { AdRunState::Failed });
        if let Some(f) = self.on_complete.take() {
            f(ok);
        }
        true
    }
}

pub struct VastAdRunner {
    sdk: Arc<dyn AdSdk>,
    ceiling: Duration,
    lookup_attempts: u32,
    lookup_backoff: Duration,
}

impl VastAdRunner {
    pub fn new(sdk: Arc<dyn AdSdk>, config: &PlayerConfig) -> Self {
        VastAdRunner {
            sdk,
            ceiling: config.ad_timeout(),
            lookup_attempts: config.media_lookup_attempts.max(1),
            lookup_backoff: config.media_lookup_backoff(),
        }
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Run one ad session for `tag_url` against the media in `surface`.
    ///
    /// Resolves `true` iff the session completed. Never resolves later than
    /// the configured ceiling; every failure is absorbed and logged.
    pub async fn run(
        &self,
        tag_url: &str,
        surface: &Arc<dyn PlayerSurface>,
        hooks: AdHooks,
        cancel: &CancellationToken,
    ) -> bool {
        let mut run = AdRun::new(hooks);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AdError::Cancelled),
            result = tokio::time::timeout(self.ceiling, self.drive(&mut run, tag_url, surface)) => {
                result.unwrap_or(Err(AdError::Timeout(self.ceiling)))
            }
        };

        surface.set_ad_overlay(false);
        let ok = match outcome {
            Ok(()) => true,
            Err(AdError::Cancelled) => {
                debug!(target: "ads", "ad run cancelled");
                false
            }
            Err(e) => {
                warn!(target: "ads", "ad skipped: {}", e);
                false
            }
        };
        run.settle(ok);
        ok
    }

    async fn drive(
        &self,
        run: &mut AdRun,
        tag_url: &str,
        surface: &Arc<dyn PlayerSurface>,
    ) -> Result<(), AdError> {
        if !self.sdk.ensure_loaded().await {
            return Err(AdError::SdkUnavailable);
        }

        let media = self.find_media(surface.as_ref()).await?;
        let (width, height) = media::ad_size(surface.as_ref());

        run.before_ad();
        surface.set_ad_overlay(true);

        run.transition(AdRunState::Requesting);
        let request = AdRequest {
            tag_url: tag_url.to_string(),
            slot_width: width,
            slot_height: height,
        };
        let mut session = self.sdk.request_ads(request, media).await?;

        loop {
            let event = session.next_event().await.ok_or(AdError::StreamClosed)?;
            debug!(target: "ads", "ad event {:?}", event);
            match event {
                AdEvent::ManagerLoaded => {
                    run.transition(AdRunState::AdsManagerLoaded);
                    session.start(width, height)?;
                }
                AdEvent::Started => {
                    run.transition(AdRunState::DisplayingAd);
                    surface.clear_tap_to_play();
                }
                AdEvent::AllAdsCompleted | AdEvent::ContentResumeRequested => return Ok(()),
                AdEvent::Error(message) => {
                    return Err(match run.state() {
                        AdRunState::DisplayingAd => AdError::Playback(message),
                        _ => AdError::Request(message),
                    });
                }
            }
        }
    }

    async fn find_media(&self, surface: &dyn PlayerSurface) -> Result<Arc<dyn MediaElement>, AdError> {
        media::wait_for_media(surface, self.lookup_attempts, self.lookup_backoff)
            .await
            .ok_or(AdError::MediaElementNotFound {
                attempts: self.lookup_attempts,
            })
    }
}
