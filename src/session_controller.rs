//! Top-level orchestration: one navigation intent becomes one playback
//! session.
//!
//! Every session gets its own [`SessionContext`] with a cancellation token.
//! Opening a session always tears the previous one down first, so no timer
//! of an outgoing session survives into the next.

use crate::ad_break::{AdBreakHandle, AdBreakScheduler};
use crate::ad_config::{self, AdConfig};
use crate::ad_pod::{self, PodTrigger};
use crate::ad_runner::VastAdRunner;
use crate::ad_sdk::AdSdk;
use crate::catalog::Catalog;
use crate::config::PlayerConfig;
use crate::content::{AdvertisingBlock, ContentItem, PlaybackRef, StreamType};
use crate::entitlement::{self, AccessVerdict, AdMode};
use crate::error::{LiveError, SessionError};
use crate::live::{self, LiveChannelScheduler};
use crate::media::{self, MountRequest, PlayerSurface};
use crate::session::SessionFacts;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What the viewer asked to watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackTarget {
    Title(String),
    /// Zero-based season and episode positions within a series.
    Episode {
        series_id: String,
        season: usize,
        episode: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackKind {
    Content,
    /// Trailers are always free and never carry ads.
    Trailer,
}

/// Per-attempt context handed to every component call.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: u64,
    pub cancel: CancellationToken,
    pub config: Arc<PlayerConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub session_id: u64,
    pub playback: Option<PlaybackRef>,
    pub ad_mode: AdMode,
    pub ad_plan: Option<AdConfig>,
    /// `Some(outcome)` when a pre-roll ran.
    pub preroll_completed: Option<bool>,
    pub midrolls_armed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Playing(PlaybackReport),
    /// Entitlement refused playback; nothing was mounted.
    Blocked(AccessVerdict),
    /// The live channel has no playable entries.
    EmptyChannel,
    /// A newer navigation replaced this session before it finished starting.
    Superseded,
}

struct ActiveSession {
    context: SessionContext,
    breaks: Option<AdBreakHandle>,
    live: Option<LiveChannelScheduler>,
}

pub struct PlaybackSessionController {
    config: Arc<PlayerConfig>,
    catalog: Arc<Catalog>,
    surface: Arc<dyn PlayerSurface>,
    runner: Arc<VastAdRunner>,
    next_id: AtomicU64,
    active: Mutex<Option<ActiveSession>>,
}

/// The item to gate and the item to play. Episodes are gated under the
/// series id with the series filling missing monetization.
struct Resolved {
    gate: ContentItem,
    play: ContentItem,
    series_ads: Option<AdvertisingBlock>,
}

impl PlaybackSessionController {
    pub fn new(
        config: Arc<PlayerConfig>,
        catalog: Arc<Catalog>,
        sdk: Arc<dyn AdSdk>,
        surface: Arc<dyn PlayerSurface>,
    ) -> Self {
        let runner = Arc::new(VastAdRunner::new(sdk, &config));
        PlaybackSessionController {
            config,
            catalog,
            surface,
            runner,
            next_id: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active_session_id(&self) -> Option<u64> {
        self.active().as_ref().map(|a| a.context.id)
    }

    /// Mid-roll breaks fired in the active session.
    pub fn breaks_fired(&self) -> usize {
        self.active()
            .as_ref()
            .and_then(|a| a.breaks.as_ref())
            .map_or(0, AdBreakHandle::breaks_fired)
    }

    /// The live channel of the active session, if it is one.
    pub fn live_channel(&self) -> Option<LiveChannelScheduler> {
        self.active().as_ref().and_then(|a| a.live.clone())
    }

    /// Tear down the active session: cancel every timer it armed and unmount
    /// the player. Returns whether there was one.
    pub fn navigate_away(&self) -> bool {
        let Some(previous) = self.active().take() else {
            return false;
        };
        info!("session {} closed", previous.context.id);
        previous.context.cancel.cancel();
        if let Some(live) = &previous.live {
            live.stop();
        }
        drop(previous);
        self.surface.unmount();
        true
    }

    fn begin(&self) -> SessionContext {
        self.navigate_away();
        let context = SessionContext {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            cancel: CancellationToken::new(),
            config: self.config.clone(),
        };
        *self.active() = Some(ActiveSession {
            context: context.clone(),
            breaks: None,
            live: None,
        });
        debug!("session {} opened", context.id);
        context
    }

    /// Run `f` on the active session if it is still `context`'s.
    fn with_session(&self, context: &SessionContext, f: impl FnOnce(&mut ActiveSession)) -> bool {
        match self.active().as_mut() {
            Some(active) if active.context.id == context.id && !context.cancel.is_cancelled() => {
                f(active);
                true
            }
            _ => false,
        }
    }

    fn resolve(&self, target: &PlaybackTarget) -> Result<Resolved, SessionError> {
        match target {
            PlaybackTarget::Title(id) => {
                let item = self
                    .catalog
                    .find(id)
                    .ok_or_else(|| SessionError::UnknownContent { id: id.clone() })?;
                Ok(Resolved {
                    gate: item.clone(),
                    play: item.clone(),
                    series_ads: None,
                })
            }
            PlaybackTarget::Episode {
                series_id,
                season,
                episode,
            } => {
                let (series, ep) = self.catalog.episode(series_id, *season, *episode).ok_or_else(|| {
                    SessionError::UnknownContent {
                        id: format!("{}_s{}e{}", series_id, season + 1, episode + 1),
                    }
                })?;
                let play = ContentItem::episode_view(series, ep);
                let mut gate = play.clone();
                gate.id = series.id.clone();
                Ok(Resolved {
                    gate,
                    play,
                    series_ads: series.advertising_block().cloned(),
                })
            }
        }
    }

    /// Open a title or episode.
    ///
    /// Trailers skip entitlement. Content is gated; a denial mounts nothing.
    /// Allowed ad-supported content is mounted paused, the pre-roll runs to
    /// completion, and only then is content started and mid-rolls armed.
    pub async fn open(
        &self,
        target: PlaybackTarget,
        kind: PlaybackKind,
        facts: &SessionFacts,
    ) -> Result<SessionOutcome, SessionError> {
        // Any navigation ends the outgoing session, even one that never plays.
        self.navigate_away();
        let resolved = self.resolve(&target)?;

        if kind == PlaybackKind::Trailer {
            let playback = resolved
                .play
                .trailer_playback()
                .ok_or_else(|| SessionError::NoPlayableReference {
                    id: resolved.play.id.clone(),
                })?;
            let context = self.begin();
            info!("trailer for '{}'", resolved.play.display_title());
            self.mount(playback.clone(), true);
            return Ok(SessionOutcome::Playing(PlaybackReport {
                session_id: context.id,
                playback: Some(playback),
                ad_mode: AdMode::None,
                ad_plan: None,
                preroll_completed: None,
                midrolls_armed: false,
            }));
        }

        let verdict = entitlement::evaluate(&resolved.gate, facts);
        if !verdict.allowed {
            info!(
                "playback of '{}' blocked: {}",
                resolved.play.display_title(),
                verdict.reason.map(|r| r.to_string()).unwrap_or_default()
            );
            return Ok(SessionOutcome::Blocked(verdict));
        }

        let playback = resolved
            .play
            .content_playback()
            .ok_or_else(|| SessionError::NoPlayableReference {
                id: resolved.play.id.clone(),
            })?;

        let context = self.begin();
        let plan = if verdict.is_avod() {
            ad_config::resolve(
                &resolved.play,
                resolved.series_ads.as_ref(),
                self.catalog.advertising.as_ref(),
                self.config.fallback_tag(),
                false,
            )
        } else {
            None
        };
        info!(
            "session {}: '{}' ({}, ads: {})",
            context.id,
            resolved.play.display_title(),
            verdict.ad_mode,
            plan.is_some()
        );

        // Content stays paused until every pre-content ad has resolved.
        self.mount(playback.clone(), !verdict.is_avod());

        if verdict.is_avod() && ad_pod::should_play(&self.config, PodTrigger::AdSupported) {
            ad_pod::play_pod_over_content(&self.config, &self.surface, &context.cancel).await;
        }

        let breaks = AdBreakScheduler::new(self.runner.clone(), self.surface.clone(), &self.config);
        let preroll_completed = match plan.as_ref() {
            Some(p) if p.pre_tag.is_some() => Some(breaks.run_preroll(p, &context.cancel).await),
            _ => None,
        };

        if context.cancel.is_cancelled() {
            return Ok(SessionOutcome::Superseded);
        }
        let content = media::wait_for_media(
            self.surface.as_ref(),
            self.config.media_lookup_attempts,
            self.config.media_lookup_backoff(),
        )
        .await;
        if context.cancel.is_cancelled() {
            return Ok(SessionOutcome::Superseded);
        }
        match content.as_ref() {
            Some(media) if verdict.is_avod() => {
                media::resume_or_prompt(media.as_ref(), self.surface.as_ref());
            }
            Some(_) => {}
            None => warn!("session {}: player never mounted a media element", context.id),
        }

        let handle = match (plan.as_ref(), content) {
            (Some(p), Some(media)) => breaks.install_midrolls(p, media, &context.cancel),
            _ => None,
        };
        let midrolls_armed = handle.is_some();
        if !self.with_session(&context, |active| active.breaks = handle) {
            return Ok(SessionOutcome::Superseded);
        }

        Ok(SessionOutcome::Playing(PlaybackReport {
            session_id: context.id,
            playback: Some(playback),
            ad_mode: verdict.ad_mode,
            ad_plan: plan,
            preroll_completed,
            midrolls_armed,
        }))
    }

    /// Open the live rotation channel. The channel always carries ads when
    /// an ad tag resolves.
    pub async fn open_live(&self) -> Result<SessionOutcome, SessionError> {
        let context = self.begin();
        let queue = live::build_queue(&self.catalog, &mut fastrand::Rng::new());
        let channel = LiveChannelScheduler::new(self.surface.clone(), &self.config, &context.cancel);
        channel.load_queue(queue);

        match channel.play_index(0) {
            Ok(_) => {}
            Err(LiveError::QueueEmpty) => {
                warn!("live channel has no playable entries");
                return Ok(SessionOutcome::EmptyChannel);
            }
        }
        let stored = channel.clone();
        self.with_session(&context, move |active| active.live = Some(stored));

        if ad_pod::should_play(&self.config, PodTrigger::Live) {
            channel.begin_break();
            ad_pod::play_pod_over_content(&self.config, &self.surface, &context.cancel).await;
            channel.end_break();
        }
        if context.cancel.is_cancelled() {
            return Ok(SessionOutcome::Superseded);
        }

        let settings = ad_config::resolve_live(
            self.catalog.live_channel.as_ref(),
            self.catalog.advertising.as_ref(),
            self.config.fallback_tag(),
            self.config.live_ad_frequency_mins_fallback,
        );
        let handle = channel.start_ads(&settings, self.runner.clone(), true);
        let midrolls_armed = handle.is_some();
        self.with_session(&context, |active| active.breaks = handle);

        Ok(SessionOutcome::Playing(PlaybackReport {
            session_id: context.id,
            playback: channel.current().map(|slot| slot.playback),
            ad_mode: if midrolls_armed { AdMode::Avod } else { AdMode::None },
            ad_plan: None,
            preroll_completed: None,
            midrolls_armed,
        }))
    }

    fn mount(&self, playback: PlaybackRef, autoplay: bool) {
        self.surface.mount(MountRequest {
            playback,
            stream_type: StreamType::OnDemand,
            autoplay,
        });
    }
}

impl Drop for PlaybackSessionController {
    fn drop(&mut self) {
        if let Some(active) = self.active().take() {
            active.context.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::DenyReason;
    use crate::headless::{AdScript, HeadlessSurface, ScriptedAdSdk};
    use crate::media::MediaElement;
    use serde_json::json;
    use std::time::Duration;

    fn catalog() -> Catalog {
        Catalog::from_value(json!({
            "titles": [
                { "id": "free", "title": "Free", "playbackId": "pf", "trailerPlaybackId": "tf" },
                { "id": "avod", "title": "Ad Supported", "playbackId": "pa", "runtimeMins": 90,
                  "monetization": { "avod": true }, "advertising": { "preRollTag": "pre", "midRollTag": "mid" } },
                { "id": "clip", "title": "Clip", "playbackId": "pc", "monetization": { "avod": true },
                  "advertising": { "midRollTag": "mid", "midRollEveryMins": 1 } },
                { "id": "svod", "title": "Members", "playbackId": "ps", "trailerPlaybackId": "ts",
                  "monetization": { "svod": true } },
                { "id": "show", "type": "series", "monetization": { "tvod": { "enabled": true } },
                  "seasons": [{ "episodes": [{ "playbackId": "e1" }] }] }
            ]
        }))
        .unwrap()
    }

    fn controller(script: AdScript) -> (PlaybackSessionController, Arc<HeadlessSurface>, Arc<ScriptedAdSdk>) {
        let surface = Arc::new(HeadlessSurface::new());
        let sdk = Arc::new(ScriptedAdSdk::new(script));
        let c = PlaybackSessionController::new(
            Arc::new(PlayerConfig::default()),
            Arc::new(catalog()),
            sdk.clone(),
            surface.clone(),
        );
        (c, surface, sdk)
    }

    #[tokio::test(start_paused = true)]
    async fn denied_content_mounts_nothing() {
        let (c, surface, _) = controller(AdScript::Complete);
        let outcome = c
            .open(PlaybackTarget::Title("svod".into()), PlaybackKind::Content, &SessionFacts::anonymous())
            .await
            .unwrap();
        match outcome {
            SessionOutcome::Blocked(v) => assert_eq!(v.reason, Some(DenyReason::Login)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(surface.mounts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn trailer_bypasses_entitlement() {
        let (c, surface, sdk) = controller(AdScript::Complete);
        let outcome = c
            .open(PlaybackTarget::Title("svod".into()), PlaybackKind::Trailer, &SessionFacts::anonymous())
            .await
            .unwrap();
        assert!(matches!(outcome, SessionOutcome::Playing(_)));
        assert_eq!(surface.mounts()[0].playback, PlaybackRef::Mux("ts".into()));
        assert_eq!(sdk.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn avod_runs_preroll_before_content_starts() {
        let (c, surface, sdk) = controller(AdScript::Complete);
        let outcome = c
            .open(PlaybackTarget::Title("avod".into()), PlaybackKind::Content, &SessionFacts::anonymous())
            .await
            .unwrap();
        let SessionOutcome::Playing(report) = outcome else {
            panic!("expected playing");
        };
        assert_eq!(report.preroll_completed, Some(true));
        assert!(report.midrolls_armed);
        assert_eq!(sdk.requests()[0].tag_url, "pre");
        assert!(!surface.mounts()[0].autoplay);
        assert!(!surface.current_media().unwrap().is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_preroll_still_starts_content() {
        let (c, surface, _) = controller(AdScript::Unavailable);
        let outcome = c
            .open(PlaybackTarget::Title("avod".into()), PlaybackKind::Content, &SessionFacts::anonymous())
            .await
            .unwrap();
        let SessionOutcome::Playing(report) = outcome else {
            panic!("expected playing");
        };
        assert_eq!(report.preroll_completed, Some(false));
        assert!(!surface.current_media().unwrap().is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn episode_is_gated_under_series_id() {
        let (c, surface, _) = controller(AdScript::Complete);
        let target = PlaybackTarget::Episode {
            series_id: "show".into(),
            season: 0,
            episode: 0,
        };
        let blocked = c
            .open(target.clone(), PlaybackKind::Content, &SessionFacts::signed_in(None))
            .await
            .unwrap();
        assert!(matches!(blocked, SessionOutcome::Blocked(ref v) if v.reason == Some(DenyReason::Tvod)));

        let owner = SessionFacts::signed_in(None).with_purchase("show");
        let playing = c.open(target, PlaybackKind::Content, &owner).await.unwrap();
        assert!(matches!(playing, SessionOutcome::Playing(_)));
        assert_eq!(surface.mounts()[0].playback, PlaybackRef::Mux("e1".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_title_is_an_error() {
        let (c, _, _) = controller(AdScript::Complete);
        let err = c
            .open(PlaybackTarget::Title("nope".into()), PlaybackKind::Content, &SessionFacts::anonymous())
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownContent { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn navigating_away_cancels_midrolls() {
        let (c, surface, sdk) = controller(AdScript::Complete);
        c.open(PlaybackTarget::Title("avod".into()), PlaybackKind::Content, &SessionFacts::anonymous())
            .await
            .unwrap();
        let media = surface.current_media().unwrap();
        assert!(c.navigate_away());
        assert!(!c.navigate_away());
        media.seek(3000.0);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sdk.request_count(), 1);
        assert_eq!(surface.unmounts(), 1);
        assert!(c.active_session_id().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_navigation_still_ends_previous_session() {
        let (c, surface, sdk) = controller(AdScript::Complete);
        c.open(PlaybackTarget::Title("avod".into()), PlaybackKind::Content, &SessionFacts::anonymous())
            .await
            .unwrap();
        let old = surface.current_media().unwrap();

        let outcome = c
            .open(PlaybackTarget::Title("svod".into()), PlaybackKind::Content, &SessionFacts::anonymous())
            .await
            .unwrap();
        assert!(matches!(outcome, SessionOutcome::Blocked(_)));
        assert!(c.active_session_id().is_none());
        assert_eq!(surface.unmounts(), 1);

        old.seek(3000.0);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sdk.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_target_still_ends_previous_session() {
        let (c, surface, _) = controller(AdScript::Complete);
        c.open(PlaybackTarget::Title("free".into()), PlaybackKind::Content, &SessionFacts::anonymous())
            .await
            .unwrap();
        assert!(c
            .open(PlaybackTarget::Title("nope".into()), PlaybackKind::Trailer, &SessionFacts::anonymous())
            .await
            .is_err());
        assert!(c.active_session_id().is_none());
        assert_eq!(surface.unmounts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn content_waits_for_a_slow_mounting_player() {
        let surface = Arc::new(
            HeadlessSurface::new()
                .with_clock(Duration::from_secs(1))
                .with_mount_delay(Duration::from_millis(500)),
        );
        let sdk = Arc::new(ScriptedAdSdk::new(AdScript::Complete));
        let c = PlaybackSessionController::new(
            Arc::new(PlayerConfig::default()),
            Arc::new(catalog()),
            sdk.clone(),
            surface.clone(),
        );
        let outcome = c
            .open(PlaybackTarget::Title("clip".into()), PlaybackKind::Content, &SessionFacts::anonymous())
            .await
            .unwrap();
        let SessionOutcome::Playing(report) = outcome else {
            panic!("expected playing");
        };
        assert_eq!(report.preroll_completed, None);
        assert!(report.midrolls_armed);
        assert!(!surface.current_media().unwrap().is_paused());

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(c.breaks_fired(), 1);
        assert_eq!(sdk.requests()[0].tag_url, "mid");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_live_channel_is_reported() {
        let (c, surface, _) = controller(AdScript::Complete);
        assert_eq!(c.open_live().await.unwrap(), SessionOutcome::EmptyChannel);
        assert!(surface.mounts().is_empty());
    }
}
