//! Pre-roll and mid-roll triggering for one on-demand session.
//!
//! Pre-roll runs once and is awaited by the caller. Mid-rolls are driven by a
//! background task that either repeats on an interval or fires once at an
//! offset. The task stops when content ends or the session is cancelled.

use crate::ad_config::{AdConfig, MidRollSchedule};
use crate::ad_runner::{AdHooks, VastAdRunner};
use crate::config::PlayerConfig;
use crate::media::{MediaElement, MediaEvent, PlayerSurface};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Check cadence for the repeating mode.
pub const REPEAT_TICK: Duration = Duration::from_secs(1);

/// Position check cadence for the single-shot mode.
pub const SINGLE_SHOT_TICK: Duration = Duration::from_millis(250);

pub struct AdBreakScheduler {
    runner: Arc<VastAdRunner>,
    surface: Arc<dyn PlayerSurface>,
    min_playback_secs: f64,
}

impl AdBreakScheduler {
    pub fn new(runner: Arc<VastAdRunner>, surface: Arc<dyn PlayerSurface>, config: &PlayerConfig) -> Self {
        AdBreakScheduler {
            runner,
            surface,
            min_playback_secs: config.midroll_min_playback_secs,
        }
    }

    /// Run the pre-roll, holding content paused until the runner resolves.
    /// Returns `false` when there was no pre-roll or it did not complete.
    pub async fn run_preroll(&self, plan: &AdConfig, cancel: &CancellationToken) -> bool {
        let Some(tag) = plan.pre_tag.as_deref() else {
            return false;
        };
        info!(target: "ads", "pre-roll");
        let hooks = AdHooks::for_content(self.surface.clone(), cancel.clone());
        self.runner.run(tag, &self.surface, hooks, cancel).await
    }

    /// Arm mid-roll triggering for `media`. `None` when the plan schedules no
    /// mid-roll.
    pub fn install_midrolls(
        &self,
        plan: &AdConfig,
        media: Arc<dyn MediaElement>,
        cancel: &CancellationToken,
    ) -> Option<AdBreakHandle> {
        let tag = plan.mid_tag.clone()?;
        let schedule = plan.mid_schedule();
        if schedule == MidRollSchedule::Unscheduled {
            return None;
        }

        let token = cancel.child_token();
        let fired = Arc::new(AtomicUsize::new(0));
        let worker = MidRollWorker {
            tag,
            media,
            surface: self.surface.clone(),
            runner: self.runner.clone(),
            token: token.clone(),
            fired: fired.clone(),
        };

        let task = match schedule {
            MidRollSchedule::Every(every) => {
                debug!(target: "ads", "mid-roll every {:?}", every);
                let min_playback = self.min_playback_secs;
                tokio::spawn(async move { worker.repeating(every, min_playback).await })
            }
            MidRollSchedule::At(offset) => {
                debug!(target: "ads", "mid-roll once at {:?}", offset);
                tokio::spawn(async move { worker.single_shot(offset.as_secs_f64()).await })
            }
            MidRollSchedule::Unscheduled => return None,
        };

        Some(AdBreakHandle::new(token, fired, task))
    }
}

/// Owns the mid-roll task. Dropping the handle cancels it.
pub struct AdBreakHandle {
    token: CancellationToken,
    fired: Arc<AtomicUsize>,
    task: Option<JoinHandle<()>>,
}

impl AdBreakHandle {
    pub(crate) fn new(token: CancellationToken, fired: Arc<AtomicUsize>, task: JoinHandle<()>) -> Self {
        AdBreakHandle {
            token,
            fired,
            task: Some(task),
        }
    }

    /// Stop triggering. Safe to call any number of times.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Mid-roll breaks started so far.
    pub fn breaks_fired(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }

    /// Cancel and wait for the task to wind down.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for AdBreakHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct MidRollWorker {
    tag: String,
    media: Arc<dyn MediaElement>,
    surface: Arc<dyn PlayerSurface>,
    runner: Arc<VastAdRunner>,
    token: CancellationToken,
    fired: Arc<AtomicUsize>,
}

/// What a media event means for the trigger loop.
enum Flow {
    Continue,
    Stop,
}

fn on_media_event(event: Result<MediaEvent, RecvError>) -> Flow {
    match event {
        Ok(MediaEvent::Ended) | Err(RecvError::Closed) => Flow::Stop,
        Ok(_) | Err(RecvError::Lagged(_)) => Flow::Continue,
    }
}

impl MidRollWorker {
    async fn fire(&self) {
        self.fired.fetch_add(1, Ordering::SeqCst);
        info!(target: "ads", "mid-roll break {}", self.fired.load(Ordering::SeqCst));
        let hooks = AdHooks::for_content(self.surface.clone(), self.token.clone());
        self.runner.run(&self.tag, &self.surface, hooks, &self.token).await;
    }

    /// Fire whenever the interval has elapsed since the last break and
    /// content has played past the minimum threshold.
    async fn repeating(self, every: Duration, min_playback_secs: f64) {
        let mut events = self.media.subscribe();
        let mut tick = tokio::time::interval(REPEAT_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_break = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                event = events.recv() => {
                    if let Flow::Stop = on_media_event(event) {
                        break;
                    }
                }
                _ = tick.tick() => {
                    if last_break.elapsed() < every || self.media.current_time() < min_playback_secs {
                        continue;
                    }
                    self.fire().await;
                    last_break = Instant::now();
                }
            }
        }
        debug!(target: "ads", "mid-roll trigger stopped");
    }

    /// Fire once when playback crosses `offset_secs`.
    async fn single_shot(self, offset_secs: f64) {
        let mut events = self.media.subscribe();
        let mut tick = tokio::time::interval(SINGLE_SHOT_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                event = events.recv() => {
                    if let Flow::Stop = on_media_event(event) {
                        break;
                    }
                }
                _ = tick.tick() => {
                    if self.media.current_time() >= offset_secs {
                        self.fire().await;
                        break;
                    }
                }
            }
        }
        debug!(target: "ads", "single mid-roll trigger stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{AdScript, HeadlessMedia, HeadlessSurface, ScriptedAdSdk};

    fn plan(every: Option<f64>, at: Option<f64>) -> AdConfig {
        AdConfig {
            pre_tag: Some("pre".into()),
            mid_tag: Some("mid".into()),
            mid_every_minutes: every,
            mid_at_seconds: at,
            mid_duration_seconds: 15.0,
        }
    }

    fn setup(script: AdScript) -> (AdBreakScheduler, Arc<ScriptedAdSdk>, Arc<HeadlessMedia>) {
        let config = PlayerConfig::default();
        let sdk = Arc::new(ScriptedAdSdk::new(script).with_ad_length(Duration::from_secs(10)));
        let runner = Arc::new(VastAdRunner::new(sdk.clone(), &config));
        let surface = Arc::new(HeadlessSurface::new());
        let media = HeadlessMedia::new(Some(7200.0));
        media.play().unwrap();
        surface.attach(media.clone());
        let scheduler = AdBreakScheduler::new(runner, surface, &config);
        (scheduler, sdk, media)
    }

    #[tokio::test(start_paused = true)]
    async fn preroll_without_tag_is_skipped() {
        let (scheduler, sdk, _media) = setup(AdScript::Complete);
        let mut p = plan(None, None);
        p.pre_tag = None;
        assert!(!scheduler.run_preroll(&p, &CancellationToken::new()).await);
        assert_eq!(sdk.request_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_waits_for_interval_and_threshold() {
        let (scheduler, sdk, media) = setup(AdScript::Complete);
        let _clock = media.run_clock(Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let handle = scheduler.install_midrolls(&plan(Some(1.0), None), media.clone(), &cancel).unwrap();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(handle.breaks_fired(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.breaks_fired(), 1);
        assert_eq!(sdk.request_count(), 1);

        // Baseline resets after the break.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.breaks_fired(), 1);
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_respects_minimum_playback() {
        let (scheduler, _sdk, media) = setup(AdScript::Complete);
        media.pause();
        let cancel = CancellationToken::new();
        let handle = scheduler.install_midrolls(&plan(Some(0.1), None), media.clone(), &cancel).unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.breaks_fired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn single_shot_fires_once_at_offset() {
        let (scheduler, sdk, media) = setup(AdScript::Complete);
        let cancel = CancellationToken::new();
        let handle = scheduler.install_midrolls(&plan(None, Some(120.0)), media.clone(), &cancel).unwrap();

        media.seek(119.0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.breaks_fired(), 0);

        media.seek(121.0);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.breaks_fired(), 1);

        media.seek(130.0);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.breaks_fired(), 1);
        assert_eq!(sdk.request_count(), 1);
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn content_end_stops_triggering() {
        let (scheduler, _sdk, media) = setup(AdScript::Complete);
        let cancel = CancellationToken::new();
        let handle = scheduler.install_midrolls(&plan(None, Some(120.0)), media.clone(), &cancel).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        media.finish();
        tokio::time::sleep(Duration::from_secs(1)).await;
        media.seek(200.0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.breaks_fired(), 0);
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn double_cancel_is_harmless() {
        let (scheduler, sdk, media) = setup(AdScript::Complete);
        let cancel = CancellationToken::new();
        let handle = scheduler.install_midrolls(&plan(None, Some(5.0)), media.clone(), &cancel).unwrap();
        handle.cancel();
        handle.cancel();
        media.seek(10.0);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sdk.request_count(), 0);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unscheduled_plan_installs_nothing() {
        let (scheduler, _sdk, media) = setup(AdScript::Complete);
        let mut p = plan(None, None);
        assert!(scheduler.install_midrolls(&p, media.clone(), &CancellationToken::new()).is_none());
        p.mid_tag = None;
        p.mid_every_minutes = Some(5.0);
        assert!(scheduler.install_midrolls(&p, media, &CancellationToken::new()).is_none());
    }
}
