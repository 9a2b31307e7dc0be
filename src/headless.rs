//! In-memory collaborators for running sessions without a browser: a media
//! element with a virtual clock, a recording player surface and a scripted
//! ad SDK. Used by the test suites and the `simulate` CLI command.

use crate::ad_sdk::{AdEvent, AdRequest, AdSdk, AdSession};
use crate::config::PodAd;
use crate::error::AdError;
use crate::media::{MediaElement, MediaEvent, MountRequest, PlaybackBlocked, PlayerSurface};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// --- Media ---

#[derive(Debug)]
struct MediaState {
    paused: bool,
    muted: bool,
    volume: f64,
    position: f64,
    duration: Option<f64>,
    ended: bool,
    autoplay_blocked: bool,
    play_calls: usize,
}

/// Media element whose position only moves when told to (or when a clock
/// task drives it).
#[derive(Debug)]
pub struct HeadlessMedia {
    state: Mutex<MediaState>,
    events: broadcast::Sender<MediaEvent>,
}

impl HeadlessMedia {
    /// A paused element at position 0 with full volume.
    pub fn new(duration: Option<f64>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(HeadlessMedia {
            state: Mutex::new(MediaState {
                paused: true,
                muted: false,
                volume: 1.0,
                position: 0.0,
                duration,
                ended: false,
                autoplay_blocked: false,
                play_calls: 0,
            }),
            events,
        })
    }

    /// Make `play()` fail the way an autoplay policy does.
    pub fn block_autoplay(&self, blocked: bool) {
        lock(&self.state).autoplay_blocked = blocked;
    }

    pub fn play_calls(&self) -> usize {
        lock(&self.state).play_calls
    }

    pub fn is_ended(&self) -> bool {
        lock(&self.state).ended
    }

    pub fn seek(&self, secs: f64) {
        lock(&self.state).position = secs.max(0.0);
        let _ = self.events.send(MediaEvent::TimeUpdate(secs));
    }

    /// Move the position forward if playing. Reaching a known duration ends
    /// playback.
    pub fn advance(&self, secs: f64) {
        let (position, ended) = {
            let mut s = lock(&self.state);
            if s.paused || s.ended {
                return;
            }
            s.position += secs;
            if let Some(d) = s.duration {
                if s.position >= d {
                    s.position = d;
                    s.ended = true;
                    s.paused = true;
                }
            }
            (s.position, s.ended)
        };
        let _ = self.events.send(MediaEvent::TimeUpdate(position));
        if ended {
            let _ = self.events.send(MediaEvent::Ended);
        }
    }

    /// Fire `ended` now, whatever the position.
    pub fn finish(&self) {
        {
            let mut s = lock(&self.state);
            s.ended = true;
            s.paused = true;
        }
        let _ = self.events.send(MediaEvent::Ended);
    }

    pub fn fail(&self, message: &str) {
        let _ = self.events.send(MediaEvent::Error(message.to_string()));
    }

    /// Drive the position from tokio time, one `tick` at a time.
    pub fn run_clock(self: &Arc<Self>, tick: Duration) -> JoinHandle<()> {
        let media = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.tick().await;
            loop {
                interval.tick().await;
                if media.is_ended() {
                    break;
                }
                media.advance(tick.as_secs_f64());
            }
        })
    }
}

impl MediaElement for HeadlessMedia {
    fn play(&self) -> Result<(), PlaybackBlocked> {
        let mut s = lock(&self.state);
        s.play_calls += 1;
        if s.autoplay_blocked {
            return Err(PlaybackBlocked("autoplay blocked".to_string()));
        }
        s.paused = false;
        Ok(())
    }

    fn pause(&self) {
        lock(&self.state).paused = true;
    }

    fn is_paused(&self) -> bool {
        lock(&self.state).paused
    }

    fn is_muted(&self) -> bool {
        lock(&self.state).muted
    }

    fn set_muted(&self, muted: bool) {
        lock(&self.state).muted = muted;
    }

    fn volume(&self) -> f64 {
        lock(&self.state).volume
    }

    fn set_volume(&self, volume: f64) {
        lock(&self.state).volume = volume.clamp(0.0, 1.0);
    }

    fn current_time(&self) -> f64 {
        lock(&self.state).position
    }

    fn duration(&self) -> Option<f64> {
        lock(&self.state).duration
    }

    fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.events.subscribe()
    }
}

// --- Surface ---

#[derive(Debug, Default)]
struct SurfaceState {
    media: Option<Arc<HeadlessMedia>>,
    /// The mounted element is not reachable through `media()` before this.
    ready_at: Option<Instant>,
    clock: Option<JoinHandle<()>>,
    size: (u32, u32),
    hidden: bool,
    mounts: Vec<MountRequest>,
    unmounts: usize,
    tap_to_play_shown: usize,
    tap_to_play_visible: bool,
    ad_overlay: bool,
    overlay_ads: Vec<PodAd>,
    overlay_media: Option<Arc<HeadlessMedia>>,
    log: Vec<String>,
}

/// Player surface that records what the core asked of it.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    state: Mutex<SurfaceState>,
    /// Duration given to media created by `mount`; `None` plays as live.
    mount_duration: Mutex<Option<f64>>,
    clock_tick: Option<Duration>,
    mount_delay: Option<Duration>,
    /// How long a house ad plays; `None` never ends.
    pod_ad_length: Option<Duration>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        HeadlessSurface {
            pod_ad_length: Some(Duration::from_secs(15)),
            ..Default::default()
        }
    }

    /// Mounted media advance with tokio time in `tick` steps.
    pub fn with_clock(mut self, tick: Duration) -> Self {
        self.clock_tick = Some(tick);
        self
    }

    /// Mounted media only becomes reachable `delay` after `mount`.
    pub fn with_mount_delay(mut self, delay: Duration) -> Self {
        self.mount_delay = Some(delay);
        self
    }

    pub fn with_pod_ad_length(mut self, length: Option<Duration>) -> Self {
        self.pod_ad_length = length;
        self
    }

    pub fn set_mount_duration(&self, secs: Option<f64>) {
        *lock(&self.mount_duration) = secs;
    }

    /// Put an existing element in the surface as if it had been mounted.
    pub fn attach(&self, media: Arc<HeadlessMedia>) {
        lock(&self.state).media = Some(media);
    }

    pub fn set_size(&self, width: u32, height: u32) {
        lock(&self.state).size = (width, height);
    }

    pub fn set_hidden(&self, hidden: bool) {
        lock(&self.state).hidden = hidden;
    }

    pub fn current_media(&self) -> Option<Arc<HeadlessMedia>> {
        lock(&self.state).media.clone()
    }

    pub fn mounts(&self) -> Vec<MountRequest> {
        lock(&self.state).mounts.clone()
    }

    pub fn unmounts(&self) -> usize {
        lock(&self.state).unmounts
    }

    pub fn tap_to_play_shown(&self) -> usize {
        lock(&self.state).tap_to_play_shown
    }

    pub fn tap_to_play_visible(&self) -> bool {
        lock(&self.state).tap_to_play_visible
    }

    pub fn ad_overlay_active(&self) -> bool {
        lock(&self.state).ad_overlay
    }

    pub fn overlay_ads(&self) -> Vec<PodAd> {
        lock(&self.state).overlay_ads.clone()
    }

    /// The element of the house ad currently on the overlay.
    pub fn overlay_media(&self) -> Option<Arc<HeadlessMedia>> {
        lock(&self.state).overlay_media.clone()
    }

    /// Human-readable record of every surface call.
    pub fn log(&self) -> Vec<String> {
        lock(&self.state).log.clone()
    }

    fn stop_clock(state: &mut SurfaceState) {
        if let Some(clock) = state.clock.take() {
            clock.abort();
        }
    }
}

impl PlayerSurface for HeadlessSurface {
    fn media(&self) -> Option<Arc<dyn MediaElement>> {
        let s = lock(&self.state);
        if s.ready_at.is_some_and(|at| Instant::now() < at) {
            return None;
        }
        s.media.clone().map(|m| m as Arc<dyn MediaElement>)
    }

    fn size(&self) -> (u32, u32) {
        lock(&self.state).size
    }

    fn mount(&self, request: MountRequest) {
        let media = HeadlessMedia::new(*lock(&self.mount_duration));
        if request.autoplay {
            let _ = media.play();
        }
        let mut s = lock(&self.state);
        Self::stop_clock(&mut s);
        if let Some(tick) = self.clock_tick {
            s.clock = Some(media.run_clock(tick));
        }
        s.log.push(format!("mount {} ({})", request.playback, request.stream_type));
        s.mounts.push(request);
        s.media = Some(media);
        s.ready_at = self.mount_delay.map(|delay| Instant::now() + delay);
    }

    fn unmount(&self) {
        let mut s = lock(&self.state);
        Self::stop_clock(&mut s);
        if s.media.take().is_some() {
            s.unmounts += 1;
            s.log.push("unmount".to_string());
        }
    }

    fn show_tap_to_play(&self) {
        let mut s = lock(&self.state);
        s.tap_to_play_shown += 1;
        s.tap_to_play_visible = true;
        s.log.push("tap-to-play shown".to_string());
    }

    fn clear_tap_to_play(&self) {
        lock(&self.state).tap_to_play_visible = false;
    }

    fn set_ad_overlay(&self, active: bool) {
        let mut s = lock(&self.state);
        if s.ad_overlay != active {
            s.ad_overlay = active;
            s.log.push(format!("ad overlay {}", if active { "on" } else { "off" }));
        }
    }

    fn is_hidden(&self) -> bool {
        lock(&self.state).hidden
    }

    fn play_overlay(&self, ad: &PodAd) -> Option<Arc<dyn MediaElement>> {
        let media = HeadlessMedia::new(None);
        let _ = media.play();
        if let Some(length) = self.pod_ad_length {
            let finishing = media.clone();
            tokio::spawn(async move {
                tokio::time::sleep(length).await;
                finishing.finish();
            });
        }
        let mut s = lock(&self.state);
        s.log.push(format!("house ad '{}'", ad.label()));
        s.overlay_ads.push(ad.clone());
        s.overlay_media = Some(media.clone());
        Some(media)
    }

    fn close_overlay(&self) {
        let mut s = lock(&self.state);
        s.overlay_media = None;
        s.log.push("house ad closed".to_string());
    }
}

// --- Ad SDK ---

/// How one scripted ad request plays out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdScript {
    /// Loads, starts, and completes after the ad length.
    Complete,
    /// Like `Complete` but ends with a content-resume request.
    ResumeRequested,
    /// Loads, then reports an error.
    Error(String),
    /// The request itself is rejected.
    RequestFails(String),
    /// Loads and starts, then never emits another event.
    Hang,
    /// The SDK script cannot be loaded.
    Unavailable,
}

/// Ad SDK that plays back scripts in order, then repeats its fallback.
#[derive(Debug)]
pub struct ScriptedAdSdk {
    queue: Mutex<VecDeque<AdScript>>,
    fallback: AdScript,
    ad_length: Duration,
    requests: Mutex<Vec<AdRequest>>,
}

impl ScriptedAdSdk {
    pub fn new(fallback: AdScript) -> Self {
        ScriptedAdSdk {
            queue: Mutex::new(VecDeque::new()),
            fallback,
            ad_length: Duration::from_secs(5),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_ad_length(mut self, length: Duration) -> Self {
        self.ad_length = length;
        self
    }

    /// Queue scripts for the next requests, ahead of the fallback.
    pub fn then(self, script: AdScript) -> Self {
        lock(&self.queue).push_back(script);
        self
    }

    pub fn requests(&self) -> Vec<AdRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next_script(&self) -> AdScript {
        lock(&self.queue).pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl AdSdk for ScriptedAdSdk {
    async fn ensure_loaded(&self) -> bool {
        let mut queue = lock(&self.queue);
        match queue.front() {
            Some(AdScript::Unavailable) => {
                queue.pop_front();
                false
            }
            Some(_) => true,
            None => self.fallback != AdScript::Unavailable,
        }
    }

    async fn request_ads(
        &self,
        request: AdRequest,
        _media: Arc<dyn MediaElement>,
    ) -> Result<Box<dyn AdSession>, AdError> {
        lock(&self.requests).push(request);
        let script = self.next_script();
        let len = self.ad_length;
        let plan: Vec<(Duration, AdEvent)> = match script {
            AdScript::Complete => vec![
                (Duration::ZERO, AdEvent::ManagerLoaded),
                (Duration::ZERO, AdEvent::Started),
                (len, AdEvent::AllAdsCompleted),
            ],
            AdScript::ResumeRequested => vec![
                (Duration::ZERO, AdEvent::ManagerLoaded),
                (Duration::ZERO, AdEvent::Started),
                (len, AdEvent::ContentResumeRequested),
            ],
            AdScript::Error(message) => vec![
                (Duration::ZERO, AdEvent::ManagerLoaded),
                (Duration::ZERO, AdEvent::Error(message)),
            ],
            AdScript::RequestFails(message) => return Err(AdError::Request(message)),
            AdScript::Hang => vec![
                (Duration::ZERO, AdEvent::ManagerLoaded),
                (Duration::ZERO, AdEvent::Started),
            ],
            AdScript::Unavailable => return Err(AdError::SdkUnavailable),
        };
        let hang = plan.last().is_some_and(|(_, e)| *e == AdEvent::Started);
        Ok(Box::new(ScriptedSession {
            plan: plan.into(),
            hang,
        }))
    }
}

struct ScriptedSession {
    plan: VecDeque<(Duration, AdEvent)>,
    hang: bool,
}

#[async_trait]
impl AdSession for ScriptedSession {
    async fn next_event(&mut self) -> Option<AdEvent> {
        match self.plan.pop_front() {
            Some((delay, event)) => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Some(event)
            }
            None if self.hang => std::future::pending().await,
            None => None,
        }
    }

    fn start(&mut self, _width: u32, _height: u32) -> Result<(), AdError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{PlaybackRef, StreamType};

    #[tokio::test(start_paused = true)]
    async fn clock_advances_playing_media_until_end() {
        let media = HeadlessMedia::new(Some(3.0));
        media.play().unwrap();
        let mut events = media.subscribe();
        let clock = media.run_clock(Duration::from_secs(1));
        loop {
            if events.recv().await.unwrap() == MediaEvent::Ended {
                break;
            }
        }
        assert_eq!(media.current_time(), 3.0);
        clock.await.unwrap();
    }

    #[tokio::test]
    async fn mount_replaces_media_and_records_request() {
        let surface = HeadlessSurface::new();
        surface.mount(MountRequest {
            playback: PlaybackRef::Mux("abc".into()),
            stream_type: StreamType::OnDemand,
            autoplay: true,
        });
        let first = surface.current_media().unwrap();
        assert!(!first.is_paused());
        surface.mount(MountRequest {
            playback: PlaybackRef::Url("https://cdn/x.m3u8".into()),
            stream_type: StreamType::Live,
            autoplay: false,
        });
        let second = surface.current_media().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(surface.mounts().len(), 2);
        surface.unmount();
        surface.unmount();
        assert_eq!(surface.unmounts(), 1);
    }

    #[tokio::test]
    async fn scripted_sdk_consumes_queue_then_fallback() {
        let sdk = ScriptedAdSdk::new(AdScript::Complete).then(AdScript::Unavailable);
        assert!(!sdk.ensure_loaded().await);
        assert!(sdk.ensure_loaded().await);
        let media: Arc<dyn MediaElement> = HeadlessMedia::new(None);
        let request = AdRequest {
            tag_url: "t".into(),
            slot_width: 1,
            slot_height: 1,
        };
        let mut session = sdk.request_ads(request, media).await.unwrap();
        assert_eq!(session.next_event().await, Some(AdEvent::ManagerLoaded));
        assert_eq!(sdk.request_count(), 1);
    }
}
