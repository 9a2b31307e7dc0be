//! The never-ending live rotation channel.
//!
//! The scheduler owns a cyclic queue and the "now playing" slot. Each slot
//! advances on its media's `ended` event or on a duration-based fallback
//! timer, whichever fires first. A slot epoch makes the second trigger a
//! no-op. The channel also runs its own ad cadence.

use crate::ad_break::AdBreakHandle;
use crate::ad_config::{LiveAdSettings, LiveCadence};
use crate::ad_runner::{AdHooks, VastAdRunner};
use crate::catalog::Catalog;
use crate::config::PlayerConfig;
use crate::content::{ContentItem, PlaybackRef, StreamType};
use crate::error::LiveError;
use crate::media::{MediaEvent, MountRequest, PlayerSurface};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One slot of the rotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopQueueItem {
    pub id: Option<String>,
    pub label: String,
    pub playback: PlaybackRef,
    pub stream_type: StreamType,
    pub duration_secs: Option<f64>,
}

impl LoopQueueItem {
    /// `None` when the item has nothing playable.
    pub fn from_item(item: &ContentItem) -> Option<Self> {
        let playback = item.live_playback()?;
        Some(LoopQueueItem {
            id: Some(item.id.clone()).filter(|id| !id.is_empty()),
            label: item.display_title().to_string(),
            playback,
            stream_type: item.live_stream_type(),
            duration_secs: item.duration_seconds(),
        })
    }

    /// Slot length, or `default` when the duration is unknown.
    pub fn slot_length(&self, default: Duration) -> Duration {
        self.duration_secs
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(default)
    }
}

/// Id carried by a reference object: `id`, `refId`, `titleId`, `contentId`,
/// then `ref.id`, `ref.refId`.
fn reference_id(entry: &Map<String, Value>) -> Option<String> {
    let as_id = |v: &Value| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    ["id", "refId", "titleId", "contentId"]
        .iter()
        .find_map(|k| entry.get(*k).and_then(as_id))
        .or_else(|| {
            let nested = entry.get("ref")?.as_object()?;
            ["id", "refId"].iter().find_map(|k| nested.get(*k).and_then(as_id))
        })
}

fn resolve_entry(entry: &Value, catalog: &Catalog) -> Option<ContentItem> {
    match entry {
        Value::String(id) => catalog.find(id.trim()).cloned(),
        Value::Object(map) => reference_id(map)
            .and_then(|id| catalog.find(&id).cloned())
            .or_else(|| serde_json::from_value(entry.clone()).ok()),
        _ => None,
    }
}

/// Normalize raw queue entries (id strings, reference objects, inline slot
/// objects) into playable slots. With nothing resolvable, the catalog's
/// live-tagged titles stand in. Entries without a playback reference are
/// dropped.
pub fn normalize_queue(raw: &[Value], catalog: &Catalog) -> Vec<LoopQueueItem> {
    let mut items: Vec<ContentItem> = raw.iter().filter_map(|e| resolve_entry(e, catalog)).collect();
    if items.is_empty() {
        items = catalog.live_tagged_titles().cloned().collect();
    }
    items.iter().filter_map(LoopQueueItem::from_item).collect()
}

/// Build the channel queue from the catalog, shuffled unless the channel
/// turns shuffling off.
pub fn build_queue(catalog: &Catalog, rng: &mut fastrand::Rng) -> Vec<LoopQueueItem> {
    let mut queue = normalize_queue(catalog.raw_live_queue(), catalog);
    let shuffle = catalog.live_channel.as_ref().is_none_or(|c| c.should_shuffle());
    if shuffle {
        rng.shuffle(&mut queue);
    }
    queue
}

/// One row of the program guide. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveScheduleEntry {
    pub queue_index: usize,
    pub item: LoopQueueItem,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_now: bool,
}

/// Walk the queue cyclically from `index`, starting the current slot at
/// `start` and accumulating slot lengths.
pub fn project_schedule(
    queue: &[LoopQueueItem],
    index: usize,
    start: DateTime<Utc>,
    count: usize,
    default_slot: Duration,
) -> Vec<LiveScheduleEntry> {
    if queue.is_empty() {
        return Vec::new();
    }
    let mut entries = Vec::with_capacity(count);
    let mut cursor = start;
    for step in 0..count {
        let queue_index = (index + step) % queue.len();
        let item = &queue[queue_index];
        let end = chrono::Duration::from_std(item.slot_length(default_slot))
            .ok()
            .and_then(|length| cursor.checked_add_signed(length))
            .unwrap_or(cursor);
        entries.push(LiveScheduleEntry {
            queue_index,
            item: item.clone(),
            start: cursor,
            end,
            is_now: step == 0,
        });
        cursor = end;
    }
    entries
}

struct LiveState {
    queue: Arc<[LoopQueueItem]>,
    index: usize,
    slot_start: DateTime<Utc>,
    slot_end: DateTime<Utc>,
    /// Bumped on every slot change; stale triggers compare against it.
    epoch: u64,
    slot_token: Option<CancellationToken>,
    /// An ad break owns the player; slot changes wait for it to end.
    in_break: bool,
    /// Epoch of a slot whose advance was held back by a break.
    deferred: Option<u64>,
}

struct LiveInner {
    surface: Arc<dyn PlayerSurface>,
    default_slot: Duration,
    min_playback_secs: f64,
    preroll_delay: Duration,
    token: CancellationToken,
    state: Mutex<LiveState>,
}

/// Live rotation scheduler. Cheap to clone; clones share one channel.
#[derive(Clone)]
pub struct LiveChannelScheduler {
    inner: Arc<LiveInner>,
}

impl LiveChannelScheduler {
    pub fn new(surface: Arc<dyn PlayerSurface>, config: &PlayerConfig, cancel: &CancellationToken) -> Self {
        let now = Utc::now();
        LiveChannelScheduler {
            inner: Arc::new(LiveInner {
                surface,
                default_slot: config.live_default_slot(),
                min_playback_secs: config.live_min_playback_secs,
                preroll_delay: config.live_preroll_delay(),
                token: cancel.child_token(),
                state: Mutex::new(LiveState {
                    queue: Arc::from(Vec::new()),
                    index: 0,
                    slot_start: now,
                    slot_end: now,
                    epoch: 0,
                    slot_token: None,
                    in_break: false,
                    deferred: None,
                }),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LiveState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the queue wholesale and rewind to the first slot. Readers
    /// holding the previous queue keep a consistent copy.
    pub fn load_queue(&self, items: Vec<LoopQueueItem>) {
        let mut state = self.state();
        state.queue = Arc::from(items);
        state.index = 0;
        debug!("live queue loaded: {} slots", state.queue.len());
    }

    pub fn queue(&self) -> Arc<[LoopQueueItem]> {
        self.state().queue.clone()
    }

    pub fn current_index(&self) -> usize {
        self.state().index
    }

    pub fn current(&self) -> Option<LoopQueueItem> {
        let state = self.state();
        state.queue.get(state.index).cloned()
    }

    /// Virtual start and end of the current slot.
    pub fn slot_window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let state = self.state();
        (state.slot_start, state.slot_end)
    }

    /// The next `count` guide rows, starting with the current slot.
    pub fn guide(&self, count: usize) -> Vec<LiveScheduleEntry> {
        let state = self.state();
        project_schedule(&state.queue, state.index, state.slot_start, count, self.inner.default_slot)
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Stop the channel: slot timers and ad cadence both end.
    pub fn stop(&self) {
        self.inner.token.cancel();
    }

    /// Play slot `index` (wrapped into the queue).
    pub fn play_index(&self, index: usize) -> Result<usize, LiveError> {
        let mut state = self.state();
        self.play_locked(&mut state, index)
    }

    /// Move to the next slot, wrapping at the end of the queue.
    pub fn advance(&self) -> Result<usize, LiveError> {
        let mut state = self.state();
        let next = state.index + 1;
        self.play_locked(&mut state, next)
    }

    /// Hold slot changes while an ad break owns the player.
    pub fn begin_break(&self) {
        self.state().in_break = true;
    }

    /// Release the player. A slot that ran out during the break advances now.
    pub fn end_break(&self) {
        let mut state = self.state();
        state.in_break = false;
        if state.deferred.take() != Some(state.epoch) {
            return;
        }
        debug!("live slot {} ran out during a break", state.index);
        let next = state.index + 1;
        if let Err(e) = self.play_locked(&mut state, next) {
            warn!("live channel cannot advance: {}", e);
        }
    }

    /// Advance only if slot `epoch` is still the one playing.
    fn advance_from(&self, epoch: u64) {
        let mut state = self.state();
        if state.epoch != epoch {
            debug!("stale live trigger for slot epoch {}", epoch);
            return;
        }
        if state.in_break {
            state.deferred = Some(epoch);
            return;
        }
        let next = state.index + 1;
        if let Err(e) = self.play_locked(&mut state, next) {
            warn!("live channel cannot advance: {}", e);
        }
    }

    fn play_locked(&self, state: &mut LiveState, index: usize) -> Result<usize, LiveError> {
        if self.inner.token.is_cancelled() {
            return Ok(state.index);
        }
        if state.queue.is_empty() {
            return Err(LiveError::QueueEmpty);
        }
        let index = index % state.queue.len();
        let item = state.queue[index].clone();
        let length = item.slot_length(self.inner.default_slot);

        if let Some(previous) = state.slot_token.take() {
            previous.cancel();
        }
        let slot_token = self.inner.token.child_token();
        state.slot_token = Some(slot_token.clone());
        state.epoch += 1;
        state.index = index;
        state.slot_start = Utc::now();
        state.slot_end = chrono::Duration::from_std(length)
            .ok()
            .and_then(|length| state.slot_start.checked_add_signed(length))
            .unwrap_or(state.slot_start);

        info!("live slot {}: {} ({})", index, item.label, item.playback);
        self.inner.surface.mount(MountRequest {
            playback: item.playback.clone(),
            stream_type: item.stream_type,
            autoplay: true,
        });

        self.arm_slot_triggers(state.epoch, length, slot_token);
        Ok(index)
    }

    /// Arm both advance triggers for one slot: the media's `ended` event and
    /// a fallback timer for sources that never end.
    fn arm_slot_triggers(&self, epoch: u64, length: Duration, token: CancellationToken) {
        let mut events = self.inner.surface.media().map(|m| m.subscribe());
        let this = self.clone();
        tokio::spawn(async move {
            let ended = async {
                let Some(events) = events.as_mut() else {
                    return std::future::pending::<()>().await;
                };
                loop {
                    match events.recv().await {
                        Ok(MediaEvent::Ended) => return,
                        Ok(_) | Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => return std::future::pending::<()>().await,
                    }
                }
            };
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = ended => debug!("live slot ended"),
                _ = tokio::time::sleep(length) => debug!("live slot fallback timer fired"),
            }
            this.advance_from(epoch);
        });
    }

    /// Start the channel's ad cadence: an optional pre-roll shortly after
    /// start, then mid-rolls whenever the drawn delay has elapsed while
    /// content is visible, playing and past the minimum playback.
    pub fn start_ads(
        &self,
        settings: &LiveAdSettings,
        runner: Arc<VastAdRunner>,
        preroll: bool,
    ) -> Option<AdBreakHandle> {
        let tag = settings.vast_tag.clone()?;
        let token = self.inner.token.child_token();
        let fired = Arc::new(AtomicUsize::new(0));
        let worker = LiveAdWorker {
            tag,
            cadence: settings.cadence,
            surface: self.inner.surface.clone(),
            runner,
            token: token.clone(),
            fired: fired.clone(),
            min_playback_secs: self.inner.min_playback_secs,
            channel: self.clone(),
        };
        let preroll_delay = preroll.then_some(self.inner.preroll_delay);
        let task = tokio::spawn(async move { worker.run(preroll_delay).await });
        Some(AdBreakHandle::new(token, fired, task))
    }
}

struct LiveAdWorker {
    tag: String,
    cadence: LiveCadence,
    surface: Arc<dyn PlayerSurface>,
    runner: Arc<VastAdRunner>,
    token: CancellationToken,
    fired: Arc<AtomicUsize>,
    min_playback_secs: f64,
    channel: LiveChannelScheduler,
}

impl LiveAdWorker {
    async fn fire(&self) {
        self.fired.fetch_add(1, Ordering::SeqCst);
        self.channel.begin_break();
        let hooks = AdHooks::for_content(self.surface.clone(), self.token.clone());
        self.runner.run(&self.tag, &self.surface, hooks, &self.token).await;
        self.channel.end_break();
    }

    fn ready_for_break(&self) -> bool {
        let Some(media) = self.surface.media() else {
            return false;
        };
        !self.surface.is_hidden() && !media.is_paused() && media.current_time() >= self.min_playback_secs
    }

    async fn run(self, preroll_delay: Option<Duration>) {
        let mut rng = fastrand::Rng::new();

        if let Some(delay) = preroll_delay {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if self.surface.media().is_some() {
                info!(target: "ads", "live pre-roll");
                self.fire().await;
            }
        }

        let mut next_at = Instant::now() + self.cadence.next_delay(&mut rng);
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = tick.tick() => {}
            }
            if !self.ready_for_break() || Instant::now() < next_at {
                continue;
            }
            info!(target: "ads", "live mid-roll");
            self.fire().await;
            next_at = Instant::now() + self.cadence.next_delay(&mut rng);
            debug!(target: "ads", "next live break in {:?}", next_at - Instant::now());
        }
        debug!(target: "ads", "live ad cadence stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{AdScript, HeadlessSurface, ScriptedAdSdk};
    use crate::media::MediaElement;
    use chrono::TimeZone;
    use serde_json::json;

    fn slot(id: &str, secs: Option<f64>) -> LoopQueueItem {
        LoopQueueItem {
            id: Some(id.to_string()),
            label: id.to_uppercase(),
            playback: PlaybackRef::Mux(format!("pb-{}", id)),
            stream_type: StreamType::OnDemand,
            duration_secs: secs,
        }
    }

    fn channel(surface: &Arc<HeadlessSurface>) -> LiveChannelScheduler {
        let dyn_surface: Arc<dyn PlayerSurface> = surface.clone();
        LiveChannelScheduler::new(dyn_surface, &PlayerConfig::default(), &CancellationToken::new())
    }

    #[test]
    fn queue_resolves_ids_refs_and_inline_slots() {
        let catalog = Catalog::from_value(json!({
            "titles": [
                { "id": "a", "title": "Alpha", "playbackId": "pa", "durationSec": 600 },
                { "id": "b", "title": "Bravo", "streamUrl": "https://cdn/b.m3u8" },
                { "id": "c", "title": "No asset" }
            ]
        }))
        .unwrap();
        let raw = vec![
            json!("a"),
            json!({ "ref": { "id": "b" } }),
            json!("c"),
            json!({ "title": "Inline", "livePlaybackId": "pi", "streamType": "live" }),
            json!("missing"),
            json!(42),
        ];
        let queue = normalize_queue(&raw, &catalog);
        let labels: Vec<&str> = queue.iter().map(|q| q.label.as_str()).collect();
        assert_eq!(labels, ["Alpha", "Bravo", "Inline"]);
        assert_eq!(queue[0].duration_secs, Some(600.0));
        assert_eq!(queue[1].playback, PlaybackRef::Url("https://cdn/b.m3u8".into()));
        assert_eq!(queue[2].stream_type, StreamType::Live);
    }

    #[test]
    fn empty_queue_falls_back_to_live_tagged_titles() {
        let catalog = Catalog::from_value(json!({
            "titles": [
                { "id": "a", "playbackId": "pa" },
                { "id": "b", "playbackId": "pb", "tags": ["Live TV"] },
                { "id": "c", "playbackId": "pc", "isLive": true }
            ]
        }))
        .unwrap();
        let ids: Vec<_> = normalize_queue(&[], &catalog).into_iter().filter_map(|q| q.id).collect();
        assert_eq!(ids, ["b", "c"]);
    }

    #[test]
    fn shuffle_can_be_turned_off() {
        let catalog = Catalog::from_value(json!({
            "liveChannel": { "shuffle": false, "queue": ["a", "b", "c", "d"] },
            "titles": [
                { "id": "a", "playbackId": "1" }, { "id": "b", "playbackId": "2" },
                { "id": "c", "playbackId": "3" }, { "id": "d", "playbackId": "4" }
            ]
        }))
        .unwrap();
        let mut rng = fastrand::Rng::with_seed(1);
        let ids: Vec<_> = build_queue(&catalog, &mut rng).into_iter().filter_map(|q| q.id).collect();
        assert_eq!(ids, ["a", "b", "c", "d"]);
    }

    #[test]
    fn guide_walks_queue_cyclically() {
        let queue = vec![slot("x", Some(600.0)), slot("y", None), slot("z", Some(300.0))];
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let guide = project_schedule(&queue, 2, start, 4, Duration::from_secs(1800));
        let order: Vec<usize> = guide.iter().map(|e| e.queue_index).collect();
        assert_eq!(order, [2, 0, 1, 2]);
        assert!(guide[0].is_now && !guide[1].is_now);
        assert_eq!(guide[0].end, start + chrono::Duration::minutes(5));
        assert_eq!(guide[1].end, start + chrono::Duration::minutes(15));
        assert_eq!(guide[2].end, start + chrono::Duration::minutes(45));
        assert_eq!(guide[3].start, guide[2].end);
    }

    #[tokio::test(start_paused = true)]
    async fn advance_wraps_around() {
        let surface = Arc::new(HeadlessSurface::new());
        let live = channel(&surface);
        live.load_queue(vec![slot("x", None), slot("y", None), slot("z", None)]);
        assert_eq!(live.play_index(1), Ok(1));
        assert_eq!(live.advance(), Ok(2));
        assert_eq!(live.current().unwrap().label, "Z");
        assert_eq!(live.advance(), Ok(0));
        assert_eq!(live.current().unwrap().label, "X");
    }

    #[tokio::test(start_paused = true)]
    async fn n_advances_visit_every_slot_once() {
        let surface = Arc::new(HeadlessSurface::new());
        let live = channel(&surface);
        live.load_queue((0..5).map(|i| slot(&i.to_string(), None)).collect());
        live.play_index(0).unwrap();
        for _ in 0..5 {
            live.advance().unwrap();
        }
        assert_eq!(live.current_index(), 0);
        let mounted: Vec<String> = surface.mounts().iter().map(|m| m.playback.to_string()).collect();
        assert_eq!(mounted[..5], ["mux:pb-0", "mux:pb-1", "mux:pb-2", "mux:pb-3", "mux:pb-4"]);
        assert_eq!(mounted[5], "mux:pb-0");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_queue_is_reported() {
        let surface = Arc::new(HeadlessSurface::new());
        let live = channel(&surface);
        assert_eq!(live.play_index(0), Err(LiveError::QueueEmpty));
        assert!(surface.mounts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_timer_advances_indefinite_sources() {
        let surface = Arc::new(HeadlessSurface::new());
        let live = channel(&surface);
        live.load_queue(vec![slot("x", Some(60.0)), slot("y", Some(60.0))]);
        live.play_index(0).unwrap();
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(live.current_index(), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(live.current_index(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ended_and_timer_advance_only_once() {
        let surface = Arc::new(HeadlessSurface::new());
        let live = channel(&surface);
        live.load_queue(vec![slot("x", Some(60.0)), slot("y", Some(600.0)), slot("z", Some(600.0))]);
        live.play_index(0).unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        surface.current_media().unwrap().finish();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(live.current_index(), 1);

        // The first slot's fallback timer would have fired at 60s.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(live.current_index(), 1);
        assert_eq!(surface.mounts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn media_end_beats_a_long_fallback() {
        let surface = Arc::new(HeadlessSurface::new().with_clock(Duration::from_secs(1)));
        surface.set_mount_duration(Some(20.0));
        let live = channel(&surface);
        live.load_queue(vec![slot("x", Some(600.0)), slot("y", Some(600.0))]);
        live.play_index(0).unwrap();

        tokio::time::sleep(Duration::from_secs(18)).await;
        assert_eq!(live.current_index(), 0);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(live.current_index(), 1);
        assert_eq!(surface.mounts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slot_change_waits_for_running_break() {
        let surface = Arc::new(HeadlessSurface::new().with_clock(Duration::from_secs(1)));
        let live = channel(&surface);
        live.load_queue(vec![slot("x", Some(5.0)), slot("y", Some(600.0))]);
        live.play_index(0).unwrap();

        let sdk = Arc::new(ScriptedAdSdk::new(AdScript::Complete).with_ad_length(Duration::from_secs(15)));
        let runner = Arc::new(VastAdRunner::new(sdk, &PlayerConfig::default()));
        let settings = LiveAdSettings {
            vast_tag: Some("live-tag".into()),
            cadence: LiveCadence::Fixed(60.0),
        };
        let _handle = live.start_ads(&settings, runner, true).unwrap();

        // The slot runs out at 5s, inside the pre-roll.
        tokio::time::sleep(Duration::from_secs(8)).await;
        assert!(surface.ad_overlay_active());
        assert_eq!(surface.mounts().len(), 1);
        assert_eq!(live.current_index(), 0);
        let held = surface.current_media().unwrap();
        assert!(held.is_paused());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!surface.ad_overlay_active());
        assert_eq!(live.current_index(), 1);
        assert_eq!(surface.mounts().len(), 2);
        let next = surface.current_media().unwrap();
        assert!(!next.is_paused());
        assert!(!next.is_muted());
        live.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn reload_replaces_queue_without_touching_old_snapshot() {
        let surface = Arc::new(HeadlessSurface::new());
        let live = channel(&surface);
        live.load_queue(vec![slot("x", None), slot("y", None)]);
        let before = live.queue();
        live.load_queue(vec![slot("z", None)]);
        assert_eq!(before.len(), 2);
        assert_eq!(live.queue().len(), 1);
        assert_eq!(live.current_index(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_rotation() {
        let surface = Arc::new(HeadlessSurface::new());
        let live = channel(&surface);
        live.load_queue(vec![slot("x", Some(10.0)), slot("y", Some(10.0))]);
        live.play_index(0).unwrap();
        live.stop();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(live.current_index(), 0);
        assert_eq!(surface.mounts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn live_ads_run_preroll_then_cadence() {
        let surface = Arc::new(HeadlessSurface::new().with_clock(Duration::from_secs(1)));
        let live = channel(&surface);
        live.load_queue(vec![slot("x", Some(7200.0))]);
        live.play_index(0).unwrap();

        let sdk = Arc::new(ScriptedAdSdk::new(AdScript::Complete).with_ad_length(Duration::from_secs(10)));
        let runner = Arc::new(VastAdRunner::new(sdk.clone(), &PlayerConfig::default()));
        let settings = LiveAdSettings {
            vast_tag: Some("live-tag".into()),
            cadence: LiveCadence::Fixed(2.0),
        };
        let handle = live.start_ads(&settings, runner, true).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.breaks_fired(), 1);

        // Pre-roll ends at ~10.35s; the next break is two minutes later.
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(handle.breaks_fired(), 1);
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(handle.breaks_fired(), 2);
        assert!(surface.current_media().unwrap().current_time() > 10.0);
        live.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn live_ads_hold_while_hidden() {
        let surface = Arc::new(HeadlessSurface::new().with_clock(Duration::from_secs(1)));
        let live = channel(&surface);
        live.load_queue(vec![slot("x", Some(7200.0))]);
        live.play_index(0).unwrap();
        surface.set_hidden(true);

        let sdk = Arc::new(ScriptedAdSdk::new(AdScript::Complete));
        let runner = Arc::new(VastAdRunner::new(sdk.clone(), &PlayerConfig::default()));
        let settings = LiveAdSettings {
            vast_tag: Some("live-tag".into()),
            cadence: LiveCadence::Fixed(1.0),
        };
        let handle = live.start_ads(&settings, runner, false).unwrap();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(handle.breaks_fired(), 0);

        surface.set_hidden(false);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.breaks_fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn live_ads_need_a_tag() {
        let surface = Arc::new(HeadlessSurface::new());
        let live = channel(&surface);
        let sdk = Arc::new(ScriptedAdSdk::new(AdScript::Complete));
        let runner = Arc::new(VastAdRunner::new(sdk, &PlayerConfig::default()));
        let settings = LiveAdSettings {
            vast_tag: None,
            cadence: LiveCadence::Fixed(1.0),
        };
        assert!(live.start_ads(&settings, runner, true).is_none());
    }
}
