//! Seams to the presentation layer: the media element backing content and
//! the surface the core mounts players into.

use crate::config::PodAd;
use crate::content::{PlaybackRef, StreamType};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

/// Ad display size used when the surface reports no usable dimensions.
pub const DEFAULT_AD_SIZE: (u32, u32) = (640, 360);

#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Playback position moved (seconds).
    TimeUpdate(f64),
    Ended,
    Error(String),
}

/// `play()` was refused, usually by an autoplay policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("playback refused: {0}")]
pub struct PlaybackBlocked(pub String);

/// The `<video>`-equivalent element. Exclusively owned by one session; the ad
/// path only borrows it.
pub trait MediaElement: Send + Sync {
    fn play(&self) -> Result<(), PlaybackBlocked>;
    fn pause(&self);
    fn is_paused(&self) -> bool;
    fn is_muted(&self) -> bool;
    fn set_muted(&self, muted: bool);
    fn volume(&self) -> f64;
    fn set_volume(&self, volume: f64);
    /// Playback position in seconds.
    fn current_time(&self) -> f64;
    /// Known duration in seconds; `None` for live or not-yet-loaded sources.
    fn duration(&self) -> Option<f64>;
    fn subscribe(&self) -> broadcast::Receiver<MediaEvent>;
}

/// What to put into the player surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    pub playback: PlaybackRef,
    pub stream_type: StreamType,
    pub autoplay: bool,
}

/// The container the core mounts a player into. The core owns no markup; it
/// only asks the surface to mount, unmount and show affordances.
pub trait PlayerSurface: Send + Sync {
    /// The mounted media element, if the player has finished mounting.
    fn media(&self) -> Option<Arc<dyn MediaElement>>;
    /// Pixel size of the ad display area. `(0, 0)` when unknown.
    fn size(&self) -> (u32, u32);
    fn mount(&self, request: MountRequest);
    fn unmount(&self);
    fn show_tap_to_play(&self);
    fn clear_tap_to_play(&self);
    fn set_ad_overlay(&self, active: bool);
    /// Whether the page is in the background.
    fn is_hidden(&self) -> bool;
    /// Start one house ad on a full-screen overlay. `None` when the overlay
    /// could not be created.
    fn play_overlay(&self, ad: &PodAd) -> Option<Arc<dyn MediaElement>>;
    fn close_overlay(&self);
}

/// Ad display size for `surface`, or [`DEFAULT_AD_SIZE`].
pub fn ad_size(surface: &dyn PlayerSurface) -> (u32, u32) {
    match surface.size() {
        (w, h) if w > 0 && h > 0 => (w, h),
        _ => DEFAULT_AD_SIZE,
    }
}

/// The player may still be mounting: poll for its media element up to
/// `attempts` times, `backoff` apart.
pub async fn wait_for_media(
    surface: &dyn PlayerSurface,
    attempts: u32,
    backoff: Duration,
) -> Option<Arc<dyn MediaElement>> {
    for attempt in 1..=attempts.max(1) {
        if let Some(media) = surface.media() {
            return Some(media);
        }
        if attempt < attempts {
            tokio::time::sleep(backoff).await;
        }
    }
    None
}

/// Resume content; if autoplay policy refuses, show the tap-to-play prompt
/// instead of stalling silently.
pub fn resume_or_prompt(media: &dyn MediaElement, surface: &dyn PlayerSurface) -> bool {
    match media.play() {
        Ok(()) => true,
        Err(e) => {
            debug!(target: "ads", "resume refused ({}), showing tap-to-play", e);
            surface.show_tap_to_play();
            false
        }
    }
}

/// Content audio state captured before an ad takes over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSnapshot {
    pub was_paused: bool,
    pub muted: bool,
    pub volume: f64,
}

impl AudioSnapshot {
    /// Capture, then silence content: mute, zero volume, pause.
    pub fn hold(media: &dyn MediaElement) -> Self {
        let snapshot = AudioSnapshot {
            was_paused: media.is_paused(),
            muted: media.is_muted(),
            volume: media.volume(),
        };
        media.set_muted(true);
        media.set_volume(0.0);
        media.pause();
        snapshot
    }

    /// Put mute and volume back, and resume if content was playing.
    pub fn restore(&self, media: &dyn MediaElement, surface: &dyn PlayerSurface) {
        media.set_muted(self.muted);
        media.set_volume(self.volume);
        if !self.was_paused {
            resume_or_prompt(media, surface);
        }
    }
}
