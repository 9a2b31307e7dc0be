//! Global house-ad pod: a configured sequence of ads played on an overlay
//! before ad-supported content or the live channel.

use crate::config::{PlayerConfig, PodAd};
use crate::media::{AudioSnapshot, MediaEvent, PlayerSurface};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Which flow is about to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodTrigger {
    AdSupported,
    Live,
}

/// Whether the pod runs for `trigger` under `config`.
pub fn should_play(config: &PlayerConfig, trigger: PodTrigger) -> bool {
    let enabled = match trigger {
        PodTrigger::AdSupported => config.play_global_ads_on_avod,
        PodTrigger::Live => config.play_global_ads_on_live,
    };
    enabled && !config.global_ads.is_empty()
}

/// Play every entry in order. Each ends on `ended`, `error` or its
/// fail-safe. Returns how many entries ended normally.
pub async fn play_pod(
    ads: &[PodAd],
    surface: &Arc<dyn PlayerSurface>,
    item_timeout: Duration,
    cancel: &CancellationToken,
) -> usize {
    let mut finished = 0;
    for (index, ad) in ads.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        let Some(media) = surface.play_overlay(ad) else {
            debug!(target: "ads", "house ad {} could not start", index);
            continue;
        };
        let mut events = media.subscribe();
        let deadline = tokio::time::sleep(item_timeout);
        tokio::pin!(deadline);

        let ended = loop {
            tokio::select! {
                _ = cancel.cancelled() => break false,
                _ = &mut deadline => {
                    debug!(target: "ads", "house ad '{}' hit fail-safe", ad.label());
                    break false;
                }
                event = events.recv() => match event {
                    Ok(MediaEvent::Ended) => break true,
                    Ok(MediaEvent::Error(e)) => {
                        debug!(target: "ads", "house ad '{}' failed: {}", ad.label(), e);
                        break false;
                    }
                    Ok(MediaEvent::TimeUpdate(_)) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break false,
                },
            }
        };
        media.pause();
        surface.close_overlay();
        if ended {
            finished += 1;
        }
    }
    finished
}

/// Silence content, play the pod, then hand content back.
pub async fn play_pod_over_content(
    config: &PlayerConfig,
    surface: &Arc<dyn PlayerSurface>,
    cancel: &CancellationToken,
) -> usize {
    info!(target: "ads", "playing global ad pod ({} entries)", config.global_ads.len());
    let content = surface.media();
    let snapshot = content.as_deref().map(AudioSnapshot::hold);

    let finished = play_pod(&config.global_ads, surface, config.pod_item_timeout(), cancel).await;

    if cancel.is_cancelled() {
        return finished;
    }
    if let (Some(media), Some(snapshot)) = (surface.media(), snapshot) {
        snapshot.restore(media.as_ref(), surface.as_ref());
    }
    finished
}
