//! Ad plan resolution for one playback session.
//!
//! Each value is looked up through a fixed precedence chain, first non-empty
//! wins:
//!
//! | value | chain |
//! | --- | --- |
//! | pre/mid tag | item `advertising` → item root fields → series/channel block → catalog block → configured tag |
//! | repeating cadence | item `advertising` → series/channel block → catalog block |
//! | single offset | seconds → minutes → percent of runtime → runtime midpoint |
//! | break length | item `advertising` → catalog block → 15s |

use crate::catalog::LiveChannelBlock;
use crate::content::{AdvertisingBlock, ContentItem};
use crate::entitlement::AccessFlags;
use serde::Serialize;
use std::time::Duration;

pub const DEFAULT_MID_DURATION_SECS: f64 = 15.0;
/// Live cadence used when the configured fallback is unusable.
pub const DEFAULT_LIVE_FREQUENCY_MINS: f64 = 10.0;
/// Live breaks never come closer together than this.
pub const MIN_LIVE_FREQUENCY_MINS: f64 = 1.0;
/// Longest single live break delay; keeps timer deadlines representable.
pub const MAX_LIVE_FREQUENCY_MINS: f64 = 24.0 * 60.0;

/// Resolved ad plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdConfig {
    pub pre_tag: Option<String>,
    pub mid_tag: Option<String>,
    /// Repeating cadence. Mutually exclusive with `mid_at_seconds`.
    pub mid_every_minutes: Option<f64>,
    /// Single trigger offset into the content.
    pub mid_at_seconds: Option<f64>,
    pub mid_duration_seconds: f64,
}

/// How mid-roll breaks are triggered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidRollSchedule {
    Every(Duration),
    At(Duration),
    Unscheduled,
}

impl AdConfig {
    pub fn mid_schedule(&self) -> MidRollSchedule {
        if self.mid_tag.is_none() {
            return MidRollSchedule::Unscheduled;
        }
        // Offsets too large for a Duration can never be reached.
        match (self.mid_every_minutes, self.mid_at_seconds) {
            (Some(mins), _) => Duration::try_from_secs_f64(mins * 60.0)
                .map_or(MidRollSchedule::Unscheduled, MidRollSchedule::Every),
            (None, Some(secs)) => Duration::try_from_secs_f64(secs)
                .map_or(MidRollSchedule::Unscheduled, MidRollSchedule::At),
            (None, None) => MidRollSchedule::Unscheduled,
        }
    }
}

fn pick_tag<'a>(
    levels: &[Option<&'a AdvertisingBlock>],
    fallback: Option<&'a str>,
    get: fn(&'a AdvertisingBlock) -> Option<&'a str>,
) -> Option<String> {
    levels
        .iter()
        .flatten()
        .find_map(|&block| get(block))
        .or(fallback.map(str::trim).filter(|s| !s.is_empty()))
        .map(str::to_string)
}

fn pick_number<'a>(
    levels: &[Option<&'a AdvertisingBlock>],
    get: fn(&'a AdvertisingBlock) -> Option<f64>,
) -> Option<f64> {
    levels.iter().flatten().find_map(|&block| get(block))
}

/// Resolve the ad plan for `item`.
///
/// Returns `None` when the item does not carry ads (not ad-supported and not
/// forced, or transactional) or when neither a pre- nor a mid-roll tag
/// resolved.
pub fn resolve(
    item: &ContentItem,
    overrides: Option<&AdvertisingBlock>,
    global: Option<&AdvertisingBlock>,
    fallback_tag: Option<&str>,
    force_ad_mode: bool,
) -> Option<AdConfig> {
    let flags = AccessFlags::of(item);
    if (!flags.ad_supported && !force_ad_mode) || flags.transactional {
        return None;
    }

    let own = item.advertising_block();
    let tag_levels = [own, Some(&item.legacy), overrides, global];

    let pre_tag = pick_tag(&tag_levels, fallback_tag, AdvertisingBlock::pre_roll);
    let mid_tag = pick_tag(&tag_levels, fallback_tag, AdvertisingBlock::mid_roll);
    if pre_tag.is_none() && mid_tag.is_none() {
        return None;
    }

    let mid_every_minutes = pick_number(&[own, overrides, global], AdvertisingBlock::mid_every_mins);

    let mid_at_seconds = if mid_every_minutes.is_some() {
        None
    } else {
        single_offset_seconds(item, &[own, overrides])
    };

    let mid_duration_seconds = pick_number(&[own, global], AdvertisingBlock::mid_duration_secs)
        .unwrap_or(DEFAULT_MID_DURATION_SECS);

    Some(AdConfig {
        pre_tag,
        mid_tag,
        mid_every_minutes,
        mid_at_seconds,
        mid_duration_seconds,
    })
}

/// Explicit seconds, explicit minutes, percent of a known runtime, then the
/// runtime midpoint. Unknown runtime and no explicit offset leaves the
/// mid-roll unscheduled.
fn single_offset_seconds(item: &ContentItem, levels: &[Option<&AdvertisingBlock>]) -> Option<f64> {
    let runtime_secs = item.runtime_minutes().map(|m| m * 60.0);

    if let Some(secs) = pick_number(levels, AdvertisingBlock::mid_at_seconds) {
        return Some(secs);
    }
    if let Some(mins) = pick_number(levels, AdvertisingBlock::mid_at_minutes) {
        return Some(mins * 60.0);
    }
    if let (Some(pct), Some(runtime)) = (pick_number(levels, AdvertisingBlock::mid_at_percent), runtime_secs) {
        return Some(runtime * pct / 100.0);
    }
    runtime_secs.map(|runtime| runtime / 2.0)
}

/// Live channel ad cadence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum LiveCadence {
    /// Break every `n` minutes.
    Fixed(f64),
    /// Break after a delay drawn uniformly from `[min, max)` minutes, redrawn
    /// after every break.
    Window { min: f64, max: f64 },
}

impl LiveCadence {
    pub fn next_delay(&self, rng: &mut fastrand::Rng) -> Duration {
        let mins = match *self {
            LiveCadence::Fixed(mins) => mins,
            LiveCadence::Window { min, max } => {
                let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
                lo + rng.f64() * (hi - lo)
            }
        };
        let mins = if mins.is_nan() { MIN_LIVE_FREQUENCY_MINS } else { mins };
        Duration::from_secs_f64(mins.clamp(MIN_LIVE_FREQUENCY_MINS, MAX_LIVE_FREQUENCY_MINS) * 60.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveAdSettings {
    pub vast_tag: Option<String>,
    pub cadence: LiveCadence,
}

/// Resolve the live channel's ad settings.
///
/// Tag: channel `advertising` → channel root fields → catalog block →
/// configured tag. Cadence: a min/max window wins over a fixed value, which
/// wins over `fallback_mins`. A non-positive fallback means
/// [`DEFAULT_LIVE_FREQUENCY_MINS`].
pub fn resolve_live(
    channel: Option<&LiveChannelBlock>,
    global: Option<&AdvertisingBlock>,
    fallback_tag: Option<&str>,
    fallback_mins: f64,
) -> LiveAdSettings {
    let own = channel.and_then(LiveChannelBlock::advertising_block);
    let fields = channel.map(|c| &c.legacy);

    let vast_tag = pick_tag(&[own, fields, global], fallback_tag, AdvertisingBlock::live_tag);

    let levels = [own, fields];
    let min = pick_number(&levels, AdvertisingBlock::live_window_min);
    let max = pick_number(&levels, AdvertisingBlock::live_window_max);
    let fixed = pick_number(&levels, AdvertisingBlock::live_fixed_mins);

    let fallback_mins = if fallback_mins.is_finite() && fallback_mins > 0.0 {
        fallback_mins
    } else {
        DEFAULT_LIVE_FREQUENCY_MINS
    };
    let cadence = match (min, max) {
        (Some(min), Some(max)) => LiveCadence::Window { min, max },
        _ => LiveCadence::Fixed(fixed.unwrap_or(fallback_mins)),
    };

    LiveAdSettings { vast_tag, cadence }
}
