//! playback_core: playback orchestration for a video streaming site.
//!
//! Decides whether an item may play, which ads run and when, drives the ad
//! SDK around content playback and runs the never-ending live channel.
//! Presentation, the ad SDK and the media element are reached through the
//! traits in [`media`] and [`ad_sdk`]; [`headless`] provides in-memory
//! versions for tests and the CLI.

pub mod ad_break;
pub mod ad_config;
pub mod ad_pod;
pub mod ad_runner;
pub mod ad_sdk;
pub mod catalog;
pub mod config;
pub mod content;
pub mod entitlement;
pub mod error;
pub mod headless;
pub mod live;
pub mod logging;
pub mod media;
pub mod session;
pub mod session_controller;
