use clap::{Parser, Subcommand, ValueEnum};
use playback_core::ad_config;
use playback_core::catalog::Catalog;
use playback_core::config::PlayerConfig;
use playback_core::entitlement;
use playback_core::headless::{AdScript, HeadlessSurface, ScriptedAdSdk};
use playback_core::live;
use playback_core::logging;
use playback_core::session::SessionFacts;
use playback_core::session_controller::{
    PlaybackKind, PlaybackSessionController, PlaybackTarget, SessionOutcome,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "playback-core", about = "Playback orchestration CLI")]
struct Cli {
    /// Player config file (defaults to ./config.json, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Catalog JSON file
    #[arg(long, global = true, default_value = "catalog.json")]
    catalog: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate access to a title for a viewer
    Verdict {
        /// Title id
        id: String,
        /// Session facts JSON file (anonymous when omitted)
        #[arg(long)]
        facts: Option<PathBuf>,
    },
    /// Print the resolved ad plan for a title
    Ads {
        /// Title id
        id: String,
        /// Resolve even when the title is not ad-supported
        #[arg(long)]
        force: bool,
    },
    /// Print the live channel program guide
    Guide {
        /// Number of rows
        #[arg(short = 'n', long, default_value_t = 8)]
        count: usize,
        /// Shuffle seed, for a reproducible order
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run a session headlessly against a scripted ad SDK
    Simulate {
        /// Title id, or "live" for the live channel
        target: String,
        /// Session facts JSON file (anonymous when omitted)
        #[arg(long)]
        facts: Option<PathBuf>,
        /// How every ad request plays out
        #[arg(long, value_enum, default_value_t = Script::Complete)]
        script: Script,
        /// Virtual seconds to keep the session running
        #[arg(long, default_value_t = 1800)]
        seconds: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Script {
    Complete,
    Resume,
    Error,
    Hang,
    Unavailable,
}

impl From<Script> for AdScript {
    fn from(script: Script) -> Self {
        match script {
            Script::Complete => AdScript::Complete,
            Script::Resume => AdScript::ResumeRequested,
            Script::Error => AdScript::Error("no fill".to_string()),
            Script::Hang => AdScript::Hang,
            Script::Unavailable => AdScript::Unavailable,
        }
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}

fn load_catalog(path: &Path) -> Catalog {
    let data = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("cannot read catalog '{}': {}", path.display(), e)));
    Catalog::from_json(&data)
        .unwrap_or_else(|e| fail(format!("cannot parse catalog '{}': {}", path.display(), e)))
}

fn load_facts(path: Option<&Path>) -> SessionFacts {
    let Some(path) = path else {
        return SessionFacts::anonymous();
    };
    let data = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("cannot read facts '{}': {}", path.display(), e)));
    serde_json::from_str(&data)
        .unwrap_or_else(|e| fail(format!("cannot parse facts '{}': {}", path.display(), e)))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => fail(e),
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PlayerConfig::load(path).unwrap_or_else(|e| fail(e)),
        None => PlayerConfig::load_default(),
    };
    let _ = logging::init_logging(config.ads_debug);
    let catalog = load_catalog(&cli.catalog);

    match cli.command {
        Commands::Verdict { id, facts } => {
            let item = catalog
                .find(&id)
                .unwrap_or_else(|| fail(format!("no title '{}' in catalog", id)));
            let facts = load_facts(facts.as_deref());
            print_json(&entitlement::evaluate(item, &facts));
        }
        Commands::Ads { id, force } => {
            let item = catalog
                .find(&id)
                .unwrap_or_else(|| fail(format!("no title '{}' in catalog", id)));
            let plan = ad_config::resolve(
                item,
                None,
                catalog.advertising.as_ref(),
                config.fallback_tag(),
                force,
            );
            match plan {
                Some(plan) => {
                    print_json(&plan);
                    println!("Mid-roll schedule: {:?}", plan.mid_schedule());
                }
                None => println!("No ad plan for '{}'.", item.display_title()),
            }
        }
        Commands::Guide { count, seed } => {
            let mut rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
            let queue = live::build_queue(&catalog, &mut rng);
            if queue.is_empty() {
                println!("Live channel is empty.");
                return;
            }
            let now = chrono::Utc::now();
            let guide = live::project_schedule(&queue, 0, now, count, config.live_default_slot());
            for entry in guide {
                println!(
                    "{} {}-{}  {}",
                    if entry.is_now { "NOW " } else { "    " },
                    entry.start.with_timezone(&chrono::Local).format("%H:%M"),
                    entry.end.with_timezone(&chrono::Local).format("%H:%M"),
                    entry.item.label
                );
            }
            let settings = ad_config::resolve_live(
                catalog.live_channel.as_ref(),
                catalog.advertising.as_ref(),
                config.fallback_tag(),
                config.live_ad_frequency_mins_fallback,
            );
            println!(
                "Ads: {} ({:?})",
                settings.vast_tag.as_deref().unwrap_or("none"),
                settings.cadence
            );
        }
        Commands::Simulate {
            target,
            facts,
            script,
            seconds,
        } => {
            let facts = load_facts(facts.as_deref());
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap_or_else(|e| fail(e));
            runtime.block_on(simulate(config, catalog, target, facts, script.into(), seconds));
        }
    }
}

async fn simulate(
    config: PlayerConfig,
    catalog: Catalog,
    target: String,
    facts: SessionFacts,
    script: AdScript,
    seconds: u64,
) {
    let surface = Arc::new(HeadlessSurface::new().with_clock(Duration::from_secs(1)));
    let sdk = Arc::new(ScriptedAdSdk::new(script));
    let controller = PlaybackSessionController::new(
        Arc::new(config),
        Arc::new(catalog),
        sdk.clone(),
        surface.clone(),
    );

    let outcome = if target == "live" {
        controller.open_live().await
    } else {
        controller
            .open(PlaybackTarget::Title(target), PlaybackKind::Content, &facts)
            .await
    };
    match outcome {
        Ok(SessionOutcome::Blocked(verdict)) => {
            println!(
                "Blocked ({}): {}",
                verdict.reason.map(|r| r.to_string()).unwrap_or_default(),
                verdict.message.unwrap_or_default()
            );
            return;
        }
        Ok(SessionOutcome::EmptyChannel) => {
            println!("Live channel is empty.");
            return;
        }
        Ok(outcome) => println!("{:?}", outcome),
        Err(e) => fail(e),
    }

    // Paused clock: idle periods auto-advance through the session timers.
    tokio::time::sleep(Duration::from_secs(seconds)).await;

    if let Some(live) = controller.live_channel() {
        println!("Live slot now: {:?}", live.current().map(|s| s.label));
    }
    println!("Mid-roll breaks: {}", controller.breaks_fired());
    println!("Ad requests: {}", sdk.request_count());
    controller.navigate_away();
    for line in surface.log() {
        println!("  {}", line);
    }
}
