mod display;
mod flanker;
mod headless;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use cogex_core::TrialPayload;
use cogex_experiment::{CancellationToken, Scheduler, SessionConfig};
use cogex_hardware::{RecordingTriggerSink, TriggerDispatcher};
use cogex_timing::HighPrecisionTimer;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Runs an event-synchronized flanker task.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Session config (JSON). Built-in defaults when omitted
    config: Option<PathBuf>,

    /// Use simulated time, display and keyboard instead of real hardware
    #[arg(long)]
    headless: bool,

    #[arg(long, default_value_t = 40)]
    trials: usize,

    /// Resting-state block before the first trial, in seconds
    #[arg(long, default_value_t = 0.0)]
    rest: f64,

    #[arg(long)]
    participant: Option<String>,

    #[arg(long)]
    session: Option<String>,

    /// Seed for trial order and ISI jitter
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let trials = flanker::trials(args.trials, &mut rng);
    let plan = flanker::plan(trials, args.rest.max(0.0) + flanker::LEAD_IN, &mut rng)?;
    info!(
        participant = %config.participant,
        session = %config.session,
        trials = plan.len(),
        end_s = plan.end_deadline(),
        headless = args.headless,
        "session planned"
    );

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || on_interrupt.cancel()).context("installing Ctrl-C handler")?;

    let markers = session::markers(&config)?;
    let report = if args.headless {
        let (time, surface, input) = headless::collaborators(&plan, &config.keys.trigger, &mut rng);
        let sink = RecordingTriggerSink::new();
        let lines = sink.lines();
        let triggers = TriggerDispatcher::new(Box::new(sink), config.hardware.parallel_port.pulse_width());
        let scheduler = Scheduler::new(&config, time, surface, input)
            .with_triggers(triggers)
            .with_markers(markers)
            .with_cancellation(cancel)
            .with_autosave();
        let report = session::run(scheduler, plan, args.rest)?;
        let codes = lines.borrow().iter().filter(|c| **c != 0).count();
        info!(codes, "simulated trigger codes written");
        report
    } else {
        let mut config = config;
        let (mut surface, input) = display::open()?;
        if let Some(hz) = surface.refresh_hz() {
            config.frame_timing.default_refresh_hz = hz;
        }
        let cached = surface.prewarm(plan.trials().iter().map(|t| t.payload.stimulus()))?;
        info!(cached, "stimuli rasterized");

        let triggers = TriggerDispatcher::from_config(&config.hardware.parallel_port);
        if triggers.is_dummy() {
            warn!("no trigger output, codes are only logged");
        }
        info!(key = %config.keys.trigger, "press the trigger key to start");
        let scheduler = Scheduler::new(&config, HighPrecisionTimer::new(), surface, input)
            .with_triggers(triggers)
            .with_markers(markers)
            .with_cancellation(cancel)
            .with_autosave();
        session::run(scheduler, plan, args.rest)?
    };

    println!("{report}");
    Ok(())
}

fn load_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(p) = &args.participant {
        config.participant = p.clone();
    }
    if let Some(s) = &args.session {
        config.session = s.clone();
    }
    config.keys.response = flanker::RESPONSE_KEYS.map(String::from).to_vec();
    config.validate()?;
    Ok(config)
}
