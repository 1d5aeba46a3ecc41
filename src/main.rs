use archipelago_sim::replay::{ActionLog, RecordedAction};
use archipelago_sim::snapshot::{SnapshotWriter, WorldSnapshot};
use archipelago_sim::{
    PresetName, RunStats, SimulationConfig, SimulationEngine, SimulationResult,
};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::process::ExitCode;
use std::str::FromStr;

#[derive(Parser)]
#[command(name = "archipelago-sim")]
#[command(about = "Runs a deterministic maritime archipelago economy simulation.")]
struct Args {
    /// Path to configuration file (YAML or TOML). CLI arguments override config file values.
    #[arg(short, long)]
    config: Option<String>,

    /// Use a preset configuration (e.g. 'small_archipelago', 'storm_season', 'quick_test')
    /// Use --list-presets to see all available presets
    #[arg(long)]
    preset: Option<String>,

    /// List all available preset configurations and exit
    #[arg(long, default_value_t = false)]
    list_presets: bool,

    #[arg(short, long)]
    ticks: Option<u64>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    islands: Option<usize>,

    #[arg(long)]
    agents: Option<usize>,

    /// Transaction tax rate in [0, 1); the tax is destroyed, not transferred
    #[arg(long)]
    tax_rate: Option<f64>,

    /// Path for the JSON run summary
    #[arg(short, long)]
    output: Option<String>,

    /// Path for a per-tick snapshot stream (one JSON document per line)
    #[arg(long)]
    snapshots: Option<String>,

    /// Compress outputs with gzip
    #[arg(long, default_value_t = false)]
    compress: bool,

    /// Path for the replay action log
    #[arg(long)]
    replay_log: Option<String>,

    /// Disable the progress bar during simulation
    #[arg(long, default_value_t = false)]
    no_progress: bool,

    /// Set the log level (error, warn, info, debug, trace)
    /// Can also be set via RUST_LOG environment variable
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn build_config(args: &Args) -> Result<SimulationConfig, String> {
    let mut config = if let Some(preset_name) = &args.preset {
        let preset = PresetName::from_str(preset_name)?;
        info!("using preset '{}'", preset.as_str());
        SimulationConfig::from_preset(&preset)
    } else if let Some(path) = &args.config {
        SimulationConfig::from_file(path).map_err(|e| e.to_string())?
    } else {
        SimulationConfig::default()
    };

    if let Some(ticks) = args.ticks {
        config.max_ticks = ticks;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(islands) = args.islands {
        config.island_count = islands;
    }
    if let Some(agents) = args.agents {
        config.agent_count = agents;
    }
    if let Some(tax_rate) = args.tax_rate {
        config.tax_rate = tax_rate;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn run(args: Args) -> Result<(), String> {
    if args.list_presets {
        println!("{}", "Available presets:".bold());
        for preset in PresetName::all() {
            println!("  {:<20} {}", preset.as_str().cyan(), preset.description());
        }
        return Ok(());
    }

    let config = build_config(&args)?;
    info!(
        "starting run: seed {}, {} islands, {} agents, {} ticks",
        config.seed, config.island_count, config.agent_count, config.max_ticks
    );

    let mut engine = SimulationEngine::new(config.clone()).map_err(|e| e.to_string())?;

    let mut snapshot_writer = match &args.snapshots {
        Some(path) => {
            Some(SnapshotWriter::create(path, args.compress).map_err(|e| e.to_string())?)
        }
        None => None,
    };
    let mut replay_log = args.replay_log.as_ref().map(|_| {
        ActionLog::new(config.seed, config.island_count, config.agent_count, config.max_ticks)
    });

    let progress = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(config.max_ticks);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] tick {pos}/{len}",
            )
            .expect("static template is valid")
            .progress_chars("#>-"),
        );
        bar
    };

    let mut stats = RunStats::new();
    let started = std::time::Instant::now();
    while engine.world().tick < config.max_ticks && !engine.is_paused() {
        let metrics = engine.step();
        progress.inc(1);
        stats.absorb(&metrics);
        if let Some(log) = replay_log.as_mut() {
            log.record(RecordedAction::TickHash {
                tick: metrics.tick,
                state_hash: metrics.state_hash,
            });
            for arrival in &metrics.arrivals {
                log.record(RecordedAction::Arrival {
                    tick: metrics.tick,
                    ship_id: arrival.ship_id.clone(),
                    island_id: arrival.island_id.clone(),
                });
            }
            for ship_id in &metrics.ships_sunk {
                log.record(RecordedAction::ShipSunk {
                    tick: metrics.tick,
                    ship_id: ship_id.clone(),
                });
            }
            for event_id in &metrics.new_events {
                log.record(RecordedAction::EventStarted {
                    tick: metrics.tick,
                    event_id: event_id.clone(),
                });
            }
            for event_id in &metrics.expired_events {
                log.record(RecordedAction::EventEnded {
                    tick: metrics.tick,
                    event_id: event_id.clone(),
                });
            }
        }
        if let Some(writer) = snapshot_writer.as_mut() {
            writer
                .append(&WorldSnapshot::from_world(engine.world()))
                .map_err(|e| e.to_string())?;
        }
        debug!(
            "tick {}: {} actions, {} arrivals",
            metrics.tick,
            metrics.agent_report.actions_applied,
            metrics.arrivals.len()
        );
    }
    progress.finish_and_clear();

    let elapsed = started.elapsed();
    let result =
        SimulationResult::build(engine.world(), &config, engine.tick_history(), stats);

    println!("{}", "Run complete".green().bold());
    println!("  ticks:          {}", result.ticks_run);
    println!("  wall time:      {:.2}s", elapsed.as_secs_f64());
    println!("  final hash:     {:#018x}", result.final_state_hash);
    println!("  trade volume:   {:.1}", result.metrics.total_trade_volume);
    println!("  tax destroyed:  {:.1}", result.metrics.tax_destroyed);
    println!("  ships sunk:     {}", result.metrics.ships_sunk);
    println!("  cash gini:      {:.3}", result.cash_gini);

    if let Some(path) = &args.output {
        result.save_to_file(path, args.compress).map_err(|e| e.to_string())?;
        println!("  summary:        {}", path.cyan());
    }
    if let (Some(path), Some(log)) = (&args.replay_log, replay_log) {
        log.save_to_file(path).map_err(|e| e.to_string())?;
        println!("  replay log:     {}", path.cyan());
    }
    if let Some(writer) = snapshot_writer {
        writer.finish().map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.log_level.clone()),
    )
    .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{} {}", "error:".red().bold(), message);
            ExitCode::FAILURE
        }
    }
}
