use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};

use randomizer::Randomizer;
use randomizer::config::{self as cfg, RandomizerConfig, SchemaKind};
use randomizer::input::{
    EnigoInjector, FocusCheck, InputHook, PointerSettings, SharedFocus, StdinHook,
    WindowTitleFocus, register_hooks,
};
use randomizer::repository::{JsonSequenceStore, watch_store};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SchemaArg {
    Config,
    Sequence,
}

impl From<SchemaArg> for SchemaKind {
    fn from(arg: SchemaArg) -> Self {
        match arg {
            SchemaArg::Config => SchemaKind::Config,
            SchemaArg::Sequence => SchemaKind::Sequence,
        }
    }
}

/// Randomizer CLI
#[derive(Debug, Parser)]
#[command(
    name = randomizer::PKG_NAME,
    version = randomizer::PKG_VERSION,
    about = "Plays randomized, interruptible input action sequences"
)]
struct Args {
    /// Path to the JSON configuration file (defaults are used when omitted)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Directory holding one JSON file per action sequence
    #[arg(short = 's', long = "sequences", default_value = "sequences")]
    sequences: PathBuf,

    /// Enable dry-run mode (log actions instead of simulating input)
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Only run while the target window holds focus
    #[arg(long = "check-focus")]
    check_focus: bool,

    /// Lower bound of the wait between two sequences, in seconds
    #[arg(long = "min-wait")]
    min_wait: Option<u64>,

    /// Upper bound of the wait between two sequences, in seconds
    #[arg(long = "max-wait")]
    max_wait: Option<u64>,

    /// Read key/mouse release and focus events as NDJSON from stdin
    #[arg(long = "stdin-hook")]
    stdin_hook: bool,

    /// Print a JSON Schema and exit
    #[arg(long = "print-schema", value_enum)]
    print_schema: Option<SchemaArg>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // --log-level wins over RUST_LOG.
    match args.log_level.as_deref() {
        Some(level) => randomizer::init_tracing_with_level(
            randomizer::parse_level(level).unwrap_or(tracing::Level::INFO),
        ),
        None => randomizer::init_tracing(),
    }

    if let Some(kind) = args.print_schema {
        cfg::write_schema_to_writer(kind.into(), std::io::stdout().lock())?;
        println!();
        return Ok(());
    }

    info!(
        version = randomizer::PKG_VERSION,
        sequences = %args.sequences.display(),
        dry_run = args.dry_run,
        "Starting Randomizer"
    );

    let config = load_config(&args).await?;
    debug!(target: "randomizer", ?config, "Configuration loaded successfully");

    let injector = Arc::new(EnigoInjector::new(
        args.dry_run,
        PointerSettings {
            steps: config.mouse_move_steps,
            step_delay: Duration::from_millis(config.mouse_move_smooth_delay_ms),
        },
    ));

    // A hook helper on stdin reports focus itself; otherwise check the window title.
    let shared_focus = Arc::new(SharedFocus::new(true));
    let focus: Arc<dyn FocusCheck> = if args.stdin_hook {
        shared_focus.clone()
    } else {
        Arc::new(WindowTitleFocus::new(config.target_window_title.clone()))
    };

    let store = Arc::new(JsonSequenceStore::new(&args.sequences));
    let app = Randomizer::new(config, store, injector, focus);

    let _watcher = match watch_store(&args.sequences, app.sequences().clone()) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(error = %e, "Sequence directory is not watched; changes need a restart");
            None
        }
    };

    let stdin_hook = Arc::new(StdinHook::new());
    if args.stdin_hook {
        let hooks: Vec<Box<dyn InputHook>> = vec![Box::new(stdin_hook.clone())];
        let sink = app.hook_sink().with_focus(shared_focus);
        if register_hooks(&hooks, &sink) == 0 {
            warn!("No input hook registered; user input will not interrupt actions");
        }
    }

    app.start()?;
    info!("Randomizer running; press Ctrl+C to exit");

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    stdin_hook.shutdown();
    // Joining the scheduler thread blocks.
    tokio::task::block_in_place(|| app.stop());

    info!("Randomizer exited");
    Ok(())
}

async fn load_config(args: &Args) -> anyhow::Result<RandomizerConfig> {
    let mut config = match &args.config {
        Some(path) => cfg::load_from_path_async(path).await?,
        None => RandomizerConfig::default(),
    };
    if args.check_focus {
        config.check_for_focus = true;
    }
    if let Some(secs) = args.min_wait {
        config.min_wait_ms = secs.saturating_mul(1000);
    }
    if let Some(secs) = args.max_wait {
        config.max_wait_ms = secs.saturating_mul(1000);
    }
    cfg::validate_config(config)
}
