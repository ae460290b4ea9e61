use std::{
    error::Error,
    io::{self, BufReader},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use botpool::{
    activity::ActivityLog,
    cli::{Cli, Commands, parse_args},
    config::load_settings,
    console::{Console, describe_error},
    error::SupervisorError,
    launcher::DetachedLauncher,
    lifecycle::LifecycleController,
    matcher::ProcessMatcher,
    pool::SupervisorPool,
    runtime,
    scheduler::PollScheduler,
    status::StatusRenderer,
    store::SlotStore,
    vcs::UpdateOutcome,
};

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args();
    init_logging(&args);
    runtime::init();

    let settings = load_settings(args.config.as_deref())?;
    let activity = ActivityLog::new(settings.activity_log_path());
    let renderer = StatusRenderer::new(!args.no_color);

    if let Commands::Log { lines } = args.command {
        print!("{}", renderer.render_activity(&activity.tail(lines)?));
        return Ok(());
    }

    let controller = LifecycleController::new(
        &settings,
        ProcessMatcher::system(),
        Arc::new(DetachedLauncher),
        Arc::new(activity.clone()),
    );
    let pool = SupervisorPool::new(
        settings.slots,
        controller,
        Some(SlotStore::new(settings.slot_store_path())),
    );
    let mut scheduler = PollScheduler::from_settings(&settings);
    if !matches!(args.command, Commands::Console) {
        scheduler.catch_up(&pool, Instant::now());
    }

    match args.command {
        Commands::Console => {
            let shutdown = register_signal_handler()?;
            info!("Console started with {} slots", pool.len());
            Console::new(&pool, scheduler, renderer, Some(activity)).run(
                BufReader::new(io::stdin()),
                &mut io::stdout(),
                shutdown,
            )?;
        }
        Commands::List { json } => {
            let records = pool.snapshots()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                print!("{}", renderer.render_pool(&records, None));
            }
        }
        Commands::Refresh { slot: None } => {
            print!("{}", renderer.render_pool(&pool.snapshots()?, None));
        }
        Commands::Refresh { slot: Some(slot) } => {
            let state = report(pool.refresh(slot.index()));
            if state.is_some() {
                print!("{}", renderer.render_slot(&pool.snapshot(slot.index())?, None));
            }
        }
        Commands::Configure { slot, path } => {
            if let Some(state) = report(pool.configure(slot.index(), Path::new(&path))) {
                println!("Bot {slot} configured ({state})");
            }
        }
        Commands::Rename { slot, name } => {
            if report(pool.rename(slot.index(), &name)).is_some() {
                println!("Bot {slot} renamed to {}", name.trim());
            }
        }
        Commands::Start { slot } => {
            if let Some(pid) = report(pool.start(slot.index())) {
                println!("Bot {slot} started (PID {pid})");
            }
        }
        Commands::Stop { slot } => {
            if let Some(count) = report(pool.stop(slot.index())) {
                println!("Bot {slot} stopped ({count} process(es) signalled)");
            }
        }
        Commands::Restart { slot } => {
            if let Some(pid) = report(pool.restart(slot.index())) {
                println!("Bot {slot} restarted (PID {pid})");
            }
        }
        Commands::Update { slot } => match report(pool.update(slot.index())) {
            Some(UpdateOutcome::NotARepository { directory }) => {
                println!("{} is not a git repository", directory.display());
            }
            Some(UpdateOutcome::Pulled { stdout, .. }) => println!("{stdout}"),
            Some(UpdateOutcome::Failed { stderr, .. }) => println!("{stderr}"),
            None => {}
        },
        Commands::Log { .. } => {}
    }

    Ok(())
}

/// Prints warnings and passes them over; a failure is printed once and exits 1.
fn report<T>(result: Result<T, SupervisorError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) if err.is_warning() => {
            println!("{}", describe_error(&err));
            None
        }
        Err(err) => {
            eprintln!("{}", describe_error(&err));
            std::process::exit(1);
        }
    }
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn register_signal_handler() -> Result<Arc<AtomicBool>, Box<dyn Error>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        eprintln!("botpool is shutting down... bots keep running");
        flag.store(true, Ordering::SeqCst);
    })?;

    Ok(shutdown)
}
