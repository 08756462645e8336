//! projection-test
//!
//! Mirrors the screen into a small off-screen capture target and exposes
//! the latest frame as a notification thumbnail. The capture coordinator
//! runs on a single loop task; session setup happens on a dedicated thread
//! and frame decoding on the blocking pool.

mod app;
mod capture;
mod config;
mod coordinator;
mod logging;
mod service;
mod ui;

use anyhow::{bail, Context, Result};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use app::{App, AppCommand, AppHandle};
use capture::{SessionWorker, SyntheticPlatform};
use config::Config;
use coordinator::{CaptureCoordinator, ObserverSet};
use service::CaptureService;
use ui::{LogNotificationSink, StatusView, ACTION_DO_SNAPSHOT, ACTION_OPEN_SETTINGS};

/// Command line options
#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    help: bool,
    deny_permission: bool,
    no_autostart: bool,
    run_for: Option<Duration>,
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let options = parse_options(&args)?;

    if options.help {
        print_help();
        return Ok(());
    }

    // Initialize logging, falling back to stderr if the log directory is unusable
    let _log_guard = match logging::init_logging() {
        Ok(guard) => Some(guard),
        Err(e) => {
            logging::init_stderr_logging();
            warn!("File logging unavailable: {:#}", e);
            None
        }
    };

    info!("projection-test starting...");

    // Load configuration
    let mut config = match &options.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.validate()?;
    if options.deny_permission {
        config.synthetic.deny_permission = true;
    }
    let config_path = config.config_path().ok();
    info!("Configuration loaded from {:?}", config_path);

    let runtime = Arc::new(tokio::runtime::Runtime::new()?);

    let platform = Arc::new(SyntheticPlatform::new(
        config.display.clone(),
        config.synthetic.clone(),
    ));

    // Dedicated session thread; exits once the coordinator drops its sender
    let (session_event_tx, session_event_rx) = mpsc::unbounded_channel();
    let (session_tx, session_thread) = SessionWorker::spawn(
        platform.clone(),
        session_event_tx,
        runtime.handle().clone(),
        config.capture.thumbnail_max_width,
    )
    .context("Failed to start capture session thread")?;

    let coordinator = CaptureCoordinator::new(session_tx, Arc::new(ObserverSet::new()));

    let (action_tx, action_rx) = mpsc::unbounded_channel();
    let notifications = Arc::new(LogNotificationSink::new(
        action_tx,
        config.notification.snapshot_dir.clone(),
    ));

    let service = CaptureService::new(
        config.capture.clone(),
        config.notification.clone(),
        platform.clone(),
        platform.clone(),
        notifications.clone(),
    );

    let (app, handle) = App::new(
        coordinator,
        service,
        StatusView::new(),
        platform,
        config_path,
        session_event_rx,
        action_rx,
        config.notification.snapshot_interval_secs,
    );
    let app_task = runtime.spawn(app.run());

    // Set up Ctrl+C handler that sends shutdown command
    let ctrl_c_handle = handle.clone();
    let ctrl_c_runtime = runtime.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        let handle = ctrl_c_handle.clone();
        ctrl_c_runtime.spawn(async move {
            let _ = handle.send(AppCommand::Shutdown).await;
        });
    })?;

    spawn_console(handle.clone(), notifications)?;

    let autostart = config.capture.autostart_on_launch && !options.no_autostart;
    let result = runtime.block_on(async {
        if autostart {
            info!("Autostart capture on launch enabled");
            handle.send(AppCommand::StartCapture).await?;
        }

        if let Some(limit) = options.run_for {
            let handle = handle.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                info!("Run time of {:?} reached", limit);
                let _ = handle.send(AppCommand::Shutdown).await;
            });
        }

        app_task.await.context("App loop panicked")?
    });

    if let Err(e) = &result {
        error!("App loop error: {:#}", e);
    }
    info!("Final capture state: {:?}", handle.query());

    // Wait for the session thread to release the platform session
    if session_thread.join().is_err() {
        error!("Capture session thread panicked");
    }

    info!("Shutdown complete");
    result
}

/// Read interactive commands from stdin
///
/// End of input leaves the app running; Ctrl+C or `quit` stops it.
fn spawn_console(handle: AppHandle, notifications: Arc<LogNotificationSink>) -> Result<()> {
    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                let cmd = match parse_console_line(&line) {
                    ConsoleInput::Empty => continue,
                    ConsoleInput::Command(cmd) => cmd,
                    // Notification buttons go through the sink like a real press
                    ConsoleInput::Press(action_id) => {
                        notifications.activate(action_id);
                        continue;
                    }
                    ConsoleInput::Unknown => {
                        println!("unknown command: {}", line.trim());
                        println!(
                            "commands: start, stop, snap, settings, status, press <snap|settings>, quit"
                        );
                        continue;
                    }
                };
                if handle.blocking_send(cmd).is_err() || cmd == AppCommand::Shutdown {
                    break;
                }
            }
        })
        .context("Failed to start console thread")?;
    Ok(())
}

/// One line typed on the console
#[derive(Debug, PartialEq)]
enum ConsoleInput<'a> {
    Empty,
    Command(AppCommand),
    /// Press a notification button by action id
    Press(&'a str),
    Unknown,
}

fn parse_console_line(line: &str) -> ConsoleInput<'_> {
    match line.split_whitespace().collect::<Vec<_>>().as_slice() {
        [] => ConsoleInput::Empty,
        ["start"] => ConsoleInput::Command(AppCommand::StartCapture),
        ["stop"] => ConsoleInput::Command(AppCommand::StopCapture),
        ["snap"] => ConsoleInput::Command(AppCommand::Snapshot),
        ["settings"] => ConsoleInput::Command(AppCommand::OpenSettings),
        ["status"] => ConsoleInput::Command(AppCommand::Status),
        ["quit"] | ["exit"] => ConsoleInput::Command(AppCommand::Shutdown),
        ["press", "snap"] => ConsoleInput::Press(ACTION_DO_SNAPSHOT),
        ["press", "settings"] => ConsoleInput::Press(ACTION_OPEN_SETTINGS),
        ["press", action] => ConsoleInput::Press(*action),
        _ => ConsoleInput::Unknown,
    }
}

fn parse_options(args: &[String]) -> Result<CliOptions> {
    let mut options = CliOptions::default();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => options.help = true,
            "--deny" => options.deny_permission = true,
            "--no-autostart" => options.no_autostart = true,
            "--run-for" => {
                let value = iter.next().context("--run-for needs a number of seconds")?;
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid --run-for value: {}", value))?;
                options.run_for = Some(Duration::from_secs(secs));
            }
            "-c" | "--config" => {
                let value = iter.next().context("--config needs a path")?;
                options.config = Some(PathBuf::from(value));
            }
            other => bail!("Unknown argument: {} (see --help)", other),
        }
    }

    Ok(options)
}

fn print_help() {
    println!("projection-test - Screen projection capture demo");
    println!();
    println!("USAGE:");
    println!("    projection-test [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help            Print this help message");
    println!("    -c, --config <PATH>   Load configuration from PATH");
    println!("        --deny            Simulate a refused capture permission");
    println!("        --no-autostart    Do not start capturing on launch");
    println!("        --run-for <SECS>  Shut down after SECS seconds");
    println!();
    println!("COMMANDS (stdin):");
    println!("    start, stop, snap, settings, status, quit");
    println!("    press <snap|settings>   Press a button on the capture notification");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG                  Set log level (e.g., debug, info, warn)");
    println!("    PROJECTION_TEST_LOG_PATH  Override the log directory");
}
