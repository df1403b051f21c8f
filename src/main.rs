//! CLI entry point — run a live transcription/translation session in the
//! terminal.
//!
//! # Startup sequence
//!
//! 1. Initialise logging (`RUST_LOG`, default `info`).
//! 2. Load [`EngineConfig`] from disk (default on first run), or from the
//!    path given as the first argument.
//! 3. Start the engine and spawn one printer thread per result queue.
//! 4. Wait for Enter (or end of stdin) — then stop, drain, exit.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::Result;
use livescribe::config::EngineConfig;
use livescribe::pipeline::{Engine, EngineCallbacks, EngineQueues};
use livescribe::queue::{MergeQueue, Pair};

// ---------------------------------------------------------------------------
// Result printers
// ---------------------------------------------------------------------------

/// Drain one result queue, printing confirmed text as it arrives and the
/// current draft on stderr (overwritten in place).
fn print_stream(label: &'static str, queue: Arc<MergeQueue<Pair>>) {
    while let Some(pair) = queue.get() {
        if !pair.confirmed.is_empty() {
            println!("[{label}] {}", pair.confirmed);
        }
        if !pair.draft.is_empty() {
            eprint!("\r[{label}] … {}\x1b[K", pair.draft);
        }
    }
    eprintln!();
    log::debug!("{label} stream ended");
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load_from(std::path::Path::new(&path))?,
        None => EngineConfig::load().unwrap_or_else(|e| {
            log::warn!("failed to load config ({e}); using defaults");
            EngineConfig::default()
        }),
    };

    let queues = if config.ai.enabled {
        EngineQueues::with_proofread()
    } else {
        EngineQueues::new()
    };

    let callbacks = EngineCallbacks {
        on_ready: Some(Box::new(|| {
            log::info!("session ready — press Enter to stop");
        })),
        on_failure: Some(Box::new(|e| {
            log::error!("could not start session: {e}");
        })),
        on_stopped: Some(Box::new(|| {
            log::info!("session stopped");
        })),
        on_record_error: Some(Box::new(|e| {
            log::error!("audio capture failed: {e}");
        })),
        on_transcribe_error: Some(Box::new(|e| {
            log::error!("transcription failed: {e}");
        })),
    };

    let handle = Engine::start(config, queues.clone(), callbacks);

    let mut printers = vec![
        std::thread::spawn({
            let queue = Arc::clone(&queues.transcription);
            move || print_stream("ts", queue)
        }),
        std::thread::spawn({
            let queue = Arc::clone(&queues.translation);
            move || print_stream("tl", queue)
        }),
    ];
    if let Some(proofread) = &queues.proofread {
        printers.push(std::thread::spawn({
            let queue = Arc::clone(proofread);
            move || print_stream("pr", queue)
        }));
    }

    // Block until the user presses Enter (or stdin closes) or the session
    // ends on its own (failure, auto-stop), then stop.
    let (stdin_tx, stdin_rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        let _ = stdin_tx.send(());
    });
    while handle.is_running() {
        if stdin_rx
            .recv_timeout(std::time::Duration::from_millis(200))
            .is_ok()
        {
            break;
        }
    }

    handle.stop();
    handle.join();
    for printer in printers {
        let _ = printer.join();
    }

    Ok(())
}
