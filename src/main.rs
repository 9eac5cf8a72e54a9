mod background;
mod config;
mod detector;
mod error;
mod hitrate;
mod history;
mod interrupt;
mod link;
mod notifier;
mod session;
mod snapshot;

use config::Config;
use error::SessionError;
use link::LinkReader;
use session::{AcquisitionSession, SessionClock};
use std::path::PathBuf;

/// Channels on the sensor board, one per HV table
pub const CHANNELS: usize = 3;

/// Records buffered between the link thread and the session
const LINK_QUEUE_DEPTH: usize = 4096;

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), SessionError> {
    // Optional first argument: config file path
    let config = match std::env::args_os().nth(1) {
        Some(path) => Config::load_from(&PathBuf::from(path))?,
        None => Config::load()?,
    };

    // Fail fast: a monitor without a link has nothing to do
    let reader = LinkReader::open(&config.link_path)?;

    let clock = SessionClock::start();
    let session = AcquisitionSession::start(config, clock.now().wall)?;

    let (record_sender, record_receiver) = crossbeam_channel::bounded(LINK_QUEUE_DEPTH);
    let (shutdown_sender, shutdown_receiver) = crossbeam_channel::bounded(1);

    reader.spawn(record_sender).map_err(SessionError::Spawn)?;
    interrupt::spawn_interrupt_watcher(shutdown_sender).map_err(SessionError::Spawn)?;

    log::info!("Monitoring... (ctrl+c to stop)");
    session.run(&record_receiver, &shutdown_receiver, &clock)
}
