//! # Interrupt Watcher Module
//!
//! Turns Ctrl-C into a message on a channel the session already selects on.
//!
//! Runs in a dedicated thread with its own Tokio runtime, so the acquisition
//! loop stays plain blocking code. The first interrupt is forwarded; after
//! that the thread exits and the session performs its final flush.

use crossbeam_channel::Sender;
use std::io;
use std::thread;
use tokio::runtime::Runtime;

pub fn spawn_interrupt_watcher(shutdown: Sender<()>) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("interrupt-watcher".into())
        .spawn(move || {
            let rt = match Runtime::new() {
                Ok(runtime) => runtime,
                Err(e) => {
                    log::error!("Failed to create async runtime for Ctrl-C handling: {}", e);
                    return;
                }
            };

            match rt.block_on(tokio::signal::ctrl_c()) {
                Ok(()) => {
                    log::debug!("Interrupt watcher: Ctrl-C caught");
                    let _ = shutdown.send(());
                }
                Err(e) => {
                    log::error!("Unable to listen for Ctrl-C: {}", e);
                }
            }
        })
}
