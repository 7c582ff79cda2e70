//! Sticky quit flag set by SIGTERM/SIGINT/SIGHUP. The reactor observes this
//! between `select` iterations rather than unwinding out of a signal
//! handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::Result;
use log::info;
use signal_hook::iterator::Signals;

static QUIT: AtomicBool = AtomicBool::new(false);

pub fn quit_requested() -> bool {
    QUIT.load(Ordering::Relaxed)
}

/// Spawns the background thread that turns SIGTERM/SIGINT/SIGHUP into the
/// sticky flag. `signal-hook`'s iterator API runs with `SA_RESTART`, so an
/// in-flight `select` call returns normally rather than failing with
/// `EINTR`.
pub fn install() -> Result<()> {
    let mut signals = Signals::new(&[libc::SIGTERM, libc::SIGINT, libc::SIGHUP])?;
    thread::spawn(move || {
        for sig in signals.forever() {
            info!("received signal {}, requesting shutdown", sig);
            QUIT.store(true, Ordering::Relaxed);
        }
    });
    Ok(())
}
