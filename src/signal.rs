use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{info, warn};
use nix::sys::signal::{SigSet, Signal};

use crate::error::{Error, ErrorKind, Result};

/// Cancellation flag shared between the update loop and whoever stops it.
#[derive(Clone, Debug, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Raises `stop` when the process receives SIGINT or SIGTERM.
///
/// Blocks both signals in the calling thread, so call this from `main`
/// before spawning anything else. A watcher thread waits on them for the
/// rest of the process; repeated signals are logged and otherwise ignored.
pub fn install_stop_handler(stop: &StopFlag) -> Result<()> {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);
    set.thread_block().map_err(|e| Error::new("", ErrorKind::Signal(e)))?;

    let stop = stop.clone();
    thread::Builder::new()
        .name("stop-signal".into())
        .spawn(move || loop {
            match set.wait() {
                Ok(sig) if stop.is_requested() => {
                    info!("received {} while already stopping", sig);
                }
                Ok(sig) => {
                    info!("received {}, stopping after the current pass", sig);
                    stop.request();
                }
                Err(e) => {
                    warn!("waiting for stop signal failed: {}", e);
                    return;
                }
            }
        })
        .map_err(|e| Error::new("", ErrorKind::Signal(errno_of(&e))))?;
    Ok(())
}

fn errno_of(err: &std::io::Error) -> nix::errno::Errno {
    nix::errno::Errno::from_raw(err.raw_os_error().unwrap_or(0))
}
