use anyhow::Result;
use rtcsync_core::StopHandle;

/// Routes SIGINT and SIGTERM to `handle` from a dedicated thread. Must run
/// before any other thread is spawned so every thread inherits the blocked
/// signal mask.
#[cfg(unix)]
pub fn install(handle: StopHandle) -> Result<()> {
    use anyhow::Context;
    use log::{info, warn};
    use nix::sys::signal::{SigSet, Signal};

    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);
    set.thread_block()
        .context("failed to block termination signals")?;

    std::thread::Builder::new()
        .name("signal-watch".into())
        .spawn(move || loop {
            match set.wait() {
                Ok(signal) => {
                    info!("caught {signal:?}, stopping after the current transaction");
                    handle.stop();
                }
                Err(e) => {
                    warn!("waiting for signals failed: {e}");
                    return;
                }
            }
        })
        .context("failed to start signal watcher")?;
    Ok(())
}

#[cfg(not(unix))]
pub fn install(_handle: StopHandle) -> Result<()> {
    log::warn!("no signal handling on this platform; terminate the process to stop polling");
    Ok(())
}
