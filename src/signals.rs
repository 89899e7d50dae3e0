use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};

/// What should we do when the user stops
/// this program?
///
/// Workers still sleeping in a backoff are abandoned, their leases only
/// live in memory and die with the process.
pub fn handle_shutdown() {
    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            log::error!("Unable to install the signal handlers: {e}");
            return;
        }
    };

    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
            log::info!("Received signal {signal}, stopping");
            std::process::exit(0);
        }
    });
}
