use std::process::ExitCode;
use std::sync::Arc;

use crate::adapter::{ContainerAdapter, DockerAdapter};
use crate::clock::{Clock, SystemClock};
use crate::config::RepairmanConfig;
use crate::http::StatusState;
use crate::journal::Journal;
use crate::lock::LockManager;
use crate::notify::{Notifier, WebhookTransport};
use crate::policy::PolicyResolver;
use crate::scheduler::Scheduler;
use crate::tasks::TaskContext;

mod adapter;
mod cli;
mod clock;
mod config;
mod config_file;
mod container;
mod http;
mod journal;
mod lock;
mod notify;
mod policy;
mod scheduler;
mod signals;
mod tasks;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match RepairmanConfig::try_init().await {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Unable to load the configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize the logger
    let default_filter = if config.global.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    log::info!(
        "Starting repairman for namespace \"{}\"",
        config.global.namespace
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifier = Arc::new(Notifier::new(Arc::new(WebhookTransport::default())));

    let journal = match Journal::open(
        &config.global.db_path,
        config.global.max_historic_entries,
        Arc::clone(&clock),
    ) {
        Ok(journal) => Arc::new(journal),
        Err(err) => {
            log::error!("Unable to open the journal at {}: {err}", config.global.db_path);
            return ExitCode::FAILURE;
        }
    };

    let resolver = Arc::new(PolicyResolver::new(
        config.global.clone(),
        Arc::clone(&clock),
        Arc::clone(&notifier),
    ));

    let adapter: Arc<dyn ContainerAdapter> = match DockerAdapter::connect(resolver) {
        Ok(adapter) => Arc::new(adapter),
        Err(err) => {
            log::error!("Unable to connect to Docker: {err}");
            return ExitCode::FAILURE;
        }
    };

    let status_state = Arc::new(StatusState {
        journal: Arc::clone(&journal),
        adapter: Arc::clone(&adapter),
    });
    let http_settings = config.http.clone();
    tokio::spawn(async move {
        if let Err(err) = http::serve(
            &http_settings.address,
            http_settings.port,
            &http_settings.prefix,
            status_state,
        )
        .await
        {
            log::error!("Status server stopped: {err}");
        }
    });

    signals::handle_shutdown();
    let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);

    let ctx = Arc::new(TaskContext {
        adapter,
        journal,
        locks: Arc::new(LockManager::new(Arc::clone(&clock))),
        notifier,
        clock,
    });

    Scheduler::new(ctx, config.interval).run().await;

    ExitCode::SUCCESS
}
