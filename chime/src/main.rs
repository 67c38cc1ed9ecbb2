use anyhow::Context;
use chime::icon::IconCache;
use chime::plugins::{PluginRegistry, PluginTypes};
use chime::settings::SettingsStore;
use chime::{CoreEvent, NotificationCore};
use clap::Parser;
use log::{error as log_error, info as log_info};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chime")]
#[command(about = "Notification daemon: accepts notifications and shows them through a backend")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Use this backend instead of the saved one
    #[arg(long)]
    backend: Option<String>,

    /// Show an example notification after startup
    #[arg(long)]
    example: bool,

    /// List the available plugins and exit
    #[arg(long)]
    list_plugins: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    chime::logging::init("chime")?;

    let registry = PluginRegistry::with_builtin();
    if cli.list_plugins {
        for (label, types) in [
            ("backends", PluginTypes::BACKEND),
            ("secondary backends", PluginTypes::SECONDARY_BACKEND),
            ("frontends", PluginTypes::FRONTEND),
        ] {
            println!("{}: {}", label, registry.available(types).join(", "));
        }
        return Ok(());
    }

    let settings = match cli.settings.or_else(SettingsStore::default_path) {
        Some(path) => SettingsStore::open(path)
            .await
            .context("failed to open settings")?,
        None => SettingsStore::in_memory(),
    };

    let core = NotificationCore::new(settings, registry, IconCache::new(IconCache::default_dir()));
    let mut events = core.subscribe();

    if let Err(e) = core.initialize().await {
        log_error!("Startup incomplete: {}", e);
    }
    if let Some(backend) = &cli.backend {
        core.set_primary_notification_backend(backend)
            .await
            .with_context(|| format!("cannot use backend {}", backend))?;
    }
    log_info!(
        "🚀 chime running with backend {:?}",
        core.primary_notification_backend().await
    );

    if cli.example {
        let id = core.display_example_notification().await?;
        log_info!("Example notification {} sent", id);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = events.recv() => match event {
                CoreEvent::PrimaryBackendError(e) => log_error!("Backend error: {}", e),
                CoreEvent::PrimaryBackendChanged(name) => log_info!("Backend changed to {}", name),
                CoreEvent::NotificationClosed { notification, reason } => {
                    log_info!("Notification {:?} closed: {}", notification.id, reason)
                }
                CoreEvent::ActionInvoked { notification, action } => {
                    log_info!("Notification {:?} action: {:?}", notification.id, action)
                }
            },
        }
    }

    core.shutdown().await;
    Ok(())
}
