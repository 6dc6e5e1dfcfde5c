use anyhow::Result;
use tracing_subscriber::EnvFilter;

use hearthsync::config::{Config, SavedIdentity};
use hearthsync::{HttpRemote, LocalStore, Reconciler, StepResult};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    let filter = EnvFilter::try_from_env("HEARTHSYNC_LOG")
        .unwrap_or_else(|_| EnvFilter::new(config.log.filter.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let identity = SavedIdentity::load()?;

    let store = match &config.store.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            LocalStore::open(std::path::Path::new(dir).join("state.redb"))?
        }
        None => LocalStore::open_default()?,
    };

    let remote = HttpRemote::new(config.remote.base_url.clone());
    let reconciler = Reconciler::new(remote, store, identity.user_id.clone());

    match reconciler.run().await {
        Ok(outcome) => {
            if outcome.migrated {
                tracing::info!("Local data seeded to the cloud");
            }
            for (name, step) in [
                ("rooms", &outcome.push.rooms),
                ("entities", &outcome.push.entities),
                ("profile", &outcome.push.profile),
            ] {
                match step {
                    StepResult::Pushed => tracing::info!("Pushed {name}"),
                    StepResult::Skipped => tracing::debug!("Skipped {name} push"),
                    StepResult::Failed(reason) => {
                        // Best-effort: failed pushes are reported, not fatal.
                        tracing::warn!("Push of {name} failed: {reason}");
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Sync session failed: {e}");
            eprintln!("Sync failed: {e}");
            std::process::exit(1);
        }
    }
}
