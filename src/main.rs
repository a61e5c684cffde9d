use anyhow::{Context, Result};
use lingua_relay::config::Config;
use lingua_relay::pipeline::Pipeline;
use lingua_relay::roster::{Member, Role};
use lingua_relay::server::{self, AppState};
use lingua_relay::store::Store;
use lingua_relay::translation::TranslationClient;
use lingua_relay::whatsapp::TwilioClient;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lingua_relay=info".parse()?),
        )
        .init();

    info!("Starting lingua-relay");

    let config = Config::from_env()?;

    let store = Arc::new(Store::open(&config.store_path)?);
    seed_super_admin(&config, &store)?;
    if store.member_count() == 0 {
        warn!("Roster is empty and SUPER_ADMIN_NUMBER is not set; nobody can run commands");
    }

    let translator = Arc::new(TranslationClient::new(&config)?);
    translator.check_mirrors().await;

    let twilio = TwilioClient::new(&config);
    let pipeline = Arc::new(Pipeline::new(
        store,
        translator,
        twilio,
        config.delivery_delay,
    ));

    let state = AppState::new(pipeline, config.webhook_secret.clone());
    server::serve(state, config.port).await
}

/// Put the configured super-admin into an empty roster.
fn seed_super_admin(config: &Config, store: &Store) -> Result<()> {
    let Some(number) = &config.super_admin_number else {
        return Ok(());
    };

    let admin = Member::new(
        number,
        &config.super_admin_lang,
        &config.super_admin_name,
        Role::Super,
    )
    .context("Invalid SUPER_ADMIN_* configuration")?;

    if store.seed(admin).context("Failed to seed super-admin")? {
        info!("Seeded empty roster with super-admin {}", config.super_admin_name);
    }
    Ok(())
}
