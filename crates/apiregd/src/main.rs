//! apiregd — announces configured services and watches the group.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::RngCore;

use apireg_core::config::RegistryConfig;
use apireg_services::RegistrationEvent;
use apiregd::{MulticastRegistry, RegistryOptions};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = RegistryConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = RegistryConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RegistryConfig::default()
    });

    let sender_id = {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    };
    tracing::info!(sender_id = %sender_id, "apiregd starting");

    let registry = MulticastRegistry::start(RegistryOptions::from_config(&config, sender_id))
        .await
        .context("failed to start multicast registry")?;

    registry.add_event_listener(Arc::new(|event: &RegistrationEvent| {
        tracing::info!(kind = %event.kind, api = %event.api, "registration event");
    }));

    for service in &config.services {
        if let Err(e) = registry
            .register_api(&service.name, service.version, service.port)
            .await
        {
            tracing::error!(service = %service.name, error = %e, "failed to register service");
        }
    }
    tracing::info!(count = registry.owned_apis().len(), "services announced");

    let mut snapshot = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }

            _ = snapshot.tick() => {
                let apis = registry.get_available_apis();
                tracing::info!(count = apis.len(), "available apis snapshot");
                for api in &apis {
                    tracing::info!(api = %api, "  api");
                }
            }
        }
    }

    registry.shutdown().await;
    Ok(())
}
