//! Registration announcements.
//!
//! Owned Apis are announced once on registration and then re-sent every
//! resend interval so peers' registrations never reach their lifespan.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use apireg_core::wire::RegisterMessage;
use apireg_core::Api;

use super::{RegistryError, Shared};

/// Encode and multicast one announcement for `api`.
///
/// An oversized payload fails before anything touches the socket.
pub(crate) async fn send_registration(shared: &Shared, api: &Api) -> Result<(), RegistryError> {
    let message = RegisterMessage::for_api(api, &shared.sender_id, shared.environment);
    let bytes = message.encode()?;
    let sent = shared
        .socket
        .send_to(&bytes, shared.group)
        .await
        .map_err(RegistryError::transport("send_to"))?;
    tracing::trace!(api = %api, bytes = sent, "announcement sent");
    Ok(())
}

/// Re-announce every owned Api each `period` until shutdown.
///
/// Send failures are logged and left for the next tick.
pub(crate) async fn resend_loop(
    shared: Arc<Shared>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    // Registration already sent the first announcement.
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(interval_secs = period.as_secs_f64(), "resend loop starting");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("resend loop shutting down");
                return;
            }

            _ = interval.tick() => {
                for api in shared.owned.all() {
                    if let Err(e) = send_registration(&shared, &api).await {
                        tracing::warn!(api = %api, error = %e, "resend failed");
                    }
                }
            }
        }
    }
}
