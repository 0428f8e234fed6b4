//! Inbound announcements and registration expiry.
//!
//! The receive loop decodes every datagram on the group, drops our own
//! announcements and those from an incompatible environment, and merges
//! the rest into the registration store using the datagram's source
//! address as the host IP.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};

use apireg_core::wire::{RegisterMessage, WireError, MAX_MESSAGE_SIZE};
use apireg_core::{Api, Environment};
use apireg_services::RegistrationStore;

use super::Shared;

/// What became of one inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Registered,
    Refreshed,
    OwnAnnouncement,
    WrongEnvironment,
    InvalidApi,
}

/// Decode `data` from `source` and merge it into `regs` if it is for us.
pub(crate) fn handle_datagram(
    data: &[u8],
    source: IpAddr,
    local_sender_id: &str,
    local_environment: Environment,
    regs: &RegistrationStore,
) -> Result<Disposition, WireError> {
    let message = RegisterMessage::decode(data)?;

    if message.sender_id == local_sender_id {
        return Ok(Disposition::OwnAnnouncement);
    }
    if !local_environment.is_compatible_with(message.environment) {
        return Ok(Disposition::WrongEnvironment);
    }

    let api = match Api::new(
        message.api_name,
        message.api_version,
        message.environment,
        source,
        message.api_port,
    ) {
        Ok(api) => api,
        Err(e) => {
            tracing::warn!(%source, error = %e, "announcement carries an invalid api");
            return Ok(Disposition::InvalidApi);
        }
    };

    if regs.merge(api, std::time::Instant::now()) {
        Ok(Disposition::Registered)
    } else {
        Ok(Disposition::Refreshed)
    }
}

/// Delay after the first receive error. Doubles per consecutive error.
const RECV_BACKOFF_INITIAL: Duration = Duration::from_millis(10);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Paces the receive loop while `recv_from` keeps failing.
#[derive(Debug, Default)]
struct RecvBackoff {
    consecutive: u32,
}

impl RecvBackoff {
    /// Record one failure and return how long to wait before the next read.
    fn failed(&mut self) -> Duration {
        self.consecutive = self.consecutive.saturating_add(1);
        let shift = (self.consecutive - 1).min(16);
        RECV_BACKOFF_INITIAL
            .saturating_mul(1 << shift)
            .min(RECV_BACKOFF_MAX)
    }

    /// Log on the 1st, 2nd, 4th, 8th... failure in a row.
    fn should_log(&self) -> bool {
        self.consecutive.is_power_of_two()
    }

    fn succeeded(&mut self) {
        self.consecutive = 0;
    }
}

/// Receive announcements until shutdown.
pub(crate) async fn receive_loop(shared: Arc<Shared>, mut shutdown: broadcast::Receiver<()>) {
    let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
    let mut backoff = RecvBackoff::default();

    tracing::info!(group = %shared.group, "receive loop starting");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("receive loop shutting down");
                return;
            }

            result = shared.socket.recv_from(&mut buf) => {
                let (len, source): (usize, SocketAddr) = match result {
                    Ok(r) => {
                        backoff.succeeded();
                        r
                    }
                    Err(e) => {
                        let delay = backoff.failed();
                        if backoff.should_log() {
                            tracing::warn!(
                                error = %e,
                                consecutive = backoff.consecutive,
                                retry_ms = delay.as_millis() as u64,
                                "recv_from failed"
                            );
                        }
                        tokio::select! {
                            _ = shutdown.recv() => {
                                tracing::info!("receive loop shutting down");
                                return;
                            }
                            _ = time::sleep(delay) => continue,
                        }
                    }
                };

                match handle_datagram(
                    &buf[..len],
                    source.ip(),
                    &shared.sender_id,
                    shared.environment,
                    &shared.regs,
                ) {
                    Ok(Disposition::OwnAnnouncement) => {
                        tracing::trace!("ignoring own announcement");
                    }
                    Ok(Disposition::WrongEnvironment) => {
                        tracing::trace!(%source, "ignoring announcement from other environment");
                    }
                    Ok(disposition) => {
                        tracing::trace!(%source, ?disposition, "announcement handled");
                    }
                    Err(e) => {
                        tracing::warn!(
                            %source,
                            bytes = len,
                            error = %e,
                            "dropping undecodable datagram"
                        );
                    }
                }
            }
        }
    }
}

/// Sweep expired registrations every `period` until shutdown.
pub(crate) async fn purge_loop(
    shared: Arc<Shared>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("purge loop shutting down");
                return;
            }

            _ = interval.tick() => {
                shared.regs.purge_expired(std::time::Instant::now());
            }
        }
    }
}
