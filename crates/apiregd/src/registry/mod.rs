//! Multicast API registry.
//!
//! Three background tasks share one group socket and two stores:
//! - broadcast: re-announces every owned Api each resend interval
//! - listener: decodes inbound announcements and merges them into the
//!   registration store
//! - purge: sweeps expired registrations
//!
//! All three stop on `shutdown()` or when the registry is dropped.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::broadcast as shutdown_channel;
use tokio::task::JoinHandle;

use apireg_core::config::RegistryConfig;
use apireg_core::wire::{
    WireError, DEFAULT_MULTICAST_GROUP, DEFAULT_MULTICAST_PORT, LIFESPAN_MULTIPLIER,
    PURGE_INTERVAL_SECS, RESEND_INTERVAL_SECS,
};
use apireg_core::{Api, Environment, ValidationError, Version};
use apireg_services::{ListenerId, OwnedApiStore, RegistrationListener, RegistrationStore};

mod broadcast;
mod listener;
mod socket;

// ── Options ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub group: Ipv4Addr,
    /// 0 binds an OS-assigned port; only useful for a lone registry.
    pub port: u16,
    pub interface: Ipv4Addr,
    pub multicast_ttl: u32,
    pub multicast_loop: bool,
    pub environment: Environment,
    /// Identifies this process on the wire. Our own announcements come back
    /// through the group and are dropped by this id.
    pub sender_id: String,
    pub resend_interval: Duration,
    /// `None` disables the sweep; reads still evict lazily.
    pub purge_interval: Option<Duration>,
    pub life_span: Duration,
}

impl RegistryOptions {
    pub fn new(sender_id: impl Into<String>, environment: Environment) -> Self {
        let resend_interval = Duration::from_secs(RESEND_INTERVAL_SECS);
        Self {
            group: DEFAULT_MULTICAST_GROUP,
            port: DEFAULT_MULTICAST_PORT,
            interface: Ipv4Addr::UNSPECIFIED,
            multicast_ttl: 1,
            multicast_loop: true,
            environment,
            sender_id: sender_id.into(),
            resend_interval,
            purge_interval: Some(Duration::from_secs(PURGE_INTERVAL_SECS)),
            life_span: resend_interval * LIFESPAN_MULTIPLIER,
        }
    }

    pub fn from_config(config: &RegistryConfig, sender_id: impl Into<String>) -> Self {
        let resend_interval = Duration::from_secs(config.registry.resend_interval_secs.max(1));
        let purge_interval = match config.registry.purge_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            group: config.network.group,
            port: config.network.port,
            interface: config.network.interface,
            multicast_ttl: config.network.multicast_ttl,
            multicast_loop: config.network.multicast_loop,
            environment: config.registry.environment,
            sender_id: sender_id.into(),
            resend_interval,
            purge_interval,
            life_span: resend_interval * config.registry.lifespan_multiplier.max(1),
        }
    }
}

impl RegistryOptions {
    /// Reject periods the background loops cannot run with.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.resend_interval.is_zero() {
            return Err(RegistryError::InvalidOptions("resend_interval must be non-zero"));
        }
        if self.purge_interval.is_some_and(|p| p.is_zero()) {
            return Err(RegistryError::InvalidOptions(
                "purge_interval must be non-zero (use None to disable)",
            ));
        }
        if self.life_span.is_zero() {
            return Err(RegistryError::InvalidOptions("life_span must be non-zero"));
        }
        Ok(())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("invalid registry options: {0}")]
    InvalidOptions(&'static str),

    #[error("transport error during {op}: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl RegistryError {
    pub(crate) fn transport(op: &'static str) -> impl FnOnce(io::Error) -> Self {
        move |source| RegistryError::Transport { op, source }
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

/// State shared by the facade and its background tasks.
pub(crate) struct Shared {
    pub(crate) socket: UdpSocket,
    pub(crate) group: SocketAddrV4,
    pub(crate) sender_id: String,
    pub(crate) environment: Environment,
    pub(crate) regs: RegistrationStore,
    pub(crate) owned: OwnedApiStore,
}

// ── Registry ──────────────────────────────────────────────────────────────────

pub struct MulticastRegistry {
    shared: Arc<Shared>,
    shutdown: shutdown_channel::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MulticastRegistry {
    /// Bind the group socket and start the background tasks.
    /// Must be called inside a Tokio runtime.
    pub async fn start(options: RegistryOptions) -> Result<Self, RegistryError> {
        options.validate()?;
        let std_socket = socket::make_multicast_socket(&options)?;
        let socket = UdpSocket::from_std(std_socket)
            .map_err(RegistryError::transport("convert to tokio socket"))?;
        let bound_port = socket
            .local_addr()
            .map_err(RegistryError::transport("local_addr"))?
            .port();

        let shared = Arc::new(Shared {
            socket,
            group: SocketAddrV4::new(options.group, bound_port),
            sender_id: options.sender_id.clone(),
            environment: options.environment,
            regs: RegistrationStore::new(options.life_span),
            owned: OwnedApiStore::new(),
        });

        let (shutdown, _) = shutdown_channel::channel::<()>(1);

        let mut tasks = vec![
            tokio::spawn(broadcast::resend_loop(
                shared.clone(),
                options.resend_interval,
                shutdown.subscribe(),
            )),
            tokio::spawn(listener::receive_loop(shared.clone(), shutdown.subscribe())),
        ];
        if let Some(period) = options.purge_interval {
            tasks.push(tokio::spawn(listener::purge_loop(
                shared.clone(),
                period,
                shutdown.subscribe(),
            )));
        }

        tracing::info!(
            group = %shared.group,
            environment = %options.environment,
            sender_id = %options.sender_id,
            resend_secs = options.resend_interval.as_secs_f64(),
            life_span_secs = options.life_span.as_secs_f64(),
            "multicast registry started"
        );

        Ok(Self {
            shared,
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }

    /// Announce a locally hosted service.
    ///
    /// Idempotent: re-registering an owned Api sends nothing. Ownership is
    /// claimed before the first announcement, so concurrent identical calls
    /// send it once. A failed send releases the claim and the call can be
    /// retried.
    pub async fn register_api(
        &self,
        name: &str,
        version: Version,
        port: u16,
    ) -> Result<(), RegistryError> {
        // Peers take the real address from the datagram source.
        let api = Api::new(
            name,
            version,
            self.shared.environment,
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
        )?;

        if !self.shared.owned.add(api.clone()) {
            tracing::trace!(api = %api, "already registered");
            return Ok(());
        }

        if let Err(e) = broadcast::send_registration(&self.shared, &api).await {
            self.shared.owned.remove(&api);
            return Err(e);
        }
        tracing::info!(api_name = name, version = %version, port, "api registered");
        Ok(())
    }

    pub fn get_available_apis(&self) -> Vec<Api> {
        self.shared
            .regs
            .get_all_regs()
            .iter()
            .map(|reg| reg.api().clone())
            .collect()
    }

    pub fn get_apis_by_api_name(&self, name: &str) -> Vec<Api> {
        self.shared
            .regs
            .get_all_regs_for_name(name)
            .iter()
            .map(|reg| reg.api().clone())
            .collect()
    }

    pub fn add_event_listener(&self, listener: Arc<dyn RegistrationListener>) -> ListenerId {
        self.shared.regs.add_listener(listener)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.shared.regs.remove_listener(id)
    }

    /// Apis this process announces and keeps refreshing.
    pub fn owned_apis(&self) -> Vec<Api> {
        self.shared.owned.all()
    }

    pub fn sender_id(&self) -> &str {
        &self.shared.sender_id
    }

    pub fn environment(&self) -> Environment {
        self.shared.environment
    }

    /// The group address announcements are sent to.
    pub fn group_addr(&self) -> SocketAddrV4 {
        self.shared.group
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RegistryError> {
        self.shared
            .socket
            .local_addr()
            .map_err(RegistryError::transport("local_addr"))
    }

    /// Stop all background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(());
        let tasks: Vec<_> = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "registry task ended abnormally");
            }
        }
        tracing::info!("multicast registry stopped");
    }
}

impl Drop for MulticastRegistry {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}
