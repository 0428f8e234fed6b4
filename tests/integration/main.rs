//! apireg integration test harness.
//!
//! Tests here run real registries against a multicast group on the local
//! host. Hosts without a multicast route (some containers, CI sandboxes)
//! cannot loop group traffic back; tests call `multicast_available()` and
//! skip gracefully when it fails.
//!
//!   cargo test --test integration

use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};

use apireg_core::Environment;
use apiregd::{MulticastRegistry, RegistryOptions};

mod discovery;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Group used by every test. Ports differ per test so tests never hear
/// each other.
pub const TEST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 77, 78);

static NEXT_PORT: AtomicU16 = AtomicU16::new(0);

/// A group port unique to this test run and this test.
pub fn test_port() -> u16 {
    let base = 40_000 + (std::process::id() % 10_000) as u16;
    base + NEXT_PORT.fetch_add(1, Ordering::Relaxed) * 3
}

/// Options with short intervals so tests settle in well under a second.
pub fn fast_options(sender_id: &str, environment: Environment, port: u16) -> RegistryOptions {
    let mut options = RegistryOptions::new(sender_id, environment);
    options.group = TEST_GROUP;
    options.port = port;
    options.resend_interval = Duration::from_millis(100);
    options.purge_interval = Some(Duration::from_millis(100));
    options.life_span = Duration::from_millis(400);
    options
}

pub async fn start(sender_id: &str, environment: Environment, port: u16) -> Result<MulticastRegistry> {
    MulticastRegistry::start(fast_options(sender_id, environment, port))
        .await
        .with_context(|| format!("failed to start registry {sender_id}"))
}

/// Check that a datagram sent to the test group comes back to a member
/// socket on this host.
pub fn multicast_available() -> bool {
    loopback_roundtrip().unwrap_or(false)
}

fn loopback_roundtrip() -> Result<bool> {
    let port = test_port();
    let receiver = member_socket(port)?;
    receiver.set_read_timeout(Some(Duration::from_millis(500)))?;

    let sender = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
    sender.set_multicast_loop_v4(true)?;
    sender.send_to(b"ping", SocketAddrV4::new(TEST_GROUP, port))?;

    let mut buf = [0u8; 16];
    Ok(matches!(receiver.recv_from(&mut buf), Ok((4, _))))
}

/// A blocking socket joined to the test group that shares `port` with
/// any registries bound there.
pub fn member_socket(port: u16) -> Result<UdpSocket> {
    use socket2::{Domain, Protocol, Socket, Type};

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;
    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true).context("SO_REUSEPORT")?;
    socket
        .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())
        .context("bind()")?;
    socket
        .join_multicast_v4(&TEST_GROUP, &Ipv4Addr::UNSPECIFIED)
        .context("IP_ADD_MEMBERSHIP")?;
    Ok(socket.into())
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[test]
fn test_ports_are_distinct() {
    let a = test_port();
    let b = test_port();
    assert_ne!(a, b);
}
