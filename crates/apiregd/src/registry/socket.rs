//! Group socket setup.

use std::net::{Ipv4Addr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};

use super::{RegistryError, RegistryOptions};

/// Create a non-blocking UDP socket bound to the group port and joined to
/// the group. The same socket sends announcements and receives them.
pub(super) fn make_multicast_socket(
    options: &RegistryOptions,
) -> Result<std::net::UdpSocket, RegistryError> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(RegistryError::transport("socket()"))?;

    // Several registries on one host share the group port.
    socket
        .set_reuse_address(true)
        .map_err(RegistryError::transport("SO_REUSEADDR"))?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket
        .set_reuse_port(true)
        .map_err(RegistryError::transport("SO_REUSEPORT"))?;
    socket
        .set_nonblocking(true)
        .map_err(RegistryError::transport("set_nonblocking"))?;

    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, options.port);
    socket
        .bind(&bind_addr.into())
        .map_err(RegistryError::transport("bind()"))?;

    socket
        .join_multicast_v4(&options.group, &options.interface)
        .map_err(RegistryError::transport("IP_ADD_MEMBERSHIP"))?;
    if !options.interface.is_unspecified() {
        socket
            .set_multicast_if_v4(&options.interface)
            .map_err(RegistryError::transport("IP_MULTICAST_IF"))?;
    }
    socket
        .set_multicast_loop_v4(options.multicast_loop)
        .map_err(RegistryError::transport("IP_MULTICAST_LOOP"))?;
    socket
        .set_multicast_ttl_v4(options.multicast_ttl)
        .map_err(RegistryError::transport("IP_MULTICAST_TTL"))?;

    Ok(socket.into())
}
