//! apiregd — multicast transport and registry facade.
//!
//! `registry::MulticastRegistry` binds the group socket, announces owned
//! Apis, and keeps a soft-state view of everything else on the segment.

pub mod registry;

pub use registry::{MulticastRegistry, RegistryError, RegistryOptions};
