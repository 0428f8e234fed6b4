//! Identity types for announced services.
//!
//! An `Api` names one endpoint: a service name and version reachable at a
//! host address and port. Two Apis are the same identity when name,
//! version, host IP, and port all match. The environment tag travels with
//! the Api but does not take part in identity.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Version ───────────────────────────────────────────────────────────────────

/// A `major.minor.bugfix` version triple. Components are 64-bit unsigned
/// so any component a peer can put on the wire decodes.
///
/// Ordering is componentwise and intentionally partial: `less_than` and
/// `greater_than` both return false for tuples that disagree in direction
/// (e.g. a higher major with a lower bugfix). There is no `PartialOrd` impl
/// so nobody sorts by it by accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub bugfix: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, bugfix: u64) -> Self {
        Self {
            major,
            minor,
            bugfix,
        }
    }

    /// Every component `<=`, bugfix strictly `<`.
    pub fn less_than(&self, other: &Version) -> bool {
        self.major <= other.major && self.minor <= other.minor && self.bugfix < other.bugfix
    }

    /// Every component `>=`, bugfix strictly `>`.
    pub fn greater_than(&self, other: &Version) -> bool {
        self.major >= other.major && self.minor >= other.minor && self.bugfix > other.bugfix
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.bugfix)
    }
}

// ── Environment ───────────────────────────────────────────────────────────────

/// Deployment tier. Partitions a flat multicast domain so production
/// services never see non-production announcements and vice versa.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    Prod,
    NonProd,
    /// Interoperates with every tier.
    #[default]
    All,
}

impl Environment {
    /// Symmetric: either side is `All`, or both sides are equal.
    pub fn is_compatible_with(self, other: Environment) -> bool {
        self == Environment::All || other == Environment::All || self == other
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::NonProd => "non-prod",
            Environment::All => "all",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" => Ok(Environment::Prod),
            "non-prod" | "nonprod" => Ok(Environment::NonProd),
            "all" => Ok(Environment::All),
            other => Err(ValidationError::UnknownEnvironment(other.to_string())),
        }
    }
}

// ── Api ───────────────────────────────────────────────────────────────────────

/// One announced service endpoint. Immutable once built.
#[derive(Debug, Clone)]
pub struct Api {
    name: String,
    version: Version,
    environment: Environment,
    host_ip: IpAddr,
    host_port: u16,
}

impl Api {
    /// Validating factory. Rejects an empty name and port 0.
    pub fn new(
        name: impl Into<String>,
        version: Version,
        environment: Environment,
        host_ip: IpAddr,
        host_port: u16,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if host_port == 0 {
            return Err(ValidationError::InvalidPort(host_port));
        }
        Ok(Self {
            name,
            version,
            environment,
            host_ip,
            host_port,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn host_ip(&self) -> IpAddr {
        self.host_ip
    }

    pub fn host_port(&self) -> u16 {
        self.host_port
    }

    /// Identity match: name, version, host IP, and port. Environment is ignored.
    pub fn same_identity(&self, other: &Api) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.host_ip == other.host_ip
            && self.host_port == other.host_port
    }
}

impl PartialEq for Api {
    fn eq(&self, other: &Self) -> bool {
        self.same_identity(other)
    }
}

impl Eq for Api {}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} @ {}:{} [{}]",
            self.name, self.version, self.host_ip, self.host_port, self.environment
        )
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("api name is required")]
    EmptyName,

    #[error("port must be > 0, got {0}")]
    InvalidPort(u16),

    #[error("unknown environment: {0:?}")]
    UnknownEnvironment(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
