//! apireg-services — registration bookkeeping shared by the multicast
//! transport and its callers. No socket code lives here.

pub mod listeners;
pub mod owned_store;
pub mod registration;
pub mod registration_store;

pub use listeners::{EventKind, ListenerId, ListenerStore, RegistrationEvent, RegistrationListener};
pub use owned_store::OwnedApiStore;
pub use registration::Registration;
pub use registration_store::RegistrationStore;
