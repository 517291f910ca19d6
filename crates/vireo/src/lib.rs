//! # Vireo
//!
//! An on-device stub DNS resolver service. Applications hand it
//! hostnames or raw DNS queries; it resolves them against the
//! configured network's upstream servers — over DNS-over-TLS when the
//! network's private DNS mode calls for it — caches the answers, and
//! synthesizes NAT64 addresses on IPv6-only networks.
//!
//! This crate is the service layer: the configuration surface the
//! platform drives, the event-listener registry, and log-severity
//! control. The resolution machinery lives in `vireo-resolver` and its
//! sibling crates.

pub mod events;
pub mod log;
pub mod service;

pub use events::{EventListener, QueryEvent};
pub use log::LogSeverity;
pub use service::{ResolverInfo, ResolverService, SetConfigurationRequest, NETID_USE_LOCAL_NAMESERVERS};

pub use vireo_resolver::{
    AddressFamily, PrivateDnsMode, QueryFlags, ResolverError, ValidationObserver,
    ValidationState,
};
