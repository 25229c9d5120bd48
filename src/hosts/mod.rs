//! Peer hosts
//!
//! - [`HostDirectory`]: hostname to persisted host row, discovering the API
//!   location on first use
//! - [`HostDiscovery`]: the probing protocol itself

pub mod directory;
pub mod discovery;

pub use directory::HostDirectory;
pub use discovery::{HostDiscovery, HttpProbe, Probe, IMP_LOCATION_HEADER};
