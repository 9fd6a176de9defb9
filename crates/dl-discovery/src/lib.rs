//! dl-discovery: Workload discovery for dockline
//!
//! Enumerates composition projects from the labels the compose tooling puts
//! on containers, using a single bulk `docker ps` per query, and classifies
//! each project as running, partial or stopped. Manifests are only read when
//! a single project is inspected, and then only for their service names.

pub mod aggregate;
pub mod discovery;
pub mod error;
pub mod manifest;
pub mod query;
pub mod record;

pub use aggregate::{
    aggregate, DiscoveredWorkload, DiscoverySource, DiscoverySummary, WorkloadStatus,
};
pub use discovery::{get_one, list_all, DiscoveryReport};
pub use error::DiscoveryError;
pub use record::{parse_record, parse_records, ContainerRecord, ContainerState};
