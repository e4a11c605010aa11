//! OpenStack resource snapshots and their fetchers
//!
//! Each fetcher returns the complete, all-pages-merged collection of one
//! resource kind. Servers and volumes are listed across all tenants.

mod wire;

use crate::client::{CloudClient, ServiceKind};
use crate::error::FetchError;
use std::collections::HashMap;
use tracing::{info, warn};

pub use wire::{
    FlavorPage, HypervisorPage, ProjectPage, ServerPage, StoragePoolPage, VolumePage,
};

/// Keystone project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
}

/// Nova flavor (ram in MB, disk in GB)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flavor {
    pub id: String,
    pub vcpus: i64,
    pub ram: i64,
    pub disk: i64,
}

/// Nova hypervisor capacity and usage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hypervisor {
    pub hostname: String,
    pub memory_mb: i64,
    pub memory_mb_used: i64,
    pub running_vms: i64,
    pub vcpus: i64,
    pub vcpus_used: i64,
}

/// Nova server, reduced to what aggregation needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Server {
    pub status: String,
    pub flavor_id: Option<String>,
    pub tenant_id: String,
}

/// Cinder volume (size in GB)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Volume {
    pub tenant_id: String,
    pub volume_type: String,
    pub size: i64,
}

/// Cinder scheduler storage pool
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoragePool {
    pub backend_name: String,
    pub total_capacity_gb: f64,
    pub free_capacity_gb: f64,
}

pub type ProjectMap = HashMap<String, Project>;
pub type FlavorMap = HashMap<String, Flavor>;

/// Index projects by id
pub fn project_map(projects: Vec<Project>) -> ProjectMap {
    projects.into_iter().map(|p| (p.id.clone(), p)).collect()
}

/// Index flavors by id
pub fn flavor_map(flavors: Vec<Flavor>) -> FlavorMap {
    flavors.into_iter().map(|f| (f.id.clone(), f)).collect()
}

/// Project name for an id, empty when unknown
pub fn project_name<'a>(projects: &'a ProjectMap, id: &str) -> &'a str {
    projects.get(id).map(|p| p.name.as_str()).unwrap_or("")
}

/// Flavor for an optional reference; `None` counts as a zero-sized flavor
pub fn resolve_flavor<'a>(flavors: &'a FlavorMap, id: Option<&str>) -> Option<&'a Flavor> {
    id.and_then(|id| flavors.get(id))
}

pub async fn fetch_projects(client: &CloudClient) -> Result<ProjectMap, FetchError> {
    let base = client.endpoint(ServiceKind::Identity)?;
    let projects = client
        .list_all::<ProjectPage>("projects", format!("{}/v3/projects", base))
        .await?;
    Ok(project_map(projects))
}

pub async fn fetch_hypervisors(client: &CloudClient) -> Result<Vec<Hypervisor>, FetchError> {
    let base = client.endpoint(ServiceKind::Compute)?;
    client
        .list_all::<HypervisorPage>("hypervisors", format!("{}/os-hypervisors/detail", base))
        .await
}

pub async fn fetch_flavors(client: &CloudClient) -> Result<FlavorMap, FetchError> {
    let base = client.endpoint(ServiceKind::Compute)?;
    let flavors = client
        .list_all::<FlavorPage>("flavors", format!("{}/flavors/detail", base))
        .await?;
    Ok(flavor_map(flavors))
}

pub async fn fetch_servers(client: &CloudClient) -> Result<Vec<Server>, FetchError> {
    let base = client.endpoint(ServiceKind::Compute)?;
    client
        .list_all::<ServerPage>("servers", format!("{}/servers/detail?all_tenants=True", base))
        .await
}

pub async fn fetch_volumes(client: &CloudClient) -> Result<Vec<Volume>, FetchError> {
    let base = client.endpoint(ServiceKind::BlockStorage)?;
    client
        .list_all::<VolumePage>("volumes", format!("{}/volumes/detail?all_tenants=1", base))
        .await
}

pub async fn fetch_storage_pools(client: &CloudClient) -> Result<Vec<StoragePool>, FetchError> {
    let base = client.endpoint(ServiceKind::BlockStorage)?;
    client
        .list_all::<StoragePoolPage>(
            "storage pools",
            format!("{}/scheduler-stats/get_pools?detail=true", base),
        )
        .await
}

/// Everything fetched during one collection cycle
///
/// A `None` slot means the fetch failed; the aggregators depending on it
/// are skipped.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub projects: Option<ProjectMap>,
    pub hypervisors: Option<Vec<Hypervisor>>,
    pub flavors: Option<FlavorMap>,
    pub servers: Option<Vec<Server>>,
    pub volumes: Option<Vec<Volume>>,
    pub storage_pools: Option<Vec<StoragePool>>,
}

impl Inventory {
    /// Fetch all six collections concurrently; failures are logged, not fatal
    pub async fn fetch(client: &CloudClient) -> Self {
        let (projects, hypervisors, flavors, servers, volumes, storage_pools) = futures::join!(
            fetch_projects(client),
            fetch_hypervisors(client),
            fetch_flavors(client),
            fetch_servers(client),
            fetch_volumes(client),
            fetch_storage_pools(client),
        );

        let inventory = Self {
            projects: keep("projects", projects),
            hypervisors: keep("hypervisors", hypervisors),
            flavors: keep("flavors", flavors),
            servers: keep("servers", servers),
            volumes: keep("volumes", volumes),
            storage_pools: keep("storage pools", storage_pools),
        };

        info!("Fetched {}/6 resource collections", inventory.available_count());
        inventory
    }

    /// Number of collections that were fetched successfully
    pub fn available_count(&self) -> usize {
        [
            self.projects.is_some(),
            self.hypervisors.is_some(),
            self.flavors.is_some(),
            self.servers.is_some(),
            self.volumes.is_some(),
            self.storage_pools.is_some(),
        ]
        .iter()
        .filter(|ok| **ok)
        .count()
    }
}

fn keep<T>(resource: &str, result: Result<T, FetchError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("failed to get {}: {}", resource, e);
            None
        }
    }
}
