//! JSON shapes of the Keystone, Nova and Cinder list responses

use super::{Flavor, Hypervisor, Project, Server, StoragePool, Volume};
use crate::client::{next_link, Link, Page};
use serde::{Deserialize, Deserializer};

/// Treat `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Cinder reports capacities as numbers or as "infinite" / "unknown"
fn capacity<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Number(n)) => n,
        Some(Raw::Text(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()).unwrap_or(0.0),
        None => 0.0,
    })
}

#[derive(Debug, Default, Deserialize)]
struct KeystoneLinks {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectWire {
    id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct ProjectPage {
    projects: Vec<ProjectWire>,
    #[serde(default)]
    links: KeystoneLinks,
}

impl Page for ProjectPage {
    type Item = Project;

    fn into_parts(self) -> (Vec<Project>, Option<String>) {
        let items = self
            .projects
            .into_iter()
            .map(|p| Project { id: p.id, name: p.name })
            .collect();
        (items, self.links.next.filter(|n| !n.is_empty()))
    }
}

#[derive(Debug, Deserialize)]
struct HypervisorWire {
    #[serde(default, deserialize_with = "null_as_default")]
    hypervisor_hostname: String,
    #[serde(default, deserialize_with = "null_as_default")]
    memory_mb: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    memory_mb_used: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    running_vms: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    vcpus: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    vcpus_used: i64,
}

#[derive(Debug, Deserialize)]
pub struct HypervisorPage {
    hypervisors: Vec<HypervisorWire>,
    #[serde(default)]
    hypervisors_links: Vec<Link>,
}

impl Page for HypervisorPage {
    type Item = Hypervisor;

    fn into_parts(self) -> (Vec<Hypervisor>, Option<String>) {
        let next = next_link(&self.hypervisors_links);
        let items = self
            .hypervisors
            .into_iter()
            .map(|h| Hypervisor {
                hostname: h.hypervisor_hostname,
                memory_mb: h.memory_mb,
                memory_mb_used: h.memory_mb_used,
                running_vms: h.running_vms,
                vcpus: h.vcpus,
                vcpus_used: h.vcpus_used,
            })
            .collect();
        (items, next)
    }
}

#[derive(Debug, Deserialize)]
struct FlavorWire {
    id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    vcpus: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    ram: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    disk: i64,
}

#[derive(Debug, Deserialize)]
pub struct FlavorPage {
    flavors: Vec<FlavorWire>,
    #[serde(default)]
    flavors_links: Vec<Link>,
}

impl Page for FlavorPage {
    type Item = Flavor;

    fn into_parts(self) -> (Vec<Flavor>, Option<String>) {
        let next = next_link(&self.flavors_links);
        let items = self
            .flavors
            .into_iter()
            .map(|f| Flavor { id: f.id, vcpus: f.vcpus, ram: f.ram, disk: f.disk })
            .collect();
        (items, next)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FlavorRefWire {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerWire {
    #[serde(default, deserialize_with = "null_as_default")]
    status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    flavor: FlavorRefWire,
    #[serde(default, deserialize_with = "null_as_default")]
    tenant_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ServerPage {
    servers: Vec<ServerWire>,
    #[serde(default)]
    servers_links: Vec<Link>,
}

impl Page for ServerPage {
    type Item = Server;

    fn into_parts(self) -> (Vec<Server>, Option<String>) {
        let next = next_link(&self.servers_links);
        let items = self
            .servers
            .into_iter()
            .map(|s| Server {
                status: s.status,
                flavor_id: s.flavor.id.filter(|id| !id.is_empty()),
                tenant_id: s.tenant_id,
            })
            .collect();
        (items, next)
    }
}

#[derive(Debug, Deserialize)]
struct VolumeWire {
    #[serde(
        rename = "os-vol-tenant-attr:tenant_id",
        default,
        deserialize_with = "null_as_default"
    )]
    tenant_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    volume_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    size: i64,
}

#[derive(Debug, Deserialize)]
pub struct VolumePage {
    volumes: Vec<VolumeWire>,
    #[serde(default)]
    volumes_links: Vec<Link>,
}

impl Page for VolumePage {
    type Item = Volume;

    fn into_parts(self) -> (Vec<Volume>, Option<String>) {
        let next = next_link(&self.volumes_links);
        let items = self
            .volumes
            .into_iter()
            .map(|v| Volume { tenant_id: v.tenant_id, volume_type: v.volume_type, size: v.size })
            .collect();
        (items, next)
    }
}

#[derive(Debug, Default, Deserialize)]
struct CapabilitiesWire {
    #[serde(default, deserialize_with = "null_as_default")]
    volume_backend_name: String,
    #[serde(default, deserialize_with = "capacity")]
    total_capacity_gb: f64,
    #[serde(default, deserialize_with = "capacity")]
    free_capacity_gb: f64,
}

#[derive(Debug, Deserialize)]
struct PoolWire {
    #[serde(default, deserialize_with = "null_as_default")]
    capabilities: CapabilitiesWire,
}

#[derive(Debug, Deserialize)]
pub struct StoragePoolPage {
    pools: Vec<PoolWire>,
}

impl Page for StoragePoolPage {
    type Item = StoragePool;

    fn into_parts(self) -> (Vec<StoragePool>, Option<String>) {
        let items = self
            .pools
            .into_iter()
            .map(|p| StoragePool {
                backend_name: p.capabilities.volume_backend_name,
                total_capacity_gb: p.capabilities.total_capacity_gb,
                free_capacity_gb: p.capabilities.free_capacity_gb,
            })
            .collect();
        (items, None)
    }
}
