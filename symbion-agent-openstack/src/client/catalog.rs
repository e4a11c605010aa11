//! Keystone service catalog lookups

use serde::Deserialize;
use std::fmt;

/// OpenStack subsystems the agent talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Identity,
    Compute,
    BlockStorage,
}

impl ServiceKind {
    /// Catalog service types accepted for this kind, most preferred first
    fn catalog_types(self) -> &'static [&'static str] {
        match self {
            ServiceKind::Identity => &["identity"],
            ServiceKind::Compute => &["compute"],
            ServiceKind::BlockStorage => &["volumev3", "volumev2", "block-storage", "volume"],
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceKind::Identity => "identity",
            ServiceKind::Compute => "compute",
            ServiceKind::BlockStorage => "block storage",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEndpoint {
    pub interface: String,
    pub url: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
}

impl CatalogEndpoint {
    fn in_region(&self, region: Option<&str>) -> bool {
        match region {
            None => true,
            Some(wanted) => {
                self.region.as_deref() == Some(wanted) || self.region_id.as_deref() == Some(wanted)
            }
        }
    }
}

/// Service catalog returned alongside a Keystone token
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    entries: Vec<CatalogEntry>,
    interface: String,
    region: Option<String>,
}

impl ServiceCatalog {
    pub fn new(entries: Vec<CatalogEntry>, interface: &str, region: Option<&str>) -> Self {
        Self {
            entries,
            interface: interface.to_string(),
            region: region.map(str::to_string),
        }
    }

    /// Endpoint URL for a service, honouring interface and region filters
    pub fn url_for(&self, kind: ServiceKind) -> Option<&str> {
        kind.catalog_types().iter().find_map(|wanted| {
            self.entries
                .iter()
                .filter(|entry| entry.service_type == *wanted)
                .flat_map(|entry| entry.endpoints.iter())
                .find(|ep| ep.interface == self.interface && ep.in_region(self.region.as_deref()))
                .map(|ep| ep.url.as_str())
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
