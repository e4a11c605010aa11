//! OpenStack statistics aggregation
//!
//! Turns one cycle's [`Inventory`] into metric records:
//! - Identity: project count
//! - Hypervisors: per-host capacity and usage, plus totals
//! - Servers: state counts and flavor resource sums, overall and per project
//! - Volumes: counts and sizes by volume type, overall and per project
//! - Storage pools: capacity per backend
//!
//! Aggregators never fail. A missing input collection only suppresses the
//! records that depend on it.

mod hypervisor;
mod identity;
mod server;
mod storage_pool;
mod volume;

pub use hypervisor::gather_hypervisor_statistics;
pub use identity::gather_identity_statistics;
pub use server::gather_server_statistics;
pub use storage_pool::gather_storage_pool_statistics;
pub use volume::gather_volume_statistics;

use crate::resources::Inventory;
use serde::Serialize;
use std::collections::BTreeMap;

pub const IDENTITY_TOTAL: &str = "identity_total";
pub const HYPERVISOR: &str = "hypervisor";
pub const HYPERVISOR_TOTAL: &str = "hypervisor_total";
pub const SERVER_STATE_TOTAL: &str = "server_state_total";
pub const SERVER_STATE: &str = "server_state";
pub const SERVER_STATS_TOTAL: &str = "server_stats_total";
pub const SERVER_STATS: &str = "server_stats";
pub const VOLUME_COUNT_TOTAL: &str = "volume_count_total";
pub const VOLUME_COUNT: &str = "volume_count";
pub const VOLUME_SIZE_TOTAL: &str = "volume_size_total";
pub const VOLUME_SIZE: &str = "volume_size";
pub const STORAGE_POOL: &str = "storage_pool";

/// Numeric field value; only storage pool capacities are floats
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::Float(_) => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

pub type Fields = BTreeMap<String, FieldValue>;
pub type Tags = BTreeMap<String, String>;

/// Running integer sums keyed by field name
pub type Counter = BTreeMap<String, i64>;

/// Counters keyed by project name
pub type ProjectCounters = BTreeMap<String, Counter>;

/// Convert integer counters into record fields
pub fn encode(counter: &Counter) -> Fields {
    counter
        .iter()
        .map(|(k, v)| (k.clone(), FieldValue::Integer(*v)))
        .collect()
}

/// Single tag set
pub fn tag(key: &str, value: &str) -> Tags {
    Tags::from([(key.to_string(), value.to_string())])
}

/// Receiver of emitted metric records
pub trait Accumulator {
    fn add_fields(&mut self, series: &str, fields: Fields, tags: Tags);
}

/// One fully formed metric record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub series: String,
    pub fields: Fields,
    pub tags: Tags,
}

impl MetricRecord {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}

/// In-memory accumulator holding the records of one cycle, in emission order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricBatch {
    records: Vec<MetricRecord>,
}

impl MetricBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[MetricRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records of one series
    pub fn series<'a>(&'a self, series: &'a str) -> impl Iterator<Item = &'a MetricRecord> + 'a {
        self.records.iter().filter(move |r| r.series == series)
    }

    /// First record of a series carrying exactly the given tags
    pub fn find(&self, series: &str, tags: &Tags) -> Option<&MetricRecord> {
        self.records
            .iter()
            .find(|r| r.series == series && &r.tags == tags)
    }

    /// First untagged record of a series
    pub fn find_untagged(&self, series: &str) -> Option<&MetricRecord> {
        self.find(series, &Tags::new())
    }
}

impl Accumulator for MetricBatch {
    fn add_fields(&mut self, series: &str, fields: Fields, tags: Tags) {
        self.records.push(MetricRecord {
            series: series.to_string(),
            fields,
            tags,
        });
    }
}

/// Run every aggregator over whatever the cycle managed to fetch
pub fn gather_all(acc: &mut dyn Accumulator, inventory: &Inventory) {
    let projects = inventory.projects.as_ref();

    gather_identity_statistics(acc, projects);
    gather_hypervisor_statistics(acc, inventory.hypervisors.as_deref());
    gather_server_statistics(
        acc,
        projects,
        inventory.flavors.as_ref(),
        inventory.servers.as_deref(),
    );
    gather_volume_statistics(acc, projects, inventory.volumes.as_deref());
    gather_storage_pool_statistics(acc, inventory.storage_pools.as_deref());
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::resources::*;

    pub fn projects(entries: &[(&str, &str)]) -> ProjectMap {
        project_map(
            entries
                .iter()
                .map(|(id, name)| Project { id: id.to_string(), name: name.to_string() })
                .collect(),
        )
    }

    pub fn flavors(entries: &[(&str, i64, i64, i64)]) -> FlavorMap {
        flavor_map(
            entries
                .iter()
                .map(|(id, vcpus, ram, disk)| Flavor {
                    id: id.to_string(),
                    vcpus: *vcpus,
                    ram: *ram,
                    disk: *disk,
                })
                .collect(),
        )
    }

    pub fn server(status: &str, flavor_id: &str, tenant_id: &str) -> Server {
        Server {
            status: status.to_string(),
            flavor_id: Some(flavor_id.to_string()),
            tenant_id: tenant_id.to_string(),
        }
    }

    pub fn volume(tenant_id: &str, volume_type: &str, size: i64) -> Volume {
        Volume {
            tenant_id: tenant_id.to_string(),
            volume_type: volume_type.to_string(),
            size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::resources::{Hypervisor, StoragePool};

    fn full_inventory() -> Inventory {
        Inventory {
            projects: Some(projects(&[("p1", "dev"), ("p2", "ops")])),
            hypervisors: Some(vec![Hypervisor {
                hostname: "cmp1".into(),
                memory_mb: 4096,
                memory_mb_used: 1024,
                running_vms: 1,
                vcpus: 8,
                vcpus_used: 2,
            }]),
            flavors: Some(flavors(&[("f1", 2, 4096, 20)])),
            servers: Some(vec![server("ACTIVE", "f1", "p1"), server("SHUTOFF", "f1", "p2")]),
            volumes: Some(vec![volume("p1", "", 10), volume("p2", "ssd", 5)]),
            storage_pools: Some(vec![StoragePool {
                backend_name: "lvm".into(),
                total_capacity_gb: 100.0,
                free_capacity_gb: 40.0,
            }]),
        }
    }

    #[test]
    fn test_gather_all_covers_every_family() {
        let mut batch = MetricBatch::new();
        gather_all(&mut batch, &full_inventory());

        for series in [
            IDENTITY_TOTAL,
            HYPERVISOR,
            HYPERVISOR_TOTAL,
            SERVER_STATE_TOTAL,
            SERVER_STATE,
            SERVER_STATS_TOTAL,
            SERVER_STATS,
            VOLUME_COUNT_TOTAL,
            VOLUME_COUNT,
            VOLUME_SIZE_TOTAL,
            VOLUME_SIZE,
            STORAGE_POOL,
        ] {
            assert!(batch.series(series).next().is_some(), "missing {}", series);
        }
        // 1 identity + 2 hypervisor + 2 + 2*2 server + 2 + 2*2 volume + 1 pool
        assert_eq!(batch.len(), 16);
    }

    #[test]
    fn test_gather_all_is_idempotent() {
        let inventory = full_inventory();
        let mut first = MetricBatch::new();
        let mut second = MetricBatch::new();
        gather_all(&mut first, &inventory);
        gather_all(&mut second, &inventory);
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_projects_only_suppresses_dependents() {
        let mut inventory = full_inventory();
        inventory.projects = None;

        let mut batch = MetricBatch::new();
        gather_all(&mut batch, &inventory);

        assert!(batch.series(IDENTITY_TOTAL).next().is_none());
        assert!(batch.series(SERVER_STATE_TOTAL).next().is_none());
        assert!(batch.series(VOLUME_COUNT_TOTAL).next().is_none());
        assert!(batch.find_untagged(HYPERVISOR_TOTAL).is_some());
        assert_eq!(batch.series(STORAGE_POOL).count(), 1);
    }

    #[test]
    fn test_empty_inventory_emits_nothing() {
        let mut batch = MetricBatch::new();
        gather_all(&mut batch, &Inventory::default());
        assert!(batch.is_empty());
    }

    #[test]
    fn test_field_value_serialization() {
        let fields: Fields = [
            ("count".to_string(), FieldValue::from(3)),
            ("free".to_string(), FieldValue::from(1.5)),
        ]
        .into_iter()
        .collect();
        let rendered = serde_json::to_string(&fields).unwrap();
        assert_eq!(rendered, r#"{"count":3,"free":1.5}"#);
    }
}
