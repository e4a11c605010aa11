use super::{
    encode, tag, Accumulator, Counter, ProjectCounters, Tags, SERVER_STATE, SERVER_STATE_TOTAL,
    SERVER_STATS, SERVER_STATS_TOTAL,
};
use crate::resources::{project_name, resolve_flavor, FlavorMap, ProjectMap, Server};

fn add_usage(counter: &mut Counter, vcpus: i64, ram: i64, disk: i64) {
    *counter.entry("vcpus".to_string()).or_default() += vcpus;
    *counter.entry("ram".to_string()).or_default() += ram;
    *counter.entry("disk".to_string()).or_default() += disk;
}

/// Server state counts and flavor resource sums, overall and per project
///
/// Needs projects, flavors and servers. Unknown flavors count as zero
/// resources, unknown tenants land in the "" project bucket.
pub fn gather_server_statistics(
    acc: &mut dyn Accumulator,
    projects: Option<&ProjectMap>,
    flavors: Option<&FlavorMap>,
    servers: Option<&[Server]>,
) {
    let (Some(projects), Some(flavors), Some(servers)) = (projects, flavors, servers) else {
        return;
    };

    let mut overall_states = Counter::new();
    let mut overall_usage = Counter::new();
    let mut project_states = ProjectCounters::new();
    let mut project_usage = ProjectCounters::new();

    for server in servers {
        let status = server.status.to_lowercase();

        // vcpus, ram (MB), disk (GB)
        let (vcpus, ram, disk) = resolve_flavor(flavors, server.flavor_id.as_deref())
            .map(|f| (f.vcpus, f.ram, f.disk))
            .unwrap_or_default();

        *overall_states.entry(status.clone()).or_default() += 1;
        add_usage(&mut overall_usage, vcpus, ram, disk);

        let project = project_name(projects, &server.tenant_id);
        *project_states
            .entry(project.to_string())
            .or_default()
            .entry(status)
            .or_default() += 1;
        add_usage(
            project_usage.entry(project.to_string()).or_default(),
            vcpus,
            ram,
            disk,
        );
    }

    if !overall_states.is_empty() {
        acc.add_fields(SERVER_STATE_TOTAL, encode(&overall_states), Tags::new());
        acc.add_fields(SERVER_STATS_TOTAL, encode(&overall_usage), Tags::new());
    }

    for (project, states) in &project_states {
        let tags = tag("project", project);
        acc.add_fields(SERVER_STATE, encode(states), tags.clone());
        if let Some(usage) = project_usage.get(project) {
            acc.add_fields(SERVER_STATS, encode(usage), tags);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::{flavors, projects, server};
    use crate::metrics::{FieldValue, Fields, MetricBatch};

    fn ints(entries: &[(&str, i64)]) -> Fields {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Integer(*v)))
            .collect()
    }

    fn sum_fields(records: Vec<&Fields>) -> Counter {
        let mut sums = Counter::new();
        for fields in records {
            for (k, v) in fields {
                *sums.entry(k.clone()).or_default() += v.as_i64().unwrap();
            }
        }
        sums
    }

    #[test]
    fn test_single_active_server() {
        let projects = projects(&[("p1", "dev")]);
        let flavors = flavors(&[("f1", 2, 4096, 20)]);
        let servers = vec![server("ACTIVE", "f1", "p1")];

        let mut batch = MetricBatch::new();
        gather_server_statistics(&mut batch, Some(&projects), Some(&flavors), Some(&servers));

        let usage = ints(&[("vcpus", 2), ("ram", 4096), ("disk", 20)]);
        let dev = tag("project", "dev");

        assert_eq!(batch.find_untagged(SERVER_STATE_TOTAL).unwrap().fields, ints(&[("active", 1)]));
        assert_eq!(batch.find_untagged(SERVER_STATS_TOTAL).unwrap().fields, usage);
        assert_eq!(batch.find(SERVER_STATE, &dev).unwrap().fields, ints(&[("active", 1)]));
        assert_eq!(batch.find(SERVER_STATS, &dev).unwrap().fields, usage);
        assert_eq!(batch.len(), 4);
    }

    #[test]
    fn test_state_counts_partition_servers() {
        let projects = projects(&[("p1", "dev"), ("p2", "ops")]);
        let flavors = flavors(&[("f1", 1, 512, 1), ("f2", 4, 8192, 80)]);
        let servers = vec![
            server("ACTIVE", "f1", "p1"),
            server("active", "f2", "p1"),
            server("SHUTOFF", "f2", "p2"),
            server("ERROR", "f1", "orphan-tenant"),
            server("BUILD", "missing-flavor", "p2"),
        ];

        let mut batch = MetricBatch::new();
        gather_server_statistics(&mut batch, Some(&projects), Some(&flavors), Some(&servers));

        let total = &batch.find_untagged(SERVER_STATE_TOTAL).unwrap().fields;
        let total_count: i64 = total.values().map(|v| v.as_i64().unwrap()).sum();
        assert_eq!(total_count, servers.len() as i64);
        assert_eq!(total.get("active"), Some(&FieldValue::Integer(2)));

        let per_project = sum_fields(batch.series(SERVER_STATE).map(|r| &r.fields).collect());
        assert_eq!(encode(&per_project), *total);

        // unresolved tenant is kept under an empty project name
        let orphan = batch.find(SERVER_STATE, &tag("project", "")).unwrap();
        assert_eq!(orphan.fields, ints(&[("error", 1)]));

        // unknown flavor contributes nothing to resource sums
        let ops = batch.find(SERVER_STATS, &tag("project", "ops")).unwrap();
        assert_eq!(ops.fields, ints(&[("vcpus", 4), ("ram", 8192), ("disk", 80)]));

        let usage_total = sum_fields(batch.series(SERVER_STATS).map(|r| &r.fields).collect());
        assert_eq!(encode(&usage_total), batch.find_untagged(SERVER_STATS_TOTAL).unwrap().fields);
    }

    #[test]
    fn test_server_without_flavor_reference() {
        let projects = projects(&[("p1", "dev")]);
        let flavors = flavors(&[("f1", 2, 4096, 20)]);
        let servers = vec![Server {
            status: "ACTIVE".into(),
            flavor_id: None,
            tenant_id: "p1".into(),
        }];

        let mut batch = MetricBatch::new();
        gather_server_statistics(&mut batch, Some(&projects), Some(&flavors), Some(&servers));

        assert_eq!(
            batch.find_untagged(SERVER_STATS_TOTAL).unwrap().fields,
            ints(&[("vcpus", 0), ("ram", 0), ("disk", 0)])
        );
    }

    #[test]
    fn test_requires_all_inputs() {
        let projects = projects(&[("p1", "dev")]);
        let flavors = flavors(&[("f1", 2, 4096, 20)]);
        let servers = vec![server("ACTIVE", "f1", "p1")];

        let mut batch = MetricBatch::new();
        gather_server_statistics(&mut batch, None, Some(&flavors), Some(&servers));
        gather_server_statistics(&mut batch, Some(&projects), None, Some(&servers));
        gather_server_statistics(&mut batch, Some(&projects), Some(&flavors), None);
        gather_server_statistics(&mut batch, Some(&projects), Some(&flavors), Some(&[]));
        assert!(batch.is_empty());
    }
}
