use super::{
    encode, tag, Accumulator, Counter, ProjectCounters, Tags, VOLUME_COUNT, VOLUME_COUNT_TOTAL,
    VOLUME_SIZE, VOLUME_SIZE_TOTAL,
};
use crate::resources::{project_name, ProjectMap, Volume};

const DEFAULT_VOLUME_TYPE: &str = "default";

/// Volume counts and sizes (GB) by type, overall and per project
pub fn gather_volume_statistics(
    acc: &mut dyn Accumulator,
    projects: Option<&ProjectMap>,
    volumes: Option<&[Volume]>,
) {
    let (Some(projects), Some(volumes)) = (projects, volumes) else {
        return;
    };

    let mut overall_count = Counter::new();
    let mut overall_size = Counter::new();
    let mut project_count = ProjectCounters::new();
    let mut project_size = ProjectCounters::new();

    for volume in volumes {
        let volume_type = if volume.volume_type.is_empty() {
            DEFAULT_VOLUME_TYPE
        } else {
            volume.volume_type.as_str()
        };

        *overall_count.entry(volume_type.to_string()).or_default() += 1;
        *overall_size.entry(volume_type.to_string()).or_default() += volume.size;

        let project = project_name(projects, &volume.tenant_id);
        *project_count
            .entry(project.to_string())
            .or_default()
            .entry(volume_type.to_string())
            .or_default() += 1;
        *project_size
            .entry(project.to_string())
            .or_default()
            .entry(volume_type.to_string())
            .or_default() += volume.size;
    }

    if !overall_count.is_empty() {
        acc.add_fields(VOLUME_COUNT_TOTAL, encode(&overall_count), Tags::new());
        acc.add_fields(VOLUME_SIZE_TOTAL, encode(&overall_size), Tags::new());
    }

    for (project, count) in &project_count {
        let tags = tag("project", project);
        acc.add_fields(VOLUME_COUNT, encode(count), tags.clone());
        if let Some(size) = project_size.get(project) {
            acc.add_fields(VOLUME_SIZE, encode(size), tags);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::{projects, volume};
    use crate::metrics::{FieldValue, Fields, MetricBatch};

    fn ints(entries: &[(&str, i64)]) -> Fields {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), FieldValue::Integer(*v)))
            .collect()
    }

    #[test]
    fn test_empty_type_defaults() {
        let projects = projects(&[("p1", "dev")]);
        let volumes = vec![volume("p1", "", 10), volume("p1", "ssd", 5)];

        let mut batch = MetricBatch::new();
        gather_volume_statistics(&mut batch, Some(&projects), Some(&volumes));

        assert_eq!(
            batch.find_untagged(VOLUME_COUNT_TOTAL).unwrap().fields,
            ints(&[("default", 1), ("ssd", 1)])
        );
        assert_eq!(
            batch.find_untagged(VOLUME_SIZE_TOTAL).unwrap().fields,
            ints(&[("default", 10), ("ssd", 5)])
        );

        let dev = tag("project", "dev");
        assert_eq!(
            batch.find(VOLUME_COUNT, &dev).unwrap().fields,
            ints(&[("default", 1), ("ssd", 1)])
        );
        assert_eq!(
            batch.find(VOLUME_SIZE, &dev).unwrap().fields,
            ints(&[("default", 10), ("ssd", 5)])
        );
    }

    #[test]
    fn test_literal_default_merges_with_empty() {
        let projects = projects(&[("p1", "dev"), ("p2", "ops")]);
        let volumes = vec![
            volume("p1", "", 1),
            volume("p2", "default", 2),
            volume("p2", "", 3),
            volume("ghost", "ceph", 40),
        ];

        let mut batch = MetricBatch::new();
        gather_volume_statistics(&mut batch, Some(&projects), Some(&volumes));

        let count = &batch.find_untagged(VOLUME_COUNT_TOTAL).unwrap().fields;
        assert_eq!(count.get("default"), Some(&FieldValue::Integer(3)));
        assert_eq!(count.get("ceph"), Some(&FieldValue::Integer(1)));

        let size = &batch.find_untagged(VOLUME_SIZE_TOTAL).unwrap().fields;
        assert_eq!(size.get("default"), Some(&FieldValue::Integer(6)));

        let ghost = batch.find(VOLUME_SIZE, &tag("project", "")).unwrap();
        assert_eq!(ghost.fields, ints(&[("ceph", 40)]));

        // two totals + count/size for dev, ops and the unresolved bucket
        assert_eq!(batch.len(), 8);
    }

    #[test]
    fn test_requires_projects_and_volumes() {
        let projects = projects(&[("p1", "dev")]);
        let volumes = vec![volume("p1", "ssd", 5)];

        let mut batch = MetricBatch::new();
        gather_volume_statistics(&mut batch, None, Some(&volumes));
        gather_volume_statistics(&mut batch, Some(&projects), None);
        gather_volume_statistics(&mut batch, Some(&projects), Some(&[]));
        assert!(batch.is_empty());
    }
}
