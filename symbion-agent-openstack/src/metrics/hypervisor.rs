use super::{encode, tag, Accumulator, Counter, Tags, HYPERVISOR, HYPERVISOR_TOTAL};
use crate::resources::Hypervisor;

fn counters(hypervisor: &Hypervisor) -> [(&'static str, i64); 5] {
    [
        ("memory_mb", hypervisor.memory_mb),
        ("memory_mb_used", hypervisor.memory_mb_used),
        ("running_vms", hypervisor.running_vms),
        ("vcpus", hypervisor.vcpus),
        ("vcpus_used", hypervisor.vcpus_used),
    ]
}

/// Per-hypervisor capacity/usage records plus an untagged total
pub fn gather_hypervisor_statistics(acc: &mut dyn Accumulator, hypervisors: Option<&[Hypervisor]>) {
    let Some(hypervisors) = hypervisors else {
        return;
    };

    let mut totals = Counter::new();

    for hypervisor in hypervisors {
        let mut fields = Counter::new();
        for (name, value) in counters(hypervisor) {
            *totals.entry(name.to_string()).or_default() += value;
            fields.insert(name.to_string(), value);
        }

        acc.add_fields(HYPERVISOR, encode(&fields), tag("hypervisor", &hypervisor.hostname));
    }

    if !totals.is_empty() {
        acc.add_fields(HYPERVISOR_TOTAL, encode(&totals), Tags::new());
    }
}
