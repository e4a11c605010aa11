use super::{tag, Accumulator, FieldValue, Fields, STORAGE_POOL};
use crate::resources::StoragePool;

/// Capacity per storage backend; this family has no rollup record
pub fn gather_storage_pool_statistics(acc: &mut dyn Accumulator, pools: Option<&[StoragePool]>) {
    let Some(pools) = pools else {
        return;
    };

    for pool in pools {
        let fields = Fields::from([
            ("total_capacity_gb".to_string(), FieldValue::Float(pool.total_capacity_gb)),
            ("free_capacity_gb".to_string(), FieldValue::Float(pool.free_capacity_gb)),
        ]);
        acc.add_fields(STORAGE_POOL, fields, tag("name", &pool.backend_name));
    }
}
