/*!
Builders de fixtures OpenStack

Produit des objets JSON au format des réponses Keystone v3, Nova v2.1 et
Cinder v3, pour alimenter le [`StubCloud`](crate::StubCloud).
*/

use serde_json::{json, Value};

/// Projet Keystone
pub fn project(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "domain_id": "default",
        "enabled": true,
        "is_domain": false,
        "description": ""
    })
}

/// Flavor Nova (ram en MB, disque en GB)
pub fn flavor(id: &str, vcpus: i64, ram: i64, disk: i64) -> Value {
    json!({
        "id": id,
        "name": format!("flavor-{id}"),
        "vcpus": vcpus,
        "ram": ram,
        "disk": disk,
        "swap": "",
        "OS-FLV-EXT-DATA:ephemeral": 0,
        "os-flavor-access:is_public": true
    })
}

/// Hyperviseur Nova avec ses compteurs de capacité
pub fn hypervisor(
    hostname: &str,
    memory_mb: i64,
    memory_mb_used: i64,
    running_vms: i64,
    vcpus: i64,
    vcpus_used: i64,
) -> Value {
    json!({
        "id": 1,
        "hypervisor_hostname": hostname,
        "hypervisor_type": "QEMU",
        "state": "up",
        "status": "enabled",
        "memory_mb": memory_mb,
        "memory_mb_used": memory_mb_used,
        "running_vms": running_vms,
        "vcpus": vcpus,
        "vcpus_used": vcpus_used,
        "local_gb": 100,
        "local_gb_used": 10
    })
}

/// Serveur Nova (microversion 2.1: flavor référencé par id)
pub fn server(id: &str, status: &str, flavor_id: &str, tenant_id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("vm-{id}"),
        "status": status,
        "tenant_id": tenant_id,
        "user_id": "u1",
        "flavor": {
            "id": flavor_id,
            "links": [{"rel": "bookmark", "href": format!("/flavors/{flavor_id}")}]
        }
    })
}

/// Volume Cinder; `volume_type` à `None` donne un type JSON null
pub fn volume(id: &str, tenant_id: &str, volume_type: Option<&str>, size: i64) -> Value {
    json!({
        "id": id,
        "name": format!("vol-{id}"),
        "status": "available",
        "size": size,
        "volume_type": volume_type,
        "os-vol-tenant-attr:tenant_id": tenant_id
    })
}

/// Pool du scheduler Cinder; les capacités acceptent nombres ou "infinite"/"unknown"
pub fn pool(
    backend: &str,
    total_capacity_gb: impl Into<Value>,
    free_capacity_gb: impl Into<Value>,
) -> Value {
    json!({
        "name": format!("cinder@{backend}#{backend}"),
        "capabilities": {
            "volume_backend_name": backend,
            "total_capacity_gb": total_capacity_gb.into(),
            "free_capacity_gb": free_capacity_gb.into(),
            "driver_version": "3.0.0",
            "storage_protocol": "iSCSI"
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_shapes() {
        let s = server("s1", "ACTIVE", "f1", "p1");
        assert_eq!(s["flavor"]["id"], "f1");
        assert_eq!(s["tenant_id"], "p1");

        let v = volume("v1", "p1", None, 10);
        assert!(v["volume_type"].is_null());
        assert_eq!(v["os-vol-tenant-attr:tenant_id"], "p1");

        let p = pool("lvm", "infinite", 12.5);
        assert_eq!(p["capabilities"]["total_capacity_gb"], "infinite");
        assert_eq!(p["capabilities"]["free_capacity_gb"], 12.5);
    }
}
