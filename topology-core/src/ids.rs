//! Process-wide id generators for topologies and nodes

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Topology and node identifier.
pub type TopoId = u64;

static NEXT_TOPOLOGY_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_NODE_COUNTER: AtomicU32 = AtomicU32::new(1);

/// Allocate the next topology id. Ids start at 1.
pub fn next_topology_id() -> TopoId {
    NEXT_TOPOLOGY_ID.fetch_add(1, Ordering::Relaxed)
}

/// Allocate the next node id: owning process id in the high 32 bits,
/// a monotonically increasing counter in the low 32 bits.
pub fn next_node_id() -> TopoId {
    let counter = NEXT_NODE_COUNTER.fetch_add(1, Ordering::Relaxed);
    ((std::process::id() as u64) << 32) | counter as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_ids_increase() {
        let a = next_topology_id();
        let b = next_topology_id();
        assert!(a >= 1);
        assert!(b > a);
    }

    #[test]
    fn test_node_id_embeds_process_id() {
        let id = next_node_id();
        assert_eq!(id >> 32, std::process::id() as u64);
        assert_ne!(id & 0xffff_ffff, 0);
        assert!(next_node_id() > id);
    }
}
