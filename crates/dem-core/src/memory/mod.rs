//! Memory entry manager
//!
//! Owns the bounded event memories (primary, user-defined, mirror) and the
//! permanent memory. Pools are independent: allocation in one never blocks
//! another.

mod entry;
mod permanent;
mod pool;

use std::sync::Arc;

use serde::Serialize;

pub use entry::{freeze_frame, AgingStatus, MemoryEntry};
pub use permanent::{PermanentEntry, PermanentMemory, PermanentState};
pub use pool::{select_victim, AllocationOutcome, DisplacementInfo, MemoryPool};

use crate::config::DemConfig;
use crate::error::RangeError;
use crate::runtime_check::RuntimeCheck;

/// NV block `index` blocks past `base`; `None` past the last block id
fn nv_block(base: u16, index: usize) -> Option<u16> {
    u16::try_from(index).ok().and_then(|index| base.checked_add(index))
}

/// Range error for an entry whose NV block lies past the last block id
fn nv_block_overflow(base: u16, index: usize) -> RangeError {
    RangeError {
        what: "nv block",
        index: base as usize + index,
        len: u16::MAX as usize + 1,
    }
}

/// NV block touched since the last persistence pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirtyBlock {
    /// Memory name (`permanent` for the permanent memory)
    pub memory: String,
    /// NV block index
    pub block: u16,
}

/// All fault memories of one instance
#[derive(Debug)]
pub struct MemoryManager {
    pools: Vec<MemoryPool>,
    permanent: PermanentMemory,
    checks: Arc<RuntimeCheck>,
}

impl MemoryManager {
    pub fn new(config: &DemConfig, checks: Arc<RuntimeCheck>) -> Self {
        Self {
            pools: config
                .memories
                .iter()
                .map(|def| MemoryPool::new(def, checks.clone()))
                .collect(),
            permanent: PermanentMemory::new(&config.permanent, checks.clone()),
            checks,
        }
    }

    /// Pool at `slot`, or a range error
    pub fn pool(&self, slot: usize) -> Result<&MemoryPool, RangeError> {
        let slot = self.checks.check_index("memory", slot, self.pools.len())?;
        Ok(&self.pools[slot])
    }

    /// Pool at `slot`; out-of-range slots resolve to pool 0
    pub fn pool_safe(&self, slot: usize) -> &MemoryPool {
        &self.pools[self.checks.index_or_default("memory", slot, self.pools.len())]
    }

    pub fn pool_by_name(&self, name: &str) -> Option<&MemoryPool> {
        self.pools.iter().find(|p| p.name() == name)
    }

    pub fn pools(&self) -> &[MemoryPool] {
        &self.pools
    }

    pub fn permanent(&self) -> &PermanentMemory {
        &self.permanent
    }

    /// Map a pool entry to the NV block that stores it
    pub fn entry_index_to_nv_block_index(&self, slot: usize, index: usize) -> Result<u16, RangeError> {
        self.pool(slot)?.nv_block_index(index)
    }

    /// Drain modified NV blocks across all memories
    pub fn take_dirty_blocks(&self) -> Vec<DirtyBlock> {
        let mut blocks: Vec<DirtyBlock> = self
            .pools
            .iter()
            .flat_map(|pool| {
                pool.take_dirty_blocks().into_iter().map(move |block| DirtyBlock {
                    memory: pool.name().to_string(),
                    block,
                })
            })
            .collect();
        blocks.extend(
            self.permanent
                .take_dirty_blocks()
                .into_iter()
                .map(|block| DirtyBlock {
                    memory: "permanent".to_string(),
                    block,
                }),
        );
        blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryDef, MemoryKind};

    fn manager() -> (MemoryManager, Arc<RuntimeCheck>) {
        let mut config = DemConfig::default();
        config.memories.push(MemoryDef {
            name: "mirror".to_string(),
            kind: MemoryKind::Mirror,
            size: 2,
            first_event: None,
            last_event: None,
            nv_block_base: 8,
        });
        config.permanent.size = 1;
        config.permanent.nv_block_base = 10;
        let checks = Arc::new(RuntimeCheck::new());
        (MemoryManager::new(&config, checks.clone()), checks)
    }

    #[test]
    fn test_pool_lookup() {
        let (manager, checks) = manager();
        assert_eq!(manager.pool(1).unwrap().name(), "mirror");
        assert!(manager.pool(2).is_err());
        assert_eq!(manager.pool_safe(2).name(), "primary");
        assert_eq!(checks.violations(), 2);
    }

    #[test]
    fn test_nv_block_mapping() {
        let (manager, _) = manager();
        assert_eq!(manager.entry_index_to_nv_block_index(0, 7), Ok(7));
        assert_eq!(manager.entry_index_to_nv_block_index(1, 1), Ok(9));
        assert!(manager.entry_index_to_nv_block_index(1, 2).is_err());
    }

    #[test]
    fn test_dirty_blocks_span_memories() {
        let (manager, _) = manager();
        manager.permanent().add(crate::types::EventId(1));
        manager.pool(1).unwrap().update(0, |e| e.max_fdc = 1);
        assert_eq!(
            manager.take_dirty_blocks(),
            vec![
                DirtyBlock {
                    memory: "mirror".to_string(),
                    block: 8
                },
                DirtyBlock {
                    memory: "permanent".to_string(),
                    block: 10
                },
            ]
        );
    }
}
