//! Block-at-a-time guest runner with a translation cache

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use xe_core::config::JitConfig;
use xe_memory::GuestMemory;
use xe_ppu::{translate_block, Block, Executor, ExitReason, ThreadState};

/// Why [`Runner::run`] stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    /// A block left exception bits pending
    Exception { pending: u64, cia: u64 },
    /// The block budget ran out; `next` is where execution would resume
    BlockLimit { next: u64 },
}

/// Translated blocks keyed by their start address
#[derive(Default)]
pub struct BlockCache {
    blocks: RwLock<HashMap<u64, Arc<Block>>>,
}

impl BlockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached block at `start`, translating it on a miss
    pub fn get_or_translate(&self, memory: &GuestMemory, start: u64, config: &JitConfig) -> Result<Arc<Block>> {
        if let Some(block) = self.blocks.read().get(&start) {
            return Ok(Arc::clone(block));
        }

        let block = Arc::new(
            translate_block(memory, start, config).with_context(|| format!("Failed to translate block at 0x{:016X}", start))?,
        );
        self.blocks.write().entry(start).or_insert_with(|| Arc::clone(&block));
        Ok(block)
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }
}

/// One hardware thread driven block by block
pub struct Runner {
    pub memory: Arc<GuestMemory>,
    pub state: ThreadState,
    config: JitConfig,
    cache: BlockCache,
    executor: Executor,
}

impl Runner {
    pub fn new(memory: Arc<GuestMemory>, config: JitConfig) -> Self {
        let step_limit = match config.step_limit {
            0 => u64::MAX,
            limit => limit,
        };
        Self {
            memory,
            state: ThreadState::new(0),
            config,
            cache: BlockCache::new(),
            executor: Executor::new(step_limit),
        }
    }

    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    /// Run from `entry` for at most `max_blocks` blocks
    pub fn run(&mut self, entry: u64, max_blocks: u64) -> Result<Stop> {
        let mut pc = entry;
        for executed in 0..max_blocks {
            let block = self.cache.get_or_translate(&self.memory, pc, &self.config)?;
            let exit = self
                .executor
                .run(&block, &mut self.state, self.memory.as_ref())
                .with_context(|| format!("Block at 0x{:016X} failed", pc))?;

            match exit {
                ExitReason::Continue { next } => {
                    tracing::trace!("block {} at 0x{:016X} -> 0x{:016X}", executed, pc, next);
                    pc = next;
                }
                ExitReason::Exception { pending } => {
                    return Ok(Stop::Exception {
                        pending,
                        cia: self.state.cia,
                    });
                }
            }
        }
        Ok(Stop::BlockLimit { next: pc })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xe_ppu::state::ex;

    const ENTRY: u64 = 0x1000;

    fn runner(code: &[u32]) -> Runner {
        let memory = Arc::new(GuestMemory::new(0x1_0000).unwrap());
        for (i, word) in code.iter().enumerate() {
            memory.write::<u32>(ENTRY + 4 * i as u64, *word).unwrap();
        }
        Runner::new(memory, JitConfig::default())
    }

    #[test]
    fn test_runs_until_system_call() {
        // li r3, 7; sc
        let mut runner = runner(&[0x3860_0007, 0x4400_0002]);
        let stop = runner.run(ENTRY, 10).unwrap();
        assert_eq!(
            stop,
            Stop::Exception {
                pending: ex::SYSTEM_CALL,
                cia: ENTRY + 4
            }
        );
        assert_eq!(runner.state.gpr[3], 7);
    }

    #[test]
    fn test_loop_reuses_cached_block() {
        // addi r3, r3, 1; b -4
        let mut runner = runner(&[0x3863_0001, 0x4BFF_FFFC]);
        let stop = runner.run(ENTRY, 5).unwrap();
        assert_eq!(stop, Stop::BlockLimit { next: ENTRY });
        assert_eq!(runner.state.gpr[3], 5);
        assert_eq!(runner.cache().len(), 1);
    }

    #[test]
    fn test_unimplemented_entry_is_an_error() {
        let mut runner = runner(&[0]);
        assert!(runner.run(ENTRY, 1).is_err());
    }
}
