//! Chain-side collaborators: logical time, round numbering, and the view
//! of the current tip used for lock-height checks.

pub mod rounds;
pub mod slots;

use std::sync::atomic::{AtomicU64, Ordering};

pub use rounds::{DelegateRounds, RoundCalculator};
pub use slots::{FixedSlotClock, SlotClock, SystemSlotClock};

/// Read-only view of the chain head.
pub trait ChainTip: Send + Sync {
    /// Height of the last committed block, if any.
    fn last_block_height(&self) -> Option<u64>;
}

/// A tip that is moved by hand. `0` means no block yet.
#[derive(Debug, Default)]
pub struct MemoryChainTip {
    height: AtomicU64,
}

impl MemoryChainTip {
    pub fn new(height: u64) -> Self {
        Self {
            height: AtomicU64::new(height),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }
}

impl ChainTip for MemoryChainTip {
    fn last_block_height(&self) -> Option<u64> {
        match self.height.load(Ordering::SeqCst) {
            0 => None,
            h => Some(h),
        }
    }
}
