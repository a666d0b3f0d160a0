//! Round numbering.

/// Maps a block height to the consensus round it belongs to.
pub trait RoundCalculator: Send + Sync {
    fn calc(&self, height: u64) -> u64;
}

/// Rounds of `delegates` consecutive blocks: heights `1..=d` are round 1,
/// `d+1..=2d` round 2, and so on.
#[derive(Debug, Clone, Copy)]
pub struct DelegateRounds {
    delegates: u64,
}

impl DelegateRounds {
    pub fn new(delegates: u64) -> Self {
        Self {
            delegates: delegates.max(1),
        }
    }
}

impl RoundCalculator for DelegateRounds {
    fn calc(&self, height: u64) -> u64 {
        height.div_ceil(self.delegates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_are_ceiling_of_height() {
        let rounds = DelegateRounds::new(101);
        assert_eq!(rounds.calc(0), 0);
        assert_eq!(rounds.calc(1), 1);
        assert_eq!(rounds.calc(101), 1);
        assert_eq!(rounds.calc(102), 2);
    }

    #[test]
    fn zero_delegates_is_clamped() {
        assert_eq!(DelegateRounds::new(0).calc(5), 5);
    }
}
