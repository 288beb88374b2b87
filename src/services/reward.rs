use crate::models::ReviewVerdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardConfig {
    pub coins_per_homework: u32,
}

/// Coins earned by a verdict. Only acceptances pay, and the amount is flat: the
/// similarity score never scales it.
pub fn compute_reward(verdict: &ReviewVerdict, config: &RewardConfig) -> u32 {
    match verdict {
        ReviewVerdict::Accept { .. } => config.coins_per_homework,
        ReviewVerdict::Reject { .. } | ReviewVerdict::SecondChance { .. } => 0,
    }
}
