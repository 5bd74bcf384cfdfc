//! Weighted lottery over accumulated credits.

use rand::Rng;

/// Outcome of a draw
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    NoEntries,
    /// Winners in draw order, no duplicates
    Winners(Vec<String>),
}

impl Selection {
    pub fn winners(&self) -> &[String] {
        match self {
            Selection::NoEntries => &[],
            Selection::Winners(winners) => winners,
        }
    }
}

/// Draw up to `winners_count` distinct wallets, each round weighted by remaining credits.
///
/// Candidates are scanned in the order given; wallets with non-positive or non-finite
/// credits never win. A `winners_count` of zero is treated as one, so a raffle with
/// entrants always gets a winner.
pub fn select_winners<R: Rng + ?Sized>(
    wallet_credits: &[(String, f64)],
    winners_count: u32,
    rng: &mut R,
) -> Selection {
    let mut pool: Vec<(&str, f64)> = wallet_credits
        .iter()
        .filter(|(_, credits)| credits.is_finite() && *credits > 0.0)
        .map(|(wallet, credits)| (wallet.as_str(), *credits))
        .collect();

    if pool.is_empty() {
        return Selection::NoEntries;
    }
    normalize_weights(&mut pool);

    let rounds = std::cmp::min(winners_count.max(1) as usize, pool.len());
    let mut winners = Vec::with_capacity(rounds);

    for _ in 0..rounds {
        let total: f64 = pool.iter().map(|(_, credits)| credits).sum();
        let threshold = rng.gen_range(0.0..total);
        let index = pick_index(&pool, threshold);
        let (wallet, _) = pool.remove(index);
        winners.push(wallet.to_string());
    }

    Selection::Winners(winners)
}

/// Rescale by the largest weight when the sum overflows, keeping the ratios.
fn normalize_weights(pool: &mut [(&str, f64)]) {
    let total: f64 = pool.iter().map(|(_, credits)| credits).sum();
    if total.is_finite() {
        return;
    }
    let max = pool
        .iter()
        .map(|(_, credits)| *credits)
        .fold(0.0_f64, f64::max);
    for (_, credits) in pool.iter_mut() {
        // never rounds a positive weight down to zero
        *credits = (*credits / max).max(f64::MIN_POSITIVE);
    }
}

/// Cumulative-weight inversion: first candidate at which the remainder drops to <= 0.
fn pick_index(pool: &[(&str, f64)], threshold: f64) -> usize {
    let mut remainder = threshold;
    for (index, (_, credits)) in pool.iter().enumerate() {
        remainder -= credits;
        if remainder <= 0.0 {
            return index;
        }
    }
    // float rounding can leave a sliver above zero
    pool.len() - 1
}
