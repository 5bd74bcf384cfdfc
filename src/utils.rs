// Raffle Settlement - Utility Functions
use std::time::{SystemTime, UNIX_EPOCH};

use solana_sdk::clock::UnixTimestamp;

/// Base units per whole coin (8 decimals)
pub const BASE_UNITS_PER_COIN: u64 = 100_000_000;

/// Current wall-clock time as a unix timestamp
pub fn now_unix() -> UnixTimestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as UnixTimestamp)
        .unwrap_or_default()
}

/// Calculate credits earned for a deposit
pub fn calculate_credits(amount: u64, credit_conversion: f64) -> f64 {
    amount as f64 / credit_conversion
}

/// Split a prize evenly; the remainder stays with the treasury
pub fn split_prize(prize_amount: u64, winners: usize) -> (u64, u64) {
    if winners == 0 {
        return (0, prize_amount);
    }
    let winners = winners as u64;
    (prize_amount / winners, prize_amount % winners)
}

/// Convert base units to whole coins (for display purposes)
pub fn base_units_to_coins(amount: u64) -> f64 {
    amount as f64 / BASE_UNITS_PER_COIN as f64
}

/// Convert whole coins to base units
pub fn coins_to_base_units(coins: f64) -> u64 {
    (coins * BASE_UNITS_PER_COIN as f64).round() as u64
}

/// Render an amount like `1000` or `0.5` without trailing zeros
pub fn format_coins(amount: u64) -> String {
    let whole = amount / BASE_UNITS_PER_COIN;
    let frac = amount % BASE_UNITS_PER_COIN;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:08}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
