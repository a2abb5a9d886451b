use chrono::{DateTime, TimeDelta, Utc};
use dotenv::dotenv;
use log::debug;
use once_cell::sync::Lazy;
use std::env;

use super::api_util::Rejection;
use super::catalog;

pub const BLOCK_REWARD: f64 = 20.0;
pub const MIN_MINE_INTERVAL_SECS: i64 = 9;

const DEFAULT_NETWORK_GROWTH_RATE: f64 = 25.0;

// Rival miners joining the network, per mining tick of any user.
static NETWORK_GROWTH_RATE: Lazy<f64> = Lazy::new(|| {
    dotenv().ok();
    env::var("NETWORK_GROWTH_RATE")
        .ok()
        .and_then(|rate| rate.parse::<f64>().ok())
        .filter(|rate| rate.is_finite() && *rate >= 0.0)
        .unwrap_or(DEFAULT_NETWORK_GROWTH_RATE)
});

pub fn network_growth_rate() -> f64 {
    *NETWORK_GROWTH_RATE
}

/// Fraction of the block a user with `power` earns against `network_power` rivals.
pub fn share_of(power: i64, network_power: f64) -> f64 {
    if power <= 0 {
        return 0.0;
    }
    let total = network_power.max(0.0) + power as f64;
    power as f64 / total
}

pub fn block_reward_for(power: i64, network_power: f64) -> f64 {
    BLOCK_REWARD * share_of(power, network_power)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MineDecision {
    /// Mined less than `MIN_MINE_INTERVAL_SECS` ago.
    TooSoon,
    NoPower,
    Reward(f64),
}

pub fn decide_mine(
    last_mine_time: Option<DateTime<Utc>>,
    power: i64,
    network_power: f64,
    now: DateTime<Utc>,
) -> MineDecision {
    if last_mine_time.is_some_and(|last| now - last < TimeDelta::seconds(MIN_MINE_INTERVAL_SECS)) {
        return MineDecision::TooSoon;
    }
    if power <= 0 {
        return MineDecision::NoPower;
    }
    let reward = block_reward_for(power, network_power);
    debug!(
        "power = {}, network = {}, reward = {}",
        power, network_power, reward
    );
    MineDecision::Reward(reward)
}

/// Balance after paying `cost`. Rejects instead of going negative.
pub fn debit(balance: f64, cost: f64) -> Result<f64, Rejection> {
    if balance < cost {
        return Err(Rejection::InsufficientBalance);
    }
    Ok(balance - cost)
}

/// Returns `(new_balance, cost)` for unlocking one more room.
pub fn buy_room(rooms_unlocked: i32, balance: f64) -> Result<(f64, f64), Rejection> {
    if rooms_unlocked >= catalog::MAX_ROOMS {
        return Err(Rejection::MaxRoomsReached);
    }
    let cost = catalog::room_cost(rooms_unlocked).ok_or(Rejection::MaxRoomsReached)?;
    Ok((debit(balance, cost)?, cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn quarter_share_earns_quarter_block() {
        assert_eq!(share_of(500, 1500.0), 0.25);
        assert_eq!(
            decide_mine(None, 500, 1500.0, now()),
            MineDecision::Reward(5.0)
        );
    }

    #[test]
    fn mining_is_rate_limited() {
        let last = now() - TimeDelta::seconds(8);
        assert_eq!(
            decide_mine(Some(last), 500, 1500.0, now()),
            MineDecision::TooSoon
        );
        let last = now() - TimeDelta::seconds(9);
        assert_eq!(
            decide_mine(Some(last), 500, 1500.0, now()),
            MineDecision::Reward(5.0)
        );
    }

    #[test]
    fn no_power_no_reward() {
        assert_eq!(decide_mine(None, 0, 1500.0, now()), MineDecision::NoPower);
        assert_eq!(share_of(-10, 1500.0), 0.0);
    }

    #[test]
    fn share_shrinks_as_network_grows() {
        let before = block_reward_for(500, 1500.0);
        let after = block_reward_for(500, 1500.0 + network_growth_rate());
        assert!(after <= before);
        assert!(block_reward_for(500, 0.0) <= BLOCK_REWARD);
    }

    #[test]
    fn rejected_purchase_keeps_balance() {
        assert_eq!(debit(40.0, 50.0), Err(Rejection::InsufficientBalance));
        assert_eq!(debit(150.0, 50.0), Ok(100.0));
        assert_eq!(debit(50.0, 50.0), Ok(0.0));
    }

    #[test]
    fn conservation_over_purchase_sequence() {
        let costs = [50.0, 100.0, 500.0, 40.0, 1000.0];
        let start = 800.0;
        let mut balance = start;
        let mut spent = 0.0;
        for cost in costs {
            if let Ok(next) = debit(balance, cost) {
                balance = next;
                spent += cost;
            }
        }
        assert_eq!(balance, start - spent);
        assert!(balance >= 0.0);
    }

    #[test]
    fn rooms_have_a_ceiling() {
        assert_eq!(buy_room(1, 1500.0), Ok((500.0, 1000.0)));
        assert_eq!(buy_room(2, 1500.0), Err(Rejection::InsufficientBalance));
        assert_eq!(buy_room(5, 1e9), Err(Rejection::MaxRoomsReached));
    }
}
