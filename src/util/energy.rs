//! Electricity is stored only as an expiry timestamp. Nothing counts down:
//! equipment is powered while `now < electricity_expires_at`.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use super::api_util::Rejection;

pub const ONE_BAR_HOURS: i64 = 6;
pub const MAX_BARS: i64 = 4;
pub const FREE_RECHARGE_COOLDOWN_HOURS: i64 = 24;

pub fn one_bar() -> TimeDelta {
    TimeDelta::hours(ONE_BAR_HOURS)
}

pub fn full_window() -> TimeDelta {
    one_bar() * MAX_BARS as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RechargeKind {
    Free,
    Battery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyState {
    pub expires_at: DateTime<Utc>,
    pub batteries: i32,
    pub last_free_recharge: Option<DateTime<Utc>>,
}

impl EnergyState {
    pub fn recharge(self, kind: RechargeKind, now: DateTime<Utc>) -> Result<Self, Rejection> {
        let mut next = self;
        match kind {
            RechargeKind::Free => {
                if let Some(last) = self.last_free_recharge {
                    let ready_at = last + TimeDelta::hours(FREE_RECHARGE_COOLDOWN_HOURS);
                    if ready_at > now {
                        return Err(Rejection::FreeRechargeOnCooldown {
                            wait_seconds: ceil_seconds(ready_at - now),
                        });
                    }
                }
                next.last_free_recharge = Some(now);
            }
            RechargeKind::Battery => {
                if self.batteries <= 0 {
                    return Err(Rejection::NoBatteries);
                }
                next.batteries -= 1;
            }
        }
        next.expires_at = extend_expiry(self.expires_at, now);
        Ok(next)
    }
}

/// One more bar on top of whatever is left, never beyond a full window from now.
pub fn extend_expiry(current: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    (current.max(now) + one_bar()).min(now + full_window())
}

/// Bars still (partially) lit.
pub fn bars_left(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    if expires_at <= now {
        return 0;
    }
    let remaining = (expires_at - now).num_milliseconds();
    let bar = one_bar().num_milliseconds();
    ((remaining + bar - 1) / bar).min(MAX_BARS)
}

pub fn ceil_seconds(delta: TimeDelta) -> i64 {
    let millis = delta.num_milliseconds().max(0);
    (millis + 999) / 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn state(expires_in_hours: i64, batteries: i32) -> EnergyState {
        EnergyState {
            expires_at: now() + TimeDelta::hours(expires_in_hours),
            batteries,
            last_free_recharge: None,
        }
    }

    #[test]
    fn depleted_energy_restarts_from_now() {
        let next = state(-10, 1).recharge(RechargeKind::Battery, now()).unwrap();
        assert_eq!(next.expires_at, now() + one_bar());
        assert_eq!(next.batteries, 0);
    }

    #[test]
    fn remaining_energy_is_extended() {
        let next = state(3, 2).recharge(RechargeKind::Battery, now()).unwrap();
        assert_eq!(next.expires_at, now() + TimeDelta::hours(9));
    }

    #[test]
    fn extension_is_capped_at_full_window() {
        let next = state(22, 2).recharge(RechargeKind::Battery, now()).unwrap();
        assert_eq!(next.expires_at, now() + full_window());
        assert_eq!(next.batteries, 1);
    }

    #[test]
    fn battery_recharge_needs_a_battery() {
        assert_eq!(
            state(0, 0).recharge(RechargeKind::Battery, now()),
            Err(Rejection::NoBatteries)
        );
    }

    #[test]
    fn free_recharge_has_daily_cooldown() {
        let first = state(0, 0).recharge(RechargeKind::Free, now()).unwrap();
        assert_eq!(first.last_free_recharge, Some(now()));
        assert_eq!(first.batteries, 0);

        let later = now() + TimeDelta::hours(23);
        assert_eq!(
            first.recharge(RechargeKind::Free, later),
            Err(Rejection::FreeRechargeOnCooldown { wait_seconds: 3600 })
        );

        let next_day = now() + TimeDelta::hours(24);
        assert!(first.recharge(RechargeKind::Free, next_day).is_ok());
    }

    #[test]
    fn bars_round_up() {
        assert_eq!(bars_left(now(), now()), 0);
        assert_eq!(bars_left(now() + TimeDelta::minutes(1), now()), 1);
        assert_eq!(bars_left(now() + TimeDelta::hours(6), now()), 1);
        assert_eq!(bars_left(now() + TimeDelta::hours(13), now()), 3);
        assert_eq!(bars_left(now() + TimeDelta::hours(24), now()), 4);
    }

    proptest! {
        #[test]
        fn repeated_recharges_never_exceed_cap(start_offset in -48i64..48, count in 1usize..40) {
            let mut current = EnergyState {
                expires_at: now() + TimeDelta::hours(start_offset.min(24)),
                batteries: count as i32,
                last_free_recharge: None,
            };
            for _ in 0..count {
                current = current.recharge(RechargeKind::Battery, now()).unwrap();
                prop_assert!(current.expires_at <= now() + full_window());
                prop_assert!(current.expires_at > now());
            }
            prop_assert_eq!(current.batteries, 0);
        }
    }
}
