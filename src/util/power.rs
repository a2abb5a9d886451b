use std::collections::HashSet;

use chrono::{DateTime, Utc};
use diesel_async::AsyncPgConnection;
use log::debug;
use serde::Serialize;

use crate::models::{GamePower, Machine, Rack, RackId, User};
use crate::util::catalog;

use super::api_util::APIError;
use super::ledger;

/// Where a user's hash power comes from at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PowerReport {
    /// Power of machines physically installed in a room, before the energy gate.
    pub equipped: i64,
    /// Power drawn by installed machines, before the energy gate.
    pub watts: i64,
    /// Unexpired minigame grants. Not gated by energy.
    pub minigame: i64,
    pub has_energy: bool,
}

impl PowerReport {
    pub fn compute(
        electricity_expires_at: DateTime<Utc>,
        racks: &[Rack],
        machines: &[Machine],
        grants: &[GamePower],
        now: DateTime<Utc>,
    ) -> Self {
        let installed = installed_machines(racks, machines);
        Self {
            equipped: installed.iter().map(|m| m.power()).sum(),
            watts: installed
                .iter()
                .filter_map(|m| catalog::miner(&m.type_id))
                .map(|spec| spec.watts)
                .sum(),
            minigame: grant_power(grants, now),
            has_energy: has_energy(electricity_expires_at, now),
        }
    }

    pub fn total(&self) -> i64 {
        let equipped = if self.has_energy { self.equipped } else { 0 };
        equipped + self.minigame
    }

    pub fn powered_watts(&self) -> i64 {
        if self.has_energy {
            self.watts
        } else {
            0
        }
    }
}

pub fn has_energy(electricity_expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    electricity_expires_at > now
}

/// Machines sitting in a rack that is itself placed in a room.
pub fn installed_machines<'a>(racks: &[Rack], machines: &'a [Machine]) -> Vec<&'a Machine> {
    let installed: HashSet<RackId> = racks
        .iter()
        .filter(|rack| rack.is_installed())
        .map(|rack| rack.id)
        .collect();
    machines
        .iter()
        .filter(|machine| machine.rack_id.is_some_and(|id| installed.contains(&id)))
        .collect()
}

pub fn grant_power(grants: &[GamePower], now: DateTime<Utc>) -> i64 {
    grants
        .iter()
        .filter(|grant| grant.expires_at > now)
        .map(|grant| grant.amount)
        .sum()
}

pub async fn fetch_power_report(
    user: &User,
    now: DateTime<Utc>,
    conn: &mut AsyncPgConnection,
) -> Result<PowerReport, APIError> {
    let racks = ledger::fetch_racks(user.id, conn).await?;
    let machines = ledger::fetch_machines(user.id, conn).await?;
    let grants = ledger::fetch_active_grants(user.id, now, conn).await?;
    let report = PowerReport::compute(user.electricity_expires_at, &racks, &machines, &grants, now);
    debug!("Power of user {}: {:?}", user.id, report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn rack(id: RackId, room_idx: Option<i32>) -> Rack {
        Rack {
            id,
            owner: 1,
            type_id: "r_large".to_owned(),
            room_idx,
            position: room_idx.map(|_| id),
        }
    }

    fn machine(id: i32, type_id: &str, rack_id: Option<RackId>) -> Machine {
        Machine {
            id,
            owner: 1,
            type_id: type_id.to_owned(),
            rack_id,
            position: rack_id.map(|_| id),
        }
    }

    fn grant(amount: i64, expires_in_secs: i64) -> GamePower {
        GamePower {
            id: 0,
            owner: 1,
            amount,
            expires_at: now() + TimeDelta::seconds(expires_in_secs),
        }
    }

    #[test]
    fn only_machines_in_placed_racks_count() {
        let racks = vec![rack(1, Some(0)), rack(2, None)];
        let machines = vec![
            machine(1, "miner_gpu", Some(1)),
            machine(2, "miner_asic", Some(2)),
            machine(3, "miner_quantum", None),
        ];
        let report = PowerReport::compute(now() + TimeDelta::hours(1), &racks, &machines, &[], now());
        assert_eq!(report.equipped, 500);
        assert_eq!(report.watts, 300);
        assert_eq!(report.total(), 500);
    }

    #[test]
    fn no_energy_zeroes_equipped_but_keeps_grants() {
        let racks = vec![rack(1, Some(0))];
        let machines = vec![machine(1, "miner_asic", Some(1))];
        let grants = vec![grant(150, 60)];
        let report = PowerReport::compute(now(), &racks, &machines, &grants, now());
        assert!(!report.has_energy);
        assert_eq!(report.total(), 150);
        assert_eq!(report.powered_watts(), 0);
    }

    #[test]
    fn expired_grants_are_ignored() {
        let grants = vec![grant(100, 10), grant(200, 0), grant(300, -5)];
        assert_eq!(grant_power(&grants, now()), 100);
    }

    #[test]
    fn grants_stack_without_cap() {
        let grants: Vec<GamePower> = (0..50).map(|_| grant(1000, 3600)).collect();
        let report = PowerReport::compute(now(), &[], &[], &grants, now());
        assert_eq!(report.total(), 50_000);
    }

    #[test]
    fn unknown_miner_type_contributes_nothing() {
        let racks = vec![rack(1, Some(0))];
        let machines = vec![machine(1, "miner_legacy", Some(1))];
        let report = PowerReport::compute(now() + TimeDelta::hours(1), &racks, &machines, &[], now());
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn computing_twice_is_stable() {
        let racks = vec![rack(1, Some(0))];
        let machines = vec![machine(1, "miner_starter", Some(1))];
        let grants = vec![grant(40, 100)];
        let a = PowerReport::compute(now() + TimeDelta::hours(2), &racks, &machines, &grants, now());
        let b = PowerReport::compute(now() + TimeDelta::hours(2), &racks, &machines, &grants, now());
        assert_eq!(a, b);
        assert_eq!(a.total(), 140);
    }
}
