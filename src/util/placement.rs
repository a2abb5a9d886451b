//! Room -> rack -> slot placement rules.

use crate::models::{Machine, Rack, RackId};

use super::api_util::Rejection;

pub const ROOM_CAPACITY: i32 = 12;

/// Checks placing `rack_id` at `(room_idx, position)` given every rack the user owns.
/// The rack being moved does not count against the room it is already in.
pub fn check_rack_placement(
    rooms_unlocked: i32,
    rack_id: RackId,
    room_idx: i32,
    position: i32,
    owned: &[Rack],
) -> Result<(), Rejection> {
    if room_idx >= rooms_unlocked {
        return Err(Rejection::RoomLocked);
    }
    if room_idx < 0 {
        return Err(Rejection::InvalidPosition);
    }
    let others: Vec<&Rack> = owned
        .iter()
        .filter(|rack| rack.id != rack_id && rack.room_idx == Some(room_idx))
        .collect();
    if others.len() >= ROOM_CAPACITY as usize {
        return Err(Rejection::RoomFull);
    }
    if !(0..ROOM_CAPACITY).contains(&position) {
        return Err(Rejection::InvalidPosition);
    }
    if others.iter().any(|rack| rack.position == Some(position)) {
        return Err(Rejection::SlotOccupied);
    }
    Ok(())
}

/// Checks putting `machine_id` into slot `position` of `rack`.
pub fn check_equip(
    rack: &Rack,
    machine_id: i32,
    position: i32,
    owned: &[Machine],
) -> Result<(), Rejection> {
    let slots = rack.slots();
    let occupants: Vec<&Machine> = owned
        .iter()
        .filter(|machine| machine.id != machine_id && machine.rack_id == Some(rack.id))
        .collect();
    if occupants.len() >= slots as usize {
        return Err(Rejection::RackFull);
    }
    if !(0..slots).contains(&position) {
        return Err(Rejection::InvalidPosition);
    }
    if occupants
        .iter()
        .any(|machine| machine.position == Some(position))
    {
        return Err(Rejection::SlotOccupied);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rack(id: RackId, room_idx: Option<i32>, position: Option<i32>) -> Rack {
        Rack {
            id,
            owner: 1,
            type_id: "r_small".to_owned(),
            room_idx,
            position,
        }
    }

    fn machine(id: i32, rack_id: Option<RackId>, position: Option<i32>) -> Machine {
        Machine {
            id,
            owner: 1,
            type_id: "miner_starter".to_owned(),
            rack_id,
            position,
        }
    }

    #[test]
    fn locked_room_is_rejected() {
        let owned = vec![rack(1, None, None)];
        assert_eq!(
            check_rack_placement(1, 1, 1, 0, &owned),
            Err(Rejection::RoomLocked)
        );
        assert_eq!(check_rack_placement(2, 1, 1, 0, &owned), Ok(()));
    }

    #[test]
    fn thirteenth_rack_does_not_fit() {
        let mut owned: Vec<Rack> = (0..12).map(|i| rack(i, Some(0), Some(i))).collect();
        owned.push(rack(99, None, None));
        assert_eq!(
            check_rack_placement(1, 99, 0, 3, &owned),
            Err(Rejection::RoomFull)
        );
    }

    #[test]
    fn room_checks_come_before_slot_range() {
        let mut owned: Vec<Rack> = (0..12).map(|i| rack(i, Some(0), Some(i))).collect();
        owned.push(rack(99, None, None));
        assert_eq!(
            check_rack_placement(1, 99, 3, 12, &owned),
            Err(Rejection::RoomLocked)
        );
        assert_eq!(
            check_rack_placement(1, 99, 0, 12, &owned),
            Err(Rejection::RoomFull)
        );
        assert_eq!(
            check_rack_placement(2, 99, 1, -1, &owned),
            Err(Rejection::InvalidPosition)
        );
    }

    #[test]
    fn moving_within_a_full_room_is_allowed_into_own_slot() {
        let owned: Vec<Rack> = (0..12).map(|i| rack(i, Some(0), Some(i))).collect();
        assert_eq!(check_rack_placement(1, 5, 0, 5, &owned), Ok(()));
    }

    #[test]
    fn occupied_room_slot_is_rejected() {
        let owned = vec![rack(1, Some(0), Some(4)), rack(2, None, None)];
        assert_eq!(
            check_rack_placement(1, 2, 0, 4, &owned),
            Err(Rejection::SlotOccupied)
        );
        assert_eq!(
            check_rack_placement(1, 2, 0, 12, &owned),
            Err(Rejection::InvalidPosition)
        );
    }

    #[test]
    fn rack_capacity_is_enforced() {
        let target = rack(1, Some(0), Some(0));
        let owned: Vec<Machine> = (0..4).map(|i| machine(i, Some(1), Some(i))).collect();
        let mut with_new = owned.clone();
        with_new.push(machine(10, None, None));
        assert_eq!(
            check_equip(&target, 10, 0, &with_new),
            Err(Rejection::RackFull)
        );
    }

    #[test]
    fn equip_checks_slot_range_and_occupancy() {
        let target = rack(1, None, None);
        let owned = vec![machine(1, Some(1), Some(2)), machine(2, None, None)];
        assert_eq!(
            check_equip(&target, 2, 2, &owned),
            Err(Rejection::SlotOccupied)
        );
        assert_eq!(
            check_equip(&target, 2, 4, &owned),
            Err(Rejection::InvalidPosition)
        );
        assert_eq!(check_equip(&target, 2, 3, &owned), Ok(()));
        // Re-seating a machine in its own slot.
        assert_eq!(check_equip(&target, 1, 2, &owned), Ok(()));
    }
}
