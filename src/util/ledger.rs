//! Row-level reads and writes shared by the API handlers.
//!
//! Mutating helpers expect to run inside a transaction that already holds the
//! owner's row lock from [`lock_user`].

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::Error;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::{
    GameLevel, GamePower, GameSession, LeaderboardEntry, Machine, MachineId, Rack, RackId, User,
    UserId,
};

use super::api_util::{new_unlocated_server_error, APIError, Rejection, ERROR_DB_UNKNOWN};
use super::energy::EnergyState;

const NETWORK_ROW: i32 = 1;

pub async fn fetch_user(user_id: UserId, conn: &mut AsyncPgConnection) -> Result<User, APIError> {
    use crate::schema::users::dsl::*;

    match users
        .filter(id.eq(user_id))
        .select(User::as_select())
        .first::<User>(conn)
        .await
    {
        Ok(user) => Ok(user),
        Err(Error::NotFound) => Err(APIError::UserNotFound),
        Err(e) => Err(new_unlocated_server_error(e, ERROR_DB_UNKNOWN)),
    }
}

/// Locks the user row until the surrounding transaction ends, serializing
/// every mutation of one account.
pub async fn lock_user(user_id: UserId, conn: &mut AsyncPgConnection) -> Result<User, APIError> {
    use crate::schema::users::dsl::*;

    match users
        .filter(id.eq(user_id))
        .select(User::as_select())
        .for_update()
        .first::<User>(conn)
        .await
    {
        Ok(user) => Ok(user),
        Err(Error::NotFound) => Err(APIError::UserNotFound),
        Err(e) => Err(new_unlocated_server_error(e, ERROR_DB_UNKNOWN)),
    }
}

pub async fn fetch_user_by_name(
    name: &str,
    conn: &mut AsyncPgConnection,
) -> Result<Option<User>, APIError> {
    use crate::schema::users::dsl::*;

    users
        .filter(username.eq(name))
        .select(User::as_select())
        .first::<User>(conn)
        .await
        .optional()
        .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))
}

pub async fn set_balance(
    user_id: UserId,
    new_balance: f64,
    conn: &mut AsyncPgConnection,
) -> Result<(), APIError> {
    use crate::schema::users::dsl::*;

    diesel::update(users.filter(id.eq(user_id)))
        .set(balance.eq(new_balance))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn touch_login(user_id: UserId, conn: &mut AsyncPgConnection) -> Result<(), APIError> {
    use crate::schema::users::dsl::*;

    diesel::update(users.filter(id.eq(user_id)))
        .set(last_login.eq(Utc::now()))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn record_mine(
    user_id: UserId,
    new_balance: f64,
    mined_at: DateTime<Utc>,
    conn: &mut AsyncPgConnection,
) -> Result<(), APIError> {
    use crate::schema::users::dsl::*;

    diesel::update(users.filter(id.eq(user_id)))
        .set((balance.eq(new_balance), last_mine_time.eq(mined_at)))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn save_energy(
    user_id: UserId,
    energy: &EnergyState,
    conn: &mut AsyncPgConnection,
) -> Result<(), APIError> {
    use crate::schema::users::dsl::*;

    diesel::update(users.filter(id.eq(user_id)))
        .set((
            electricity_expires_at.eq(energy.expires_at),
            batteries.eq(energy.batteries),
            last_free_recharge.eq(energy.last_free_recharge),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

/// Returns the new battery count.
pub async fn add_batteries(
    user_id: UserId,
    delta: i32,
    conn: &mut AsyncPgConnection,
) -> Result<i32, APIError> {
    use crate::schema::users::dsl::*;

    Ok(diesel::update(users.filter(id.eq(user_id)))
        .set(batteries.eq(batteries + delta))
        .returning(batteries)
        .get_result::<i32>(conn)
        .await?)
}

pub async fn set_rooms(
    user_id: UserId,
    new_balance: f64,
    rooms: i32,
    conn: &mut AsyncPgConnection,
) -> Result<(), APIError> {
    use crate::schema::users::dsl::*;

    diesel::update(users.filter(id.eq(user_id)))
        .set((balance.eq(new_balance), rooms_unlocked.eq(rooms)))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_racks(
    user_id: UserId,
    conn: &mut AsyncPgConnection,
) -> Result<Vec<Rack>, APIError> {
    use crate::schema::rack::dsl::*;

    rack.filter(owner.eq(user_id))
        .order(id.asc())
        .select(Rack::as_select())
        .load::<Rack>(conn)
        .await
        .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))
}

pub async fn fetch_machines(
    user_id: UserId,
    conn: &mut AsyncPgConnection,
) -> Result<Vec<Machine>, APIError> {
    use crate::schema::machine::dsl::*;

    machine
        .filter(owner.eq(user_id))
        .order(id.asc())
        .select(Machine::as_select())
        .load::<Machine>(conn)
        .await
        .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))
}

pub async fn insert_rack(
    user_id: UserId,
    rack_type: &str,
    placement: Option<(i32, i32)>,
    conn: &mut AsyncPgConnection,
) -> Result<Rack, APIError> {
    use crate::schema::rack::dsl::*;

    Ok(diesel::insert_into(rack)
        .values((
            owner.eq(user_id),
            type_id.eq(rack_type),
            room_idx.eq(placement.map(|(room, _)| room)),
            position.eq(placement.map(|(_, slot)| slot)),
        ))
        .returning(Rack::as_returning())
        .get_result(conn)
        .await?)
}

pub async fn insert_machine(
    user_id: UserId,
    miner_type: &str,
    placement: Option<(RackId, i32)>,
    conn: &mut AsyncPgConnection,
) -> Result<Machine, APIError> {
    use crate::schema::machine::dsl::*;

    Ok(diesel::insert_into(machine)
        .values((
            owner.eq(user_id),
            type_id.eq(miner_type),
            rack_id.eq(placement.map(|(holder, _)| holder)),
            position.eq(placement.map(|(_, slot)| slot)),
        ))
        .returning(Machine::as_returning())
        .get_result(conn)
        .await?)
}

/// Both placement columns are written together to keep them both-null or both-set.
pub async fn place_rack(
    user_id: UserId,
    target: RackId,
    placement: Option<(i32, i32)>,
    conn: &mut AsyncPgConnection,
) -> Result<(), APIError> {
    use crate::schema::rack::dsl::*;

    let updated = diesel::update(rack.filter(id.eq(target)).filter(owner.eq(user_id)))
        .set((
            room_idx.eq(placement.map(|(room, _)| room)),
            position.eq(placement.map(|(_, slot)| slot)),
        ))
        .execute(conn)
        .await?;
    if updated == 0 {
        return Err(Rejection::ItemNotFound.into());
    }
    Ok(())
}

pub async fn seat_machine(
    user_id: UserId,
    target: MachineId,
    placement: Option<(RackId, i32)>,
    conn: &mut AsyncPgConnection,
) -> Result<(), APIError> {
    use crate::schema::machine::dsl::*;

    let updated = diesel::update(machine.filter(id.eq(target)).filter(owner.eq(user_id)))
        .set((
            rack_id.eq(placement.map(|(holder, _)| holder)),
            position.eq(placement.map(|(_, slot)| slot)),
        ))
        .execute(conn)
        .await?;
    if updated == 0 {
        return Err(Rejection::ItemNotFound.into());
    }
    Ok(())
}

pub async fn fetch_active_grants(
    user_id: UserId,
    now: DateTime<Utc>,
    conn: &mut AsyncPgConnection,
) -> Result<Vec<GamePower>, APIError> {
    use crate::schema::game_power::dsl::*;

    game_power
        .filter(owner.eq(user_id))
        .filter(expires_at.gt(now))
        .select(GamePower::as_select())
        .load::<GamePower>(conn)
        .await
        .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))
}

pub async fn insert_grant(
    user_id: UserId,
    power: i64,
    until: DateTime<Utc>,
    conn: &mut AsyncPgConnection,
) -> Result<(), APIError> {
    use crate::schema::game_power::dsl::*;

    diesel::insert_into(game_power)
        .values((owner.eq(user_id), amount.eq(power), expires_at.eq(until)))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_network_power(conn: &mut AsyncPgConnection) -> Result<f64, APIError> {
    use crate::schema::network::dsl::*;

    match network
        .filter(id.eq(NETWORK_ROW))
        .select(network_power)
        .first::<f64>(conn)
        .await
    {
        Ok(value) => Ok(value),
        Err(Error::NotFound) => Ok(0.0),
        Err(e) => Err(new_unlocated_server_error(e, ERROR_DB_UNKNOWN)),
    }
}

/// Single-statement increment; concurrent ticks from different users never lose an update.
pub async fn grow_network_power(delta: f64, conn: &mut AsyncPgConnection) -> Result<(), APIError> {
    use crate::schema::network::dsl::*;

    diesel::insert_into(network)
        .values((id.eq(NETWORK_ROW), network_power.eq(delta)))
        .on_conflict(id)
        .do_update()
        .set(network_power.eq(network_power + delta))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_levels(
    user_id: UserId,
    conn: &mut AsyncPgConnection,
) -> Result<Vec<GameLevel>, APIError> {
    use crate::schema::game_level::dsl::*;

    game_level
        .filter(owner.eq(user_id))
        .select(GameLevel::as_select())
        .load::<GameLevel>(conn)
        .await
        .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))
}

pub async fn fetch_level(
    user_id: UserId,
    game: &str,
    conn: &mut AsyncPgConnection,
) -> Result<Option<GameLevel>, APIError> {
    use crate::schema::game_level::dsl::*;

    game_level
        .filter(owner.eq(user_id))
        .filter(game_id.eq(game))
        .select(GameLevel::as_select())
        .first::<GameLevel>(conn)
        .await
        .optional()
        .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))
}

pub async fn upsert_level(
    user_id: UserId,
    game: &str,
    new_level: i32,
    played_at: DateTime<Utc>,
    conn: &mut AsyncPgConnection,
) -> Result<(), APIError> {
    use crate::schema::game_level::dsl::*;

    diesel::insert_into(game_level)
        .values((
            owner.eq(user_id),
            game_id.eq(game),
            level.eq(new_level),
            last_played.eq(played_at),
        ))
        .on_conflict((owner, game_id))
        .do_update()
        .set((level.eq(new_level), last_played.eq(played_at)))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_session(
    user_id: UserId,
    conn: &mut AsyncPgConnection,
) -> Result<Option<GameSession>, APIError> {
    use crate::schema::game_session::dsl::*;

    game_session
        .filter(owner.eq(user_id))
        .select(GameSession::as_select())
        .first::<GameSession>(conn)
        .await
        .optional()
        .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))
}

/// Opens `session`, silently replacing any session the user still had.
pub async fn replace_session(
    session: &GameSession,
    conn: &mut AsyncPgConnection,
) -> Result<(), APIError> {
    use crate::schema::game_session::dsl::*;

    diesel::insert_into(game_session)
        .values(session)
        .on_conflict(owner)
        .do_update()
        .set((
            game_id.eq(&session.game_id),
            start_time.eq(session.start_time),
            valid_until.eq(session.valid_until),
        ))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn delete_session(user_id: UserId, conn: &mut AsyncPgConnection) -> Result<(), APIError> {
    use crate::schema::game_session::dsl::*;

    diesel::delete(game_session.filter(owner.eq(user_id)))
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_leaderboard(
    limit: i64,
    conn: &mut AsyncPgConnection,
) -> Result<Vec<LeaderboardEntry>, APIError> {
    diesel::sql_query(
        r#"
        SELECT
            u.username,
            u.balance,
            COUNT(m.id) AS machines
        FROM users AS u
        LEFT JOIN machine AS m
            ON m.owner = u.id
        GROUP BY u.id, u.username, u.balance
        ORDER BY u.balance DESC, u.id ASC
        LIMIT $1;
    "#,
    )
    .bind::<diesel::sql_types::BigInt, _>(limit)
    .load(conn)
    .await
    .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))
}

pub async fn count_users(conn: &mut AsyncPgConnection) -> Result<i64, APIError> {
    use crate::schema::users::dsl::*;

    users
        .count()
        .get_result::<i64>(conn)
        .await
        .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))
}

pub async fn count_installed(conn: &mut AsyncPgConnection) -> Result<(i64, i64), APIError> {
    use crate::schema::machine::dsl as machine_dsl;
    use crate::schema::rack::dsl as rack_dsl;

    let racks = rack_dsl::rack
        .filter(rack_dsl::room_idx.is_not_null())
        .count()
        .get_result::<i64>(conn)
        .await
        .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))?;
    let machines = machine_dsl::machine
        .filter(machine_dsl::rack_id.is_not_null())
        .count()
        .get_result::<i64>(conn)
        .await
        .map_err(|e| new_unlocated_server_error(e, ERROR_DB_UNKNOWN))?;
    Ok((racks, machines))
}
