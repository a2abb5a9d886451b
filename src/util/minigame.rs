//! Start/claim protocol for the minigames.
//!
//! The games themselves run in the browser; the server only checks that a
//! claimed win is plausible: a session was opened for the same game, it was
//! not claimed faster than the game allows, and the score reaches the target
//! for the player's level. Every claim that reaches those checks consumes the
//! session.

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use serde::Serialize;

use crate::models::{GameLevel, GameSession, UserId};

use super::api_util::Rejection;
use super::catalog::GameSpec;
use super::energy::ceil_seconds;

pub const COOLDOWN_BASE_SECS: i64 = 30;
pub const COOLDOWN_PER_LEVEL_SECS: i64 = 15;
pub const MAX_GAME_LEVEL: i32 = 10;
pub const SESSION_GRACE_SECS: i64 = 30;
pub const GAME_POWER_HOURS: i64 = 24;
pub const BATTERY_DROP_CHANCE: f64 = 0.3;

pub fn cooldown(level: i32) -> TimeDelta {
    TimeDelta::seconds(COOLDOWN_BASE_SECS + level as i64 * COOLDOWN_PER_LEVEL_SECS)
}

pub fn required_score(game: &GameSpec, level: i32) -> i64 {
    game.base_target + (level.max(1) as i64 - 1) * game.target_step
}

pub fn reward(game: &GameSpec, level: i32) -> i64 {
    (game.reward as f64 * game.diff_mult.powi(level.max(1) - 1)).floor() as i64
}

pub fn next_level(level: i32) -> i32 {
    (level + 1).clamp(1, MAX_GAME_LEVEL)
}

pub fn roll_battery_drop<R: Rng>(rng: &mut R) -> bool {
    rng.gen_bool(BATTERY_DROP_CHANCE)
}

/// Progress of one user in one game. Unseen games start at level 1, never played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub level: i32,
    pub last_played: Option<DateTime<Utc>>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            level: 1,
            last_played: None,
        }
    }
}

impl From<&GameLevel> for Progress {
    fn from(row: &GameLevel) -> Self {
        Self {
            level: row.level.clamp(1, MAX_GAME_LEVEL),
            last_played: Some(row.last_played),
        }
    }
}

impl Progress {
    pub fn ready_at(&self) -> Option<DateTime<Utc>> {
        self.last_played.map(|last| last + cooldown(self.level))
    }

    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> i64 {
        self.ready_at()
            .filter(|ready| *ready > now)
            .map_or(0, |ready| ceil_seconds(ready - now))
    }

    pub fn check_start(&self, now: DateTime<Utc>) -> Result<(), Rejection> {
        match self.cooldown_remaining(now) {
            0 => Ok(()),
            wait_seconds => Err(Rejection::OnCooldown { wait_seconds }),
        }
    }
}

pub fn open_session(owner: UserId, game: &GameSpec, now: DateTime<Utc>) -> GameSession {
    GameSession {
        owner,
        game_id: game.id.to_owned(),
        start_time: now,
        valid_until: now + TimeDelta::seconds(game.time + SESSION_GRACE_SECS),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim<'a> {
    pub game_id: &'a str,
    pub score: i64,
    pub won: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Win {
    pub reward: i64,
    pub level: i32,
    pub next_level: i32,
}

/// Whether a rejected claim still uses up the open session.
pub fn consumes_session(rejection: &Rejection) -> bool {
    !matches!(
        rejection,
        Rejection::NoActiveSession | Rejection::SessionMismatch | Rejection::UnknownGame
    )
}

pub fn judge(
    session: Option<&GameSession>,
    game: &GameSpec,
    claim: Claim<'_>,
    progress: Progress,
    now: DateTime<Utc>,
) -> Result<Win, Rejection> {
    let session = session.ok_or(Rejection::NoActiveSession)?;
    if session.game_id != claim.game_id || game.id != claim.game_id {
        return Err(Rejection::SessionMismatch);
    }
    if !claim.won {
        return Err(Rejection::GameOver);
    }
    if now > session.valid_until {
        return Err(Rejection::SessionExpired);
    }
    if now - session.start_time < TimeDelta::seconds(game.min_time) {
        return Err(Rejection::TooFast);
    }
    let level = progress.level;
    let required = required_score(game, level);
    if claim.score < required {
        return Err(Rejection::ScoreTooLow { required });
    }
    Ok(Win {
        reward: reward(game, level),
        level,
        next_level: next_level(level),
    })
}

/// What a judged claim writes to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Nothing is written and the transaction rolls back.
    Keep(Rejection),
    /// The session is deleted and committed, then the rejection is returned.
    Consume(Rejection),
    Pay {
        win: Win,
        grant_until: DateTime<Utc>,
        battery: bool,
    },
}

impl Settlement {
    pub fn deletes_session(&self) -> bool {
        !matches!(self, Settlement::Keep(_))
    }

    /// Power grant to insert as `(amount, expires_at)`.
    pub fn grant(&self) -> Option<(i64, DateTime<Utc>)> {
        match self {
            Settlement::Pay {
                win, grant_until, ..
            } => Some((win.reward, *grant_until)),
            _ => None,
        }
    }
}

pub fn settle(
    verdict: Result<Win, Rejection>,
    battery_drop: bool,
    now: DateTime<Utc>,
) -> Settlement {
    match verdict {
        Ok(win) => Settlement::Pay {
            win,
            grant_until: now + TimeDelta::hours(GAME_POWER_HOURS),
            battery: battery_drop,
        },
        Err(rejection) if consumes_session(&rejection) => Settlement::Consume(rejection),
        Err(rejection) => Settlement::Keep(rejection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::catalog;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rand::rngs::mock::StepRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn clicker() -> &'static GameSpec {
        catalog::game("coin-clicker").unwrap()
    }

    fn session_started(secs_ago: i64, game: &GameSpec) -> GameSession {
        open_session(1, game, now() - TimeDelta::seconds(secs_ago))
    }

    fn level(level: i32) -> Progress {
        Progress {
            level,
            last_played: None,
        }
    }

    #[test]
    fn targets_follow_level() {
        assert_eq!(required_score(clicker(), 1), 50);
        assert_eq!(required_score(clicker(), 3), 110);
    }

    #[test]
    fn rewards_grow_geometrically_and_floor() {
        let game = catalog::game("flappy-rocket").unwrap();
        assert_eq!(reward(game, 1), 150);
        assert_eq!(reward(game, 2), 195);
        assert_eq!(reward(game, 3), 253);

        let game = catalog::game("crypto-2048").unwrap();
        assert_eq!(reward(game, 3), 450);
    }

    #[test]
    fn winning_claim_below_target_is_rejected() {
        let session = session_started(45, clicker());
        let claim = Claim {
            game_id: "coin-clicker",
            score: 90,
            won: true,
        };
        let verdict = judge(Some(&session), clicker(), claim, level(3), now());
        assert_eq!(verdict, Err(Rejection::ScoreTooLow { required: 110 }));
        assert!(consumes_session(&verdict.unwrap_err()));
    }

    #[test]
    fn winning_claim_on_target_pays_out() {
        let session = session_started(45, clicker());
        let claim = Claim {
            game_id: "coin-clicker",
            score: 110,
            won: true,
        };
        let win = judge(Some(&session), clicker(), claim, level(3), now()).unwrap();
        assert_eq!(win.reward, reward(clicker(), 3));
        assert_eq!(win.level, 3);
        assert_eq!(win.next_level, 4);
    }

    #[test]
    fn claim_without_session() {
        let claim = Claim {
            game_id: "coin-clicker",
            score: 999,
            won: true,
        };
        let verdict = judge(None, clicker(), claim, level(1), now());
        assert_eq!(verdict, Err(Rejection::NoActiveSession));
        assert!(!consumes_session(&Rejection::NoActiveSession));
    }

    #[test]
    fn claim_for_other_game_keeps_session() {
        let flappy = catalog::game("flappy-rocket").unwrap();
        let session = session_started(45, flappy);
        let claim = Claim {
            game_id: "coin-clicker",
            score: 999,
            won: true,
        };
        let verdict = judge(Some(&session), clicker(), claim, level(1), now());
        assert_eq!(verdict, Err(Rejection::SessionMismatch));
        assert!(!consumes_session(&Rejection::SessionMismatch));
    }

    #[test]
    fn lost_game_is_game_over() {
        let session = session_started(45, clicker());
        let claim = Claim {
            game_id: "coin-clicker",
            score: 999,
            won: false,
        };
        assert_eq!(
            judge(Some(&session), clicker(), claim, level(1), now()),
            Err(Rejection::GameOver)
        );
    }

    #[test]
    fn instant_claim_is_too_fast() {
        let session = session_started(2, clicker());
        let claim = Claim {
            game_id: "coin-clicker",
            score: 999,
            won: true,
        };
        assert_eq!(
            judge(Some(&session), clicker(), claim, level(1), now()),
            Err(Rejection::TooFast)
        );
    }

    #[test]
    fn stale_session_expires() {
        let session = session_started(clicker().time + SESSION_GRACE_SECS + 1, clicker());
        let claim = Claim {
            game_id: "coin-clicker",
            score: 999,
            won: true,
        };
        assert_eq!(
            judge(Some(&session), clicker(), claim, level(1), now()),
            Err(Rejection::SessionExpired)
        );
    }

    #[test]
    fn level_is_capped() {
        assert_eq!(next_level(1), 2);
        assert_eq!(next_level(MAX_GAME_LEVEL), MAX_GAME_LEVEL);
    }

    #[test]
    fn cooldown_reports_remaining_seconds() {
        let progress = Progress {
            level: 2,
            last_played: Some(now() - TimeDelta::seconds(10)),
        };
        // 30 + 2 * 15 = 60 seconds of cooldown.
        assert_eq!(
            progress.check_start(now()),
            Err(Rejection::OnCooldown { wait_seconds: 50 })
        );
        assert_eq!(progress.check_start(now() + TimeDelta::seconds(50)), Ok(()));
        assert_eq!(Progress::default().check_start(now()), Ok(()));
    }

    #[test]
    fn session_window_includes_grace() {
        let session = open_session(7, clicker(), now());
        assert_eq!(session.valid_until - session.start_time, TimeDelta::seconds(90));
        assert_eq!(session.game_id, "coin-clicker");
    }

    #[test]
    fn battery_drop_follows_rng() {
        assert!(roll_battery_drop(&mut StepRng::new(0, 0)));
        assert!(!roll_battery_drop(&mut StepRng::new(u64::MAX, 0)));
    }

    #[test]
    fn low_score_consumes_session_without_grant() {
        let session = session_started(45, clicker());
        let claim = Claim {
            game_id: "coin-clicker",
            score: 90,
            won: true,
        };
        let settlement = settle(
            judge(Some(&session), clicker(), claim, level(3), now()),
            true,
            now(),
        );
        assert_eq!(
            settlement,
            Settlement::Consume(Rejection::ScoreTooLow { required: 110 })
        );
        assert!(settlement.deletes_session());
        assert_eq!(settlement.grant(), None);
    }

    #[test]
    fn lost_game_consumes_session() {
        let session = session_started(45, clicker());
        let claim = Claim {
            game_id: "coin-clicker",
            score: 0,
            won: false,
        };
        let settlement = settle(
            judge(Some(&session), clicker(), claim, level(1), now()),
            false,
            now(),
        );
        assert_eq!(settlement, Settlement::Consume(Rejection::GameOver));
        assert!(settlement.deletes_session());
    }

    #[test]
    fn session_can_only_be_claimed_once() {
        let mut open = Some(session_started(45, clicker()));
        let claim = Claim {
            game_id: "coin-clicker",
            score: 50,
            won: true,
        };

        let first = settle(judge(open.as_ref(), clicker(), claim, level(1), now()), false, now());
        assert_eq!(
            first.grant(),
            Some((100, now() + TimeDelta::hours(GAME_POWER_HOURS)))
        );
        assert!(first.deletes_session());
        if first.deletes_session() {
            open = None;
        }

        let second = settle(judge(open.as_ref(), clicker(), claim, level(2), now()), false, now());
        assert_eq!(second, Settlement::Keep(Rejection::NoActiveSession));
        assert!(!second.deletes_session());
        assert_eq!(second.grant(), None);
    }

    proptest! {
        #[test]
        fn cooldown_strictly_increases(level in 1i32..MAX_GAME_LEVEL) {
            prop_assert!(cooldown(level + 1) > cooldown(level));
        }

        #[test]
        fn required_score_never_decreases(level in 1i32..MAX_GAME_LEVEL) {
            for game in catalog::GAMES.iter() {
                prop_assert!(required_score(game, level + 1) >= required_score(game, level));
            }
        }
    }
}
