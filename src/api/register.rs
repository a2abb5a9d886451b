use crate::models::{MachineView, NewUser, RackView, User};
use crate::util::api_util::*;
use crate::util::catalog::{STARTER_MINER, STARTER_RACK};
use crate::util::{cipher_util, energy, ledger};

use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use actix_session::Session;
use actix_web::{get, post, web, Responder};
use chrono::Utc;
use dotenv::dotenv;
use log::info;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;

use crate::{DbPool, Ext};

pub const STARTING_BALANCE: f64 = 100.0;
pub const STARTING_BATTERIES: i32 = 5;

static PASSWORD_PEPPER: Lazy<String> = Lazy::new(|| {
    dotenv().ok();
    env::var("PASSWORD_PEPPER").expect("Environment variable PASSWORD_PEPPER not set")
});

#[derive(Debug, Deserialize)]
pub struct Credentials {
    username: String,
    password: String,
}

impl APIRequest for Credentials {
    fn ok(&self) -> bool {
        !self.username.is_empty()
            && !self.password.is_empty()
            && self.username.len() <= 64
            && self.password.len() <= 256
    }
}

pub fn validate_username(username: &str) -> Result<(), Rejection> {
    let length = username.chars().count();
    let charset = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if (3..=32).contains(&length) && charset {
        Ok(())
    } else {
        Err(Rejection::InvalidUsername)
    }
}

pub fn validate_password(password: &str) -> Result<(), Rejection> {
    if (8..=128).contains(&password.chars().count()) {
        Ok(())
    } else {
        Err(Rejection::InvalidPassword)
    }
}

#[derive(Debug, Serialize)]
struct AccountView {
    username: String,
    balance: f64,
    batteries: i32,
}

impl From<&User> for AccountView {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            balance: user.balance,
            batteries: user.batteries,
        }
    }
}

#[derive(Debug, Serialize)]
struct StarterBonus {
    balance: f64,
    batteries: i32,
    electricity_expires_at: i64,
    rack: RackView,
    machine: MachineView,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    user: AccountView,
    bonus: StarterBonus,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    user: AccountView,
}

// [[API]]
// desp: Create an account with the starter kit and log in.
// Method: POST
// URL: /api/auth/register
// Request Body: `Credentials`
// Response Body: `RegisterResponse`
#[post("/auth/register")]
pub async fn register_user(
    pool: web::Data<Arc<DbPool>>,
    form: web::Json<Credentials>,
    mut session: Session,
) -> Result<impl Responder, APIError> {
    let location = "register";
    form.sanity()?;
    validate_username(&form.username)?;
    validate_password(&form.password)?;

    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let (salt, hashed_password) =
        cipher_util::gen_salted_password(&form.password, &PASSWORD_PEPPER);
    let username = form.username.clone();
    let now = Utc::now();

    let (user, rack, machine) = conn
        .transaction::<_, APIError, _>(|conn| {
            Box::pin(async move {
                use crate::schema::users;

                let user = diesel::insert_into(users::table)
                    .values(NewUser {
                        username: &username,
                        password: &hashed_password,
                        salt: &salt,
                        balance: STARTING_BALANCE,
                        batteries: STARTING_BATTERIES,
                        electricity_expires_at: now + energy::full_window(),
                        rooms_unlocked: 1,
                    })
                    .on_conflict(users::username)
                    .do_nothing()
                    .returning(User::as_returning())
                    .get_result(conn)
                    .await
                    .optional()?
                    .ok_or(Rejection::UsernameTaken)?;

                let rack = ledger::insert_rack(user.id, STARTER_RACK, Some((0, 0)), conn).await?;
                let machine =
                    ledger::insert_machine(user.id, STARTER_MINER, Some((rack.id, 0)), conn)
                        .await?;
                Ok((user, rack, machine))
            })
        })
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    set_loggedin_session(&mut session, user.id, &user.username, location)?;
    info!("Registered user {} ({})", user.username, user.id);

    Ok(accepted(
        "Conta criada com sucesso!",
        RegisterResponse {
            user: AccountView::from(&user),
            bonus: StarterBonus {
                balance: STARTING_BALANCE,
                batteries: STARTING_BATTERIES,
                electricity_expires_at: user.electricity_expires_at.timestamp_millis(),
                rack: RackView::from(&rack),
                machine: MachineView::from(&machine),
            },
        },
    ))
}

// [[API]]
// desp: Login with username and password.
// Method: POST
// URL: /api/auth/login
// Request Body: `Credentials`
// Response Body: `LoginResponse`
#[post("/auth/login")]
pub async fn login_user(
    pool: web::Data<Arc<DbPool>>,
    form: web::Json<Credentials>,
    mut session: Session,
) -> Result<impl Responder, APIError> {
    let location = "login";
    form.sanity()?;
    let mut conn = pool
        .get()
        .await
        .map_err(|e| log_server_error(e, location, ERROR_DB_CONNECTION))?;

    let user = ledger::fetch_user_by_name(&form.username, &mut conn)
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))?
        .ok_or(Rejection::UnknownUser)?;

    let user = cipher_util::check_salted_password(&user, &form.password, &PASSWORD_PEPPER)
        .ok_or(Rejection::WrongPassword)?;

    ledger::touch_login(user.id, &mut conn)
        .await
        .map_err(|e| e.set_location(location).tap(APIError::log))?;

    set_loggedin_session(&mut session, user.id, &user.username, location)?;
    info!("User {} logged in", user.username);

    Ok(accepted(
        "Login bem-sucedido!",
        LoginResponse {
            user: AccountView::from(user),
        },
    ))
}

// [[API]]
// desp: Forget the session cookie.
// Method: POST
// URL: /api/auth/logout
// Response Body: `{success, message}`
#[post("/auth/logout")]
pub async fn logout_user(session: Session) -> impl Responder {
    session.purge();
    accepted("Sessão encerrada", Nothing {})
}

#[derive(Debug, Serialize)]
struct WhoAmIResponse {
    user_id: i32,
    username: String,
}

// [[API]]
// desp: Who the session belongs to.
// Method: GET
// URL: /api/auth/user
// Response Body: `WhoAmIResponse`
#[get("/auth/user")]
pub async fn whoami(
    session: Session,
    query: web::Query<Claimed>,
) -> Result<impl Responder, APIError> {
    let user_id = session_user(&session, query.username.as_deref())?;
    let username = session
        .get::<String>(SESSION_USERNAME)
        .ok()
        .flatten()
        .ok_or(APIError::NotLogin)?;
    Ok(accepted("OK", WhoAmIResponse { user_id, username }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_are_validated() {
        assert_eq!(validate_username("bob"), Ok(()));
        assert_eq!(validate_username("miner_42-x"), Ok(()));
        assert_eq!(validate_username("ab"), Err(Rejection::InvalidUsername));
        assert_eq!(validate_username("has space"), Err(Rejection::InvalidUsername));
        assert_eq!(
            validate_username(&"a".repeat(33)),
            Err(Rejection::InvalidUsername)
        );
    }

    #[test]
    fn passwords_are_validated() {
        assert_eq!(validate_password("12345678"), Ok(()));
        assert_eq!(validate_password("1234567"), Err(Rejection::InvalidPassword));
    }

    #[test]
    fn empty_credentials_fail_sanity() {
        let form = Credentials {
            username: String::new(),
            password: "12345678".to_owned(),
        };
        assert_eq!(form.sanity(), Err(APIError::InvalidFormData));
    }

    #[actix_web::test]
    async fn whoami_requires_login() {
        use actix_session::{storage::CookieSessionStore, SessionMiddleware};
        use actix_web::{test, App};

        let app = test::init_service(
            App::new()
                .wrap(SessionMiddleware::new(
                    CookieSessionStore::default(),
                    cipher_util::gen_cookie_key("test"),
                ))
                .service(web::scope("/api").service(whoami)),
        )
        .await;
        let request = test::TestRequest::get().uri("/api/auth/user").to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), actix_web::http::StatusCode::UNAUTHORIZED);
    }
}
