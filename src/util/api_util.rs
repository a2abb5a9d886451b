use std::fmt::Display as FmtDisplay;

use actix_session::Session;
use actix_web::{
    error,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use derive_more::derive::Display;
use diesel::result::Error;
use log::error;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

use crate::{models::UserId, Ext};

pub trait APIRequest: Sized {
    fn ok(&self) -> bool;
    fn sanity(&self) -> Result<(), APIError> {
        if self.ok() {
            Ok(())
        } else {
            Err(APIError::InvalidFormData)
        }
    }
}

/// Expected business outcomes. They never indicate a fault on the server and
/// are rendered as `{success: false, code, message}`.
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[display("Nome de usuário já está em uso")]
    UsernameTaken,

    #[display("Nome de usuário deve ter entre 3 e 32 caracteres (letras, números, _ ou -)")]
    InvalidUsername,

    #[display("Senha deve ter entre 8 e 128 caracteres")]
    InvalidPassword,

    #[display("Usuário não encontrado")]
    UnknownUser,

    #[display("Senha incorreta")]
    WrongPassword,

    #[display("Saldo insuficiente")]
    InsufficientBalance,

    #[display("Item não encontrado")]
    ItemNotFound,

    #[display("Sala bloqueada")]
    RoomLocked,

    #[display("Sala cheia")]
    RoomFull,

    #[display("Rack cheio")]
    RackFull,

    #[display("Posição ocupada")]
    SlotOccupied,

    #[display("Posição inválida")]
    InvalidPosition,

    #[display("Número máximo de salas atingido")]
    MaxRoomsReached,

    #[display("Sem baterias disponíveis")]
    NoBatteries,

    #[display("Recarga grátis disponível em {wait_seconds}s")]
    FreeRechargeOnCooldown { wait_seconds: i64 },

    #[display("Jogo não encontrado")]
    UnknownGame,

    #[display("Aguarde {wait_seconds}s para jogar novamente")]
    OnCooldown { wait_seconds: i64 },

    #[display("Nenhuma sessão de jogo ativa")]
    NoActiveSession,

    #[display("A sessão ativa pertence a outro jogo")]
    SessionMismatch,

    #[display("Sessão de jogo expirada")]
    SessionExpired,

    #[display("Partida rápida demais")]
    TooFast,

    #[display("Pontuação insuficiente: necessário {required}")]
    ScoreTooLow { required: i64 },

    #[display("Fim de jogo")]
    GameOver,
}

impl Rejection {
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::UsernameTaken => "UsernameTaken",
            Rejection::InvalidUsername => "InvalidUsername",
            Rejection::InvalidPassword => "InvalidPassword",
            Rejection::UnknownUser => "UnknownUser",
            Rejection::WrongPassword => "WrongPassword",
            Rejection::InsufficientBalance => "InsufficientBalance",
            Rejection::ItemNotFound => "ItemNotFound",
            Rejection::RoomLocked => "RoomLocked",
            Rejection::RoomFull => "RoomFull",
            Rejection::RackFull => "RackFull",
            Rejection::SlotOccupied => "SlotOccupied",
            Rejection::InvalidPosition => "InvalidPosition",
            Rejection::MaxRoomsReached => "MaxRoomsReached",
            Rejection::NoBatteries => "NoBatteries",
            Rejection::FreeRechargeOnCooldown { .. } => "FreeRechargeOnCooldown",
            Rejection::UnknownGame => "UnknownGame",
            Rejection::OnCooldown { .. } => "OnCooldown",
            Rejection::NoActiveSession => "NoActiveSession",
            Rejection::SessionMismatch => "SessionMismatch",
            Rejection::SessionExpired => "SessionExpired",
            Rejection::TooFast => "TooFast",
            Rejection::ScoreTooLow { .. } => "ScoreTooLow",
            Rejection::GameOver => "GameOver",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Rejection::UsernameTaken | Rejection::InvalidUsername | Rejection::InvalidPassword => {
                StatusCode::BAD_REQUEST
            }
            Rejection::UnknownUser | Rejection::WrongPassword => StatusCode::UNAUTHORIZED,
            _ => StatusCode::OK,
        }
    }
}

impl Serialize for Rejection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("Rejection", 4)?;
        state.serialize_field("success", &false)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        match self {
            Rejection::FreeRechargeOnCooldown { wait_seconds }
            | Rejection::OnCooldown { wait_seconds } => {
                state.serialize_field("wait_seconds", wait_seconds)?;
            }
            Rejection::ScoreTooLow { required } => {
                state.serialize_field("required_score", required)?;
            }
            _ => {}
        }
        state.end()
    }
}

#[derive(Debug, Display, PartialEq, Eq)]
pub enum APIError {
    #[display("Invalid form data")]
    InvalidFormData,

    #[display("Not logged in")]
    NotLogin,

    #[display("Unauthorized access")]
    Unauthorized,

    #[display("Usuário não encontrado")]
    UserNotFound,

    #[display("{_0}")]
    Rejected(Rejection),

    #[display("Server error at {location}, ref[{refnum}]: {msg}")]
    ServerError {
        location: &'static str,
        msg: &'static str,
        refnum: uuid::Uuid,
    },
}

impl APIError {
    pub fn set_location(self, location: &'static str) -> Self {
        match self {
            APIError::ServerError {
                location: _,
                msg,
                refnum,
            } => APIError::ServerError {
                location,
                msg,
                refnum,
            },
            _ => self,
        }
    }

    pub fn log(&self) {
        if let APIError::ServerError {
            location,
            msg,
            refnum,
        } = self
        {
            error!("Server error at {location}, ref[{refnum}]: {msg}");
        }
    }
}

impl From<Error> for APIError {
    fn from(e: Error) -> Self {
        new_unlocated_server_error(e, "Transaction")
    }
}

impl From<Rejection> for APIError {
    fn from(rejection: Rejection) -> Self {
        APIError::Rejected(rejection)
    }
}

impl error::ResponseError for APIError {
    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());
        match self {
            APIError::Rejected(rejection) => response.json(rejection),
            _ => response.insert_header(ContentType::json()).body(
                serde_json::json!({ "success": false, "message": self.to_string() }).to_string(),
            ),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            APIError::InvalidFormData => StatusCode::BAD_REQUEST,
            APIError::NotLogin => StatusCode::UNAUTHORIZED,
            APIError::Unauthorized => StatusCode::FORBIDDEN,
            APIError::UserNotFound => StatusCode::NOT_FOUND,
            APIError::Rejected(rejection) => rejection.status_code(),
            APIError::ServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct Accepted<'a, T: Serialize> {
    success: bool,
    message: &'a str,
    #[serde(flatten)]
    body: T,
}

/// Body for routes whose success carries nothing beyond the message.
#[derive(Serialize, Debug, Default)]
pub struct Nothing {}

/// Username some clients still send in-band next to the session cookie.
#[derive(Deserialize, Debug, Default)]
pub struct Claimed {
    pub username: Option<String>,
}

pub fn accepted<T: Serialize>(message: &str, body: T) -> HttpResponse {
    HttpResponse::Ok().json(Accepted {
        success: true,
        message,
        body,
    })
}

/// Resolves the logged in user. A `claimed` username sent in-band must match
/// the one stored in the session.
pub fn session_user(session: &Session, claimed: Option<&str>) -> Result<UserId, APIError> {
    if let (Ok(Some(user_id)), Ok(Some(username))) = (
        session.get::<UserId>(SESSION_USER_ID),
        session.get::<String>(SESSION_USERNAME),
    ) {
        match claimed {
            Some(claimed) if !claimed.is_empty() && claimed != username => {
                Err(APIError::Unauthorized)
            }
            _ => Ok(user_id),
        }
    } else {
        Err(APIError::NotLogin)
    }
}

pub fn set_loggedin_session(
    session: &mut Session,
    id: UserId,
    username: &str,
    location: &'static str,
) -> Result<(), APIError> {
    session.renew();
    session
        .insert(SESSION_USER_ID, id)
        .map_err(|e| log_server_error(e, location, ERROR_SESSION_INSERT))?;
    session
        .insert(SESSION_USERNAME, username)
        .map_err(|e| log_server_error(e, location, ERROR_SESSION_INSERT))?;
    Ok(())
}

pub fn kill_session(session: &mut Session) -> impl FnMut(&APIError) + '_ {
    |result| {
        if result == &APIError::UserNotFound {
            session.clear()
        };
    }
}

pub fn log_server_error<E>(error: E, location: &'static str, msg: &'static str) -> APIError
where
    E: FmtDisplay,
{
    new_unlocated_server_error(error, msg)
        .set_location(location)
        .tap(APIError::log)
}

pub fn new_unlocated_server_error<E>(error: E, msg: &'static str) -> APIError
where
    E: FmtDisplay,
{
    let refnum = uuid::Uuid::new_v4();
    error!("Error [{refnum}]: {error}");
    APIError::ServerError {
        location: LOCATION_UNKNOWN,
        msg,
        refnum,
    }
}

pub static SESSION_USER_ID: &str = "user_id";
pub static SESSION_USERNAME: &str = "username";

pub static ERROR_DB_CONNECTION: &str = "db_connction_failed";
pub static ERROR_SESSION_INSERT: &str = "session_setting_failed";
pub static ERROR_DB_UNKNOWN: &str = "database_unknown";

pub static LOCATION_UNKNOWN: &str = "[unknown]";

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn rejection_serializes_with_code_and_message() {
        let value = serde_json::to_value(Rejection::InsufficientBalance).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["code"], "InsufficientBalance");
        assert_eq!(value["message"], "Saldo insuficiente");
        assert!(value.get("wait_seconds").is_none());
    }

    #[test]
    fn cooldown_rejection_carries_wait_seconds() {
        let value = serde_json::to_value(Rejection::OnCooldown { wait_seconds: 42 }).unwrap();
        assert_eq!(value["code"], "OnCooldown");
        assert_eq!(value["wait_seconds"], 42);
    }

    #[test]
    fn score_rejection_carries_required_score() {
        let value = serde_json::to_value(Rejection::ScoreTooLow { required: 110 }).unwrap();
        assert_eq!(value["required_score"], 110);
    }

    #[test]
    fn auth_rejections_are_not_http_200() {
        assert_eq!(Rejection::WrongPassword.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(Rejection::UsernameTaken.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Rejection::RoomFull.status_code(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn rejected_error_renders_rejection_body() {
        use actix_web::ResponseError;

        let response = APIError::from(Rejection::RackFull).error_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], "RackFull");
        assert_eq!(value["success"], false);
    }

    #[actix_web::test]
    async fn server_error_hides_details_behind_refnum() {
        use actix_web::ResponseError;

        let error = new_unlocated_server_error("boom", ERROR_DB_UNKNOWN).set_location("mine");
        let response = error.error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let message = value["message"].as_str().unwrap();
        assert!(message.starts_with("Server error at mine"));
        assert!(!message.contains("boom"));
    }

    #[test]
    fn accepted_flattens_body() {
        #[derive(Serialize)]
        struct Body {
            balance: f64,
        }
        let response = accepted("ok", Body { balance: 1.5 });
        assert_eq!(response.status(), StatusCode::OK);
    }
}
