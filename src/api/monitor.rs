use std::sync::Arc;

use crate::util::cache::Cache;

use crate::util::api_util::*;
use actix_session::Session;
use actix_web::{get, web, HttpResponse, Responder};

#[get("/monitor/cache_size")]
pub async fn cache_size(
    session: Session,
    cache: web::Data<Arc<Cache>>,
) -> Result<impl Responder, APIError> {
    session_user(&session, None)?;
    Ok(HttpResponse::Ok().json(cache.get_size()))
}
