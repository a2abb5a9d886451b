extern crate diesel;
extern crate dotenv;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::dev::RequestHead;
use actix_web::http::header::HeaderValue;
use actix_web::{web, App, HttpServer};

use diesel_async::pooled_connection::{bb8::Pool, AsyncDieselConnectionManager};
use diesel_async::AsyncPgConnection;

use arcadia_server::api::{board, equipment, game, mining, monitor, register, store};
use arcadia_server::util::{cache::Cache, cipher_util};

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use arcadia_server::DbPool;
use log::{info, warn};
use once_cell::sync::Lazy;

static ALLOWED_ORIGINS: Lazy<Vec<String>> = Lazy::new(|| {
    std::env::var("ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000".to_owned())
        .split(',')
        .map(|origin| origin.trim().to_owned())
        .filter(|origin| !origin.is_empty())
        .collect()
});

fn cors_check(head: &HeaderValue, _: &RequestHead) -> bool {
    if let Ok(origin) = head.to_str() {
        ALLOWED_ORIGINS.iter().any(|allowed| allowed == origin)
    } else {
        false
    }
}

#[actix_rt::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let cookie_token = std::env::var("COOKIE_TOKEN").expect("COOKIE_TOKEN must be set");
    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:9000".to_owned());

    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool: DbPool = Pool::builder()
        .build(manager)
        .await
        .expect("Failed to link to db");

    let secret_key = cipher_util::gen_cookie_key(&cookie_token);

    let is_production = match std::env::var("MODE") {
        Ok(mode) if mode == "dev" => {
            warn!("Under development mode.");
            false
        }
        _ => true, // Production mode as default!
    };

    let pool = Arc::new(pool);
    let cache = Arc::new(Cache::new(pool.clone()));

    info!("Listening on {bind_address}, origins {:?}", *ALLOWED_ORIGINS);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(cache.clone()))
            .wrap(
                Cors::default()
                    .allowed_origin_fn(cors_check)
                    .allow_any_header()
                    .allow_any_method()
                    .supports_credentials(),
            )
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), secret_key.clone())
                    .cookie_secure(is_production)
                    .cookie_same_site(actix_web::cookie::SameSite::None)
                    .build(),
            )
            .service(
                web::scope("/api")
                    .service(register::register_user)
                    .service(register::login_user)
                    .service(register::logout_user)
                    .service(register::whoami)
                    .service(mining::status)
                    .service(mining::mine)
                    .service(mining::recharge)
                    .service(store::get_catalog)
                    .service(store::buy)
                    .service(store::buy_room)
                    .service(equipment::place_rack)
                    .service(equipment::unplace_rack)
                    .service(equipment::equip_miner)
                    .service(equipment::unequip_miner)
                    .service(game::game_levels)
                    .service(game::start_game)
                    .service(game::claim_game)
                    .service(board::leaderboard)
                    .service(board::stats)
                    .service(monitor::cache_size),
            )
    })
    .bind(bind_address)?
    .run()
    .await
}
