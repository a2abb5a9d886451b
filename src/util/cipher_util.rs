use actix_web::cookie::Key;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};

use crate::models::User;

pub fn get_salt<const N: usize>() -> [u8; N] {
    let mut salt = [0u8; N];
    OsRng.fill_bytes(&mut salt);
    salt
}

fn salted_hash(password: &str, pepper: &str, salt: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(pepper);
    hasher.update(password);
    hasher.update(salt);
    hasher.finalize().into()
}

/// Returns `(salt, hash)`, both hex encoded.
pub fn gen_salted_password(password: &str, pepper: &str) -> (String, String) {
    let salt = get_salt::<32>();
    let calculated_hash = salted_hash(password, pepper, &salt);
    (hex::encode(salt), hex::encode(calculated_hash))
}

pub fn check_salted_password<'a>(
    user: &'a User,
    password_input: &str,
    pepper: &str,
) -> Option<&'a User> {
    let mut salt = [0u8; 32];
    hex::decode_to_slice(&user.salt, &mut salt).ok()?;

    let calculated_hash = salted_hash(password_input, pepper, &salt);

    let mut expected_hash = [0u8; 32];
    hex::decode_to_slice(&user.password, &mut expected_hash).ok()?;

    if calculated_hash == expected_hash {
        Some(user)
    } else {
        None
    }
}

pub fn gen_cookie_key(cookie_token: &str) -> Key {
    let mut hasher = Sha512::new();
    hasher.update(cookie_token);
    Key::from(hasher.finalize().as_slice())
}
