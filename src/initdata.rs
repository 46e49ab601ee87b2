//! Verification of the mini-app session attestation blob (`initData`).
//!
//! The platform signs the URL-encoded parameter set with
//! `HMAC_SHA256(key = HMAC_SHA256(key = "WebAppData", data = bot_token),
//! data = data_check_string)` where the data-check string is every
//! parameter except `hash`, sorted by key, joined as `key=value` lines.
//! The submission is only trusted if the recomputed tag matches `hash`
//! and `auth_date` is recent.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Attested sessions older than this are rejected.
pub const MAX_AUTH_AGE_SECS: i64 = 600;

#[derive(Debug, Error, PartialEq)]
pub enum InitDataError {
    #[error("initData is empty")]
    Empty,
    #[error("initData missing hash")]
    MissingHash,
    #[error("initData missing auth_date")]
    MissingAuthDate,
    #[error("initData expired")]
    Expired,
    #[error("initData hash mismatch")]
    HashMismatch,
    #[error("initData missing user")]
    MissingUser,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InitDataUser {
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

/// Verify `init_data` against `bot_token` and return the attested user.
/// `now` is unix seconds; injected for testability.
pub fn verify_init_data(
    init_data: &str,
    bot_token: &str,
    now: i64,
) -> Result<InitDataUser, InitDataError> {
    if init_data.trim().is_empty() {
        return Err(InitDataError::Empty);
    }

    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(init_data.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let hash_pos = pairs
        .iter()
        .position(|(k, _)| k == "hash")
        .ok_or(InitDataError::MissingHash)?;
    let (_, provided_hash) = pairs.remove(hash_pos);

    let auth_date = pairs
        .iter()
        .find(|(k, _)| k == "auth_date")
        .and_then(|(_, v)| v.parse::<i64>().ok())
        .ok_or(InitDataError::MissingAuthDate)?;
    if now - auth_date > MAX_AUTH_AGE_SECS {
        return Err(InitDataError::Expired);
    }

    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let data_check: String = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n");

    let expected = hex::decode(provided_hash.trim()).map_err(|_| InitDataError::HashMismatch)?;

    let mut secret = HmacSha256::new_from_slice(b"WebAppData").expect("hmac accepts any key size");
    secret.update(bot_token.as_bytes());
    let secret_key = secret.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&secret_key).expect("hmac accepts any key size");
    mac.update(data_check.as_bytes());
    // verify_slice is constant time
    mac.verify_slice(&expected)
        .map_err(|_| InitDataError::HashMismatch)?;

    let user_json = pairs
        .iter()
        .find(|(k, _)| k == "user")
        .map(|(_, v)| v.as_str())
        .ok_or(InitDataError::MissingUser)?;
    serde_json::from_str::<InitDataUser>(user_json).map_err(|_| InitDataError::MissingUser)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "12345:TEST_TOKEN";

    /// Build a correctly signed blob the way the platform would.
    fn signed_init_data(user_json: &str, auth_date: i64) -> String {
        let fields = vec![
            ("auth_date".to_string(), auth_date.to_string()),
            ("query_id".to_string(), "AAE1".to_string()),
            ("user".to_string(), user_json.to_string()),
        ];

        let mut sorted = fields.clone();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let data_check: String = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n");

        let mut secret = HmacSha256::new_from_slice(b"WebAppData").unwrap();
        secret.update(TOKEN.as_bytes());
        let secret_key = secret.finalize().into_bytes();
        let mut mac = HmacSha256::new_from_slice(&secret_key).unwrap();
        mac.update(data_check.as_bytes());
        let hash = hex::encode(mac.finalize().into_bytes());

        let mut encoded = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &fields {
            encoded.append_pair(k, v);
        }
        encoded.append_pair("hash", &hash);
        encoded.finish()
    }

    #[test]
    fn valid_blob_yields_attested_user() {
        let blob = signed_init_data(r#"{"id":777,"first_name":"Alice","username":"al"}"#, 1000);
        let user = verify_init_data(&blob, TOKEN, 1100).expect("verify");
        assert_eq!(user.id, 777);
        assert_eq!(user.username.as_deref(), Some("al"));
    }

    #[test]
    fn tampered_hash_is_rejected() {
        let blob = signed_init_data(r#"{"id":777,"first_name":"Alice"}"#, 1000);
        // Flip the final hex digit of the hash.
        let mut tampered = blob.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert_eq!(
            verify_init_data(&tampered, TOKEN, 1100),
            Err(InitDataError::HashMismatch)
        );
    }

    #[test]
    fn tampered_field_is_rejected() {
        let blob = signed_init_data(r#"{"id":777,"first_name":"Alice"}"#, 1000);
        let tampered = blob.replace("777", "778");
        assert_eq!(
            verify_init_data(&tampered, TOKEN, 1100),
            Err(InitDataError::HashMismatch)
        );
    }

    #[test]
    fn stale_auth_date_is_rejected() {
        let blob = signed_init_data(r#"{"id":777,"first_name":"Alice"}"#, 1000);
        assert_eq!(
            verify_init_data(&blob, TOKEN, 1000 + MAX_AUTH_AGE_SECS + 1),
            Err(InitDataError::Expired)
        );
        // Exactly at the limit is still acceptable.
        assert!(verify_init_data(&blob, TOKEN, 1000 + MAX_AUTH_AGE_SECS).is_ok());
    }

    #[test]
    fn wrong_bot_token_is_rejected() {
        let blob = signed_init_data(r#"{"id":777,"first_name":"Alice"}"#, 1000);
        assert_eq!(
            verify_init_data(&blob, "999:OTHER", 1100),
            Err(InitDataError::HashMismatch)
        );
    }

    #[test]
    fn missing_pieces_are_rejected() {
        assert_eq!(verify_init_data("", TOKEN, 0), Err(InitDataError::Empty));
        assert_eq!(
            verify_init_data("auth_date=1000", TOKEN, 1100),
            Err(InitDataError::MissingHash)
        );
        assert_eq!(
            verify_init_data("hash=00", TOKEN, 1100),
            Err(InitDataError::MissingAuthDate)
        );
    }
}
