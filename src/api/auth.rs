//! Timestamp + hash request authentication.
//!
//! Every API request carries a Unix-epoch-ms timestamp and a SHA-256 hash of
//! the canonical request body plus a shared secret. The shared secret lives
//! in the `settings` table; a value of 0 disables authentication entirely.

use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::time::{SystemTime, UNIX_EPOCH};

const MAX_PAST_SKEW_MS: i64 = 1000;
const MAX_FUTURE_SKEW_MS: i64 = 1;

#[derive(Debug, Clone)]
pub enum ApiAuthError {
    InvalidTimestamp { timestamp: i64, now: i64, reason: String },
    InvalidHash { provided: String, calculated: String },
    MissingTimestamp,
    MissingHash,
    DatabaseError(String),
    ParseError(String),
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::InvalidTimestamp { reason, .. } => write!(f, "Invalid timestamp: {reason}"),
            ApiAuthError::InvalidHash { .. } => write!(f, "Invalid hash"),
            ApiAuthError::MissingTimestamp => write!(f, "Missing timestamp field"),
            ApiAuthError::MissingHash => write!(f, "Missing hash field"),
            ApiAuthError::DatabaseError(err) => write!(f, "Database error: {err}"),
            ApiAuthError::ParseError(err) => write!(f, "Parse error: {err}"),
        }
    }
}

impl std::error::Error for ApiAuthError {}

/// Load the shared secret from the `settings` table, generating and
/// persisting one if it has never been set.
pub async fn load_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT value FROM settings WHERE key = 'api_shared_secret'")
            .fetch_optional(db)
            .await
            .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    match result {
        Some((value,)) => value
            .parse::<i64>()
            .map_err(|e| ApiAuthError::DatabaseError(format!("Invalid i64: {e}"))),
        None => initialize_shared_secret(db).await,
    }
}

/// Generate and persist a cryptographically random, non-zero shared secret.
pub async fn initialize_shared_secret(db: &SqlitePool) -> Result<i64, ApiAuthError> {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let secret: i64 = loop {
        let val = rng.gen::<i64>();
        if val != 0 {
            break val;
        }
    };

    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES ('api_shared_secret', ?)")
        .bind(secret.to_string())
        .execute(db)
        .await
        .map_err(|e| ApiAuthError::DatabaseError(e.to_string()))?;

    Ok(secret)
}

/// A request timestamp must be no more than 1000ms in the past and no more
/// than 1ms in the future (clock-drift tolerance only).
pub fn validate_timestamp(timestamp: i64) -> Result<(), ApiAuthError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64;

    let diff = now - timestamp;

    if diff > MAX_PAST_SKEW_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {diff}ms too old (max {MAX_PAST_SKEW_MS}ms past)"),
        });
    }

    if diff < -MAX_FUTURE_SKEW_MS {
        return Err(ApiAuthError::InvalidTimestamp {
            timestamp,
            now,
            reason: format!("Timestamp {}ms in future (max {MAX_FUTURE_SKEW_MS}ms future)", diff.abs()),
        });
    }

    Ok(())
}

/// Hash = SHA-256(canonical_json(with hash field zeroed) + shared_secret), hex.
pub fn calculate_hash(json_value: &Value, shared_secret: i64) -> String {
    let mut value = json_value.clone();
    if let Some(obj) = value.as_object_mut() {
        obj.insert(
            "hash".to_string(),
            Value::String("0".repeat(64)),
        );
    }

    let canonical = to_canonical_json(&value);
    let to_hash = format!("{canonical}{shared_secret}");

    let mut hasher = Sha256::new();
    hasher.update(to_hash.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Render JSON with alphabetically sorted object keys and no whitespace.
pub fn to_canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let items: Vec<String> = pairs
                .into_iter()
                .map(|(k, v)| format!("\"{k}\":{}", to_canonical_json(v)))
                .collect();
            format!("{{{}}}", items.join(","))
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(to_canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

pub fn validate_hash(provided_hash: &str, json_value: &Value, shared_secret: i64) -> Result<(), ApiAuthError> {
    let calculated = calculate_hash(json_value, shared_secret);
    if provided_hash != calculated {
        return Err(ApiAuthError::InvalidHash {
            provided: provided_hash.to_string(),
            calculated,
        });
    }
    Ok(())
}
