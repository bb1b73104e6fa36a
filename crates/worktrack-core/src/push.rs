use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::WorktrackError;

/// Length of an uncompressed P-256 public key.
pub const VAPID_KEY_LEN: usize = 65;

/// Decode a base64url VAPID application server key into raw key bytes.
/// Padding is optional, as keys are usually published without it.
pub fn decode_vapid_key(key: &str) -> Result<Vec<u8>, WorktrackError> {
    let trimmed = key.trim();
    let bytes = if trimmed.ends_with('=') {
        URL_SAFE.decode(trimmed)
    } else {
        URL_SAFE_NO_PAD.decode(trimmed)
    }
    .map_err(|e| WorktrackError::InvalidInput(format!("vapid key: {e}")))?;

    if bytes.len() != VAPID_KEY_LEN || bytes[0] != 0x04 {
        return Err(WorktrackError::InvalidInput(format!(
            "vapid key: expected {VAPID_KEY_LEN} byte uncompressed point, got {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Body of `POST notifications/subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default)]
    pub expiration_time: Option<i64>,
    pub keys: SubscriptionKeys,
}
