//! Signed cookie values.
//!
//! Values use the version 2 signed-value layout understood by the
//! execution platform:
//!
//! ```text
//! 2|1:0|<len>:<timestamp>|<len>:<name>|<len>:<base64 value>|<hmac-sha256 hex>
//! ```
//!
//! The signature covers everything up to and including the last `|`.

use base64ct::{Base64, Encoding};
use hex::ToHex;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const FORMAT_VERSION: &str = "2";
const KEY_VERSION: &str = "0";

/// Produces signed cookie values with a shared secret.
#[derive(Clone)]
pub struct CookieSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

impl CookieSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Sign `value` for cookie `name` at `timestamp` (seconds since epoch).
    pub fn sign(&self, name: &str, value: &str, timestamp: i64) -> String {
        let encoded = Base64::encode_string(value.as_bytes());
        let timestamp = timestamp.to_string();

        let mut to_sign = String::from(FORMAT_VERSION);
        to_sign.push('|');
        for field in [KEY_VERSION, timestamp.as_str(), name, encoded.as_str()] {
            to_sign.push_str(&format!("{}:{}|", field.len(), field));
        }

        let signature = self.signature(&to_sign);
        to_sign.push_str(&signature);
        to_sign
    }

    fn signature(&self, payload: &str) -> String {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC accepts keys of any length"),
        };
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().encode_hex::<String>()
    }
}
