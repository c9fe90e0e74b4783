//! Structured cookie record carried by `set_cookie`.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::Deserialize;

/// Cookie expiry as sent by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CookieExpiry {
    /// Seconds since the Unix epoch.
    Timestamp(f64),
    /// Pre-formatted HTTP date, passed through as-is.
    Date(String),
}

/// A cookie to add to the response.
///
/// `secure` only selects which sink path is used; it is never rendered as
/// an attribute.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CookieSpec {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub expires: Option<CookieExpiry>,
    #[serde(default)]
    pub expires_days: Option<f64>,
    #[serde(default)]
    pub max_age: Option<i64>,
    #[serde(default)]
    pub httponly: bool,
    #[serde(default)]
    pub samesite: Option<String>,
    #[serde(default)]
    pub secure: bool,
}

/// Largest accepted `expires_days` magnitude (about 2700 years).
pub const MAX_EXPIRES_DAYS: f64 = 1_000_000.0;

pub(crate) fn default_path() -> String {
    "/".to_string()
}

impl CookieSpec {
    /// Reject names and values that cannot appear in a `Set-Cookie` line.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("cookie name is empty".to_string());
        }
        if self.name.bytes().any(|b| b <= 0x20 || b == b';' || b == b'=') {
            return Err(format!("invalid cookie name {:?}", self.name));
        }
        if self.value.bytes().any(|b| b <= 0x20 || b == b';') {
            return Err(format!("invalid value for cookie {:?}", self.name));
        }
        validate_attribute("domain", self.domain.as_deref())?;
        validate_attribute("path", Some(&self.path))?;
        validate_attribute("samesite", self.samesite.as_deref())?;
        if let Some(days) = self.expires_days {
            if !days.is_finite() || days.abs() > MAX_EXPIRES_DAYS {
                return Err(format!("expires_days out of range for cookie {:?}", self.name));
            }
        }
        Ok(())
    }

    /// Render the `Set-Cookie` header value, resolving relative expiry
    /// against `now`.
    pub fn render(&self, now: DateTime<Utc>) -> String {
        let mut out = format!("{}={}", self.name, self.value);

        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }

        let expires = match (&self.expires, self.expires_days) {
            (Some(CookieExpiry::Date(date)), _) => Some(date.clone()),
            (Some(CookieExpiry::Timestamp(ts)), _) => Some(http_date_from_secs(*ts)),
            (None, Some(days)) => days_duration(days)
                .and_then(|delta| now.checked_add_signed(delta))
                .map(http_date),
            (None, None) => None,
        };
        if let Some(expires) = expires {
            out.push_str("; expires=");
            out.push_str(&expires);
        }

        out.push_str("; Path=");
        out.push_str(&self.path);

        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age));
        }
        if self.httponly {
            out.push_str("; HttpOnly");
        }
        if let Some(samesite) = &self.samesite {
            out.push_str("; SameSite=");
            out.push_str(samesite);
        }
        out
    }
}

/// Format an instant as an IMF-fixdate.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn http_date_from_secs(secs: f64) -> String {
    let at = Utc
        .timestamp_opt(secs.trunc() as i64, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    http_date(at)
}

/// Reject attribute values that would split or extend a `Set-Cookie` line.
pub fn validate_attribute(attribute: &str, value: Option<&str>) -> Result<(), String> {
    match value {
        Some(v) if v.bytes().any(|b| b < 0x20 || b == 0x7f || b == b';') => {
            Err(format!("invalid cookie {} {:?}", attribute, v))
        }
        _ => Ok(()),
    }
}

fn days_duration(days: f64) -> Option<TimeDelta> {
    if !days.is_finite() {
        return None;
    }
    let millis = days * 86_400_000.0;
    if millis.abs() >= i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(millis as i64)
}
