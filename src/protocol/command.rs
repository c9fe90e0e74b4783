//! Command messages of the streaming protocol.
//!
//! Each line from the backend is a JSON object `{"command": ..., "data": {...}}`.
//! The command name is resolved exactly once, here, into [`Command`]; the
//! dispatcher matches on the enum.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::protocol::cookie::{default_path, validate_attribute, CookieSpec};
use crate::protocol::error::ProtocolError;

/// Payload of `write`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WriteData {
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub flush: bool,
}

/// Payload of `set_status`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetStatusData {
    pub code: u16,
}

/// Payload of `set_header`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetHeaderData {
    pub key: String,
    pub value: Value,
}

/// Payload of `clear_cookie`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClearCookieData {
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default = "default_path")]
    pub path: String,
}

/// Payload of `clear_all_cookie`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClearAllCookieData {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default = "default_path")]
    pub path: String,
}

/// Payload of `redirect`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RedirectData {
    pub url: String,
    #[serde(default)]
    pub query: Option<Value>,
    #[serde(default)]
    pub permanent: bool,
}

/// One decoded protocol command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Write(WriteData),
    SetStatus(SetStatusData),
    SetCookie(CookieSpec),
    ClearCookie(ClearCookieData),
    ClearAllCookie(ClearAllCookieData),
    SetHeader(SetHeaderData),
    Flush,
    Redirect(RedirectData),
    Finish,
}

#[derive(Deserialize)]
struct RawCommand {
    command: String,
    #[serde(default)]
    data: Value,
}

impl Command {
    /// Decode one framed line.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let raw: RawCommand = serde_json::from_str(line)
            .map_err(|e| ProtocolError::MalformedCommand(e.to_string()))?;

        let data = match raw.data {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        let command = match raw.command.as_str() {
            "write" => Command::Write(payload(&raw.command, data)?),
            "set_status" => Command::SetStatus(payload(&raw.command, data)?),
            "set_cookie" => {
                let cookie: CookieSpec = payload(&raw.command, data)?;
                cookie.validate().map_err(ProtocolError::MalformedCommand)?;
                Command::SetCookie(cookie)
            }
            "clear_cookie" => {
                let clear: ClearCookieData = payload(&raw.command, data)?;
                validate_attribute("name", Some(&clear.name))
                    .and_then(|_| validate_attribute("domain", clear.domain.as_deref()))
                    .and_then(|_| validate_attribute("path", Some(&clear.path)))
                    .map_err(ProtocolError::MalformedCommand)?;
                Command::ClearCookie(clear)
            }
            "clear_all_cookie" => {
                let clear: ClearAllCookieData = payload(&raw.command, data)?;
                validate_attribute("domain", clear.domain.as_deref())
                    .and_then(|_| validate_attribute("path", Some(&clear.path)))
                    .map_err(ProtocolError::MalformedCommand)?;
                Command::ClearAllCookie(clear)
            }
            "set_header" => Command::SetHeader(payload(&raw.command, data)?),
            "flush" => Command::Flush,
            "redirect" => Command::Redirect(payload(&raw.command, data)?),
            "finish" => Command::Finish,
            _ => return Err(ProtocolError::UnsupportedCommand(raw.command)),
        };
        Ok(command)
    }

    /// Protocol name of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Write(_) => "write",
            Command::SetStatus(_) => "set_status",
            Command::SetCookie(_) => "set_cookie",
            Command::ClearCookie(_) => "clear_cookie",
            Command::ClearAllCookie(_) => "clear_all_cookie",
            Command::SetHeader(_) => "set_header",
            Command::Flush => "flush",
            Command::Redirect(_) => "redirect",
            Command::Finish => "finish",
        }
    }
}

fn payload<T: DeserializeOwned>(command: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data)
        .map_err(|e| ProtocolError::MalformedCommand(format!("{}: {}", command, e)))
}
