//! Command replay onto a response sink.
//!
//! # Responsibilities
//! - Apply one decoded command to a [`ResponseSink`]
//! - Select the plain or signed cookie path
//! - Build redirect targets with merged query strings
//!
//! # Design Decisions
//! - Strictly sequential: the caller awaits each dispatch before the next
//! - `finish` is reported back to the caller instead of touching the sink;
//!   the forwarder owns finalization

use serde_json::Value;
use url::form_urlencoded;

use crate::protocol::command::{Command, WriteData};
use crate::protocol::error::ProtocolError;
use crate::protocol::sink::ResponseSink;

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// What the stream should do after a command was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Continue,
    Finish,
}

/// Decode one framed line and apply it.
pub async fn dispatch_line<S>(line: &str, sink: &mut S) -> Result<Dispatch, ProtocolError>
where
    S: ResponseSink + ?Sized,
{
    let command = Command::decode(line)?;
    dispatch(command, sink).await
}

/// Apply one command to the sink.
pub async fn dispatch<S>(command: Command, sink: &mut S) -> Result<Dispatch, ProtocolError>
where
    S: ResponseSink + ?Sized,
{
    tracing::trace!(command = command.name(), "Dispatching command");

    match command {
        Command::Write(data) => {
            let flush = data.flush;
            let (body, is_json) = render_content(data);
            if is_json {
                sink.set_header("Content-Type", JSON_CONTENT_TYPE)?;
            }
            sink.write(&body)?;
            if flush {
                sink.flush().await?;
            }
        }
        Command::SetStatus(data) => sink.set_status(data.code)?,
        Command::SetCookie(cookie) => {
            if cookie.secure {
                sink.set_cookie(&cookie)?;
            } else {
                sink.set_signed_cookie(&cookie)?;
            }
        }
        Command::ClearCookie(data) => {
            sink.clear_cookie(&data.name, data.domain.as_deref(), &data.path)?
        }
        Command::ClearAllCookie(data) => {
            sink.clear_all_cookies(data.domain.as_deref(), &data.path)?
        }
        Command::SetHeader(data) => sink.set_header(&data.key, &value_text(&data.value))?,
        Command::Flush => sink.flush().await?,
        Command::Redirect(data) => {
            let target = redirect_target(&data.url, data.query.as_ref());
            sink.redirect(&target, data.permanent).await?;
        }
        Command::Finish => return Ok(Dispatch::Finish),
    }

    Ok(Dispatch::Continue)
}

/// Body bytes for a `write`, and whether they are a serialized JSON object.
fn render_content(data: WriteData) -> (Vec<u8>, bool) {
    match data.content {
        None | Some(Value::Null) => (b"null".to_vec(), false),
        Some(Value::String(s)) => (s.into_bytes(), false),
        Some(v @ Value::Object(_)) => (v.to_string().into_bytes(), true),
        Some(other) => (other.to_string().into_bytes(), false),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Append `query` (when it is an object) to `url`.
pub fn redirect_target(url: &str, query: Option<&Value>) -> String {
    let params = match query {
        Some(Value::Object(params)) if !params.is_empty() => params,
        _ => return url.to_string(),
    };

    let mut encoded = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        encoded.append_pair(key, &value_text(value));
    }
    let query_string = encoded.finish();

    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, query_string)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::cookie::CookieSpec;
    use crate::protocol::error::SinkError;
    use async_trait::async_trait;

    /// Records every sink call in order.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSink {
        pub calls: Vec<String>,
        pub body: Vec<u8>,
        pub finished: bool,
    }

    impl RecordingSink {
        fn check(&self) -> Result<(), SinkError> {
            if self.finished {
                Err(SinkError::Finished)
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ResponseSink for RecordingSink {
        fn set_status(&mut self, code: u16) -> Result<(), SinkError> {
            self.check()?;
            self.calls.push(format!("status {}", code));
            Ok(())
        }

        fn set_header(&mut self, key: &str, value: &str) -> Result<(), SinkError> {
            self.check()?;
            self.calls.push(format!("header {}: {}", key, value));
            Ok(())
        }

        fn set_cookie(&mut self, cookie: &CookieSpec) -> Result<(), SinkError> {
            self.check()?;
            self.calls.push(format!("plain_cookie {}={}", cookie.name, cookie.value));
            Ok(())
        }

        fn set_signed_cookie(&mut self, cookie: &CookieSpec) -> Result<(), SinkError> {
            self.check()?;
            self.calls.push(format!("signed_cookie {}={}", cookie.name, cookie.value));
            Ok(())
        }

        fn clear_cookie(&mut self, name: &str, domain: Option<&str>, path: &str) -> Result<(), SinkError> {
            self.check()?;
            self.calls.push(format!("clear {} {:?} {}", name, domain, path));
            Ok(())
        }

        fn clear_all_cookies(&mut self, domain: Option<&str>, path: &str) -> Result<(), SinkError> {
            self.check()?;
            self.calls.push(format!("clear_all {:?} {}", domain, path));
            Ok(())
        }

        fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
            self.check()?;
            self.body.extend_from_slice(bytes);
            self.calls.push("write".to_string());
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), SinkError> {
            self.check()?;
            self.calls.push("flush".to_string());
            Ok(())
        }

        async fn redirect(&mut self, url: &str, permanent: bool) -> Result<(), SinkError> {
            self.check()?;
            self.calls.push(format!("redirect {} {}", url, permanent));
            self.finished = true;
            Ok(())
        }

        async fn finish(&mut self) -> Result<(), SinkError> {
            self.check()?;
            self.calls.push("finish".to_string());
            self.finished = true;
            Ok(())
        }

        async fn fail(&mut self, status: u16, message: &str) {
            self.calls.push(format!("fail {} {}", status, message));
            self.finished = true;
        }

        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    async fn run(lines: &[&str]) -> (RecordingSink, Result<Dispatch, ProtocolError>) {
        let mut sink = RecordingSink::default();
        let mut last = Ok(Dispatch::Continue);
        for line in lines {
            last = dispatch_line(line, &mut sink).await;
            if !matches!(last, Ok(Dispatch::Continue)) {
                break;
            }
        }
        (sink, last)
    }

    #[tokio::test]
    async fn test_write_variants() {
        let (sink, result) = run(&[
            r#"{"command":"write","data":{"content":"Hello, "}}"#,
            r#"{"command":"write","data":{}}"#,
            r#"{"command":"write","data":{"content":42,"flush":true}}"#,
        ])
        .await;
        assert!(result.is_ok());
        assert_eq!(sink.body, b"Hello, null42");
        assert_eq!(sink.calls, vec!["write", "write", "write", "flush"]);
    }

    #[tokio::test]
    async fn test_write_object_sets_json_content_type() {
        let (sink, _) = run(&[r#"{"command":"write","data":{"content":{"ok":true}}}"#]).await;
        assert_eq!(sink.body, br#"{"ok":true}"#);
        assert_eq!(sink.calls[0], "header Content-Type: application/json; charset=UTF-8");
    }

    #[tokio::test]
    async fn test_status_and_headers() {
        let (sink, _) = run(&[
            r#"{"command":"set_status","data":{"code":201}}"#,
            r#"{"command":"set_header","data":{"key":"X-Data","value":"Asyncy"}}"#,
            r#"{"command":"set_header","data":{"key":"X-Count","value":3}}"#,
        ])
        .await;
        assert_eq!(
            sink.calls,
            vec!["status 201", "header X-Data: Asyncy", "header X-Count: 3"]
        );
    }

    #[tokio::test]
    async fn test_cookie_policy_branch() {
        let (sink, _) = run(&[
            r#"{"command":"set_cookie","data":{"name":"a","value":"1","secure":true}}"#,
            r#"{"command":"set_cookie","data":{"name":"b","value":"2","secure":false}}"#,
            r#"{"command":"set_cookie","data":{"name":"c","value":"3"}}"#,
        ])
        .await;
        assert_eq!(
            sink.calls,
            vec!["plain_cookie a=1", "signed_cookie b=2", "signed_cookie c=3"]
        );
    }

    #[tokio::test]
    async fn test_clear_cookies() {
        let (sink, _) = run(&[
            r#"{"command":"clear_cookie","data":{"name":"sid","domain":"x.io","path":"/a"}}"#,
            r#"{"command":"clear_all_cookie","data":{"path":"/b"}}"#,
        ])
        .await;
        assert_eq!(
            sink.calls,
            vec![r#"clear sid Some("x.io") /a"#, "clear_all None /b"]
        );
    }

    #[test]
    fn test_redirect_query_merge() {
        let query = serde_json::json!({"q": "1"});
        assert_eq!(redirect_target("/x", Some(&query)), "/x?q=1");
        assert_eq!(redirect_target("/x?y=2", Some(&query)), "/x?y=2&q=1");
        assert_eq!(redirect_target("/x", None), "/x");
        assert_eq!(redirect_target("/x", Some(&serde_json::json!("q=1"))), "/x");

        let spaced = serde_json::json!({"a b": "c&d", "n": 5});
        assert_eq!(redirect_target("/x", Some(&spaced)), "/x?a+b=c%26d&n=5");
    }

    #[tokio::test]
    async fn test_redirect_finishes_sink() {
        let (sink, result) = run(&[
            r#"{"command":"redirect","data":{"url":"/login","query":{"next":"/home"}}}"#,
        ])
        .await;
        assert!(matches!(result, Ok(Dispatch::Continue)));
        assert_eq!(sink.calls, vec!["redirect /login?next=%2Fhome false"]);
        assert!(sink.is_finished());
    }

    #[tokio::test]
    async fn test_finish_stops_stream() {
        let (sink, result) = run(&[
            r#"{"command":"write","data":{"content":"a"}}"#,
            r#"{"command":"finish"}"#,
            r#"{"command":"write","data":{"content":"b"}}"#,
        ])
        .await;
        assert!(matches!(result, Ok(Dispatch::Finish)));
        assert_eq!(sink.body, b"a");
        assert!(!sink.is_finished());
    }

    #[tokio::test]
    async fn test_unsupported_command_is_fatal() {
        let (sink, result) = run(&[
            r#"{"command":"write","data":{"content":"a"}}"#,
            r#"{"command":"bogus"}"#,
            r#"{"command":"write","data":{"content":"b"}}"#,
        ])
        .await;
        assert!(matches!(result, Err(ProtocolError::UnsupportedCommand(ref c)) if c == "bogus"));
        assert_eq!(sink.body, b"a");
    }

    #[tokio::test]
    async fn test_mutation_after_finish_is_rejected() {
        let mut sink = RecordingSink::default();
        sink.finish().await.unwrap();
        let result = dispatch_line(r#"{"command":"set_status","data":{"code":500}}"#, &mut sink).await;
        assert!(matches!(result, Err(ProtocolError::Sink(SinkError::Finished))));
    }
}
