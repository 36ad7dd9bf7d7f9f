#![forbid(unsafe_code)]

//! Stdio bridge to the automation helper that owns the actual UI work
//! (locating elements, clicking, waiting for renders). The helper is a
//! long-lived child process speaking newline-delimited JSON:
//!
//!   -> {"cmd":"summary"}
//!   <- {"ok":true,"title":"Grilled Pizza","modified":"6/1/2024","legacyCreated":"3/29/2007 9:10:16 PM"}
//!   -> {"cmd":"detail"}
//!   <- {"ok":true,"folder":"Recipes","parentPath":"Cooking","modified":"6/1/2024","created":"3/29/2007, 9:10:16 PM"}
//!   -> {"cmd":"tags"}
//!   <- {"ok":true,"tags":["dinner","grill"]}
//!   -> {"cmd":"advance"}
//!   <- {"ok":true}
//!
//! A failed read is `{"ok":false,"error":"..."}`. The helper performs
//! its own settle-and-wait; this side only bounds how long it is
//! willing to wait for the reply line.

use crate::surface::{ItemSurface, SurfaceError};
use np_core::model::{ItemDetail, ItemSummary};
use serde::Deserialize;
use serde_json::Value;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

pub(crate) struct BridgeSurface {
    child: Child,
    stdin: ChildStdin,
    lines: mpsc::Receiver<std::io::Result<String>>,
    settle: Duration,
}

impl BridgeSurface {
    pub(crate) fn spawn(command: &str, settle_ms: u64) -> Result<Self, SurfaceError> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| SurfaceError::Spawn("empty surface command".to_string()))?;

        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|err| SurfaceError::Spawn(format!("{program}: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SurfaceError::Spawn("helper stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SurfaceError::Spawn("helper stdout unavailable".to_string()))?;

        // Reading through a channel is what makes the settle deadline
        // enforceable; a reply that never arrives becomes a Timeout
        // instead of a blocked read_line.
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            child,
            stdin,
            lines: rx,
            settle: Duration::from_millis(settle_ms),
        })
    }

    fn request(&mut self, cmd: &str) -> Result<Value, SurfaceError> {
        let req = serde_json::json!({ "cmd": cmd });
        writeln!(self.stdin, "{req}")?;
        self.stdin.flush()?;

        loop {
            match self.lines.recv_timeout(self.settle) {
                Ok(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    return decode_reply(cmd, &line);
                }
                Ok(Err(err)) => return Err(SurfaceError::Io(err)),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    return Err(SurfaceError::Timeout { waited_ms: self.settle.as_millis() as u64 });
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => return Err(SurfaceError::Closed),
            }
        }
    }
}

impl ItemSurface for BridgeSurface {
    fn summary(&mut self) -> Result<ItemSummary, SurfaceError> {
        let payload: SummaryPayload = decode_payload("summary", self.request("summary")?)?;
        Ok(ItemSummary {
            title: payload.title,
            modified: payload.modified,
            legacy_created: payload.legacy_created,
        })
    }

    fn detail(&mut self) -> Result<ItemDetail, SurfaceError> {
        let payload: DetailPayload = decode_payload("detail", self.request("detail")?)?;
        Ok(ItemDetail {
            folder: payload.folder,
            parent_path: payload.parent_path,
            modified: payload.modified,
            created: payload.created,
        })
    }

    fn tags(&mut self) -> Result<Vec<String>, SurfaceError> {
        let payload: TagsPayload = decode_payload("tags", self.request("tags")?)?;
        Ok(payload.tags)
    }

    fn advance(&mut self) -> Result<(), SurfaceError> {
        self.request("advance").map(|_| ())
    }
}

impl Drop for BridgeSurface {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SummaryPayload {
    pub title: String,
    pub modified: String,
    #[serde(default)]
    pub legacy_created: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DetailPayload {
    pub folder: String,
    pub parent_path: String,
    pub modified: String,
    pub created: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagsPayload {
    #[serde(default)]
    pub tags: Vec<String>,
}

pub(crate) fn decode_reply(cmd: &str, line: &str) -> Result<Value, SurfaceError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|err| SurfaceError::Protocol(format!("{cmd}: bad reply json: {err}")))?;
    if !value.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("helper reported failure");
        return Err(SurfaceError::Read(format!("{cmd}: {message}")));
    }
    Ok(value)
}

pub(crate) fn decode_payload<T: serde::de::DeserializeOwned>(
    cmd: &str,
    value: Value,
) -> Result<T, SurfaceError> {
    serde_json::from_value(value)
        .map_err(|err| SurfaceError::Protocol(format!("{cmd}: bad reply shape: {err}")))
}
