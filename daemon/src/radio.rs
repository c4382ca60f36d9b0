//! Radio control endpoint client and the settings bridge that feeds it.
//!
//! # Protocol Overview
//!
//! The radio process exposes one XML-RPC method per parameter, named
//! `set_<parameter>`, taking a single value. The daemon never reads values
//! back. A typical call:
//!
//! ```text
//! POST / HTTP/1.1
//! Content-Type: text/xml
//!
//! <?xml version="1.0"?>
//! <methodCall><methodName>set_freq</methodName>
//! <params><param><value><double>1420005000</double></value></param></params>
//! </methodCall>
//! ```
//!
//! # Bridge
//!
//! Any thread may enqueue `(parameter, value)` pairs through a cloned
//! [`RadioSender`]. A single [`RadioBridge`] consumer turns them into calls in
//! arrival order, so two calls are never in flight at once. Failed calls are
//! logged and dropped.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::state::ErrorLog;

/// Per-call timeout for the XML-RPC transport.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause between consecutive calls so the radio process is not flooded.
pub const DEFAULT_CALL_SPACING: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum RadioError {
    /// The endpoint could not be reached.
    #[error("Radio endpoint {url} unreachable: {message}")]
    Unreachable { url: String, message: String },

    /// The endpoint answered with an XML-RPC fault.
    #[error("Radio rejected {method}: {message}")]
    Fault { method: String, message: String },

    #[error("Radio transport error: {0}")]
    Transport(String),
}

/// A parameter value the radio understands.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
    FloatArray(Vec<f64>),
}

impl From<f64> for RadioValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for RadioValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<usize> for RadioValue {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<bool> for RadioValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for RadioValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for RadioValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<f64>> for RadioValue {
    fn from(v: Vec<f64>) -> Self {
        Self::FloatArray(v)
    }
}

/// Something that can apply a radio parameter.
pub trait RadioControl: Send {
    /// Call `set_<name>(value)` on the radio.
    fn set(&mut self, name: &str, value: &RadioValue) -> Result<(), RadioError>;
}

// ==================== XML-RPC encoding ====================

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn encode_value(value: &RadioValue, out: &mut String) {
    out.push_str("<value>");
    match value {
        RadioValue::Float(v) => {
            let _ = write!(out, "<double>{v}</double>");
        }
        RadioValue::Int(v) => {
            let _ = write!(out, "<int>{v}</int>");
        }
        RadioValue::Bool(v) => {
            let _ = write!(out, "<boolean>{}</boolean>", u8::from(*v));
        }
        RadioValue::Text(v) => {
            let _ = write!(out, "<string>{}</string>", escape(v));
        }
        RadioValue::FloatArray(values) => {
            out.push_str("<array><data>");
            for v in values {
                encode_value(&RadioValue::Float(*v), out);
            }
            out.push_str("</data></array>");
        }
    }
    out.push_str("</value>");
}

/// XML-RPC request body for `method(value)`.
pub fn encode_call(method: &str, value: &RadioValue) -> String {
    let mut body = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    body.push_str(&escape(method));
    body.push_str("</methodName><params><param>");
    encode_value(value, &mut body);
    body.push_str("</param></params></methodCall>\n");
    body
}

fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let end = text[start..].find(close)? + start;
    Some(&text[start..end])
}

/// The fault string of a fault response, or None for a normal response.
pub fn parse_fault(response: &str) -> Option<String> {
    let fault = between(response, "<fault>", "</fault>")?;
    let message = fault
        .find("faultString")
        .and_then(|at| between(&fault[at..], "<string>", "</string>"))
        .unwrap_or("unknown fault");
    Some(message.to_string())
}

// ==================== HTTP transport ====================

/// XML-RPC client for the radio process.
pub struct XmlRpcRadio {
    url: String,
    agent: ureq::Agent,
}

impl XmlRpcRadio {
    pub fn new(url: impl Into<String>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(RPC_TIMEOUT))
            .build()
            .into();
        Self {
            url: url.into(),
            agent,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RadioControl for XmlRpcRadio {
    fn set(&mut self, name: &str, value: &RadioValue) -> Result<(), RadioError> {
        let method = format!("set_{name}");
        let body = encode_call(&method, value);
        let mut response = self
            .agent
            .post(&self.url)
            .header("Content-Type", "text/xml")
            .send(body.as_str())
            .map_err(|e| match e {
                ureq::Error::StatusCode(code) => RadioError::Transport(format!("HTTP status {code}")),
                other => RadioError::Unreachable {
                    url: self.url.clone(),
                    message: other.to_string(),
                },
            })?;
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| RadioError::Transport(e.to_string()))?;
        match parse_fault(&text) {
            Some(message) => Err(RadioError::Fault { method, message }),
            None => Ok(()),
        }
    }
}

// ==================== Settings bridge ====================

/// One queued parameter change.
pub type RadioUpdate = (String, RadioValue);

/// Producer handle for the settings bridge.
#[derive(Debug, Clone)]
pub struct RadioSender {
    tx: Sender<RadioUpdate>,
}

impl RadioSender {
    pub fn push(&self, name: &str, value: impl Into<RadioValue>) {
        // a closed bridge means the daemon is shutting down
        let _ = self.tx.send((name.to_string(), value.into()));
    }
}

/// Create a connected sender/receiver pair.
pub fn radio_channel() -> (RadioSender, Receiver<RadioUpdate>) {
    let (tx, rx) = unbounded();
    (RadioSender { tx }, rx)
}

/// Single consumer that forwards queued updates to the radio.
pub struct RadioBridge {
    rx: Receiver<RadioUpdate>,
    radio: Box<dyn RadioControl>,
    spacing: Duration,
    reachable: bool,
}

impl RadioBridge {
    pub fn new(rx: Receiver<RadioUpdate>, radio: Box<dyn RadioControl>) -> Self {
        Self {
            rx,
            radio,
            spacing: DEFAULT_CALL_SPACING,
            reachable: true,
        }
    }

    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = spacing;
        self
    }

    fn forward(&mut self, (name, value): RadioUpdate, errors: &ErrorLog) {
        debug!("Setting {} = {:?}", name, value);
        match self.radio.set(&name, &value) {
            Ok(()) => {
                if !self.reachable {
                    info!("Radio endpoint reachable again");
                }
                self.reachable = true;
            }
            Err(err @ RadioError::Unreachable { .. }) => {
                // one entry per outage, not one per dropped update
                if self.reachable {
                    errors.push(err.to_string());
                } else {
                    debug!("Dropped {} while radio unreachable", name);
                }
                self.reachable = false;
            }
            Err(err) => errors.push(err.to_string()),
        }
    }

    /// Forward updates until `running` is cleared, then drain what is left.
    pub fn run(mut self, running: &AtomicBool, errors: &ErrorLog) {
        const POLL: Duration = Duration::from_millis(100);
        while running.load(Ordering::SeqCst) {
            match self.rx.recv_timeout(POLL) {
                Ok(update) => {
                    self.forward(update, errors);
                    std::thread::sleep(self.spacing);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        let remaining: Vec<RadioUpdate> = self.rx.try_iter().collect();
        if !remaining.is_empty() {
            warn!("Flushing {} radio updates before exit", remaining.len());
        }
        for update in remaining {
            self.forward(update, errors);
        }
    }
}
