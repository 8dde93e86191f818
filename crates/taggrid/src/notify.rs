//! Change notifications: payload templating and fan-out to sinks.

use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use serde_json::Value;
use taggrid_tags::DecodedGrid;

use crate::config::NotifyConfig;
use crate::{Mailbox, WorkerHandle};

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("POST to {url} failed: {message}")]
    Http { url: String, message: String },
    #[error("sink {0} is no longer running")]
    Closed(String),
    #[error("JSON pointer {pointer:?} does not resolve inside the template")]
    Pointer { pointer: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Destination for notification payloads.
pub trait NotificationSink: Send {
    fn name(&self) -> &str;
    fn post(&mut self, payload: &str) -> Result<(), NotifyError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsoleTarget {
    Stdout,
    Stderr,
}

/// Writes each payload as one line.
#[derive(Debug)]
pub struct ConsoleSink {
    target: ConsoleTarget,
}

impl ConsoleSink {
    pub fn new(target: ConsoleTarget) -> Self {
        Self { target }
    }
}

impl NotificationSink for ConsoleSink {
    fn name(&self) -> &str {
        match self.target {
            ConsoleTarget::Stdout => "stdout",
            ConsoleTarget::Stderr => "stderr",
        }
    }

    fn post(&mut self, payload: &str) -> Result<(), NotifyError> {
        match self.target {
            ConsoleTarget::Stdout => {
                let mut out = io::stdout().lock();
                writeln!(out, "{payload}")?;
                out.flush()?;
            }
            ConsoleTarget::Stderr => writeln!(io::stderr().lock(), "{payload}")?,
        }
        Ok(())
    }
}

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// POSTs JSON payloads from its own thread.
///
/// `post` only hands the payload over; a slow or unreachable endpoint never
/// blocks the caller. If payloads arrive faster than they can be delivered,
/// only the newest one is sent.
#[derive(Debug)]
pub struct HttpSink {
    url: String,
    outbox: Arc<Mailbox<Arc<str>>>,
    worker: WorkerHandle,
}

impl HttpSink {
    pub fn spawn(url: impl Into<String>) -> io::Result<Self> {
        let url = url.into();
        let outbox: Arc<Mailbox<Arc<str>>> = Arc::new(Mailbox::new());
        let thread_outbox = Arc::clone(&outbox);
        let thread_url = url.clone();
        let worker = WorkerHandle::spawn("notify-http", move |_| {
            let agent = ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build();
            while let Some(payload) = thread_outbox.wait_fresh() {
                match post_json(&agent, &thread_url, &payload) {
                    Ok(()) => debug!("posted {} bytes to {thread_url}", payload.len()),
                    Err(err) => warn!("{err}"),
                }
            }
        })?;
        Ok(Self {
            url,
            outbox,
            worker,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for HttpSink {
    fn drop(&mut self) {
        self.outbox.close();
    }
}

fn post_json(agent: &ureq::Agent, url: &str, payload: &str) -> Result<(), NotifyError> {
    agent
        .post(url)
        .set("Content-Type", "application/json")
        .send_string(payload)
        .map(|_| ())
        .map_err(|err| NotifyError::Http {
            url: url.to_owned(),
            message: err.to_string(),
        })
}

impl NotificationSink for HttpSink {
    fn name(&self) -> &str {
        &self.url
    }

    fn post(&mut self, payload: &str) -> Result<(), NotifyError> {
        if self.worker.is_finished() {
            return Err(NotifyError::Closed(self.url.clone()));
        }
        self.outbox.set(Arc::from(payload));
        Ok(())
    }
}

/// Sends every payload to all sinks and optionally repeats the last one.
///
/// A failing sink is logged and skipped; the remaining sinks still receive
/// the payload.
pub struct NotificationManager {
    sinks: Vec<Box<dyn NotificationSink>>,
    repeat: Option<Duration>,
    last: Option<(String, Instant)>,
}

impl NotificationManager {
    pub fn new(sinks: Vec<Box<dyn NotificationSink>>, repeat: Option<Duration>) -> Self {
        Self {
            sinks,
            repeat,
            last: None,
        }
    }

    /// Sinks and repeat interval as configured.
    pub fn from_config(config: &NotifyConfig) -> io::Result<Self> {
        let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();
        if config.stdout {
            sinks.push(Box::new(ConsoleSink::new(ConsoleTarget::Stdout)));
        }
        if config.stderr {
            sinks.push(Box::new(ConsoleSink::new(ConsoleTarget::Stderr)));
        }
        if config.remote {
            if let Some(url) = config.url.as_deref() {
                sinks.push(Box::new(HttpSink::spawn(url)?));
            }
        }
        let repeat = config
            .repeat
            .then(|| Duration::from_secs_f64(config.interval.max(0.0)));
        Ok(Self::new(sinks, repeat))
    }

    /// Post `payload` to every sink. Returns the number of sinks that accepted it.
    pub fn notify(&mut self, payload: String) -> usize {
        self.notify_at(payload, Instant::now())
    }

    pub fn notify_at(&mut self, payload: String, now: Instant) -> usize {
        let delivered = self.broadcast(&payload);
        self.last = Some((payload, now));
        delivered
    }

    /// Re-post the last payload if the repeat interval has elapsed.
    pub fn tick(&mut self) -> bool {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> bool {
        let Some(interval) = self.repeat else {
            return false;
        };
        let Some((payload, sent)) = &self.last else {
            return false;
        };
        if now.saturating_duration_since(*sent) < interval {
            return false;
        }
        let payload = payload.clone();
        self.broadcast(&payload);
        self.last = Some((payload, now));
        true
    }

    fn broadcast(&mut self, payload: &str) -> usize {
        let mut delivered = 0;
        for sink in &mut self.sinks {
            match sink.post(payload) {
                Ok(()) => delivered += 1,
                Err(err) => warn!("notification sink {} failed: {err}", sink.name()),
            }
        }
        delivered
    }
}

/// JSON document with a slot the decoded grid is written into.
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationTemplate {
    template: Value,
    assign_to: String,
}

impl NotificationTemplate {
    pub fn new(template: Value, assign_to: impl Into<String>) -> Self {
        Self {
            template,
            assign_to: assign_to.into(),
        }
    }

    pub fn from_config(config: &NotifyConfig) -> Self {
        Self::new(config.template.clone(), config.assign_to.clone())
    }

    /// Serialized payload for `grid`, unmatched cells written as `-1`.
    pub fn render(&self, grid: &DecodedGrid) -> Result<String, NotifyError> {
        let mut doc = self.template.clone();
        set_pointer(&mut doc, &self.assign_to, serde_json::to_value(grid)?)?;
        Ok(serde_json::to_string(&doc)?)
    }
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Write `value` at the JSON pointer `pointer` (RFC 6901).
///
/// The parent must exist. The last token replaces or adds an object member;
/// for arrays it replaces an existing index or appends with `-`.
pub fn set_pointer(doc: &mut Value, pointer: &str, value: Value) -> Result<(), NotifyError> {
    if pointer.is_empty() {
        *doc = value;
        return Ok(());
    }
    let err = || NotifyError::Pointer {
        pointer: pointer.to_owned(),
    };
    let (parent_ptr, last) = pointer.rsplit_once('/').ok_or_else(err)?;
    let parent = doc.pointer_mut(parent_ptr).ok_or_else(err)?;
    let key = unescape_token(last);
    match parent {
        Value::Object(map) => {
            map.insert(key, value);
        }
        Value::Array(items) if key == "-" => items.push(value),
        Value::Array(items) => {
            let slot = key
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get_mut(i))
                .ok_or_else(err)?;
            *slot = value;
        }
        _ => return Err(err()),
    }
    Ok(())
}
