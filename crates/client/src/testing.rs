//! Scripted transport for tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use hearth_core::{Error, Request, Response};

use crate::fetch::Transport;

#[derive(Clone)]
enum Reply {
    Respond(Response),
    Fail,
}

#[derive(Clone)]
struct Script {
    reply: Reply,
    delay: Option<Duration>,
}

/// Answers from a per-URL script and counts calls. Unscripted URLs fail
/// like an unreachable host.
#[derive(Default)]
pub struct FakeTransport {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, usize>>,
    offline: AtomicBool,
}

fn normalize(url: &str) -> String {
    url::Url::parse(url).expect("test url").to_string()
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self, url: &str, reply: Reply, delay: Option<Duration>) -> &Self {
        self.scripts.lock().unwrap().insert(normalize(url), Script { reply, delay });
        self
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) -> &Self {
        self.script(url, Reply::Respond(Response::new(status, body)), None)
    }

    pub fn respond_slowly(&self, url: &str, status: u16, body: &str, delay: Duration) -> &Self {
        self.script(url, Reply::Respond(Response::new(status, body)), Some(delay))
    }

    pub fn fail(&self, url: &str) -> &Self {
        self.script(url, Reply::Fail, None)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(&normalize(url)).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.to_string();
        *self.calls.lock().unwrap().entry(url.clone()).or_default() += 1;

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::NetworkFailed(format!("{url}: offline")));
        }

        let script = self.scripts.lock().unwrap().get(&url).cloned();
        let Some(script) = script else {
            return Err(Error::NetworkFailed(format!("{url}: connection refused")));
        };

        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }

        match script.reply {
            Reply::Respond(response) => Ok(response),
            Reply::Fail => Err(Error::NetworkFailed(format!("{url}: connection reset"))),
        }
    }
}
