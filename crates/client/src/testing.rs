//! Scripted network for strategy and lifecycle tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use http::StatusCode;
use tokio::sync::Notify;

use shelter_core::{Error, Request, Response};

use crate::fetch::Network;

#[derive(Clone)]
enum Outcome {
    Respond(StatusCode, String),
    Fail,
}

/// Answers by exact URL. Unscripted URLs fail like a dropped connection.
#[derive(Default)]
pub(crate) struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Outcome>>,
    calls: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, url: &str, status: StatusCode, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Outcome::Respond(status, body.to_string()));
    }

    pub(crate) fn ok(&self, url: &str, body: &str) {
        self.respond(url, StatusCode::OK, body);
    }

    pub(crate) fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Outcome::Fail);
    }

    /// Every fetch waits for a permit on the returned gate.
    pub(crate) fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let outcome = self.routes.lock().unwrap().get(&url).cloned();
        match outcome {
            Some(Outcome::Respond(status, body)) => Ok(Response::new(status, body)),
            Some(Outcome::Fail) | None => Err(Error::Network(format!("{url}: connection refused"))),
        }
    }
}
