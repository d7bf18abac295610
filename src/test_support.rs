//! Shared fakes for unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::data::{FetchResult, MediaItem, MediaKind, MediaPost};
use crate::http::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::providers::{MediaProvider, ProviderError};

/// Transport that answers by URL substring and records every request
#[derive(Default)]
pub struct RouteTransport {
    routes: Mutex<Vec<(String, VecDeque<Result<HttpResponse, TransportError>>)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RouteTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a response for requests whose URL contains `pattern`
    ///
    /// The last queued response for a route is repeated once the queue drains.
    pub fn respond(&self, pattern: &str, status: u16, body: impl Into<String>) {
        self.push(pattern, Ok(HttpResponse::new(status, body)));
    }

    pub fn fail(&self, pattern: &str, message: &str) {
        self.push(pattern, Err(TransportError(message.to_string())));
    }

    fn push(&self, pattern: &str, outcome: Result<HttpResponse, TransportError>) {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|(p, _)| p == pattern) {
            Some((_, queue)) => queue.push_back(outcome),
            None => routes.push((pattern.to_string(), VecDeque::from([outcome]))),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for RouteTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut routes = self.routes.lock().unwrap();
        let Some((_, queue)) = routes.iter_mut().find(|(p, _)| request.url.contains(p.as_str()))
        else {
            return Err(TransportError(format!("no route for {}", request.url)));
        };

        if queue.len() > 1 {
            queue.pop_front().unwrap_or_else(|| Err(TransportError("empty route".to_string())))
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(TransportError("empty route".to_string())))
        }
    }
}

/// Provider that replays scripted outcomes and counts calls
///
/// The last outcome repeats once the script drains. An optional delay is slept
/// before answering so tests can overlap requests.
pub struct ScriptedProvider {
    name: &'static str,
    outcomes: Mutex<VecDeque<Result<FetchResult, ProviderError>>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedProvider {
    pub fn new(
        name: &'static str,
        outcomes: impl IntoIterator<Item = Result<FetchResult, ProviderError>>,
    ) -> Arc<Self> {
        Self::delayed(name, outcomes, Duration::ZERO)
    }

    pub fn delayed(
        name: &'static str,
        outcomes: impl IntoIterator<Item = Result<FetchResult, ProviderError>>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            calls: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(
        &self,
        _username: &str,
        _max_results: u32,
    ) -> Result<FetchResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.len() > 1 {
            outcomes.pop_front().unwrap()
        } else {
            outcomes
                .front()
                .cloned()
                .unwrap_or_else(|| Err(ProviderError::TransportError("no script".to_string())))
        }
    }
}

/// A one-post result with a single photo
pub fn sample_result(post_id: &str, author: &str) -> FetchResult {
    let media = MediaItem::new(
        format!("photo_{}", post_id),
        MediaKind::Photo,
        Some(format!("https://pbs.example/{}.jpg", post_id)),
        None,
        None,
    )
    .unwrap();
    FetchResult::new(vec![MediaPost::new(post_id, "caption", None, author, vec![media]).unwrap()])
}
