//! Two-tier provider fallback
//!
//! Tries the primary provider first and the secondary provider second. The
//! orchestrator itself is stateless; it reports whether the primary failure was
//! rate-limit shaped so the caller can extend cache lifetimes.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::data::FetchResult;
use crate::providers::{MediaProvider, ProviderError};

/// Which provider produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Primary,
    Secondary,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Primary => f.write_str("primary"),
            Source::Secondary => f.write_str("secondary"),
        }
    }
}

/// Successful fallback run
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub result: FetchResult,
    pub source: Source,
    /// The primary failed with a rate-limit shaped error before the secondary answered
    pub primary_rate_limited: bool,
}

/// Both sources failed (or the run was cancelled before the secondary)
#[derive(Debug, Clone, Error)]
#[error("primary: {primary}; secondary: {}", secondary_message(.secondary))]
pub struct FallbackError {
    pub primary: ProviderError,
    /// `None` when the run was cancelled before the secondary was tried
    pub secondary: Option<ProviderError>,
    pub primary_rate_limited: bool,
}

fn secondary_message(secondary: &Option<ProviderError>) -> String {
    match secondary {
        Some(err) => err.to_string(),
        None => "cancelled before secondary provider".to_string(),
    }
}

/// Shared cancellation flag checked between providers
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Orchestrator states
#[derive(Debug)]
enum State {
    TryPrimary,
    TrySecondary { primary: ProviderError },
    Exhausted {
        primary: ProviderError,
        secondary: Option<ProviderError>,
    },
}

/// Tries the primary provider, then the secondary
#[derive(Clone)]
pub struct FallbackOrchestrator {
    primary: Arc<dyn MediaProvider>,
    secondary: Arc<dyn MediaProvider>,
}

impl FallbackOrchestrator {
    pub fn new(primary: Arc<dyn MediaProvider>, secondary: Arc<dyn MediaProvider>) -> Self {
        Self { primary, secondary }
    }

    /// Runs the fallback sequence to completion
    pub async fn fetch(
        &self,
        username: &str,
        max_results: u32,
    ) -> Result<FetchOutcome, FallbackError> {
        self.fetch_with_cancel(username, max_results, &CancelFlag::new())
            .await
    }

    /// Runs the fallback sequence, giving up between providers once `cancel` is set
    ///
    /// A provider call already in flight (including its retry sleeps) is never
    /// abandoned.
    pub async fn fetch_with_cancel(
        &self,
        username: &str,
        max_results: u32,
        cancel: &CancelFlag,
    ) -> Result<FetchOutcome, FallbackError> {
        let mut primary_rate_limited = false;
        let mut state = State::TryPrimary;

        loop {
            debug!(username, ?state, "fallback step");
            state = match state {
                State::TryPrimary => match self.primary.fetch(username, max_results).await {
                    Ok(result) => {
                        return Ok(FetchOutcome {
                            result,
                            source: Source::Primary,
                            primary_rate_limited: false,
                        });
                    }
                    Err(err) => {
                        primary_rate_limited = err.is_rate_limit();
                        warn!(
                            username,
                            provider = self.primary.name(),
                            rate_limited = primary_rate_limited,
                            error = %err,
                            "primary provider failed, falling back"
                        );
                        State::TrySecondary { primary: err }
                    }
                },
                State::TrySecondary { primary } => {
                    if cancel.is_cancelled() {
                        info!(username, "fetch cancelled before secondary provider");
                        State::Exhausted {
                            primary,
                            secondary: None,
                        }
                    } else {
                        match self.secondary.fetch(username, max_results).await {
                            Ok(result) => {
                                return Ok(FetchOutcome {
                                    result,
                                    source: Source::Secondary,
                                    primary_rate_limited,
                                });
                            }
                            Err(err) => {
                                warn!(
                                    username,
                                    provider = self.secondary.name(),
                                    error = %err,
                                    "secondary provider failed"
                                );
                                State::Exhausted {
                                    primary,
                                    secondary: Some(err),
                                }
                            }
                        }
                    }
                }
                State::Exhausted { primary, secondary } => {
                    return Err(FallbackError {
                        primary,
                        secondary,
                        primary_rate_limited,
                    });
                }
            };
        }
    }
}
