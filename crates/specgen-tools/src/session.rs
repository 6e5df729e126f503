use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;

use crate::{ToolCallError, ToolNamespace, ToolUnavailableError};

/// Fixed establishment attempt budget per namespace.
pub const ESTABLISH_ATTEMPTS: usize = 3;
/// Base inter-attempt delay; doubles per attempt (2s, 4s).
pub const ESTABLISH_BASE_BACKOFF_MS: u64 = 2_000;

pub fn establish_backoff_ms(attempt: usize) -> u64 {
    let shift = attempt.min(6);
    ESTABLISH_BASE_BACKOFF_MS.saturating_mul(1_u64 << shift)
}

#[async_trait]
/// A live session to one remote namespace. Validity is bounded by the
/// execution context active when the handle was established.
pub trait ToolHandle: Send + Sync + std::fmt::Debug {
    async fn call(&self, capability: &str, arguments: Value) -> Result<Value, ToolCallError>;
}

#[async_trait]
/// Trait contract for establishing namespace handles.
pub trait HandleFactory: Send + Sync {
    async fn establish(
        &self,
        namespace: ToolNamespace,
    ) -> Result<Arc<dyn ToolHandle>, ToolCallError>;
}

/// One handle per namespace. Replaced wholesale, never patched per field.
#[derive(Debug)]
pub struct HandleSet {
    pub issue_tracker: Arc<dyn ToolHandle>,
    pub code_host: Arc<dyn ToolHandle>,
}

impl HandleSet {
    pub fn handle(&self, namespace: ToolNamespace) -> Arc<dyn ToolHandle> {
        match namespace {
            ToolNamespace::IssueTracker => self.issue_tracker.clone(),
            ToolNamespace::CodeHost => self.code_host.clone(),
        }
    }
}

/// Owns the lifecycle of the namespace handle set.
///
/// The set lives in an `ArcSwapOption`, so replacement is one atomic swap: a
/// run that has already loaded the set keeps using the handles it resolved,
/// and never observes a half-replaced pair. Refresh runs before every
/// pipeline invocation; a refresh failure falls back to the previous set when
/// one exists and is fatal only on first establishment.
pub struct ToolSessionManager {
    factory: Arc<dyn HandleFactory>,
    handles: ArcSwapOption<HandleSet>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl ToolSessionManager {
    pub fn new(factory: Arc<dyn HandleFactory>) -> Self {
        Self {
            factory,
            handles: ArcSwapOption::from(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the current handle set without touching the factory.
    pub fn current(&self) -> Option<Arc<HandleSet>> {
        self.handles.load_full()
    }

    /// Lazily establishes the set on first need.
    pub async fn acquire(&self) -> Result<Arc<HandleSet>, ToolUnavailableError> {
        if let Some(set) = self.current() {
            return Ok(set);
        }
        self.refresh().await
    }

    /// Discards the current set and recreates both handles.
    ///
    /// Called unconditionally before every run: a handle's backing context
    /// may have ended since the previous run, and reuse after that point
    /// fails silently rather than raising. If recreation fails and a
    /// previous set exists, that set is kept for this run with a warning.
    pub async fn refresh(&self) -> Result<Arc<HandleSet>, ToolUnavailableError> {
        let _guard = self.refresh_lock.lock().await;
        match self.establish_set().await {
            Ok(set) => {
                let set = Arc::new(set);
                self.handles.store(Some(set.clone()));
                Ok(set)
            }
            Err(error) => match self.handles.load_full() {
                Some(stale) => {
                    tracing::warn!(
                        error = %error,
                        "handle refresh failed; reusing previous session set"
                    );
                    Ok(stale)
                }
                None => Err(error),
            },
        }
    }

    async fn establish_set(&self) -> Result<HandleSet, ToolUnavailableError> {
        let issue_tracker = self
            .establish_with_retry(ToolNamespace::IssueTracker)
            .await?;
        let code_host = self.establish_with_retry(ToolNamespace::CodeHost).await?;
        Ok(HandleSet {
            issue_tracker,
            code_host,
        })
    }

    async fn establish_with_retry(
        &self,
        namespace: ToolNamespace,
    ) -> Result<Arc<dyn ToolHandle>, ToolUnavailableError> {
        let mut last_error: Option<ToolCallError> = None;
        for attempt in 0..ESTABLISH_ATTEMPTS {
            match self.factory.establish(namespace).await {
                Ok(handle) => {
                    tracing::debug!(
                        namespace = namespace.as_str(),
                        attempt = attempt + 1,
                        "namespace handle established"
                    );
                    return Ok(handle);
                }
                Err(error) => {
                    tracing::warn!(
                        namespace = namespace.as_str(),
                        attempt = attempt + 1,
                        error = %error,
                        "handle establishment attempt failed"
                    );
                    last_error = Some(error);
                    if attempt + 1 < ESTABLISH_ATTEMPTS {
                        sleep(Duration::from_millis(establish_backoff_ms(attempt))).await;
                    }
                }
            }
        }

        Err(ToolUnavailableError {
            namespace: namespace.as_str(),
            attempts: ESTABLISH_ATTEMPTS,
            detail: last_error
                .map(|error| error.to_string())
                .unwrap_or_else(|| "no attempt recorded".to_string()),
        })
    }
}
