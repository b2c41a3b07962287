//! Middleware around handler invocation
//!
//! Middleware runs after an operation has been selected and its arguments
//! bound, immediately around the handler call. Common uses:
//! - Logging and tracing
//! - Access checks against the target identity
//! - Metrics collection
//!
//! # Middleware Chain
//!
//! `pre_handle` runs in registration order and may short-circuit with an
//! outcome of its own. `post_handle` runs in reverse order for every
//! middleware whose `pre_handle` ran, and sees the final result.
//!
//! # Built-in Middleware
//!
//! - **LoggingMiddleware**: one `tracing` event per request and response
//! - **MetricsMiddleware**: request and error counts plus last duration
//! - **TracingMiddleware**: debug/info events carrying operation fields
//!
//! # Examples
//!
//! ```rust
//! use restbind_server::{LoggingMiddleware, MiddlewareChain};
//!
//! let mut chain = MiddlewareChain::new();
//! chain.add_sync(LoggingMiddleware);
//! assert_eq!(chain.len(), 1);
//! ```

use crate::response::HandlerOutcome;
use async_trait::async_trait;
use restbind_core::{ResourceIdentity, Result, Verb};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Result a handler, or a short-circuiting middleware, produces
pub type OperationResult = Result<Option<HandlerOutcome>>;

/// Action to take after middleware pre-processing
#[derive(Debug, Clone)]
pub enum MiddlewareAction {
    /// Continue to next middleware/handler
    Continue,
    /// Skip the handler and the remaining middleware with this outcome
    ShortCircuit(Option<HandlerOutcome>),
}

/// Request information visible to middleware
#[derive(Debug, Clone)]
pub struct MiddlewareContext {
    /// Name of the selected operation
    pub operation: String,
    pub verb: Verb,
    /// Request path, e.g. `/Patient/123`
    pub path: String,
    /// Bound target identity
    pub identity: Option<ResourceIdentity>,
    /// Free-form data shared between middleware
    pub metadata: HashMap<String, Value>,
}

impl MiddlewareContext {
    pub fn new(operation: impl Into<String>, verb: Verb, path: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            verb,
            path: path.into(),
            identity: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_identity(mut self, identity: ResourceIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}

/// Async middleware
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction>;

    async fn post_handle(&self, ctx: &mut MiddlewareContext, result: &OperationResult) -> Result<()>;
}

/// Middleware without async work
pub trait SyncMiddleware: Send + Sync {
    fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction>;

    fn post_handle(&self, ctx: &mut MiddlewareContext, result: &OperationResult) -> Result<()>;
}

struct SyncMiddlewareAdapter<T: SyncMiddleware> {
    inner: T,
}

#[async_trait]
impl<T: SyncMiddleware + 'static> Middleware for SyncMiddlewareAdapter<T> {
    async fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
        self.inner.pre_handle(ctx)
    }

    async fn post_handle(&self, ctx: &mut MiddlewareContext, result: &OperationResult) -> Result<()> {
        self.inner.post_handle(ctx, result)
    }
}

/// Ordered middleware list
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn add_sync<T: SyncMiddleware + 'static>(&mut self, middleware: T) {
        self.middlewares.push(Arc::new(SyncMiddlewareAdapter { inner: middleware }));
    }

    /// Run the chain around `handler`
    ///
    /// An error from `pre_handle` aborts the request with that error.
    /// Errors from `post_handle` are logged and otherwise ignored.
    pub async fn execute<F, Fut>(&self, mut ctx: MiddlewareContext, handler: F) -> OperationResult
    where
        F: FnOnce(MiddlewareContext) -> Fut + Send,
        Fut: std::future::Future<Output = OperationResult> + Send,
    {
        let mut ran = 0;
        let mut short_circuit = None;

        for middleware in &self.middlewares {
            let action = middleware.pre_handle(&mut ctx).await;
            ran += 1;
            match action {
                Ok(MiddlewareAction::Continue) => continue,
                Ok(MiddlewareAction::ShortCircuit(outcome)) => {
                    short_circuit = Some(Ok(outcome));
                    break;
                }
                Err(e) => {
                    short_circuit = Some(Err(e));
                    break;
                }
            }
        }

        let result = match short_circuit {
            Some(result) => result,
            None => handler(ctx.clone()).await,
        };

        for middleware in self.middlewares[..ran].iter().rev() {
            if let Err(e) = middleware.post_handle(&mut ctx, &result).await {
                tracing::warn!(operation = %ctx.operation, error = %e, "post_handle failed");
            }
        }

        result
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

/// Logs each request and its result through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl SyncMiddleware for LoggingMiddleware {
    fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
        tracing::info!(
            operation = %ctx.operation,
            verb = %ctx.verb,
            path = %ctx.path,
            "request"
        );
        Ok(MiddlewareAction::Continue)
    }

    fn post_handle(&self, ctx: &mut MiddlewareContext, result: &OperationResult) -> Result<()> {
        match result {
            Ok(outcome) => tracing::info!(
                operation = %ctx.operation,
                path = %ctx.path,
                empty = outcome.is_none(),
                "response"
            ),
            Err(e) => tracing::warn!(
                operation = %ctx.operation,
                path = %ctx.path,
                category = %e.category(),
                error = %e,
                "response failed"
            ),
        }
        Ok(())
    }
}

const STARTED_AT: &str = "metrics.started_at";

/// Counts requests and errors and keeps the last observed duration
///
/// A lightweight in-process counterpart to [`ServerMetrics`](crate::ServerMetrics)
/// for tests and health endpoints.
#[derive(Debug, Default)]
pub struct MetricsMiddleware {
    origin: Origin,
    request_count: AtomicU64,
    error_count: AtomicU64,
    last_duration_micros: AtomicU64,
}

impl MetricsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn last_duration_micros(&self) -> u64 {
        self.last_duration_micros.load(Ordering::Relaxed)
    }

    fn elapsed_micros(&self) -> u64 {
        u64::try_from(self.origin.0.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

#[derive(Debug)]
struct Origin(Instant);

impl Default for Origin {
    fn default() -> Self {
        Self(Instant::now())
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    async fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        ctx.insert_metadata(STARTED_AT, Value::from(self.elapsed_micros()));
        Ok(MiddlewareAction::Continue)
    }

    async fn post_handle(&self, ctx: &mut MiddlewareContext, result: &OperationResult) -> Result<()> {
        if result.is_err() {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(started) = ctx.get_metadata(STARTED_AT).and_then(Value::as_u64) {
            let duration = self.elapsed_micros().saturating_sub(started);
            self.last_duration_micros.store(duration, Ordering::Relaxed);
            tracing::debug!(operation = %ctx.operation, duration_us = duration, "operation timed");
        }
        Ok(())
    }
}

/// Emits span-scoped events with the operation's fields
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMiddleware;

impl TracingMiddleware {
    fn span(ctx: &MiddlewareContext) -> tracing::Span {
        let identity = ctx.identity.as_ref().map(ToString::to_string).unwrap_or_default();
        tracing::info_span!(
            "restbind_operation",
            operation = %ctx.operation,
            verb = %ctx.verb,
            path = %ctx.path,
            identity = %identity,
        )
    }
}

#[async_trait]
impl Middleware for TracingMiddleware {
    async fn pre_handle(&self, ctx: &mut MiddlewareContext) -> Result<MiddlewareAction> {
        let span = Self::span(ctx);
        let _enter = span.enter();
        tracing::debug!("operation started");
        Ok(MiddlewareAction::Continue)
    }

    async fn post_handle(&self, ctx: &mut MiddlewareContext, result: &OperationResult) -> Result<()> {
        let span = Self::span(ctx);
        let _enter = span.enter();
        match result {
            Ok(_) => tracing::info!("operation completed"),
            Err(e) => tracing::error!(error = %e, category = %e.category(), "operation failed"),
        }
        Ok(())
    }
}
