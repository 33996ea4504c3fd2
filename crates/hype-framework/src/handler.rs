//! Handler capability types.
//!
//! Command handlers and scheduled jobs are plain async functions (or
//! closures) from a context to a [`HandlerResult`]. Any `Fn` returning a
//! `Send` future of `Result<impl Into<Reply>, HandlerError>` qualifies:
//!
//! ```rust,ignore
//! async fn ping(_ctx: RequestContext) -> HandlerResult {
//!     Ok(Reply::text("pong"))
//! }
//!
//! async fn echo(ctx: RequestContext) -> HandlerResult<String> {
//!     Ok(ctx.arg_text().to_string())
//! }
//!
//! let shout = |ctx: RequestContext| async move {
//!     Ok::<_, HandlerError>(ctx.arg_text().to_uppercase())
//! };
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use hype_core::{BoxFuture, Reply};

use crate::context::RequestContext;
use crate::scheduler::JobContext;

pub use crate::error::{HandlerError, HandlerResult};

/// A command handler.
pub trait Handler: Send + Sync + 'static {
    /// Runs the command.
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    R: Into<Reply>,
{
    fn call(&self, ctx: RequestContext) -> BoxFuture<'static, HandlerResult> {
        self(ctx).map(|result| result.map(Into::into)).boxed()
    }
}

/// A shared command handler.
pub type BoxedHandler = Arc<dyn Handler>;

/// A scheduled job body.
pub trait JobHandler: Send + Sync + 'static {
    /// Runs one firing of the job.
    fn call(&self, ctx: JobContext) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut, R> JobHandler for F
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, HandlerError>> + Send + 'static,
    R: Into<Reply>,
{
    fn call(&self, ctx: JobContext) -> BoxFuture<'static, HandlerResult> {
        self(ctx).map(|result| result.map(Into::into)).boxed()
    }
}

/// A shared job handler.
pub type BoxedJobHandler = Arc<dyn JobHandler>;
