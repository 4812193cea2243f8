//! Request handler abstractions
//!
//! A [`Handler`] gets the decoded [`Request`] and a [`ResponseWriter`] for it. It
//! may read the request body through the writer, and answers by committing a
//! response head and, optionally, body chunks. Whatever it leaves open is
//! completed by the connection once it returns.
//!
//! Closures become handlers with [`handler_fn`]:
//!
//! ```
//! use http::StatusCode;
//! use micro_icap::handler::{handler_fn, HandlerError};
//!
//! let handler = handler_fn(|writer, _request| {
//!     Box::pin(async move {
//!         writer.write_header(StatusCode::NO_CONTENT, None, false).await?;
//!         Ok::<_, HandlerError>(())
//!     })
//! });
//! # let _ = handler;
//! ```

use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use http::StatusCode;
use tracing::debug;

use crate::connection::ResponseWriter;
use crate::mux::redirect;
use crate::protocol::Request;

/// The error type handlers fail with.
pub type HandlerError = Box<dyn Error + Send + Sync>;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, writer: &mut ResponseWriter<'_>, request: &Request) -> Result<(), HandlerError>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Box<H> {
    async fn serve(&self, writer: &mut ResponseWriter<'_>, request: &Request) -> Result<(), HandlerError> {
        (**self).serve(writer, request).await
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn serve(&self, writer: &mut ResponseWriter<'_>, request: &Request) -> Result<(), HandlerError> {
        (**self).serve(writer, request).await
    }
}

/// A handler backed by a closure, see [`handler_fn`].
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: for<'a, 'conn> Fn(&'a mut ResponseWriter<'conn>, &'a Request) -> BoxFuture<'a, Result<(), HandlerError>> + Send + Sync,
{
    async fn serve(&self, writer: &mut ResponseWriter<'_>, request: &Request) -> Result<(), HandlerError> {
        (self.f)(writer, request).await
    }
}

pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a, 'conn> Fn(&'a mut ResponseWriter<'conn>, &'a Request) -> BoxFuture<'a, Result<(), HandlerError>> + Send + Sync,
{
    HandlerFn { f }
}

/// Answers every request with `404 Not Found` and no body.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFoundHandler;

#[async_trait]
impl Handler for NotFoundHandler {
    async fn serve(&self, writer: &mut ResponseWriter<'_>, request: &Request) -> Result<(), HandlerError> {
        debug!(path = request.path(), "no service found");
        writer.write_header(StatusCode::NOT_FOUND, None, false).await?;
        Ok(())
    }
}

/// Redirects every request to a fixed target, see [`redirect`].
#[derive(Debug, Clone)]
pub struct RedirectHandler {
    target: String,
    status: StatusCode,
}

impl RedirectHandler {
    pub fn new(target: impl Into<String>, status: StatusCode) -> Self {
        Self { target: target.into(), status }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

#[async_trait]
impl Handler for RedirectHandler {
    async fn serve(&self, writer: &mut ResponseWriter<'_>, request: &Request) -> Result<(), HandlerError> {
        redirect(writer, request, &self.target, self.status).await?;
        Ok(())
    }
}
