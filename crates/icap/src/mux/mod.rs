//! Request routing by service path
//!
//! [`ServeMux`] is a [`Handler`] that picks another handler from the path of the
//! request target. Patterns come in two forms:
//!
//! - `/echo` matches the path `/echo` only
//! - `/filters/` names a subtree and matches every path starting with it
//!
//! The longest matching pattern wins, so `/filters/images` can be registered next
//! to `/filters/` to take over part of the subtree.
//!
//! Paths are canonicalized before matching. A request for `/a/b/../c` is not
//! routed at all but answered with `301 Moved Permanently` and `Location: /a/c`.
//!
//! ```
//! use http::StatusCode;
//! use micro_icap::handler::RedirectHandler;
//! use micro_icap::mux::{Route, ServeMux};
//!
//! let mut mux = ServeMux::new();
//! mux.register("/filters/", RedirectHandler::new("/filters/v2/", StatusCode::MOVED_PERMANENTLY)).unwrap();
//!
//! assert!(matches!(mux.route("/filters/images"), Route::Matched { pattern: "/filters/", .. }));
//! assert!(matches!(mux.route("/echo"), Route::NotFound));
//! ```

mod path;
mod redirect;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use http::header::LOCATION;
use http::{HeaderValue, StatusCode};
use tracing::{debug, trace};

use crate::connection::ResponseWriter;
use crate::handler::{Handler, HandlerError, NotFoundHandler};
use crate::protocol::{MuxError, Request, SendError};

pub use path::{clean, clean_path, path_match};
pub use redirect::{redirect, resolve_location};

/// Where a request path leads.
pub enum Route<'a> {
    /// The path isn't canonical, the client is sent to the canonical one
    Redirect(String),
    /// The handler of the longest matching pattern
    Matched { pattern: &'a str, handler: &'a dyn Handler },
    /// No pattern matches the path
    NotFound,
}

impl fmt::Debug for Route<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redirect(location) => f.debug_tuple("Redirect").field(location).finish(),
            Self::Matched { pattern, .. } => f.debug_struct("Matched").field("pattern", pattern).finish_non_exhaustive(),
            Self::NotFound => f.write_str("NotFound"),
        }
    }
}

/// A routing table from path patterns to handlers.
///
/// Patterns are registered before serving, then the mux is shared read-only between
/// connections, typically as an `Arc<ServeMux>`.
#[derive(Default)]
pub struct ServeMux {
    entries: BTreeMap<String, Box<dyn Handler>>,
}

impl fmt::Debug for ServeMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServeMux").field("patterns", &self.entries.keys().collect::<Vec<_>>()).finish()
    }
}

impl ServeMux {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers `handler` for `pattern`.
    ///
    /// # Errors
    ///
    /// [`MuxError::EmptyPattern`] for an empty pattern, and
    /// [`MuxError::DuplicatePattern`] if the pattern already has a handler.
    pub fn register<H>(&mut self, pattern: impl Into<String>, handler: H) -> Result<(), MuxError>
    where
        H: Handler + 'static,
    {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(MuxError::EmptyPattern);
        }
        if self.entries.contains_key(&pattern) {
            return Err(MuxError::DuplicatePattern { pattern });
        }

        debug!(%pattern, "register handler");
        self.entries.insert(pattern, Box::new(handler));
        Ok(())
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Resolves a request path to a route.
    pub fn route(&self, path: &str) -> Route<'_> {
        let canonical = clean_path(path);
        if canonical != path {
            return Route::Redirect(canonical);
        }

        self.entries
            .iter()
            .filter(|(pattern, _)| path_match(pattern, path))
            .max_by_key(|(pattern, _)| pattern.len())
            .map_or(Route::NotFound, |(pattern, handler)| Route::Matched { pattern: pattern.as_str(), handler: &**handler })
    }

    /// Resolves the path of `request` to a route.
    pub fn dispatch(&self, request: &Request) -> Route<'_> {
        self.route(request.path())
    }
}

#[async_trait]
impl Handler for ServeMux {
    async fn serve(&self, writer: &mut ResponseWriter<'_>, request: &Request) -> Result<(), HandlerError> {
        match self.dispatch(request) {
            Route::Redirect(location) => {
                debug!(path = request.path(), %location, "redirect to canonical path");
                let value = HeaderValue::try_from(location).map_err(|e| SendError::invalid_header(e.to_string()))?;
                writer.header_mut().insert(LOCATION, value);
                writer.write_header(StatusCode::MOVED_PERMANENTLY, None, false).await?;
                Ok(())
            }
            Route::Matched { pattern, handler } => {
                trace!(path = request.path(), pattern, "route request");
                handler.serve(writer, request).await
            }
            Route::NotFound => NotFoundHandler.serve(writer, request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::IcapConnection;
    use crate::handler::handler_fn;
    use indoc::indoc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex, split};

    /// Answers with a status that tells which handler ran.
    fn status_handler(status: StatusCode, calls: Arc<AtomicUsize>) -> impl Handler {
        handler_fn(move |writer, _request| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                writer.write_header(status, None, false).await?;
                Ok::<_, HandlerError>(())
            })
        })
    }

    async fn exchange(mux: ServeMux, request: &str) -> String {
        let (mut client, server) = duplex(16 * 1024);
        let (reader, writer) = split(server);
        let task = tokio::spawn(IcapConnection::new(reader, writer).process(Arc::new(mux)));

        client.write_all(request.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        task.await.unwrap().unwrap();
        String::from_utf8(response).unwrap()
    }

    #[test]
    fn longest_pattern_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mux = ServeMux::new();
        mux.register("/foo/", status_handler(StatusCode::OK, calls.clone())).unwrap();
        mux.register("/foo/bar", status_handler(StatusCode::NO_CONTENT, calls)).unwrap();

        assert!(matches!(mux.route("/foo/bar"), Route::Matched { pattern: "/foo/bar", .. }));
        assert!(matches!(mux.route("/foo/baz"), Route::Matched { pattern: "/foo/", .. }));
        assert!(matches!(mux.route("/foo/bar/baz"), Route::Matched { pattern: "/foo/", .. }));
        assert!(matches!(mux.route("/foo"), Route::NotFound));
    }

    #[test]
    fn non_canonical_path_redirects() {
        let mux = ServeMux::new();
        assert!(matches!(mux.route("/a/b/../c"), Route::Redirect(location) if location == "/a/c"));
        assert!(matches!(mux.route("//echo"), Route::Redirect(location) if location == "/echo"));
        assert!(matches!(mux.route("/a/"), Route::NotFound));
    }

    #[test]
    fn register_rejects_conflicts() {
        let mut mux = ServeMux::new();
        mux.register("/echo", NotFoundHandler).unwrap();

        assert_eq!(mux.register("/echo", NotFoundHandler), Err(MuxError::DuplicatePattern { pattern: "/echo".into() }));
        assert_eq!(mux.register("", NotFoundHandler), Err(MuxError::EmptyPattern));
        assert_eq!(mux.patterns().collect::<Vec<_>>(), vec!["/echo"]);
    }

    #[tokio::test]
    async fn redirect_without_calling_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut mux = ServeMux::new();
        mux.register("/", status_handler(StatusCode::OK, calls.clone())).unwrap();

        let request = indoc! {"
            OPTIONS /a/b/../c ICAP/1.0\r
            Encapsulated: null-body=0\r
            \r
        "};
        let response = exchange(mux, request).await;

        assert!(response.starts_with("ICAP/1.0 301 Moved Permanently\r\n"));
        assert!(response.contains("\r\nlocation: /a/c\r\n"));
        assert!(response.ends_with("encapsulated: null-body=0\r\n\r\n"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatch_to_longest_match() {
        let subtree = Arc::new(AtomicUsize::new(0));
        let exact = Arc::new(AtomicUsize::new(0));
        let mut mux = ServeMux::new();
        mux.register("/foo/", status_handler(StatusCode::OK, subtree.clone())).unwrap();
        mux.register("/foo/bar", status_handler(StatusCode::NO_CONTENT, exact.clone())).unwrap();

        let request = indoc! {"
            REQMOD icap://localhost/foo/bar ICAP/1.0\r
            Encapsulated: null-body=0\r
            \r
        "};
        let response = exchange(mux, request).await;

        assert!(response.starts_with("ICAP/1.0 204 No Content\r\n"));
        assert_eq!(exact.load(Ordering::SeqCst), 1);
        assert_eq!(subtree.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_service_is_not_found() {
        let mut mux = ServeMux::new();
        mux.register("/echo", status_handler(StatusCode::OK, Arc::default())).unwrap();

        let request = indoc! {"
            OPTIONS /scan ICAP/1.0\r
            Encapsulated: null-body=0\r
            \r
        "};
        let response = exchange(mux, request).await;

        assert!(response.starts_with("ICAP/1.0 404 Not Found\r\n"));
    }

    #[tokio::test]
    async fn relative_redirect_handler() {
        let mut mux = ServeMux::new();
        mux.register("/old/", crate::handler::RedirectHandler::new("../new/scan?mode=fast", StatusCode::FOUND)).unwrap();

        let request = indoc! {"
            OPTIONS /old/scan ICAP/1.0\r
            Encapsulated: null-body=0\r
            \r
        "};
        let response = exchange(mux, request).await;

        assert!(response.starts_with("ICAP/1.0 302 Found\r\n"));
        assert!(response.contains("\r\nlocation: /new/scan?mode=fast\r\n"));
    }
}
