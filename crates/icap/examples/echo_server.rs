//! An ICAP service that echoes the adapted message back unchanged.
//!
//! Run it with `cargo run --example echo_server` and point a proxy at
//! `icap://127.0.0.1:1344/echo`.

use std::sync::Arc;

use bytes::BytesMut;
use http::{HeaderValue, StatusCode};
use micro_icap::connection::{IcapConnection, ResponseWriter};
use micro_icap::handler::{HandlerError, handler_fn};
use micro_icap::mux::ServeMux;
use micro_icap::protocol::{HttpHead, Request};
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const PREVIEW_SIZE: &str = "1024";

async fn echo(writer: &mut ResponseWriter<'_>, request: &Request) -> Result<(), HandlerError> {
    if request.header().is_options() {
        let headers = writer.header_mut();
        headers.insert("methods", HeaderValue::from_static("REQMOD, RESPMOD"));
        headers.insert("istag", HeaderValue::from_static("\"micro-icap-echo\""));
        headers.insert("preview", HeaderValue::from_static(PREVIEW_SIZE));
        headers.insert("allow", HeaderValue::from_static("204"));
        writer.write_header(StatusCode::OK, None, false).await?;
        return Ok(());
    }

    if request.allows_204() && request.preview().is_some() {
        // the preview is enough to know nothing changes
        writer.write_header(StatusCode::NO_CONTENT, None, false).await?;
        return Ok(());
    }

    let http_head = if request.header().is_reqmod() {
        request.http_request().cloned().map(HttpHead::from)
    } else {
        request.http_response().cloned().map(HttpHead::from)
    };

    // the remainder has to be read before the response is committed
    let body = if request.has_body() {
        let mut body = BytesMut::new();
        if let Some(preview) = request.preview() {
            body.extend_from_slice(preview);
        }
        body.extend_from_slice(&writer.read_to_end().await?);
        Some(body.freeze())
    } else {
        None
    };

    writer.write_header(StatusCode::OK, http_head, body.is_some()).await?;
    if let Some(body) = body {
        writer.write_body(body).await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut mux = ServeMux::new();
    mux.register("/echo", handler_fn(|writer, request| Box::pin(echo(writer, request)))).expect("register echo service");
    let mux = Arc::new(mux);

    info!(port = 1344, "start listening");
    let tcp_listener = match TcpListener::bind("127.0.0.1:1344").await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    loop {
        let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };

        let mux = mux.clone();

        tokio::spawn(async move {
            let (reader, writer) = tcp_stream.into_split();
            let connection = IcapConnection::new(reader, writer).with_remote_addr(remote_addr);
            match connection.process(mux).await {
                Ok(_) => info!("finished process, connection shutdown"),
                Err(e) => error!("service has error, cause {}, connection shutdown", e),
            }
        });
    }
}
