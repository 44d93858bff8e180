//! Diagnostic events.
//!
//! The gateway does not log by itself. It reports what happens to an
//! [`Observer`] that was handed to it at construction time. The default,
//! [`LogObserver`], forwards everything to the `log` crate.

use std::fmt;
use std::net::SocketAddr;

use http::{Method, StatusCode, Uri};

use crate::errors::GatewayError;
use crate::multistatus::MultistatusError;

/// Which backend an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Next,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => f.write_str("local"),
            Side::Next => f.write_str("next"),
        }
    }
}

/// Something worth knowing about happened while handling a request.
#[derive(Debug)]
pub enum Event<'a> {
    /// A request came in.
    Request {
        method: &'a Method,
        uri: &'a Uri,
        client: Option<SocketAddr>,
    },
    /// Gateway credentials did not match. `username` is what the client sent.
    Unauthorized {
        uri: &'a Uri,
        username: Option<&'a str>,
    },
    /// A backend did not answer a PROPFIND with 207 Multi-Status.
    BackendFailed {
        side: Side,
        method: &'a Method,
        uri: &'a Uri,
        status: StatusCode,
        body: &'a [u8],
    },
    /// A backend answered 207 but its body could not be parsed.
    BadMultistatus {
        side: Side,
        uri: &'a Uri,
        error: &'a MultistatusError,
    },
    /// The local store said 404, the request goes to the next hop.
    Fallthrough { method: &'a Method, uri: &'a Uri },
    /// The request ended in an error before any backend answered it.
    Failed {
        method: &'a Method,
        uri: &'a Uri,
        error: &'a GatewayError,
    },
    /// The next hop could not be reached.
    ProxyFailed {
        uri: &'a Uri,
        error: &'a (dyn std::error::Error + Send + Sync),
    },
}

/// Receives diagnostic events.
pub trait Observer: Send + Sync {
    fn observe(&self, event: &Event<'_>);
}

/// Observer that writes events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn observe(&self, event: &Event<'_>) {
        match event {
            Event::Request {
                method,
                uri,
                client,
            } => match client {
                Some(addr) => debug!("== REQUEST {method} {uri} by {addr}"),
                None => debug!("== REQUEST {method} {uri}"),
            },
            Event::Unauthorized { uri, username } => {
                info!(
                    "unauthorized request for {} by {:?}",
                    uri.path(),
                    username.unwrap_or("")
                );
            }
            Event::BackendFailed {
                side,
                method,
                uri,
                status,
                body,
            } => {
                warn!(
                    "{side} {method} {uri} failed with {status}: {}",
                    String::from_utf8_lossy(body)
                );
            }
            Event::BadMultistatus { side, uri, error } => {
                warn!("{side} multistatus for {uri} dropped: {error}");
            }
            Event::Fallthrough { method, uri } => {
                debug!("{method} {} not found locally, trying next", uri.path());
            }
            Event::Failed { method, uri, error } => {
                debug!("== END REQUEST {method} {uri} result {error:?}");
            }
            Event::ProxyFailed { uri, error } => {
                error!("next hop failed for {uri}: {error}");
            }
        }
    }
}
