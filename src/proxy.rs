//! Single-host reverse proxy to the next-hop WebDAV server.
//!
//! Requests keep their method, headers and body. The uri is moved onto the
//! next hop (its path is prefixed with the next url's path), the `Host`
//! header is rewritten, hop-by-hop headers are dropped, and the client
//! address is appended to `X-Forwarded-For`. If the next url carries
//! credentials they replace the client's `Authorization` header.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::FutureExt;
use headers::{Authorization, HeaderMapExt};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::uri::{PathAndQuery, Uri};
use http::{Request, Response, StatusCode};
use hyper::client::HttpConnector;
use hyper::{Body, Client};

use crate::backend::{BackendFuture, DavBackend};
use crate::config::{Credentials, NextBackend};
use crate::errors::{GatewayError, GatewayResult};
use crate::observer::{Event, Observer};
use crate::util::{join_path, join_query};

// Headers that only make sense for a single connection.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Client address of the request being forwarded, stored in the
/// request extensions.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub SocketAddr);

/// Forwards requests to the next hop.
#[derive(Clone)]
pub struct NextHop {
    next: NextBackend,
    authority: HeaderValue,
    credentials: Option<Credentials>,
    client: Client<HttpConnector, Body>,
    observer: Arc<dyn Observer>,
}

impl NextHop {
    pub fn new(next: NextBackend, observer: Arc<dyn Observer>) -> GatewayResult<NextHop> {
        let authority = HeaderValue::from_str(&next.authority())
            .map_err(|_| GatewayError::InvalidNext(next.to_string()))?;
        Ok(NextHop {
            credentials: next.credentials(),
            authority,
            next,
            client: Client::new(),
            observer,
        })
    }

    /// Send `req` to the next hop and return whatever it answers.
    ///
    /// Connection failures are answered with `502 Bad Gateway`.
    pub async fn forward(&self, req: Request<Body>) -> Response<Body> {
        let uri = req.uri().clone();
        let req = match self.rewrite(req) {
            Ok(req) => req,
            Err(e) => {
                self.observer.observe(&Event::ProxyFailed {
                    uri: &uri,
                    error: &e,
                });
                return bad_gateway();
            }
        };
        match self.client.request(req).await {
            Ok(mut resp) => {
                remove_hop_by_hop(resp.headers_mut());
                resp
            }
            Err(e) => {
                self.observer.observe(&Event::ProxyFailed {
                    uri: &uri,
                    error: &e,
                });
                bad_gateway()
            }
        }
    }

    // point the request at the next hop.
    fn rewrite(&self, req: Request<Body>) -> GatewayResult<Request<Body>> {
        let (mut parts, body) = req.into_parts();

        let origin = self.next.origin();
        let path = join_path(origin.path(), parts.uri.path());
        let pq = match join_query(origin.query(), parts.uri.query()) {
            Some(q) => format!("{path}?{q}"),
            None => path,
        };
        let pq = PathAndQuery::try_from(pq.as_str()).map_err(|e| {
            GatewayError::InvalidNext(format!("{}: {e}", self.next))
        })?;
        parts.uri = Uri::builder()
            .scheme(origin.scheme())
            .authority(self.next.authority().as_str())
            .path_and_query(pq)
            .build()
            .map_err(|e| GatewayError::InvalidNext(format!("{}: {e}", self.next)))?;

        let headers = &mut parts.headers;
        remove_hop_by_hop(headers);
        headers.insert(header::HOST, self.authority.clone());
        if let Some(creds) = &self.credentials {
            headers.typed_insert(Authorization::basic(&creds.username, &creds.password));
        }
        if let Some(ClientAddr(addr)) = parts.extensions.get::<ClientAddr>() {
            let ip = addr.ip().to_string();
            let xff = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
                Some(prior) => format!("{prior}, {ip}"),
                None => ip,
            };
            if let Ok(v) = HeaderValue::from_str(&xff) {
                headers.insert("x-forwarded-for", v);
            }
        }

        Ok(Request::from_parts(parts, body))
    }
}

impl DavBackend for NextHop {
    fn call(&self, req: Request<Body>) -> BackendFuture<'_> {
        self.forward(req).boxed()
    }
}

fn bad_gateway() -> Response<Body> {
    let mut resp = Response::new(Body::empty());
    *resp.status_mut() = StatusCode::BAD_GATEWAY;
    resp.headers_mut().typed_insert(headers::ContentLength(0));
    resp
}

fn remove_hop_by_hop(headers: &mut HeaderMap) {
    // headers named in Connection are hop-by-hop too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}
