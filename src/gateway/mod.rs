//
// This module contains the main entry point of the library,
// Gateway.
//
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Buf;
use headers::HeaderMapExt;
use http::{Request, Response};
use http_body::Body as HttpBody;
use hyper::Body;

use crate::backend::{DavBackend, LocalEngine};
use crate::body::{into_hyper, BufferedBody};
use crate::config::{Credentials, LocalBackend, NextBackend};
use crate::errors::GatewayResult;
use crate::observer::{Event, LogObserver, Observer};
use crate::proxy::{ClientAddr, NextHop};
use crate::util::is_propfind;

pub mod handle_auth;
pub mod handle_fallthrough;
pub mod handle_propfind;

/// Configuration of the gateway.
#[derive(Clone)]
pub struct GatewayBuilder {
    /// Url path prefix the local store is mounted at.
    prefix: String,
    /// Local store.
    local: LocalBackend,
    /// Replaces the engine built from `local`.
    local_backend: Option<Arc<dyn DavBackend>>,
    /// Next hop, if any.
    next: Option<NextBackend>,
    /// Replaces the proxy built from `next`.
    next_backend: Option<Arc<dyn DavBackend>>,
    /// Credentials clients must present.
    credentials: Option<Credentials>,
    /// Receives diagnostic events (default: `LogObserver`).
    observer: Arc<dyn Observer>,
    /// Largest request body that is buffered for replay.
    body_limit: Option<usize>,
}

impl GatewayBuilder {
    /// Create a new configuration builder.
    pub fn new(local: LocalBackend) -> GatewayBuilder {
        GatewayBuilder {
            prefix: String::new(),
            local,
            local_backend: None,
            next: None,
            next_backend: None,
            credentials: None,
            observer: Arc::new(LogObserver),
            body_limit: None,
        }
    }

    /// Build the gateway. Fails if the next hop cannot be set up.
    pub fn build(self) -> GatewayResult<Gateway> {
        let local = match self.local_backend {
            Some(backend) => backend,
            None => Arc::new(LocalEngine::new(
                &self.local.root,
                self.local.writable,
                &self.prefix,
            )),
        };
        let next = match (self.next_backend, self.next) {
            (Some(backend), _) => Some(backend),
            (None, Some(next)) => {
                Some(Arc::new(NextHop::new(next, self.observer.clone())?) as Arc<dyn DavBackend>)
            }
            (None, None) => None,
        };
        Ok(Gateway {
            local,
            next,
            auth: self.credentials.map(Arc::new),
            observer: self.observer,
            body_limit: self.body_limit,
        })
    }

    /// Prefix to be stripped off before translating the rest of
    /// the request path to a path in the local store.
    pub fn strip_prefix(self, prefix: impl Into<String>) -> Self {
        let mut this = self;
        this.prefix = prefix.into();
        this
    }

    /// Fall through to this server.
    pub fn next(self, next: NextBackend) -> Self {
        let mut this = self;
        this.next = Some(next);
        this
    }

    /// Require basic authentication. An empty username disables it.
    pub fn credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        let mut this = self;
        let creds = Credentials::new(username, password);
        this.credentials = if creds.username.is_empty() {
            None
        } else {
            Some(creds)
        };
        this
    }

    /// Where diagnostic events go.
    pub fn observer(self, observer: Arc<dyn Observer>) -> Self {
        let mut this = self;
        this.observer = observer;
        this
    }

    /// Refuse request bodies larger than `limit` bytes with 413 when they
    /// have to be buffered (default: no limit).
    pub fn body_limit(self, limit: usize) -> Self {
        let mut this = self;
        this.body_limit = Some(limit);
        this
    }

    /// Use this backend instead of a WebDAV engine over the local directory.
    pub fn local_backend(self, backend: Arc<dyn DavBackend>) -> Self {
        let mut this = self;
        this.local_backend = Some(backend);
        this
    }

    /// Use this backend as the next hop instead of a proxy.
    pub fn next_backend(self, backend: Arc<dyn DavBackend>) -> Self {
        let mut this = self;
        this.next_backend = Some(backend);
        this
    }
}

/// The gateway.
///
/// Built with [`Gateway::builder`]. The `handle` and `handle_with`
/// methods do the actual work. Cloning is cheap, and there is no state
/// shared between requests.
#[derive(Clone)]
pub struct Gateway {
    pub(crate) local: Arc<dyn DavBackend>,
    pub(crate) next: Option<Arc<dyn DavBackend>>,
    pub(crate) auth: Option<Arc<Credentials>>,
    pub(crate) observer: Arc<dyn Observer>,
    pub(crate) body_limit: Option<usize>,
}

impl Gateway {
    /// Return a configuration builder.
    pub fn builder(local: LocalBackend) -> GatewayBuilder {
        GatewayBuilder::new(local)
    }

    /// Handle a request.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        self.handle_inner(req, None).await
    }

    /// Handle a request from `client`. The address is passed on to the
    /// next hop in `X-Forwarded-For`.
    pub async fn handle_with<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
        client: Option<SocketAddr>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        self.handle_inner(req, client).await
    }

    // Turn any GatewayError results into a HTTP error response.
    async fn handle_inner<ReqBody, ReqData, ReqError>(
        &self,
        mut req: Request<ReqBody>,
        client: Option<SocketAddr>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        self.observer.observe(&Event::Request {
            method: req.method(),
            uri: req.uri(),
            client,
        });
        if let Some(addr) = client {
            req.extensions_mut().insert(ClientAddr(addr));
        }

        let method = req.method().clone();
        let uri = req.uri().clone();
        match self.handle2(req).await {
            Ok(resp) => resp,
            Err(err) => {
                self.observer.observe(&Event::Failed {
                    method: &method,
                    uri: &uri,
                    error: &err,
                });
                let mut resp = Response::new(Body::empty());
                *resp.status_mut() = err.statuscode();
                resp.headers_mut().typed_insert(headers::ContentLength(0));
                if err.must_close() {
                    resp.headers_mut()
                        .typed_insert(headers::Connection::close());
                }
                resp
            }
        }
    }

    // internal dispatcher part 2.
    async fn handle2<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> GatewayResult<Response<Body>>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        if let Some(resp) = self.check_auth(&req) {
            return Ok(resp);
        }

        let (parts, body) = req.into_parts();

        // Without a next hop the local store is all there is, and the
        // body can be streamed.
        let next = match &self.next {
            Some(next) => next.clone(),
            None => {
                let req = Request::from_parts(parts, into_hyper(body));
                return Ok(self.local.call(req).await);
            }
        };

        // The request may be sent twice, so read the body once up front.
        let body = BufferedBody::read(body, self.body_limit).await?;
        let req = Request::from_parts(parts, ());

        if is_propfind(req.method()) {
            Ok(self.handle_propfind(&req, &body, next.as_ref()).await)
        } else {
            Ok(self.handle_fallthrough(&req, &body, next.as_ref()).await)
        }
    }
}

// A fresh copy of `req` with its own view of the body.
pub(crate) fn replay(req: &Request<()>, body: &BufferedBody) -> Request<Body> {
    let mut copy = Request::new(body.view());
    *copy.method_mut() = req.method().clone();
    *copy.uri_mut() = req.uri().clone();
    *copy.version_mut() = req.version();
    *copy.headers_mut() = req.headers().clone();
    if let Some(addr) = req.extensions().get::<ClientAddr>() {
        copy.extensions_mut().insert(*addr);
    }
    copy
}
