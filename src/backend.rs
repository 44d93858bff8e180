//! The things a request can be dispatched to.

use std::path::Path;

use dav_server::memls::MemLs;
use dav_server::DavHandler;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use http::{Request, Response};
use hyper::Body;

use crate::fs::GuardedFs;

/// Future returned by [`DavBackend::call`].
pub type BackendFuture<'a> = BoxFuture<'a, Response<Body>>;

/// A WebDAV server the gateway can send a request to.
///
/// Backends never fail at the type level: transport and protocol errors
/// are answered with an error response.
pub trait DavBackend: Send + Sync {
    fn call(&self, req: Request<Body>) -> BackendFuture<'_>;
}

/// The local WebDAV engine, serving a directory through [`GuardedFs`].
#[derive(Clone)]
pub struct LocalEngine {
    handler: DavHandler,
}

impl LocalEngine {
    /// Serve `root` below the url path `prefix`.
    pub fn new(root: impl AsRef<Path>, writable: bool, prefix: &str) -> LocalEngine {
        let handler = DavHandler::builder()
            .strip_prefix(prefix)
            .filesystem(GuardedFs::local(root, writable))
            .locksystem(MemLs::new())
            .build_handler();
        LocalEngine { handler }
    }
}

impl DavBackend for LocalEngine {
    fn call(&self, req: Request<Body>) -> BackendFuture<'_> {
        async move {
            let resp = self.handler.handle(req).await;
            // Need to remap the dav_server body to a hyper::Body.
            let (parts, body) = resp.into_parts();
            Response::from_parts(parts, Body::wrap_stream(body))
        }
        .boxed()
    }
}
