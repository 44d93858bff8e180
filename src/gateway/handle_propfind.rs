use futures_util::future;
use headers::HeaderMapExt;
use http::header::{HeaderValue, ACCEPT_ENCODING, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use hyper::Body;

use crate::backend::DavBackend;
use crate::body::BufferedBody;
use crate::gateway::replay;
use crate::multistatus::Multistatus;
use crate::observer::{Event, Side};
use crate::sink::{Capture, Captured, ResponseSink};

impl crate::Gateway {
    // PROPFIND goes to both backends. The 207 answers are merged, local
    // entries first. If neither backend answers 207, the local answer is
    // passed on unchanged.
    pub(crate) async fn handle_propfind(
        &self,
        req: &Request<()>,
        body: &BufferedBody,
        next: &dyn DavBackend,
    ) -> Response<Body> {
        let (local, remote) = future::join(
            capture(self.local.as_ref(), replay(req, body)),
            capture(next, replay(req, body)),
        )
        .await;

        for (side, captured) in [(Side::Local, &local), (Side::Next, &remote)] {
            if !captured.is_multistatus() {
                self.observer.observe(&Event::BackendFailed {
                    side,
                    method: req.method(),
                    uri: req.uri(),
                    status: captured.status,
                    body: &captured.body,
                });
            }
        }

        if !local.is_multistatus() && !remote.is_multistatus() {
            return local.into_response();
        }

        let mut multistatus = Multistatus::new();
        for (side, captured) in [(Side::Local, &local), (Side::Next, &remote)] {
            if !captured.is_multistatus() {
                continue;
            }
            if let Err(error) = multistatus.append(&captured.body) {
                self.observer.observe(&Event::BadMultistatus {
                    side,
                    uri: req.uri(),
                    error: &error,
                });
            }
        }

        let data = multistatus.to_bytes();
        let len = data.len() as u64;
        let mut res = Response::new(Body::from(data));
        *res.status_mut() = StatusCode::MULTI_STATUS;
        let h = res.headers_mut();
        h.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/xml; charset=utf-8"),
        );
        h.typed_insert(headers::ContentLength(len));
        res
    }
}

// Run `req` against `backend` and keep the whole answer in memory. A body
// that breaks off halfway is recorded as 502. The answer has to be plain
// XML, so the client's Accept-Encoding is not passed on.
async fn capture(backend: &dyn DavBackend, mut req: Request<Body>) -> Captured {
    req.headers_mut().remove(ACCEPT_ENCODING);
    let resp = backend.call(req).await;
    match Capture.sink(resp).await {
        Ok(captured) => captured,
        Err(e) => {
            let mut captured = Captured::from_status(StatusCode::BAD_GATEWAY);
            captured.body = e.to_string().into();
            captured
        }
    }
}
