use http::{Request, Response};
use hyper::Body;

use crate::backend::DavBackend;
use crate::body::BufferedBody;
use crate::gateway::replay;
use crate::observer::Event;
use crate::sink::{Fallthrough, Passed, ResponseSink};

impl crate::Gateway {
    // Everything but PROPFIND: the local store answers, unless it says
    // 404. Then the request is replayed against the next hop, whose answer
    // goes to the client as-is.
    pub(crate) async fn handle_fallthrough(
        &self,
        req: &Request<()>,
        body: &BufferedBody,
        next: &dyn DavBackend,
    ) -> Response<Body> {
        let resp = self.local.call(replay(req, body)).await;
        match Fallthrough.sink(resp).await {
            Passed::Committed(resp) => resp,
            Passed::NotFound => {
                self.observer.observe(&Event::Fallthrough {
                    method: req.method(),
                    uri: req.uri(),
                });
                next.call(replay(req, body)).await
            }
        }
    }
}
