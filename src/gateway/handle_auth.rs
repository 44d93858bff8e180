use headers::authorization::Basic;
use headers::{Authorization, HeaderMapExt};
use http::header::{HeaderValue, WWW_AUTHENTICATE};
use http::{Request, Response, StatusCode};
use hyper::Body;

use crate::observer::Event;

const REALM: &str = "Basic realm=\"Dav Server\"";

impl crate::Gateway {
    // Returns the 401 reply if the request does not carry the gateway
    // credentials. Requests always pass if no credentials are configured.
    pub(crate) fn check_auth<B>(&self, req: &Request<B>) -> Option<Response<Body>> {
        let creds = self.auth.as_ref()?;

        let basic = req.headers().typed_get::<Authorization<Basic>>();
        let allowed = basic
            .as_ref()
            .map(|Authorization(b)| creds.matches(b.username(), b.password()))
            .unwrap_or(false);
        if allowed {
            return None;
        }

        self.observer.observe(&Event::Unauthorized {
            uri: req.uri(),
            username: basic.as_ref().map(|Authorization(b)| b.username()),
        });

        let mut res = Response::new(Body::from("unauthorized"));
        *res.status_mut() = StatusCode::UNAUTHORIZED;
        res.headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static(REALM));
        Some(res)
    }
}
