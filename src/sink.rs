//! Where a backend's response goes.
//!
//! The dispatcher never hands a backend response straight to the client.
//! It is first offered to a [`ResponseSink`], and the sink decides what the
//! response turns into:
//!
//! - [`Capture`] reads the whole response into memory ([`Captured`]), so it
//!   can be inspected, merged, or thrown away.
//! - [`Fallthrough`] lets the response through untouched unless its status
//!   is `404 Not Found`. A 404 is dropped without reading its headers or
//!   body, so another backend can be tried.

use bytes::Bytes;
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use http::header::CONTENT_ENCODING;
use http::{HeaderMap, Response, StatusCode};
use hyper::Body;

/// Future returned by [`ResponseSink::sink`].
pub type SinkFuture<T> = BoxFuture<'static, T>;

/// Consumes one backend response.
pub trait ResponseSink {
    type Output;

    fn sink(self, resp: Response<Body>) -> SinkFuture<Self::Output>;
}

/// Sink that buffers a complete response.
#[derive(Debug, Default, Clone, Copy)]
pub struct Capture;

/// A response held in memory. Nothing of it has reached the client.
#[derive(Debug, Clone)]
pub struct Captured {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Captured {
    /// An empty response with just a status.
    pub fn from_status(status: StatusCode) -> Captured {
        Captured {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Did the backend answer `207 Multi-Status` with a body that can be
    /// read as XML. A compressed 207 does not count.
    pub fn is_multistatus(&self) -> bool {
        self.status == StatusCode::MULTI_STATUS && self.is_identity()
    }

    fn is_identity(&self) -> bool {
        self.headers
            .get_all(CONTENT_ENCODING)
            .iter()
            .flat_map(|v| v.to_str().unwrap_or("?").split(','))
            .map(str::trim)
            .all(|enc| enc.is_empty() || enc.eq_ignore_ascii_case("identity"))
    }

    /// Replay the captured response, unchanged.
    pub fn into_response(self) -> Response<Body> {
        let mut resp = Response::new(Body::from(self.body));
        *resp.status_mut() = self.status;
        *resp.headers_mut() = self.headers;
        resp
    }
}

impl ResponseSink for Capture {
    type Output = Result<Captured, hyper::Error>;

    fn sink(self, resp: Response<Body>) -> SinkFuture<Self::Output> {
        async move {
            let (parts, body) = resp.into_parts();
            let body = hyper::body::to_bytes(body).await?;
            Ok(Captured {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        }
        .boxed()
    }
}

/// Sink that passes everything but a 404 on to the client.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fallthrough;

/// What a [`Fallthrough`] sink did with a response.
#[derive(Debug)]
pub enum Passed {
    /// Response goes to the client as-is.
    Committed(Response<Body>),
    /// The backend said 404. Nothing was kept.
    NotFound,
}

impl ResponseSink for Fallthrough {
    type Output = Passed;

    fn sink(self, resp: Response<Body>) -> SinkFuture<Passed> {
        let passed = if resp.status() == StatusCode::NOT_FOUND {
            Passed::NotFound
        } else {
            Passed::Committed(resp)
        };
        future::ready(passed).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: StatusCode, body: &'static str) -> Response<Body> {
        Response::builder()
            .status(status)
            .header("x-backend", "local")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn capture_records_everything() {
        let captured = Capture
            .sink(response(StatusCode::MULTI_STATUS, "<multistatus/>"))
            .await
            .unwrap();
        assert!(captured.is_multistatus());
        assert_eq!(captured.headers["x-backend"], "local");
        assert_eq!(captured.body, "<multistatus/>");

        let resp = captured.clone().into_response();
        assert_eq!(resp.status(), StatusCode::MULTI_STATUS);
        assert_eq!(resp.headers()["x-backend"], "local");
        let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
        assert_eq!(body, captured.body);
    }

    #[tokio::test]
    async fn capture_failure_is_not_multistatus() {
        let captured = Capture
            .sink(response(StatusCode::FORBIDDEN, "nope"))
            .await
            .unwrap();
        assert!(!captured.is_multistatus());
        assert!(!Captured::from_status(StatusCode::BAD_GATEWAY).is_multistatus());
    }

    #[test]
    fn compressed_multistatus_is_not_multistatus() {
        let mut captured = Captured::from_status(StatusCode::MULTI_STATUS);
        captured
            .headers
            .insert(CONTENT_ENCODING, "identity".parse().unwrap());
        assert!(captured.is_multistatus());

        captured
            .headers
            .insert(CONTENT_ENCODING, "gzip".parse().unwrap());
        assert!(!captured.is_multistatus());

        captured
            .headers
            .insert(CONTENT_ENCODING, "identity, br".parse().unwrap());
        assert!(!captured.is_multistatus());
    }

    #[tokio::test]
    async fn fallthrough_commits_other_statuses() {
        for status in [StatusCode::OK, StatusCode::FORBIDDEN, StatusCode::CREATED] {
            match Fallthrough.sink(response(status, "data")).await {
                Passed::Committed(resp) => {
                    assert_eq!(resp.status(), status);
                    assert_eq!(resp.headers()["x-backend"], "local");
                    let body = hyper::body::to_bytes(resp.into_body()).await.unwrap();
                    assert_eq!(body, "data");
                }
                Passed::NotFound => panic!("{status} must be committed"),
            }
        }
    }

    #[tokio::test]
    async fn fallthrough_swallows_not_found() {
        let passed = Fallthrough
            .sink(response(StatusCode::NOT_FOUND, "local 404 page"))
            .await;
        assert!(matches!(passed, Passed::NotFound));
    }
}
