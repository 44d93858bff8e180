//! Request body plumbing.
//!
//! A request that may be sent to two backends is read exactly once into a
//! [`BufferedBody`]. Every backend then gets its own [`view`](BufferedBody::view)
//! of it, a fresh body that starts at the first byte. The buffer lives as long
//! as the request does.

use std::error::Error as StdError;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use futures_util::stream::Stream;
use http_body::Body as HttpBody;
use pin_project::pin_project;

use crate::errors::{GatewayError, GatewayResult};

/// A request body that has been read into memory.
#[derive(Clone, Debug, Default)]
pub struct BufferedBody {
    data: Bytes,
}

impl BufferedBody {
    /// Drain `body`. Fails with [`GatewayError::BodyTooLarge`] as soon as
    /// more than `limit` bytes have been seen.
    pub async fn read<ReqBody, ReqData, ReqError>(
        body: ReqBody,
        limit: Option<usize>,
    ) -> GatewayResult<BufferedBody>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let mut data = BytesMut::new();
        pin_utils::pin_mut!(body);
        while let Some(res) = body.data().await {
            let mut buf = res.map_err(|_| {
                GatewayError::IoError(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "UnexpectedEof",
                ))
            })?;
            while buf.has_remaining() {
                if let Some(max) = limit {
                    if data.len() + buf.remaining() > max {
                        return Err(GatewayError::BodyTooLarge);
                    }
                }
                let b = buf.chunk();
                let l = b.len();
                data.extend_from_slice(b);
                buf.advance(l);
            }
        }
        Ok(BufferedBody {
            data: data.freeze(),
        })
    }

    /// A new body over the buffered bytes, positioned at the start.
    pub fn view(&self) -> hyper::Body {
        if self.data.is_empty() {
            hyper::Body::empty()
        } else {
            hyper::Body::from(self.data.clone())
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Bytes> for BufferedBody {
    fn from(data: Bytes) -> BufferedBody {
        BufferedBody { data }
    }
}

// Turns any http_body::Body into a hyper::Body without buffering it.
pub(crate) fn into_hyper<ReqBody, ReqData, ReqError>(body: ReqBody) -> hyper::Body
where
    ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
    ReqData: Buf + Send + 'static,
    ReqError: StdError + Send + Sync + 'static,
{
    hyper::Body::wrap_stream(BodyStream { body })
}

// A struct that contains a http_body::Body, and implements Stream.
#[pin_project]
pub(crate) struct BodyStream<B> {
    #[pin]
    body: B,
}

impl<ReqBody, ReqData, ReqError> Stream for BodyStream<ReqBody>
where
    ReqData: Buf + Send,
    ReqError: StdError + Send + Sync + 'static,
    ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
{
    type Item = Result<Bytes, ReqError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        this.body
            .poll_data(cx)
            .map(|item| item.map(|res| res.map(|mut data| data.copy_to_bytes(data.remaining()))))
    }
}
