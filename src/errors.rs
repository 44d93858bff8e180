use std::error::Error;
use std::fmt;
use std::io;

use http::StatusCode;

/// Errors the gateway can run into, at startup or while handling a request.
#[derive(Debug)]
pub enum GatewayError {
    /// Request body was larger than the configured limit.
    BodyTooLarge,
    /// The next-hop URL cannot be used.
    InvalidNext(String),
    UrlError(url::ParseError),
    IoError(io::Error),
    HyperError(hyper::Error),
}

/// Result type used throughout the crate.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl Error for GatewayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GatewayError::UrlError(e) => Some(e),
            GatewayError::IoError(e) => Some(e),
            GatewayError::HyperError(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::BodyTooLarge => write!(f, "request body too large"),
            GatewayError::InvalidNext(s) => write!(f, "invalid next url: {s}"),
            GatewayError::UrlError(e) => write!(f, "url error: {e}"),
            GatewayError::IoError(e) => write!(f, "I/O error: {e}"),
            GatewayError::HyperError(e) => write!(f, "http error: {e}"),
        }
    }
}

impl From<io::Error> for GatewayError {
    fn from(e: io::Error) -> Self {
        GatewayError::IoError(e)
    }
}

impl From<url::ParseError> for GatewayError {
    fn from(e: url::ParseError) -> Self {
        GatewayError::UrlError(e)
    }
}

impl From<hyper::Error> for GatewayError {
    fn from(e: hyper::Error) -> Self {
        GatewayError::HyperError(e)
    }
}

impl GatewayError {
    /// Status to answer the client with when this error ends a request.
    pub(crate) fn statuscode(&self) -> StatusCode {
        match self {
            GatewayError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::IoError(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::HyperError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // the request body may be left half-read.
    pub(crate) fn must_close(&self) -> bool {
        matches!(
            self,
            GatewayError::BodyTooLarge | GatewayError::IoError(_) | GatewayError::HyperError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuscodes() {
        assert_eq!(
            GatewayError::BodyTooLarge.statuscode(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        let eof = io::Error::new(io::ErrorKind::UnexpectedEof, "UnexpectedEof");
        assert_eq!(
            GatewayError::from(eof).statuscode(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::InvalidNext("ftp://x".into()).statuscode(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert!(GatewayError::BodyTooLarge.must_close());
    }
}
