//! Body type shared by every layer of the proxy pipeline

use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Collected, Empty, Full, Limited};
use hyper::body::{Body, Bytes};
use std::future::Future;
use std::pin::Pin;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Request and response body flowing through transports.
///
/// Upstream bodies stay streaming unless a transport has to rewrite them.
pub type ProxyBody = UnsyncBoxBody<Bytes, BoxError>;

pub fn full(bytes: impl Into<Bytes>) -> ProxyBody {
    Full::new(bytes.into()).map_err(|never| match never {}).boxed_unsync()
}

pub fn empty() -> ProxyBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

/// Wrap any body (typically `hyper::body::Incoming`) without buffering it
pub fn streaming<B>(body: B) -> ProxyBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// Buffer a body, failing once it grows past `limit` bytes
pub async fn collect(body: ProxyBody, limit: usize) -> Result<Bytes, BoxError> {
    let collecting: Pin<Box<dyn Future<Output = Result<Collected<Bytes>, BoxError>> + Send>> =
        Box::pin(Limited::new(body, limit).collect());
    let collected = collecting.await?;
    Ok(collected.to_bytes())
}
