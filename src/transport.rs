//! The transport boundary.
//!
//! The core never performs raw I/O. A [`Transport`] turns a
//! [`Request`](crate::request::Request) into a
//! [`Response`](crate::request::Response) and is expected to watch the
//! provided cancellation token: when the last caller attached to a
//! deduplicated call detaches, the token fires and the transport should
//! abort the underlying I/O.
//!
//! Any `Fn(Request, CancellationToken) -> BoxFuture` closure is a transport,
//! so adapting an HTTP client is a one-liner:
//!
//! ```rust,ignore
//! let transport = |req: Request, cancel: CancellationToken| {
//!     async move {
//!         tokio::select! {
//!             () = cancel.cancelled() => Err(TransportError::Aborted),
//!             result = http_client.execute(req) => result,
//!         }
//!     }
//!     .boxed()
//! };
//! let client = Client::new(transport);
//! ```

pub mod mock;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::request::{Request, Response};

/// Performs the actual network call for a request.
///
/// Implementations must be cheap to call concurrently; the layers above
/// guarantee that at most one call per cache key is in flight at a time.
pub trait Transport: Send + Sync + 'static {
    /// Sends `request`, resolving with the response or a transport error.
    ///
    /// `cancel` fires when no caller is interested in the outcome anymore;
    /// implementations should abort and resolve with
    /// [`TransportError::Aborted`].
    fn send(
        &self,
        request: Request,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Response, TransportError>>;
}

impl<F> Transport for F
where
    F: Fn(Request, CancellationToken) -> BoxFuture<'static, Result<Response, TransportError>>
        + Send
        + Sync
        + 'static,
{
    fn send(
        &self,
        request: Request,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<Response, TransportError>> {
        self(request, cancel)
    }
}
