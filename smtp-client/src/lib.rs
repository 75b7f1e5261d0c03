//! Asynchronous SMTP client library.
//!
//! Given a [`SendRequest`] — envelope, body, and the handful of
//! operational knobs — this crate resolves
//! delivery hosts by MX lookup, opens one SMTP session per destination
//! domain, walks the client-side dialogue, and aggregates per-recipient
//! outcomes into a single [`SendOutcome`].
//!
//! [`MxResolver`] wraps DNS resolution, [`fsm::run`] is the per-session
//! dialogue, and [`Dispatcher`] is the fan-out/aggregation layer tying
//! them together, regrouped around a per-domain fan-out rather than a
//! single-destination dialogue.

mod conn;
mod dispatcher;
mod error;
mod fsm;
mod request;
mod resolver;

pub use dispatcher::{CancelHandle, Dispatcher};
pub use error::{DispatchError, TransportError};
pub use request::{SendOutcome, SendRequest, SendRequestBuilder};
pub use resolver::MxResolver;

/// A one-shot facade: build a [`Dispatcher`] for a single
/// [`SendRequest`] and await its aggregated result directly. Callers who
/// need the cancellation handle should use [`Dispatcher::send`] instead —
/// this facade is for the common case of "send and await the outcome".
pub async fn send<C, P>(
    resolver: MxResolver<C, P>,
    req: SendRequest,
) -> SendOutcome
where
    C: trust_dns_resolver::proto::DnsHandle<Error = trust_dns_resolver::error::ResolveError>
        + 'static,
    P: trust_dns_resolver::ConnectionProvider<Conn = C> + 'static,
{
    let dispatcher = Dispatcher::new(resolver);
    let (_cancel, fut) = dispatcher.send(req);
    fut.await
}
