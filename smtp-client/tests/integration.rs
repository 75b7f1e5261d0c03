//! Black-box client→server round trip: a real `Dispatcher::send` talks to
//! a real `smtp-server` `Listener` over loopback TCP (the "client
//! round-trip" and the two-domain fan-out scenario).
//!
//! MX resolution itself is exercised by `resolver.rs`'s unit tests; these
//! tests use `SendRequest::builder().host(...)` to bypass it, the same
//! way an explicit host override skips the resolver
//! entirely.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use smtp_client::{Dispatcher, MxResolver, SendOutcome, SendRequest};
use smtp_message::Email;
use smtp_server::{Envelope, Listener};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// A `Dispatcher` needs a resolver type even when every test here bypasses
/// it via an explicit `host` override, so it is never actually consulted.
/// `AsyncResolver`'s Tokio-backed connection provider wants an active
/// Tokio context to construct, which the rest of this crate (built on
/// `smol`) never otherwise needs — so construction gets its own
/// single-threaded runtime just for this one call.
fn unused_resolver() -> MxResolver<
    trust_dns_resolver::name_server::GenericConnection,
    trust_dns_resolver::name_server::GenericConnectionProvider<
        trust_dns_resolver::name_server::TokioRuntime,
    >,
> {
    let rt = tokio::runtime::Runtime::new().expect("building a throwaway tokio runtime");
    let resolver = rt.block_on(async {
        TokioAsyncResolver::tokio(ResolverConfig::new(), ResolverOpts::default())
            .expect("constructing a resolver with no nameservers configured should not fail")
    });
    MxResolver::new(resolver)
}

#[test]
fn single_recipient_round_trip_delivers_byte_identical_envelope() {
    smol::block_on(async {
        let received: Arc<Mutex<Vec<Envelope>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let mut listener = Listener::new(Some("127.0.0.1".to_owned()), 0, "test.example", false);
        listener.hooks().on_mail(move |e| sink.lock().unwrap().push(e));
        let addr = listener.start().await.unwrap();

        let dispatcher = Dispatcher::new(unused_resolver());
        let req = SendRequest::builder(
            Email::new("a", "b"),
            vec![Email::new("c", "d")],
            b"hello\r\n".to_vec(),
        )
        .host("127.0.0.1")
        .port(addr.port())
        .build();

        let (_cancel, fut) = dispatcher.send(req);
        let outcome = fut.await;
        assert!(outcome.is_full_success());
        match outcome {
            SendOutcome::Single { ok, err } => {
                assert!(ok.is_some());
                assert!(err.is_none());
            }
            SendOutcome::Multi { .. } => panic!("single recipient should collapse to a pair"),
        }

        smol::Timer::after(Duration::from_millis(50)).await;
        let envelopes = received.lock().unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].from, "a@b");
        assert_eq!(envelopes[0].to, vec!["c@d".to_string()]);
        assert_eq!(envelopes[0].data, b"hello\r\n");

        listener.stop().await;
    });
}

#[test]
fn multiple_recipients_report_a_map_keyed_by_address() {
    smol::block_on(async {
        let mut listener = Listener::new(Some("127.0.0.1".to_owned()), 0, "test.example", false);
        let addr = listener.start().await.unwrap();

        let dispatcher = Dispatcher::new(unused_resolver());
        let req = SendRequest::builder(
            Email::new("a", "b"),
            vec![Email::new("c", "d"), Email::new("e", "f")],
            b"body\r\n".to_vec(),
        )
        .host("127.0.0.1")
        .port(addr.port())
        .build();

        let (_cancel, fut) = dispatcher.send(req);
        match fut.await {
            SendOutcome::Multi { ok, err } => {
                assert!(err.is_empty());
                assert!(ok.contains_key("c@d"));
                assert!(ok.contains_key("e@f"));
            }
            SendOutcome::Single { .. } => panic!("two recipients should not collapse"),
        }

        listener.stop().await;
    });
}

#[test]
fn connecting_to_a_closed_port_fails_every_recipient() {
    smol::block_on(async {
        let dispatcher = Dispatcher::new(unused_resolver());
        // Port 0 never accepts connections; dialing it fails immediately.
        let req = SendRequest::builder(
            Email::new("a", "b"),
            vec![Email::new("c", "d")],
            b"hello\r\n".to_vec(),
        )
        .host("127.0.0.1")
        .port(1)
        .build();

        let (_cancel, fut) = dispatcher.send(req);
        match fut.await {
            SendOutcome::Single { ok, err } => {
                assert!(ok.is_none());
                assert!(err.is_some());
            }
            SendOutcome::Multi { .. } => panic!("single recipient should collapse"),
        }
    });
}
