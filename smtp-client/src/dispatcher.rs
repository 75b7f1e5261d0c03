use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{abortable, join_all, AbortHandle};
use smol::net::TcpStream;
use tracing::instrument;

use smtp_message::Email;

use crate::conn::ClientConn;
use crate::error::DispatchError;
use crate::fsm;
use crate::request::{SendOutcome, SendRequest};
use crate::resolver::MxResolver;

/// Cancels an in-flight [`Dispatcher::send`] when dropped: every
/// recipient still pending at that point is reported `Cancelled`.
pub struct CancelHandle {
    abort: AbortHandle,
}

impl CancelHandle {
    /// Cancel explicitly, equivalent to dropping the handle.
    pub fn cancel(&self) {
        self.abort.abort();
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

/// Groups a [`SendRequest`]'s recipients by domain, resolves MX per group,
/// runs one [`fsm::run`] session per group, and aggregates the per-group
/// results into a single [`SendOutcome`].
pub struct Dispatcher<C, P>
where
    C: trust_dns_resolver::proto::DnsHandle<Error = trust_dns_resolver::error::ResolveError>,
    P: trust_dns_resolver::ConnectionProvider<Conn = C>,
{
    resolver: Arc<MxResolver<C, P>>,
}

impl<C, P> Dispatcher<C, P>
where
    C: trust_dns_resolver::proto::DnsHandle<Error = trust_dns_resolver::error::ResolveError>
        + 'static,
    P: trust_dns_resolver::ConnectionProvider<Conn = C> + 'static,
{
    pub fn new(resolver: MxResolver<C, P>) -> Dispatcher<C, P> {
        Dispatcher {
            resolver: Arc::new(resolver),
        }
    }

    /// Submit `req`. Returns immediately with a cancellation handle and a
    /// future that resolves to the aggregated outcome; the work itself
    /// runs in a detached background task so dropping the returned future
    /// (as opposed to the [`CancelHandle`]) does not cancel it (the
    /// "Dispatcher cancellation fans out to all child sessions" is a
    /// property of the handle, not of the future).
    #[instrument(skip(self, req), fields(recipients = req.to.len()))]
    pub fn send(
        &self,
        req: SendRequest,
    ) -> (CancelHandle, impl std::future::Future<Output = SendOutcome>) {
        let single = req.to.len() == 1;
        let recipients = req.to.clone();
        let resolver = self.resolver.clone();

        let (tx, rx) = oneshot::channel();
        let work = async move {
            let outcomes = run_dispatch(req, resolver).await;
            let _ = tx.send(outcomes);
        };
        let (work, abort) = abortable(work);
        smol::spawn(async move {
            let _ = work.await;
        })
        .detach();

        let fut = async move {
            match rx.await {
                Ok(outcomes) => build_outcome(single, outcomes),
                Err(_canceled) => {
                    let outcomes = recipients
                        .into_iter()
                        .map(|r| (r, Err(DispatchError::Cancelled.as_reply_text())))
                        .collect();
                    build_outcome(single, outcomes)
                }
            }
        };

        (CancelHandle { abort }, fut)
    }
}

async fn run_dispatch<C, P>(
    req: SendRequest,
    resolver: Arc<MxResolver<C, P>>,
) -> Vec<(Email, Result<String, String>)>
where
    C: trust_dns_resolver::proto::DnsHandle<Error = trust_dns_resolver::error::ResolveError>,
    P: trust_dns_resolver::ConnectionProvider<Conn = C>,
{
    if let Some(host) = req.host.clone() {
        return run_group(
            host, req.port, req.helo, req.from, req.to, req.data, req.timeout, req.debug,
        )
        .await;
    }

    let groups = group_recipients_by_domain(&req.to);

    let tasks = groups.into_iter().map(|(domain, recipients)| {
        let resolver = resolver.clone();
        let helo = req.helo.clone();
        let from = req.from.clone();
        let data = req.data.clone();
        let port = req.port;
        let timeout = req.timeout;
        let debug = req.debug;
        async move {
            let hosts = resolver.resolve(&domain).await;
            match hosts.into_iter().next() {
                None => {
                    let err = DispatchError::NoMxRecord {
                        domain: domain.clone(),
                    }
                    .as_reply_text();
                    recipients
                        .into_iter()
                        .map(|r| (r, Err(err.clone())))
                        .collect::<Vec<_>>()
                }
                Some(host) => {
                    run_group(host, port, helo, from, recipients, data, timeout, debug).await
                }
            }
        }
    });

    join_all(tasks).await.into_iter().flatten().collect()
}

#[allow(clippy::too_many_arguments)]
async fn run_group(
    host: String,
    port: u16,
    helo: String,
    from: Email,
    recipients: Vec<Email>,
    data: Vec<u8>,
    timeout: Option<Duration>,
    debug: bool,
) -> Vec<(Email, Result<String, String>)> {
    let stream = match TcpStream::connect((host.as_str(), port)).await {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("connecting to {}:{}: {}", host, port, e);
            return recipients.into_iter().map(|r| (r, Err(msg.clone()))).collect();
        }
    };
    let mut conn = ClientConn::new(stream, timeout);
    fsm::run(&mut conn, &helo, &from, &recipients, &data, debug).await
}

fn build_outcome(single: bool, outcomes: Vec<(Email, Result<String, String>)>) -> SendOutcome {
    if single {
        let (_, result) = outcomes
            .into_iter()
            .next()
            .expect("a SendRequest always has at least one recipient");
        match result {
            Ok(text) => SendOutcome::Single {
                ok: Some(text),
                err: None,
            },
            Err(text) => SendOutcome::Single {
                ok: None,
                err: Some(text),
            },
        }
    } else {
        let mut ok = HashMap::new();
        let mut err = HashMap::new();
        for (rcpt, result) in outcomes {
            match result {
                Ok(text) => {
                    ok.insert(rcpt.to_string(), text);
                }
                Err(text) => {
                    err.insert(rcpt.to_string(), text);
                }
            }
        }
        SendOutcome::Multi { ok, err }
    }
}

/// Partition recipients into per-domain groups, preserving each
/// recipient's original form (only the grouping key is lowercased) and
/// the order domains were first seen in (grouping by the "substring
/// after the final `@`" rule).
fn group_recipients_by_domain(recipients: &[Email]) -> Vec<(String, Vec<Email>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Email>> = HashMap::new();
    for rcpt in recipients {
        let key = rcpt.domain().to_ascii_lowercase();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(rcpt.clone());
    }
    order
        .into_iter()
        .map(|domain| {
            let recipients = groups.remove(&domain).expect("just inserted above");
            (domain, recipients)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_domain_case_insensitively() {
        let recipients = vec![
            Email::new("a", "Example.com"),
            Email::new("b", "other.org"),
            Email::new("c", "example.COM"),
        ];
        let groups = group_recipients_by_domain(&recipients);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "example.com");
        assert_eq!(groups[0].1, vec![Email::new("a", "Example.com"), Email::new("c", "example.COM")]);
        assert_eq!(groups[1].0, "other.org");
        assert_eq!(groups[1].1, vec![Email::new("b", "other.org")]);
    }

    #[test]
    fn build_outcome_collapses_single_recipient_to_a_pair() {
        let outcomes = vec![(Email::new("a", "b"), Ok("250 OK".to_string()))];
        match build_outcome(true, outcomes) {
            SendOutcome::Single { ok, err } => {
                assert_eq!(ok, Some("250 OK".to_string()));
                assert_eq!(err, None);
            }
            SendOutcome::Multi { .. } => panic!("expected Single"),
        }
    }

    #[test]
    fn build_outcome_keys_multi_by_recipient_address() {
        let outcomes = vec![
            (Email::new("a", "b"), Ok("250 OK".to_string())),
            (Email::new("c", "d"), Err("550 no".to_string())),
        ];
        match build_outcome(false, outcomes) {
            SendOutcome::Multi { ok, err } => {
                assert_eq!(ok.get("a@b"), Some(&"250 OK".to_string()));
                assert_eq!(err.get("c@d"), Some(&"550 no".to_string()));
            }
            SendOutcome::Single { .. } => panic!("expected Multi"),
        }
    }
}
