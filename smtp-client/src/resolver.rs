use std::collections::BTreeMap;

use tracing::warn;
use trust_dns_resolver::AsyncResolver;

/// Resolves MX records for a domain, sorted by preference ascending,
/// grouping hosts by MX preference, ascending.
///
/// Generic over the same `DnsHandle`/`ConnectionProvider` pair as
/// `trust_dns_resolver::AsyncResolver` itself, so the caller decides which
/// executor the resolver's background connection tasks run on — this
/// crate does not construct a resolver of its own, the same way the
/// teacher's `Client::new` takes an already-built `AsyncResolver`.
pub struct MxResolver<C, P>
where
    C: trust_dns_resolver::proto::DnsHandle<Error = trust_dns_resolver::error::ResolveError>,
    P: trust_dns_resolver::ConnectionProvider<Conn = C>,
{
    resolver: AsyncResolver<C, P>,
}

impl<C, P> MxResolver<C, P>
where
    C: trust_dns_resolver::proto::DnsHandle<Error = trust_dns_resolver::error::ResolveError>,
    P: trust_dns_resolver::ConnectionProvider<Conn = C>,
{
    pub fn new(resolver: AsyncResolver<C, P>) -> MxResolver<C, P> {
        MxResolver { resolver }
    }

    /// Resolve `domain`'s MX hostnames, sorted by preference ascending with
    /// ties broken by input order. An empty result means
    /// "no MX" — DNS errors (including a genuine `NXDOMAIN`) collapse to
    /// the same empty result, since both are treated identically by the
    /// `Dispatcher` ("no MX" is a per-domain delivery failure either
    /// way).
    pub async fn resolve(&self, domain: &str) -> Vec<String> {
        let lookup = match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!(domain, error = %e, "MX lookup failed");
                return Vec::new();
            }
        };

        let mut by_preference: BTreeMap<u16, Vec<String>> = BTreeMap::new();
        for record in lookup.iter() {
            by_preference
                .entry(record.preference())
                .or_default()
                .push(record.exchange().to_string());
        }

        by_preference.into_values().flatten().collect()
    }
}
