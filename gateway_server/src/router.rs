//! Resolution of ticket strings to backend requests.
//!
//! The set of tickets is closed: every ticket the gateway serves is a row of
//! [`ROUTES`], matched by exact string comparison. There is no default route.

use std::fmt;

/// The family of store a ticket is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    /// A relational database queried with SQL over the network.
    Relational,
    /// A document store queried with a field-filtered find.
    Document,
    /// An embedded analytical engine reading a local file.
    Embedded,
}

impl BackendKind {
    pub const ALL: [Self; 3] = [Self::Relational, Self::Document, Self::Embedded];

    /// The ticket prefix naming this backend.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Relational => "postgres",
            Self::Document => "mongo",
            Self::Embedded => "duckdb",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which columns a request reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Projection {
    /// Every canonical column, normalized to the canonical schema.
    All,
    /// Only the `value` column, in the store's native numeric type.
    Values,
}

/// How the result is shaped on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputMode {
    /// The table itself, as columnar chunks.
    Columnar,
    /// The table rendered as JSON text inside a one-cell table.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteSpec {
    pub backend: BackendKind,
    pub projection: Projection,
    pub output: OutputMode,
}

impl RouteSpec {
    const fn new(backend: BackendKind, projection: Projection, output: OutputMode) -> Self {
        Self {
            backend,
            projection,
            output,
        }
    }

    /// The ticket that resolves to this route.
    pub fn ticket(&self) -> &'static str {
        ROUTES
            .iter()
            .find(|(_, route)| route == self)
            .map(|(ticket, _)| *ticket)
            .unwrap_or("<unrouted>")
    }

    /// True if the result of this route has the canonical schema.
    pub fn is_canonical(&self) -> bool {
        self.projection == Projection::All && self.output == OutputMode::Columnar
    }
}

/// Every ticket the gateway serves.
pub const ROUTES: [(&str, RouteSpec); 9] = {
    use BackendKind::*;
    use OutputMode::*;
    use Projection::*;
    [
        ("postgres", RouteSpec::new(Relational, All, Columnar)),
        ("postgres_values", RouteSpec::new(Relational, Values, Columnar)),
        ("postgres_json", RouteSpec::new(Relational, All, Text)),
        ("mongo", RouteSpec::new(Document, All, Columnar)),
        ("mongo_values", RouteSpec::new(Document, Values, Columnar)),
        ("mongo_json", RouteSpec::new(Document, All, Text)),
        ("duckdb", RouteSpec::new(Embedded, All, Columnar)),
        ("duckdb_values", RouteSpec::new(Embedded, Values, Columnar)),
        ("duckdb_json", RouteSpec::new(Embedded, All, Text)),
    ]
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ticket '{ticket}', expected one of: {}", known_tickets().collect::<Vec<_>>().join(", "))]
pub struct UnknownTicket {
    pub ticket: String,
}

/// Look up the route for `ticket`.
pub fn resolve(ticket: &str) -> Result<RouteSpec, UnknownTicket> {
    ROUTES
        .iter()
        .find(|(known, _)| *known == ticket)
        .map(|(_, route)| *route)
        .ok_or_else(|| UnknownTicket {
            ticket: ticket.to_string(),
        })
}

/// Resolve raw ticket bytes; anything that is not UTF-8 is unknown.
pub fn resolve_bytes(ticket: &[u8]) -> Result<RouteSpec, UnknownTicket> {
    match std::str::from_utf8(ticket) {
        Ok(ticket) => resolve(ticket),
        Err(_) => Err(UnknownTicket {
            ticket: String::from_utf8_lossy(ticket).into_owned(),
        }),
    }
}

pub fn known_tickets() -> impl Iterator<Item = &'static str> {
    ROUTES.iter().map(|(ticket, _)| *ticket)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_known_ticket_resolves() {
        for (ticket, route) in ROUTES {
            assert_eq!(resolve(ticket).unwrap(), route);
            assert_eq!(route.ticket(), ticket);
        }
    }

    #[test]
    fn routes_are_distinct_and_cover_each_backend() {
        let tickets: HashSet<_> = known_tickets().collect();
        assert_eq!(tickets.len(), ROUTES.len());

        let routes: HashSet<_> = ROUTES.iter().map(|(_, r)| *r).collect();
        assert_eq!(routes.len(), ROUTES.len());

        for backend in BackendKind::ALL {
            let name = backend.name();
            assert_eq!(
                resolve(name).unwrap(),
                RouteSpec::new(backend, Projection::All, OutputMode::Columnar)
            );
            assert_eq!(
                resolve(&format!("{name}_values")).unwrap(),
                RouteSpec::new(backend, Projection::Values, OutputMode::Columnar)
            );
            assert_eq!(
                resolve(&format!("{name}_json")).unwrap(),
                RouteSpec::new(backend, Projection::All, OutputMode::Text)
            );
        }
    }

    #[test]
    fn near_misses_are_unknown() {
        for ticket in [
            "postgres2",
            "Postgres",
            "postgres ",
            " mongo",
            "duckdb_value",
            "mongo_values_json",
            "relational",
            "",
        ] {
            let err = resolve(ticket).unwrap_err();
            assert_eq!(err.ticket, ticket);
        }
    }

    #[test]
    fn non_utf8_ticket_is_unknown() {
        assert!(resolve_bytes(&[0xff, 0xfe]).is_err());
        assert_eq!(
            resolve_bytes(b"mongo_json").unwrap(),
            RouteSpec::new(BackendKind::Document, Projection::All, OutputMode::Text)
        );
    }

    #[test]
    fn only_full_columnar_routes_are_canonical() {
        let canonical: Vec<_> = ROUTES
            .iter()
            .filter(|(_, r)| r.is_canonical())
            .map(|(t, _)| *t)
            .collect();
        assert_eq!(canonical, vec!["postgres", "mongo", "duckdb"]);
    }
}
