//! The declarative route table of the catalog API
//!
//! Patterns are matched segment by segment against the percent-decoded request path, in table
//! order. Literal routes come before routes that would capture the same segment.
use http::Method;

/// The operation a request resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    Config,
    ListDatabases,
    CreateDatabase,
    GetDatabase,
    DropDatabase,
    AlterDatabase,
    ListTables,
    CreateTable,
    GetTable,
    AlterTable,
    DropTable,
    CommitTable,
    RenameTable,
    GetTableToken,
    LoadSnapshot,
    ListPartitions,
    CreatePartitions,
    DropPartitions,
    AlterPartitions,
    MarkDonePartitions,
    ListBranches,
    CreateBranch,
    GetBranch,
    FastForward,
    DropBranch,
    ListViews,
    CreateView,
    GetView,
    DropView,
    RenameView,
}

#[derive(Debug)]
struct Route {
    method: Method,
    /// Segments below `/v1/{prefix}`, `{name}` captures a segment
    pattern: &'static str,
    endpoint: Endpoint,
}

const fn route(method: Method, pattern: &'static str, endpoint: Endpoint) -> Route {
    Route {
        method,
        pattern,
        endpoint,
    }
}

const TABLE: &str = "/databases/{database}/tables/{table}";

static ROUTES: &[Route] = &[
    route(Method::GET, "/databases", Endpoint::ListDatabases),
    route(Method::POST, "/databases", Endpoint::CreateDatabase),
    route(Method::GET, "/databases/{database}", Endpoint::GetDatabase),
    route(Method::DELETE, "/databases/{database}", Endpoint::DropDatabase),
    route(Method::POST, "/databases/{database}", Endpoint::AlterDatabase),
    route(Method::GET, "/databases/{database}/tables", Endpoint::ListTables),
    route(Method::POST, "/databases/{database}/tables", Endpoint::CreateTable),
    route(Method::GET, TABLE, Endpoint::GetTable),
    route(Method::POST, TABLE, Endpoint::AlterTable),
    route(Method::DELETE, TABLE, Endpoint::DropTable),
    route(
        Method::POST,
        "/databases/{database}/tables/{table}/commit",
        Endpoint::CommitTable,
    ),
    route(
        Method::POST,
        "/databases/{database}/tables/{table}/rename",
        Endpoint::RenameTable,
    ),
    route(
        Method::GET,
        "/databases/{database}/tables/{table}/token",
        Endpoint::GetTableToken,
    ),
    route(
        Method::GET,
        "/databases/{database}/tables/{table}/snapshot",
        Endpoint::LoadSnapshot,
    ),
    route(
        Method::GET,
        "/databases/{database}/tables/{table}/partitions",
        Endpoint::ListPartitions,
    ),
    route(
        Method::POST,
        "/databases/{database}/tables/{table}/partitions",
        Endpoint::CreatePartitions,
    ),
    route(
        Method::POST,
        "/databases/{database}/tables/{table}/partitions/drop",
        Endpoint::DropPartitions,
    ),
    route(
        Method::POST,
        "/databases/{database}/tables/{table}/partitions/alter",
        Endpoint::AlterPartitions,
    ),
    route(
        Method::POST,
        "/databases/{database}/tables/{table}/partitions/mark",
        Endpoint::MarkDonePartitions,
    ),
    route(
        Method::GET,
        "/databases/{database}/tables/{table}/branches",
        Endpoint::ListBranches,
    ),
    route(
        Method::POST,
        "/databases/{database}/tables/{table}/branches",
        Endpoint::CreateBranch,
    ),
    route(
        Method::GET,
        "/databases/{database}/tables/{table}/branches/{branch}",
        Endpoint::GetBranch,
    ),
    route(
        Method::POST,
        "/databases/{database}/tables/{table}/branches/{branch}",
        Endpoint::FastForward,
    ),
    route(
        Method::DELETE,
        "/databases/{database}/tables/{table}/branches/{branch}",
        Endpoint::DropBranch,
    ),
    route(Method::GET, "/databases/{database}/views", Endpoint::ListViews),
    route(Method::POST, "/databases/{database}/views", Endpoint::CreateView),
    route(Method::GET, "/databases/{database}/views/{view}", Endpoint::GetView),
    route(
        Method::DELETE,
        "/databases/{database}/views/{view}",
        Endpoint::DropView,
    ),
    route(
        Method::POST,
        "/databases/{database}/views/{view}/rename",
        Endpoint::RenameView,
    ),
];

/// Segments captured from a request path
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct PathParams {
    pub(crate) database: Option<String>,
    /// A table or view name, possibly with suffixes
    pub(crate) object: Option<String>,
    pub(crate) branch: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RouteMatch {
    Found(Endpoint, PathParams),
    NotFound,
    MethodNotAllowed,
}

/// Resolves request paths against [`ROUTES`] for a prefix
#[derive(Debug, Clone)]
pub(crate) struct Router {
    /// Decoded segments of `/v1/{prefix}`
    base: Vec<String>,
}

impl Router {
    pub(crate) fn new(prefix: &str) -> Self {
        let base = lakecat_types::ResourcePaths::new(prefix);
        Self {
            base: split(base.base()).map(decode).collect(),
        }
    }

    pub(crate) fn resolve(&self, method: &Method, path: &str) -> RouteMatch {
        if path == lakecat_types::CONFIG_PATH {
            return if method == Method::GET {
                RouteMatch::Found(Endpoint::Config, PathParams::default())
            } else {
                RouteMatch::MethodNotAllowed
            };
        }

        let segments: Vec<String> = split(path).map(decode).collect();
        let Some(rest) = segments.strip_prefix(self.base.as_slice()) else {
            return RouteMatch::NotFound;
        };

        let mut path_matched = false;
        for route in ROUTES {
            let Some(params) = match_pattern(route.pattern, rest) else {
                continue;
            };
            if route.method == method {
                return RouteMatch::Found(route.endpoint, params);
            }
            path_matched = true;
        }
        if path_matched {
            RouteMatch::MethodNotAllowed
        } else {
            RouteMatch::NotFound
        }
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn decode(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.to_string())
        .unwrap_or_else(|_| segment.to_string())
}

fn match_pattern(pattern: &str, segments: &[String]) -> Option<PathParams> {
    let pattern: Vec<&str> = split(pattern).collect();
    if pattern.len() != segments.len() {
        return None;
    }
    let mut params = PathParams::default();
    for (expected, actual) in pattern.iter().zip(segments) {
        match *expected {
            "{database}" => params.database = Some(actual.clone()),
            "{table}" | "{view}" => params.object = Some(actual.clone()),
            "{branch}" => params.branch = Some(actual.clone()),
            literal if literal == actual => {}
            _ => return None,
        }
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn resolve() {
        let router = Router::new("lakecat");

        assert_eq!(
            router.resolve(&Method::GET, "/v1/config"),
            RouteMatch::Found(Endpoint::Config, PathParams::default())
        );
        assert_eq!(
            router.resolve(&Method::POST, "/v1/lakecat/databases/db/tables/t%24branch_b1/commit"),
            RouteMatch::Found(
                Endpoint::CommitTable,
                PathParams {
                    database: Some("db".into()),
                    object: Some("t$branch_b1".into()),
                    branch: None,
                }
            )
        );
        assert_eq!(
            router.resolve(&Method::DELETE, "/v1/lakecat/databases/db/tables/t/branches/b1"),
            RouteMatch::Found(
                Endpoint::DropBranch,
                PathParams {
                    database: Some("db".into()),
                    object: Some("t".into()),
                    branch: Some("b1".into()),
                }
            )
        );
        assert_eq!(
            router.resolve(&Method::POST, "/v1/lakecat/databases/db/tables/t/partitions/drop"),
            RouteMatch::Found(
                Endpoint::DropPartitions,
                PathParams {
                    database: Some("db".into()),
                    object: Some("t".into()),
                    branch: None,
                }
            )
        );
    }

    #[test]
    fn unknown_paths_and_methods() {
        let router = Router::new("lakecat");
        assert_eq!(
            router.resolve(&Method::GET, "/v1/other/databases"),
            RouteMatch::NotFound
        );
        assert_eq!(
            router.resolve(&Method::GET, "/v1/lakecat/databases/db/nothing"),
            RouteMatch::NotFound
        );
        assert_eq!(
            router.resolve(&Method::PUT, "/v1/lakecat/databases"),
            RouteMatch::MethodNotAllowed
        );
        assert_eq!(
            router.resolve(&Method::POST, "/v1/config"),
            RouteMatch::MethodNotAllowed
        );
    }
}
