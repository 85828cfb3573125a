//! A [`Catalog`] backed by a remote catalog service
//!
//! [`RestCatalog`] speaks the catalog API over any [`Transport`]: [`HttpTransport`] for a server
//! reached over the network, or a `CatalogService` for an in-process one. Error responses are
//! mapped back onto the matching [`CatalogError`], so callers see the same errors as they would
//! from a local backend.
mod transport;

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use http::{
    HeaderName, HeaderValue, Method, Request, Response, StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use lakecat_catalog::{
    Branch, Catalog, CatalogError, Database, Identifier, Partition, PartitionSpec,
    PartitionStatistics, PropertyChange, Schema, SchemaChange, Snapshot, Table, Token, View,
    ViewSchema,
};
use lakecat_time::TimeProvider;
use lakecat_types::{
    DEFAULT_PREFIX, ErrorResponse, ResourcePaths, ResourceType, Transport, TransportError,
    http::{
        AlterDatabaseRequest, AlterPartitionsRequest, AlterTableRequest, CommitTableRequest,
        CommitTableResponse, ConfigResponse, CreateBranchRequest, CreateDatabaseRequest,
        CreateTableRequest, CreateViewRequest, GetBranchResponse, GetDatabaseResponse,
        GetSnapshotResponse, GetTableResponse, GetTableTokenResponse, GetViewResponse,
        ListBranchesResponse, ListDatabasesResponse, ListPartitionsResponse, ListTablesResponse,
        ListViewsResponse, PartitionsRequest, RenameRequest,
    },
};
use object_store::ObjectStore;
use secrecy::{ExposeSecret, Secret};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info};

pub use transport::HttpTransport;

/// Errors setting up a [`RestCatalog`] or its transport
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("base URL error: {0}")]
    BaseUrl(#[source] reqwest::Error),

    #[error("failed to fetch the catalog config: {0}")]
    Transport(#[from] TransportError),

    #[error("catalog config request failed with status {status}: {message}")]
    Config { status: StatusCode, message: String },

    #[error("failed to parse the catalog config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid header '{name}' in the catalog config")]
    InvalidHeader { name: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// A [`Catalog`] that forwards every operation to a catalog service
#[derive(Debug)]
pub struct RestCatalog {
    transport: Arc<dyn Transport>,
    /// The `Bearer` token sent with each request
    token: Secret<String>,
    paths: ResourcePaths,
    /// Headers the service asked to receive with each request
    headers: Vec<(HeaderName, HeaderValue)>,
    config: ConfigResponse,
    /// The warehouse store tables read their snapshots and manifests from
    store: Arc<dyn ObjectStore>,
    time_provider: Arc<dyn TimeProvider>,
}

impl RestCatalog {
    /// Connect to the service behind `transport`, fetching its config
    pub async fn try_new(
        transport: Arc<dyn Transport>,
        token: Secret<String>,
        store: Arc<dyn ObjectStore>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(ResourcePaths::config())
            .header(AUTHORIZATION, bearer(&token))
            .body(Bytes::new())
            .map_err(|_| Error::InvalidHeader {
                name: AUTHORIZATION.to_string(),
            })?;
        let response = transport.send(request).await?;
        if response.status() != StatusCode::OK {
            return Err(Error::Config {
                status: response.status(),
                message: String::from_utf8_lossy(response.body()).to_string(),
            });
        }
        let config: ConfigResponse = serde_json::from_slice(response.body())?;

        let headers = config
            .headers()
            .into_iter()
            .map(|(name, value)| {
                let header = HeaderName::from_bytes(name.as_bytes())
                    .ok()
                    .zip(HeaderValue::from_str(&value).ok());
                header.ok_or(Error::InvalidHeader { name })
            })
            .collect::<Result<Vec<_>>>()?;
        let prefix = config.prefix().unwrap_or(DEFAULT_PREFIX);
        info!(prefix, headers = headers.len(), "connected to catalog service");

        Ok(Self {
            transport,
            token,
            paths: ResourcePaths::new(prefix),
            headers,
            config,
            store,
            time_provider,
        })
    }

    pub fn config(&self) -> &ConfigResponse {
        &self.config
    }

    pub fn paths(&self) -> &ResourcePaths {
        &self.paths
    }

    async fn execute<B: Serialize + Sync>(
        &self,
        method: Method,
        path: String,
        body: Option<&B>,
    ) -> CatalogResult<Response<Bytes>> {
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(path.as_str())
            .header(AUTHORIZATION, bearer(&self.token));
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        let body = match body {
            Some(body) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Bytes::from(serde_json::to_vec(body)?)
            }
            None => Bytes::new(),
        };
        let request = builder
            .body(body)
            .map_err(|e| CatalogError::invalid_argument(format!("invalid request {path}: {e}")))?;

        debug!(%method, %path, "catalog request");
        self.transport
            .send(request)
            .await
            .map_err(|e| CatalogError::Service {
                status: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
                message: e.to_string(),
            })
    }

    /// Send a request and decode the JSON body of a successful response
    async fn call<B, T>(
        &self,
        method: Method,
        path: String,
        body: Option<&B>,
        context: Option<&Identifier>,
    ) -> CatalogResult<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self.execute(method, path, body).await?;
        if !response.status().is_success() {
            return Err(map_error(response.status(), response.body(), context));
        }
        Ok(serde_json::from_slice(response.body())?)
    }

    /// Send a request whose successful response carries no body
    async fn call_empty<B: Serialize + Sync>(
        &self,
        method: Method,
        path: String,
        body: Option<&B>,
        context: Option<&Identifier>,
    ) -> CatalogResult<()> {
        let response = self.execute(method, path, body).await?;
        if !response.status().is_success() {
            return Err(map_error(response.status(), response.body(), context));
        }
        Ok(())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: String,
        context: Option<&Identifier>,
    ) -> CatalogResult<T> {
        self.call::<(), T>(Method::GET, path, None, context).await
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: String,
        body: &B,
        context: Option<&Identifier>,
    ) -> CatalogResult<()> {
        self.call_empty(Method::POST, path, Some(body), context)
            .await
    }

    async fn delete(&self, path: String, context: Option<&Identifier>) -> CatalogResult<()> {
        self.call_empty::<()>(Method::DELETE, path, None, context)
            .await
    }
}

fn bearer(token: &Secret<String>) -> String {
    format!("Bearer {}", token.expose_secret())
}

/// Turn `condition` into success when `ignore` is set
fn ignore_if(
    result: CatalogResult<()>,
    ignore: bool,
    condition: impl Fn(&CatalogError) -> bool,
) -> CatalogResult<()> {
    match result {
        Err(e) if ignore && condition(&e) => Ok(()),
        other => other,
    }
}

/// Map an error response back onto the [`CatalogError`] the service raised
///
/// `context` is the table or view the request was about, it completes errors whose resource
/// name alone does not identify the object, e.g. missing columns.
fn map_error(status: StatusCode, body: &Bytes, context: Option<&Identifier>) -> CatalogError {
    let Ok(response) = serde_json::from_slice::<ErrorResponse>(body) else {
        return CatalogError::Service {
            status: status.as_u16(),
            message: String::from_utf8_lossy(body).to_string(),
        };
    };
    let name = response.resource_name.clone().unwrap_or_default();
    let identifier = || {
        name.parse::<Identifier>()
            .ok()
            .or_else(|| context.cloned())
    };
    let unmapped = || CatalogError::Service {
        status: status.as_u16(),
        message: response.message.clone(),
    };

    match (status, response.resource_type) {
        (StatusCode::NOT_FOUND, Some(ResourceType::Database)) => {
            CatalogError::DatabaseNotExist { database: name }
        }
        (StatusCode::NOT_FOUND, Some(ResourceType::Table)) => identifier()
            .map(|identifier| CatalogError::TableNotExist { identifier })
            .unwrap_or_else(unmapped),
        (StatusCode::NOT_FOUND, Some(ResourceType::View)) => identifier()
            .map(|identifier| CatalogError::ViewNotExist { identifier })
            .unwrap_or_else(unmapped),
        (StatusCode::NOT_FOUND, Some(ResourceType::Column)) => context
            .map(|identifier| CatalogError::ColumnNotExist {
                identifier: identifier.clone(),
                column: name.clone(),
            })
            .unwrap_or_else(unmapped),
        (StatusCode::NOT_FOUND, Some(ResourceType::Snapshot)) => context
            .zip(name.parse().ok())
            .map(|(identifier, snapshot_id)| CatalogError::SnapshotNotExist {
                identifier: identifier.clone(),
                snapshot_id,
            })
            .unwrap_or_else(unmapped),
        (StatusCode::CONFLICT, Some(ResourceType::Database)) => {
            CatalogError::DatabaseAlreadyExist { database: name }
        }
        (StatusCode::CONFLICT, Some(ResourceType::Table)) => identifier()
            .map(|identifier| CatalogError::TableAlreadyExist { identifier })
            .unwrap_or_else(unmapped),
        (StatusCode::CONFLICT, Some(ResourceType::View)) => identifier()
            .map(|identifier| CatalogError::ViewAlreadyExist { identifier })
            .unwrap_or_else(unmapped),
        (StatusCode::CONFLICT, Some(ResourceType::Column)) => context
            .map(|identifier| CatalogError::ColumnAlreadyExist {
                identifier: identifier.clone(),
                column: name.clone(),
            })
            .unwrap_or_else(unmapped),
        (StatusCode::BAD_REQUEST, Some(ResourceType::Database)) => {
            CatalogError::DatabaseNotEmpty { database: name }
        }
        (StatusCode::BAD_REQUEST, _) => CatalogError::InvalidArgument {
            message: response.message,
        },
        (StatusCode::NOT_IMPLEMENTED, _) => CatalogError::Unsupported {
            message: response.message,
        },
        (StatusCode::INTERNAL_SERVER_ERROR, _) => CatalogError::Internal {
            message: response.message,
        },
        _ => unmapped(),
    }
}

#[async_trait]
impl Catalog for RestCatalog {
    async fn list_databases(&self) -> CatalogResult<Vec<String>> {
        let response: ListDatabasesResponse = self.get(self.paths.databases(), None).await?;
        Ok(response.databases)
    }

    async fn create_database(
        &self,
        name: &str,
        ignore_if_exists: bool,
        options: BTreeMap<String, String>,
    ) -> CatalogResult<()> {
        let request = CreateDatabaseRequest {
            name: name.to_string(),
            ignore_if_exists,
            options,
        };
        let result = self.post(self.paths.databases(), &request, None).await;
        ignore_if(result, ignore_if_exists, |e| {
            matches!(e, CatalogError::DatabaseAlreadyExist { .. })
        })
    }

    async fn get_database(&self, name: &str) -> CatalogResult<Arc<Database>> {
        let response: GetDatabaseResponse = self.get(self.paths.database(name), None).await?;
        Ok(Arc::new(response.into()))
    }

    async fn drop_database(
        &self,
        name: &str,
        ignore_if_not_exists: bool,
        cascade: bool,
    ) -> CatalogResult<()> {
        let result: CatalogResult<()> = async {
            if !cascade {
                // the service always drops with cascade
                let empty = self.list_tables(name).await?.is_empty()
                    && self.list_views(name).await?.is_empty();
                if !empty {
                    return Err(CatalogError::DatabaseNotEmpty {
                        database: name.to_string(),
                    });
                }
            }
            self.delete(self.paths.database(name), None).await
        }
        .await;
        ignore_if(result, ignore_if_not_exists, |e| {
            matches!(e, CatalogError::DatabaseNotExist { .. })
        })
    }

    async fn alter_database(
        &self,
        name: &str,
        changes: Vec<PropertyChange>,
        ignore_if_not_exists: bool,
    ) -> CatalogResult<()> {
        let result = self
            .post(
                self.paths.database(name),
                &AlterDatabaseRequest { changes },
                None,
            )
            .await;
        ignore_if(result, ignore_if_not_exists, |e| {
            matches!(e, CatalogError::DatabaseNotExist { .. })
        })
    }

    async fn list_tables(&self, database: &str) -> CatalogResult<Vec<String>> {
        let response: ListTablesResponse = self.get(self.paths.tables(database), None).await?;
        Ok(response.tables)
    }

    async fn get_table(&self, identifier: &Identifier) -> CatalogResult<Arc<Table>> {
        let origin = identifier.without_system_table();
        let response: GetTableResponse = self
            .get(self.paths.table(&origin), Some(&origin))
            .await?;
        let table = Table::new(
            &response.identifier,
            Arc::new(response.metadata),
            Arc::clone(&self.store),
            Arc::clone(&self.time_provider),
        );
        if identifier.is_system_table() {
            table.load_system_table(identifier)
        } else {
            Ok(Arc::new(table))
        }
    }

    async fn create_table(
        &self,
        identifier: &Identifier,
        schema: Schema,
        ignore_if_exists: bool,
    ) -> CatalogResult<()> {
        let request = CreateTableRequest {
            identifier: identifier.clone(),
            schema,
        };
        let result = self
            .post(
                self.paths.tables(identifier.database()),
                &request,
                Some(identifier),
            )
            .await;
        ignore_if(result, ignore_if_exists, |e| {
            matches!(e, CatalogError::TableAlreadyExist { .. })
        })
    }

    async fn drop_table(
        &self,
        identifier: &Identifier,
        ignore_if_not_exists: bool,
    ) -> CatalogResult<()> {
        let result = self
            .delete(self.paths.table(identifier), Some(identifier))
            .await;
        ignore_if(result, ignore_if_not_exists, |e| {
            matches!(e, CatalogError::TableNotExist { .. })
        })
    }

    async fn rename_table(
        &self,
        from: &Identifier,
        to: &Identifier,
        ignore_if_not_exists: bool,
    ) -> CatalogResult<()> {
        let request = RenameRequest {
            destination: to.clone(),
        };
        let result = self
            .post(self.paths.rename_table(from), &request, Some(from))
            .await;
        ignore_if(result, ignore_if_not_exists, |e| {
            matches!(e, CatalogError::TableNotExist { identifier } if identifier == from)
        })
    }

    async fn alter_table(
        &self,
        identifier: &Identifier,
        changes: Vec<SchemaChange>,
        ignore_if_not_exists: bool,
    ) -> CatalogResult<()> {
        let result = self
            .post(
                self.paths.table(identifier),
                &AlterTableRequest { changes },
                Some(identifier),
            )
            .await;
        ignore_if(result, ignore_if_not_exists, |e| {
            matches!(e, CatalogError::TableNotExist { .. })
        })
    }

    async fn list_views(&self, database: &str) -> CatalogResult<Vec<String>> {
        let response: ListViewsResponse = self.get(self.paths.views(database), None).await?;
        Ok(response.views)
    }

    async fn get_view(&self, identifier: &Identifier) -> CatalogResult<Arc<View>> {
        let view: GetViewResponse = self
            .get(self.paths.view(identifier), Some(identifier))
            .await?;
        Ok(Arc::new(view))
    }

    async fn create_view(
        &self,
        identifier: &Identifier,
        schema: ViewSchema,
        ignore_if_exists: bool,
    ) -> CatalogResult<()> {
        let request = CreateViewRequest {
            identifier: identifier.clone(),
            schema,
        };
        let result = self
            .post(
                self.paths.views(identifier.database()),
                &request,
                Some(identifier),
            )
            .await;
        ignore_if(result, ignore_if_exists, |e| {
            matches!(e, CatalogError::ViewAlreadyExist { .. })
        })
    }

    async fn drop_view(
        &self,
        identifier: &Identifier,
        ignore_if_not_exists: bool,
    ) -> CatalogResult<()> {
        let result = self
            .delete(self.paths.view(identifier), Some(identifier))
            .await;
        ignore_if(result, ignore_if_not_exists, |e| {
            matches!(e, CatalogError::ViewNotExist { .. })
        })
    }

    async fn rename_view(
        &self,
        from: &Identifier,
        to: &Identifier,
        ignore_if_not_exists: bool,
    ) -> CatalogResult<()> {
        let request = RenameRequest {
            destination: to.clone(),
        };
        let result = self
            .post(self.paths.rename_view(from), &request, Some(from))
            .await;
        ignore_if(result, ignore_if_not_exists, |e| {
            matches!(e, CatalogError::ViewNotExist { identifier } if identifier == from)
        })
    }

    async fn list_partitions(&self, identifier: &Identifier) -> CatalogResult<Vec<Partition>> {
        let response: ListPartitionsResponse = self
            .get(self.paths.partitions(identifier), Some(identifier))
            .await?;
        Ok(response.partitions)
    }

    async fn create_partitions(
        &self,
        identifier: &Identifier,
        specs: Vec<PartitionSpec>,
    ) -> CatalogResult<()> {
        self.post(
            self.paths.partitions(identifier),
            &PartitionsRequest { specs },
            Some(identifier),
        )
        .await
    }

    async fn drop_partitions(
        &self,
        identifier: &Identifier,
        specs: Vec<PartitionSpec>,
    ) -> CatalogResult<()> {
        self.post(
            self.paths.drop_partitions(identifier),
            &PartitionsRequest { specs },
            Some(identifier),
        )
        .await
    }

    async fn alter_partitions(
        &self,
        identifier: &Identifier,
        partitions: Vec<PartitionStatistics>,
    ) -> CatalogResult<()> {
        self.post(
            self.paths.alter_partitions(identifier),
            &AlterPartitionsRequest { partitions },
            Some(identifier),
        )
        .await
    }

    async fn mark_done_partitions(
        &self,
        identifier: &Identifier,
        specs: Vec<PartitionSpec>,
    ) -> CatalogResult<()> {
        self.post(
            self.paths.mark_done_partitions(identifier),
            &PartitionsRequest { specs },
            Some(identifier),
        )
        .await
    }

    async fn list_branches(&self, identifier: &Identifier) -> CatalogResult<Vec<String>> {
        let response: ListBranchesResponse = self
            .get(self.paths.branches(identifier), Some(identifier))
            .await?;
        Ok(response.branches)
    }

    async fn get_branch(&self, identifier: &Identifier, branch: &str) -> CatalogResult<Branch> {
        let branch: GetBranchResponse = self
            .get(self.paths.branch(identifier, branch), Some(identifier))
            .await?;
        Ok(branch)
    }

    async fn create_branch(
        &self,
        identifier: &Identifier,
        branch: &str,
        from_tag: Option<&str>,
    ) -> CatalogResult<()> {
        let request = CreateBranchRequest {
            branch: branch.to_string(),
            from_tag: from_tag.map(ToString::to_string),
        };
        self.post(self.paths.branches(identifier), &request, Some(identifier))
            .await
    }

    async fn drop_branch(&self, identifier: &Identifier, branch: &str) -> CatalogResult<()> {
        self.delete(self.paths.branch(identifier, branch), Some(identifier))
            .await
    }

    async fn fast_forward(&self, identifier: &Identifier, branch: &str) -> CatalogResult<()> {
        self.call_empty::<()>(
            Method::POST,
            self.paths.branch(identifier, branch),
            None,
            Some(identifier),
        )
        .await
    }

    async fn load_snapshot(&self, identifier: &Identifier) -> CatalogResult<Option<Arc<Snapshot>>> {
        let response = self
            .execute::<()>(Method::GET, self.paths.table_snapshot(identifier), None)
            .await?;
        match response.status() {
            StatusCode::OK => {
                let response: GetSnapshotResponse = serde_json::from_slice(response.body())?;
                Ok(Some(Arc::new(response.snapshot)))
            }
            StatusCode::NOT_FOUND if is_snapshot_error(&response) => Ok(None),
            status => Err(map_error(status, response.body(), Some(identifier))),
        }
    }

    async fn commit_snapshot(
        &self,
        identifier: &Identifier,
        snapshot: Snapshot,
        statistics: Vec<PartitionStatistics>,
    ) -> CatalogResult<bool> {
        let request = CommitTableRequest {
            branch: identifier.branch().map(ToString::to_string),
            snapshot,
            statistics,
        };
        let response: CommitTableResponse = self
            .call(
                Method::POST,
                self.paths.commit_table(identifier),
                Some(&request),
                Some(identifier),
            )
            .await?;
        Ok(response.success)
    }

    async fn get_token(&self, identifier: &Identifier) -> CatalogResult<Arc<Token>> {
        let response: GetTableTokenResponse = self
            .get(self.paths.table_token(identifier), Some(identifier))
            .await?;
        Ok(Arc::new(response.into()))
    }
}

fn is_snapshot_error(response: &Response<Bytes>) -> bool {
    serde_json::from_slice::<ErrorResponse>(response.body())
        .is_ok_and(|e| e.resource_type == Some(ResourceType::Snapshot))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use lakecat_cache::{CacheOptions, CachingCatalog};
    use lakecat_catalog::{
        CommitKind, DataField, ErrorKind, MemCatalog, SystemTableType, TableKind,
    };
    use lakecat_server::{CatalogService, ServiceConfig};
    use lakecat_time::{MockProvider, Time};
    use mockito::Server;
    use object_store::{memory::InMemory, path::Path};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    const TOKEN: &str = "super-secret-token";

    fn time_provider() -> Arc<MockProvider> {
        Arc::new(MockProvider::new(Time::from_timestamp_nanos(0)))
    }

    fn schema() -> Schema {
        Schema::new(vec![
            DataField::new(0, "dt", "STRING"),
            DataField::new(1, "v", "INT"),
        ])
    }

    /// A client talking to an in-process service over a shared warehouse store
    async fn connect() -> (Arc<MemCatalog>, RestCatalog) {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let time_provider = time_provider();
        let backend = Arc::new(MemCatalog::with_object_store(
            Arc::clone(&store),
            Path::from("warehouse"),
            Arc::clone(&time_provider) as _,
        ));
        let service = CatalogService::new(
            Arc::clone(&backend) as _,
            ServiceConfig::new("lakecat", "warehouse", Secret::new(TOKEN.to_string())),
        );
        let client = RestCatalog::try_new(
            Arc::new(service),
            Secret::new(TOKEN.to_string()),
            store,
            time_provider,
        )
        .await
        .unwrap();
        (backend, client)
    }

    #[tokio::test]
    async fn sends_token_and_config_headers() {
        let mut mock_server = Server::new_async().await;
        let config = mock_server
            .mock("GET", "/v1/config")
            .match_header("Authorization", format!("Bearer {TOKEN}").as_str())
            .with_status(200)
            .with_body(
                json!({
                    "defaults": {"prefix": "custom", "header.x-tenant": "t1"},
                    "overrides": {},
                })
                .to_string(),
            )
            .create_async()
            .await;
        let list = mock_server
            .mock("GET", "/v1/custom/databases")
            .match_header("Authorization", format!("Bearer {TOKEN}").as_str())
            .match_header("x-tenant", "t1")
            .with_status(200)
            .with_body(r#"{"databases": ["a", "b"]}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new(mock_server.url()).expect("create transport");
        let client = RestCatalog::try_new(
            Arc::new(transport),
            Secret::new(TOKEN.to_string()),
            Arc::new(InMemory::new()),
            time_provider(),
        )
        .await
        .expect("fetch config");
        assert_eq!(client.paths().base(), "/v1/custom");

        let databases = client.list_databases().await.unwrap();
        assert_eq!(databases, vec!["a".to_string(), "b".to_string()]);

        config.assert_async().await;
        list.assert_async().await;
    }

    #[tokio::test]
    async fn maps_error_responses() {
        let mut mock_server = Server::new_async().await;
        let _config = mock_server
            .mock("GET", "/v1/config")
            .with_status(200)
            .with_body(r#"{"defaults": {}, "overrides": {}}"#)
            .create_async()
            .await;
        let _missing = mock_server
            .mock("GET", "/v1/lakecat/databases/missing")
            .with_status(404)
            .with_body(
                json!({
                    "resourceType": "DATABASE",
                    "resourceName": "missing",
                    "message": "Database missing does not exist.",
                    "code": 404,
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _broken = mock_server
            .mock("GET", "/v1/lakecat/databases/broken")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let transport = HttpTransport::new(mock_server.url()).expect("create transport");
        let client = RestCatalog::try_new(
            Arc::new(transport),
            Secret::new(TOKEN.to_string()),
            Arc::new(InMemory::new()),
            time_provider(),
        )
        .await
        .expect("fetch config");

        let err = client.get_database("missing").await.unwrap_err();
        assert!(
            matches!(&err, CatalogError::DatabaseNotExist { database } if database == "missing"),
            "{err:?}"
        );

        let err = client.get_database("broken").await.unwrap_err();
        assert!(
            matches!(
                &err,
                CatalogError::Service { status: 502, message } if message == "bad gateway"
            ),
            "{err:?}"
        );
        assert_eq!(err.kind(), ErrorKind::Unrecognized);
    }

    #[test]
    fn map_error_uses_the_request_context() {
        let identifier = Identifier::new("db", "t");
        let body = |resource_type: ResourceType, name: &str| {
            Bytes::from(
                serde_json::to_vec(
                    &ErrorResponse::new(404, "gone").with_resource(resource_type, name),
                )
                .unwrap(),
            )
        };

        let err = map_error(
            StatusCode::NOT_FOUND,
            &body(ResourceType::Column, "c"),
            Some(&identifier),
        );
        assert!(
            matches!(
                &err,
                CatalogError::ColumnNotExist { identifier: id, column }
                    if *id == identifier && column == "c"
            ),
            "{err:?}"
        );

        let err = map_error(
            StatusCode::NOT_FOUND,
            &body(ResourceType::Snapshot, "7"),
            Some(&identifier),
        );
        assert!(
            matches!(err, CatalogError::SnapshotNotExist { snapshot_id: 7, .. }),
            "{err:?}"
        );

        let err = map_error(
            StatusCode::NOT_FOUND,
            &body(ResourceType::Table, "db.t$branch_b1"),
            None,
        );
        assert_eq!(err.to_string(), "Table db.t$branch_b1 does not exist.");
    }

    #[tokio::test]
    async fn rejects_a_wrong_token() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let backend = Arc::new(MemCatalog::new(time_provider()));
        let service = CatalogService::new(
            backend as _,
            ServiceConfig::new("lakecat", "warehouse", Secret::new(TOKEN.to_string())),
        );
        let err = RestCatalog::try_new(
            Arc::new(service),
            Secret::new("wrong".to_string()),
            store,
            time_provider(),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(err, Error::Config { status: StatusCode::UNAUTHORIZED, .. }),
            "{err:?}"
        );
    }

    #[test_log::test(tokio::test)]
    async fn round_trip_reproduces_typed_errors() {
        let (_, client) = connect().await;

        client
            .create_database("db", false, BTreeMap::new())
            .await
            .unwrap();
        client
            .create_database("db", true, BTreeMap::new())
            .await
            .unwrap();
        let err = client
            .create_database("db", false, BTreeMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Database db already exists.");
        assert!(err.is_already_exist());

        let identifier = Identifier::new("db", "t");
        let err = client.get_table(&identifier).await.unwrap_err();
        assert_eq!(err.to_string(), "Table db.t does not exist.");

        client
            .create_table(&identifier, schema(), false)
            .await
            .unwrap();
        client
            .create_table(&identifier, schema(), true)
            .await
            .unwrap();
        let err = client
            .create_table(&identifier, schema(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::TableAlreadyExist { .. }), "{err:?}");

        let err = client
            .alter_table(
                &identifier,
                vec![SchemaChange::DropColumn {
                    name: "nope".into(),
                }],
                false,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Column nope does not exist in the db.t table."
        );

        let err = client.drop_database("db", false, false).await.unwrap_err();
        assert!(
            matches!(&err, CatalogError::DatabaseNotEmpty { database } if database == "db"),
            "{err:?}"
        );

        let err = client.list_partitions(&identifier).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        let missing = Identifier::new("db", "missing");
        client.drop_table(&missing, true).await.unwrap();
        client
            .rename_table(&missing, &Identifier::new("db", "other"), true)
            .await
            .unwrap();
        let err = client.drop_table(&missing, false).await.unwrap_err();
        assert!(err.is_not_exist());

        client.drop_database("db", false, true).await.unwrap();
        client.drop_database("db", true, false).await.unwrap();
        let err = client.get_database("db").await.unwrap_err();
        assert!(matches!(err, CatalogError::DatabaseNotExist { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn tables_read_the_shared_warehouse() {
        let (_, client) = connect().await;
        client
            .create_database("db", false, BTreeMap::new())
            .await
            .unwrap();
        let identifier = Identifier::new("db", "t");
        client
            .create_table(&identifier, schema(), false)
            .await
            .unwrap();
        assert_eq!(client.load_snapshot(&identifier).await.unwrap(), None);

        let table = client.get_table(&identifier).await.unwrap();
        let snapshot = table
            .new_snapshot(CommitKind::Append, vec![Bytes::from_static(b"manifest")], 3)
            .await
            .unwrap();
        assert!(
            client
                .commit_snapshot(&identifier, snapshot.clone(), vec![])
                .await
                .unwrap()
        );
        assert!(
            !client
                .commit_snapshot(&identifier, snapshot, vec![])
                .await
                .unwrap()
        );

        let latest = client.load_snapshot(&identifier).await.unwrap().unwrap();
        assert_eq!(latest.id, 1);
        assert_eq!(latest.total_record_count, 3);

        let plan = table.scan().await.unwrap();
        assert_eq!(plan.manifests.len(), 1);
        assert_eq!(plan.manifests[0].content, Bytes::from_static(b"manifest"));

        let files = client
            .get_table(&Identifier::new("db", "t$FILES"))
            .await
            .unwrap();
        assert_eq!(files.kind(), &TableKind::System(SystemTableType::Files));

        let token = client.get_token(&identifier).await.unwrap();
        assert!(token.expire_at_millis > 0);
    }

    #[tokio::test]
    async fn branches_and_views() {
        let (backend, client) = connect().await;
        client
            .create_database("db", false, BTreeMap::new())
            .await
            .unwrap();
        let identifier = Identifier::new("db", "t");
        client
            .create_table(&identifier, schema(), false)
            .await
            .unwrap();
        let table = client.get_table(&identifier).await.unwrap();
        let snapshot = table
            .new_snapshot(CommitKind::Append, vec![], 1)
            .await
            .unwrap();
        assert!(
            client
                .commit_snapshot(&identifier, snapshot, vec![])
                .await
                .unwrap()
        );
        backend.create_tag(&identifier, "t1", None).await.unwrap();

        client
            .create_branch(&identifier, "b1", Some("t1"))
            .await
            .unwrap();
        assert_eq!(
            client.list_branches(&identifier).await.unwrap(),
            vec!["b1".to_string()]
        );
        let branch = client.get_branch(&identifier, "b1").await.unwrap();
        assert_eq!(branch.from_tag.as_deref(), Some("t1"));
        let err = client
            .create_branch(&identifier, "b2", Some("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let on_branch = Identifier::new("db", "t$branch_b1");
        let latest = client.load_snapshot(&on_branch).await.unwrap().unwrap();
        assert_eq!(latest.id, 1);

        client.drop_table(&identifier, false).await.unwrap();
        let err = client
            .get_table(&Identifier::new("db", "t$branch_b1$snapshots"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Table db.t$branch_b1 does not exist.");

        let view = Identifier::new("db", "v");
        let schema = ViewSchema {
            fields: vec![DataField::new(0, "a", "INT")],
            query: "SELECT 1 AS a".into(),
            ..Default::default()
        };
        client.create_view(&view, schema.clone(), false).await.unwrap();
        assert_eq!(client.get_view(&view).await.unwrap().schema, schema);
        let err = client.create_view(&view, schema, false).await.unwrap_err();
        assert!(matches!(err, CatalogError::ViewAlreadyExist { .. }), "{err:?}");

        let renamed = Identifier::new("db", "v2");
        client.rename_view(&view, &renamed, false).await.unwrap();
        assert_eq!(client.list_views("db").await.unwrap(), vec!["v2".to_string()]);
        client.drop_view(&view, true).await.unwrap();
        let err = client.get_view(&view).await.unwrap_err();
        assert_eq!(err.to_string(), "View db.v does not exist.");
    }

    #[tokio::test]
    async fn caching_catalog_over_the_client() {
        let (backend, client) = connect().await;
        let time_provider = time_provider();
        let options = CacheOptions {
            expire_after_access: Duration::from_secs(60),
            ..Default::default()
        };
        let caching =
            CachingCatalog::try_new(Arc::new(client), options, Arc::clone(&time_provider) as _)
                .unwrap();

        caching
            .create_database("db", false, BTreeMap::new())
            .await
            .unwrap();
        let identifier = Identifier::new("db", "t");
        caching
            .create_table(&identifier, schema(), false)
            .await
            .unwrap();
        let first = caching.get_table(&identifier).await.unwrap();

        // a write behind the cache's back stays invisible until expiry
        backend.drop_table(&identifier, false).await.unwrap();
        let second = caching.get_table(&identifier).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        time_provider.inc(Duration::from_secs(61));
        let err = caching.get_table(&identifier).await.unwrap_err();
        assert!(matches!(err, CatalogError::TableNotExist { .. }), "{err:?}");
    }
}
