//! HTTP request handling for the catalog API
use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::{
    HeaderValue, Request, Response, StatusCode,
    header::{CONTENT_LENGTH, CONTENT_TYPE},
};
use hyper::{Body, body::HttpBody};
use lakecat_catalog::{Catalog, CatalogError, ErrorKind, Identifier, MAIN_BRANCH};
use lakecat_types::{
    ErrorResponse, ResourceType, Transport, TransportError,
    http::{
        AlterDatabaseRequest, AlterPartitionsRequest, AlterTableRequest, CommitTableRequest,
        CommitTableResponse, ConfigResponse, CreateBranchRequest, CreateDatabaseRequest,
        CreateTableRequest, CreateViewRequest, GetDatabaseResponse, GetSnapshotResponse,
        GetTableResponse, GetTableTokenResponse, HEADER_CONFIG_PREFIX, ListBranchesResponse,
        ListDatabasesResponse, ListPartitionsResponse, ListTablesResponse, ListViewsResponse,
        PREFIX_CONFIG, PartitionsRequest, RenameRequest, WAREHOUSE_CONFIG,
    },
};
use secrecy::Secret;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, error, trace};

use crate::{
    auth::{AuthenticationError, BearerAuthenticator},
    routes::{Endpoint, PathParams, RouteMatch, Router},
};

/// Default limit on the size of a request body
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub(crate) enum Error {
    /// The requested path has no registered handler.
    #[error("not found")]
    NoHandler,

    /// The path exists, but not for the requested method.
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthenticationError),

    /// The request body could not be decoded.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("missing path parameter '{0}'")]
    MissingParameter(&'static str),

    /// The client sent a request body that exceeds the configured maximum.
    #[error("max request size ({0} bytes) exceeded")]
    RequestSizeExceeded(usize),

    /// The client disconnected.
    #[error("client disconnected")]
    ClientHangup(#[source] hyper::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

type Result<T, E = Error> = std::result::Result<T, E>;

trait IntoResponse {
    fn into_response(self) -> Response<Bytes>;
}

fn empty_response(status: StatusCode) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

fn ok() -> Response<Bytes> {
    empty_response(StatusCode::OK)
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<Bytes>> {
    let body = serde_json::to_vec(body).map_err(CatalogError::from)?;
    let mut response = Response::new(Bytes::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}

fn error_response(status: StatusCode, body: ErrorResponse) -> Response<Bytes> {
    json_response(status, &body).unwrap_or_else(|_| empty_response(status))
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response<Bytes> {
        let (status, resource) = match &self {
            Self::DatabaseNotExist { database } => (
                StatusCode::NOT_FOUND,
                Some((ResourceType::Database, database.clone())),
            ),
            Self::TableNotExist { identifier } => (
                StatusCode::NOT_FOUND,
                Some((ResourceType::Table, identifier.full_name())),
            ),
            Self::ColumnNotExist { column, .. } => (
                StatusCode::NOT_FOUND,
                Some((ResourceType::Column, column.clone())),
            ),
            Self::ViewNotExist { identifier } => (
                StatusCode::NOT_FOUND,
                Some((ResourceType::View, identifier.full_name())),
            ),
            Self::SnapshotNotExist { snapshot_id, .. } => (
                StatusCode::NOT_FOUND,
                Some((ResourceType::Snapshot, snapshot_id.to_string())),
            ),
            Self::DatabaseAlreadyExist { database } => (
                StatusCode::CONFLICT,
                Some((ResourceType::Database, database.clone())),
            ),
            Self::TableAlreadyExist { identifier } => (
                StatusCode::CONFLICT,
                Some((ResourceType::Table, identifier.full_name())),
            ),
            Self::ColumnAlreadyExist { column, .. } => (
                StatusCode::CONFLICT,
                Some((ResourceType::Column, column.clone())),
            ),
            Self::ViewAlreadyExist { identifier } => (
                StatusCode::CONFLICT,
                Some((ResourceType::View, identifier.full_name())),
            ),
            Self::DatabaseNotEmpty { database } => (
                StatusCode::BAD_REQUEST,
                Some((ResourceType::Database, database.clone())),
            ),
            Self::InvalidArgument { .. } => (StatusCode::BAD_REQUEST, None),
            Self::Unsupported { .. } => (StatusCode::NOT_IMPLEMENTED, None),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
            Self::Service { .. } | Self::ObjectStore(_) | Self::Serde(_) => {
                return empty_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };
        let mut body = ErrorResponse::new(status.as_u16(), self.to_string());
        if let Some((resource_type, name)) = resource {
            body = body.with_resource(resource_type, name);
        }
        error_response(status, body)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response<Bytes> {
        match self {
            Self::NoHandler => empty_response(StatusCode::NOT_FOUND),
            Self::MethodNotAllowed => empty_response(StatusCode::METHOD_NOT_ALLOWED),
            Self::Authentication(_) => empty_response(StatusCode::UNAUTHORIZED),
            Self::InvalidBody(_) | Self::MissingParameter(_) => error_response(
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(StatusCode::BAD_REQUEST.as_u16(), self.to_string()),
            ),
            Self::RequestSizeExceeded(_) => error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorResponse::new(StatusCode::PAYLOAD_TOO_LARGE.as_u16(), self.to_string()),
            ),
            Self::ClientHangup(_) => empty_response(StatusCode::BAD_REQUEST),
            Self::Catalog(err) => err.into_response(),
        }
    }
}

/// Settings of a [`CatalogService`]
#[derive(Debug)]
pub struct ServiceConfig {
    /// The path prefix of every resource, e.g. `/v1/lakecat/databases`
    pub prefix: String,
    /// The warehouse advertised to clients
    pub warehouse: String,
    /// Extra headers clients are told to send with every request
    pub headers: BTreeMap<String, String>,
    pub bearer_token: Secret<String>,
    pub max_request_bytes: usize,
}

impl ServiceConfig {
    pub fn new(
        prefix: impl Into<String>,
        warehouse: impl Into<String>,
        token: Secret<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            warehouse: warehouse.into(),
            headers: BTreeMap::new(),
            bearer_token: token,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
        }
    }
}

/// Serves the catalog API on top of any [`Catalog`]
///
/// The service is transport agnostic: [`CatalogService::handle`] maps a buffered request to a
/// buffered response. The hyper server and the in-process [`Transport`] both go through it.
#[derive(Debug)]
pub struct CatalogService {
    catalog: Arc<dyn Catalog>,
    router: Router,
    authenticator: BearerAuthenticator,
    config: ConfigResponse,
    max_request_bytes: usize,
}

impl CatalogService {
    pub fn new(catalog: Arc<dyn Catalog>, config: ServiceConfig) -> Self {
        let mut defaults = BTreeMap::from([
            (PREFIX_CONFIG.to_string(), config.prefix.clone()),
            (WAREHOUSE_CONFIG.to_string(), config.warehouse.clone()),
        ]);
        defaults.extend(
            config
                .headers
                .iter()
                .map(|(name, value)| (format!("{HEADER_CONFIG_PREFIX}{name}"), value.clone())),
        );
        Self {
            catalog,
            router: Router::new(&config.prefix),
            authenticator: BearerAuthenticator::new(&config.bearer_token),
            config: ConfigResponse {
                defaults,
                overrides: BTreeMap::new(),
            },
            max_request_bytes: config.max_request_bytes,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn config(&self) -> &ConfigResponse {
        &self.config
    }

    /// Handle a request, turning every failure into its error response
    pub async fn handle(&self, request: Request<Bytes>) -> Response<Bytes> {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        match self.route_request(request).await {
            Ok(response) => {
                debug!(%method, %path, status = %response.status(), "processed request");
                response
            }
            Err(err) => {
                log_error(&err, &method, &path);
                err.into_response()
            }
        }
    }

    /// Buffer a hyper request, applying the request size limit, and handle it
    pub(crate) async fn handle_hyper(&self, request: Request<Body>) -> Response<Body> {
        let (parts, body) = request.into_parts();
        let content_length = parts.headers.get(CONTENT_LENGTH).cloned();
        let read = self.read_body(body, content_length.as_ref()).await;
        let response = match read {
            Ok(bytes) => self.handle(Request::from_parts(parts, bytes)).await,
            Err(err) => {
                log_error(&err, &parts.method, parts.uri.path());
                err.into_response()
            }
        };
        response.map(Body::from)
    }

    async fn read_body(
        &self,
        mut body: Body,
        content_length: Option<&HeaderValue>,
    ) -> Result<Bytes> {
        let quarter_of_max = self.max_request_bytes / 4;
        let mut bytes = match content_length
            .and_then(|len| len.to_str().ok())
            .and_then(|len| len.parse::<usize>().ok())
        {
            Some(len) if len < quarter_of_max => BytesMut::with_capacity(len),
            _ => BytesMut::new(),
        };
        while let Some(chunk) = body.data().await {
            let chunk = chunk.map_err(Error::ClientHangup)?;
            if bytes.len() + chunk.len() > self.max_request_bytes {
                return Err(Error::RequestSizeExceeded(self.max_request_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes.freeze())
    }

    async fn route_request(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.authenticator.authenticate(request.headers())?;

        let (endpoint, params) = match self
            .router
            .resolve(request.method(), request.uri().path())
        {
            RouteMatch::Found(endpoint, params) => (endpoint, params),
            RouteMatch::NotFound => return Err(Error::NoHandler),
            RouteMatch::MethodNotAllowed => return Err(Error::MethodNotAllowed),
        };
        trace!(?endpoint, ?params, "routing request");
        let body = request.into_body();

        match endpoint {
            Endpoint::Config => json_response(StatusCode::OK, &self.config),
            Endpoint::ListDatabases => {
                let databases = self.catalog.list_databases().await?;
                json_response(StatusCode::OK, &ListDatabasesResponse { databases })
            }
            Endpoint::CreateDatabase => {
                let request: CreateDatabaseRequest = parse_body(&body)?;
                self.catalog
                    .create_database(&request.name, request.ignore_if_exists, request.options)
                    .await?;
                Ok(ok())
            }
            Endpoint::GetDatabase => {
                let database = self.catalog.get_database(database(&params)?).await?;
                json_response(StatusCode::OK, &GetDatabaseResponse::from(database.as_ref()))
            }
            Endpoint::DropDatabase => {
                self.catalog
                    .drop_database(database(&params)?, false, true)
                    .await?;
                Ok(ok())
            }
            Endpoint::AlterDatabase => {
                let request: AlterDatabaseRequest = parse_body(&body)?;
                self.catalog
                    .alter_database(database(&params)?, request.changes, false)
                    .await?;
                Ok(ok())
            }
            Endpoint::ListTables => {
                let tables = self.catalog.list_tables(database(&params)?).await?;
                json_response(StatusCode::OK, &ListTablesResponse { tables })
            }
            Endpoint::CreateTable => {
                let request: CreateTableRequest = parse_body(&body)?;
                let identifier =
                    Identifier::new(database(&params)?, &request.identifier.object_name());
                self.catalog
                    .create_table(&identifier, request.schema, false)
                    .await?;
                Ok(ok())
            }
            Endpoint::GetTable => {
                let table = self.catalog.get_table(&identifier(&params)?).await?;
                json_response(
                    StatusCode::OK,
                    &GetTableResponse {
                        identifier: table.identifier().clone(),
                        metadata: table.metadata().clone(),
                    },
                )
            }
            Endpoint::AlterTable => {
                let request: AlterTableRequest = parse_body(&body)?;
                self.catalog
                    .alter_table(&identifier(&params)?, request.changes, false)
                    .await?;
                Ok(ok())
            }
            Endpoint::DropTable => {
                self.catalog
                    .drop_table(&identifier(&params)?, false)
                    .await?;
                Ok(ok())
            }
            Endpoint::CommitTable => self.commit_table(&params, &body).await,
            Endpoint::RenameTable => {
                let request: RenameRequest = parse_body(&body)?;
                self.catalog
                    .rename_table(&identifier(&params)?, &request.destination, false)
                    .await?;
                Ok(ok())
            }
            Endpoint::GetTableToken => {
                let token = self.catalog.get_token(&identifier(&params)?).await?;
                json_response(StatusCode::OK, &GetTableTokenResponse::from(token.as_ref()))
            }
            Endpoint::LoadSnapshot => {
                let identifier = identifier(&params)?;
                match self.catalog.load_snapshot(&identifier).await? {
                    Some(snapshot) => json_response(
                        StatusCode::OK,
                        &GetSnapshotResponse {
                            snapshot: snapshot.as_ref().clone(),
                        },
                    ),
                    None => Ok(error_response(
                        StatusCode::NOT_FOUND,
                        ErrorResponse::new(
                            StatusCode::NOT_FOUND.as_u16(),
                            format!("Table {identifier} has no snapshot."),
                        )
                        .with_resource(ResourceType::Snapshot, identifier.full_name()),
                    )),
                }
            }
            Endpoint::ListPartitions => {
                let identifier = self.partitioned_table(&params).await?;
                let partitions = self.catalog.list_partitions(&identifier).await?;
                json_response(StatusCode::OK, &ListPartitionsResponse { partitions })
            }
            Endpoint::CreatePartitions => {
                let identifier = self.partitioned_table(&params).await?;
                let request: PartitionsRequest = parse_body(&body)?;
                self.catalog
                    .create_partitions(&identifier, request.specs)
                    .await?;
                Ok(ok())
            }
            Endpoint::DropPartitions => {
                let identifier = self.partitioned_table(&params).await?;
                let request: PartitionsRequest = parse_body(&body)?;
                self.catalog
                    .drop_partitions(&identifier, request.specs)
                    .await?;
                Ok(ok())
            }
            Endpoint::AlterPartitions => {
                let identifier = self.partitioned_table(&params).await?;
                let request: AlterPartitionsRequest = parse_body(&body)?;
                self.catalog
                    .alter_partitions(&identifier, request.partitions)
                    .await?;
                Ok(ok())
            }
            Endpoint::MarkDonePartitions => {
                let identifier = self.partitioned_table(&params).await?;
                let request: PartitionsRequest = parse_body(&body)?;
                self.catalog
                    .mark_done_partitions(&identifier, request.specs)
                    .await?;
                Ok(ok())
            }
            Endpoint::ListBranches => {
                let branches = self.catalog.list_branches(&identifier(&params)?).await?;
                json_response(StatusCode::OK, &ListBranchesResponse { branches })
            }
            Endpoint::CreateBranch => {
                let request: CreateBranchRequest = parse_body(&body)?;
                self.catalog
                    .create_branch(
                        &identifier(&params)?,
                        &request.branch,
                        request.from_tag.as_deref(),
                    )
                    .await?;
                Ok(ok())
            }
            Endpoint::GetBranch => {
                let branch = self
                    .catalog
                    .get_branch(&identifier(&params)?, branch(&params)?)
                    .await?;
                json_response(StatusCode::OK, &branch)
            }
            Endpoint::FastForward => {
                self.catalog
                    .fast_forward(&identifier(&params)?, branch(&params)?)
                    .await?;
                Ok(ok())
            }
            Endpoint::DropBranch => {
                self.catalog
                    .drop_branch(&identifier(&params)?, branch(&params)?)
                    .await?;
                Ok(ok())
            }
            Endpoint::ListViews => {
                let views = self.catalog.list_views(database(&params)?).await?;
                json_response(StatusCode::OK, &ListViewsResponse { views })
            }
            Endpoint::CreateView => {
                let request: CreateViewRequest = parse_body(&body)?;
                let identifier =
                    Identifier::new(database(&params)?, &request.identifier.object_name());
                self.catalog
                    .create_view(&identifier, request.schema, false)
                    .await?;
                Ok(ok())
            }
            Endpoint::GetView => {
                let view = self.catalog.get_view(&identifier(&params)?).await?;
                json_response(StatusCode::OK, view.as_ref())
            }
            Endpoint::DropView => {
                self.catalog.drop_view(&identifier(&params)?, false).await?;
                Ok(ok())
            }
            Endpoint::RenameView => {
                let request: RenameRequest = parse_body(&body)?;
                self.catalog
                    .rename_view(&identifier(&params)?, &request.destination, false)
                    .await?;
                Ok(ok())
            }
        }
    }

    async fn commit_table(&self, params: &PathParams, body: &Bytes) -> Result<Response<Bytes>> {
        let request: CommitTableRequest = parse_body(body)?;
        let path_identifier = identifier(params)?;
        let branch = request
            .branch
            .as_deref()
            .or(path_identifier.branch())
            .unwrap_or(MAIN_BRANCH);
        let identifier = Identifier::from_parts(
            path_identifier.database(),
            path_identifier.table(),
            Some(branch),
            None,
        );
        let success = self
            .catalog
            .commit_snapshot(&identifier, request.snapshot, request.statistics)
            .await?;
        debug!(%identifier, success, "commit");
        json_response(StatusCode::OK, &CommitTableResponse { success })
    }

    /// Resolve the table of a partition endpoint
    ///
    /// The table must exist and have its partitions tracked by the catalog, which is checked
    /// before any partition is touched.
    async fn partitioned_table(&self, params: &PathParams) -> Result<Identifier> {
        let identifier = identifier(params)?;
        let table = self.catalog.get_table(&identifier).await?;
        if !table.schema().partitioned_in_metastore() {
            return Err(CatalogError::unsupported(format!(
                "Table {identifier} is not partitioned in the metastore."
            ))
            .into());
        }
        Ok(identifier)
    }
}

#[async_trait]
impl Transport for CatalogService {
    async fn send(
        &self,
        request: Request<Bytes>,
    ) -> std::result::Result<Response<Bytes>, TransportError> {
        Ok(self.handle(request).await)
    }
}

fn log_error(err: &Error, method: &http::Method, path: &str) {
    let unexpected = match err {
        Error::Catalog(err) => matches!(err.kind(), ErrorKind::Internal | ErrorKind::Unrecognized),
        Error::ClientHangup(_) => true,
        _ => false,
    };
    if unexpected {
        error!(error = %err, %method, %path, "Error while handling request");
    } else {
        debug!(error = %err, %method, %path, "request failed");
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(Into::into)
}

fn database(params: &PathParams) -> Result<&str> {
    params
        .database
        .as_deref()
        .ok_or(Error::MissingParameter("database"))
}

fn identifier(params: &PathParams) -> Result<Identifier> {
    let object = params
        .object
        .as_deref()
        .ok_or(Error::MissingParameter("object"))?;
    Ok(Identifier::new(database(params)?, object))
}

fn branch(params: &PathParams) -> Result<&str> {
    params
        .branch
        .as_deref()
        .ok_or(Error::MissingParameter("branch"))
}
