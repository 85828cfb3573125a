//! The lakecat catalog server
//!
//! Exposes any [`Catalog`](lakecat_catalog::Catalog) over the HTTP catalog API. Requests are
//! authenticated with a bearer token, resolved against a declarative route table, and answered
//! with the JSON bodies of [`lakecat_types`].
mod auth;
mod routes;
mod service;

use std::{convert::Infallible, sync::Arc};

use hyper::{
    Body, Request,
    server::conn::AddrIncoming,
    service::{make_service_fn, service_fn},
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use service::{CatalogService, DEFAULT_MAX_REQUEST_BYTES, ServiceConfig};

#[derive(Debug, Error)]
pub enum Error {
    #[error("hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Serve `service` on `listener` until `shutdown` is cancelled
///
/// In-flight requests are allowed to finish after cancellation.
pub async fn serve(
    service: Arc<CatalogService>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr()?;
    let incoming = AddrIncoming::from_listener(listener)?;
    info!(address = %addr, "serving the catalog API");

    let make_service = make_service_fn(move |_conn| {
        let service = Arc::clone(&service);
        async move {
            Ok::<_, Infallible>(service_fn(move |request: Request<Body>| {
                let service = Arc::clone(&service);
                async move { Ok::<_, Infallible>(service.handle_hyper(request).await) }
            }))
        }
    });

    hyper::Server::builder(incoming)
        .serve(make_service)
        .with_graceful_shutdown(shutdown.cancelled())
        .await?;
    info!("catalog API stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, sync::Arc};

    use bytes::Bytes;
    use http::{
        Method, Request, Response, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE},
    };
    use lakecat_catalog::{
        Catalog, CommitKind, DataField, Identifier, METASTORE_PARTITIONED_TABLE, MemCatalog,
        Schema,
    };
    use lakecat_time::{MockProvider, Time};
    use lakecat_types::{
        ErrorResponse, ResourceType,
        http::{CommitTableRequest, CommitTableResponse, ConfigResponse, ListDatabasesResponse},
    };
    use pretty_assertions::assert_eq;
    use secrecy::Secret;
    use serde_json::{Value, json};
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    use super::*;

    const TOKEN: &str = "s3cret";

    fn service() -> (Arc<MemCatalog>, CatalogService) {
        let time_provider = Arc::new(MockProvider::new(Time::from_timestamp_nanos(0)));
        let catalog = Arc::new(MemCatalog::new(time_provider));
        let service = CatalogService::new(
            Arc::clone(&catalog) as _,
            ServiceConfig::new("lakecat", "warehouse", Secret::new(TOKEN.to_string())),
        );
        (catalog, service)
    }

    fn request(method: Method, path: &str, body: Option<Value>) -> Request<Bytes> {
        let body = body
            .map(|b| Bytes::from(serde_json::to_vec(&b).unwrap()))
            .unwrap_or_default();
        Request::builder()
            .method(method)
            .uri(path)
            .header(AUTHORIZATION, format!("Bearer {TOKEN}"))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap()
    }

    fn error_body(response: &Response<Bytes>) -> ErrorResponse {
        serde_json::from_slice(response.body()).unwrap()
    }

    fn schema() -> Schema {
        Schema::new(vec![
            DataField::new(0, "dt", "STRING"),
            DataField::new(1, "v", "INT"),
        ])
    }

    #[tokio::test]
    async fn every_path_requires_the_token() {
        let (_, service) = service();
        for path in ["/v1/config", "/v1/lakecat/databases", "/not/a/path"] {
            let request = Request::builder()
                .method(Method::GET)
                .uri(path)
                .body(Bytes::new())
                .unwrap();
            let response = service.handle(request).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
            assert!(response.body().is_empty());

            let request = Request::builder()
                .uri(path)
                .header(AUTHORIZATION, "Bearer nope")
                .body(Bytes::new())
                .unwrap();
            let response = service.handle(request).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{path}");
        }
    }

    #[tokio::test]
    async fn config() {
        let (_, service) = service();
        let response = service
            .handle(request(Method::GET, "/v1/config", None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let config: ConfigResponse = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(config.prefix(), Some("lakecat"));
        assert_eq!(config.warehouse(), Some("warehouse"));
    }

    #[tokio::test]
    async fn unknown_routes() {
        let (_, service) = service();
        let response = service
            .handle(request(Method::GET, "/v1/lakecat/nothing", None))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.body().is_empty());

        let response = service
            .handle(request(Method::PUT, "/v1/lakecat/databases", None))
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn database_errors() {
        let (_, service) = service();
        let create = || {
            request(
                Method::POST,
                "/v1/lakecat/databases",
                Some(json!({"name": "db", "options": {"comment": "hi"}})),
            )
        };
        assert_eq!(service.handle(create()).await.status(), StatusCode::OK);

        let response = service.handle(create()).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            error_body(&response),
            ErrorResponse::new(409, "Database db already exists.")
                .with_resource(ResourceType::Database, "db")
        );

        let response = service
            .handle(request(Method::GET, "/v1/lakecat/databases/missing", None))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            error_body(&response),
            ErrorResponse::new(404, "Database missing does not exist.")
                .with_resource(ResourceType::Database, "missing")
        );

        let response = service
            .handle(request(Method::GET, "/v1/lakecat/databases", None))
            .await;
        let list: ListDatabasesResponse = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(list.databases, vec!["db".to_string()]);

        let response = service
            .handle(request(
                Method::POST,
                "/v1/lakecat/databases",
                Some(json!({"nom": "db"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn table_errors() {
        let (catalog, service) = service();
        catalog
            .create_database("db", false, BTreeMap::new())
            .await
            .unwrap();

        let response = service
            .handle(request(Method::GET, "/v1/lakecat/databases/db/tables/t", None))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            error_body(&response),
            ErrorResponse::new(404, "Table db.t does not exist.")
                .with_resource(ResourceType::Table, "db.t")
        );

        catalog
            .create_table(&Identifier::new("db", "t"), schema(), false)
            .await
            .unwrap();
        let response = service
            .handle(request(
                Method::POST,
                "/v1/lakecat/databases/db/tables/t",
                Some(json!({"changes": [{"action": "dropColumn", "name": "nope"}]})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = error_body(&response);
        assert_eq!(body.resource_type, Some(ResourceType::Column));
        assert_eq!(body.resource_name.as_deref(), Some("nope"));

        let response = service
            .handle(request(
                Method::POST,
                "/v1/lakecat/databases/db/tables/t/branches",
                Some(json!({"branch": "main"})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn partition_endpoints_check_the_table_first() {
        let (catalog, service) = service();
        catalog
            .create_database("db", false, BTreeMap::new())
            .await
            .unwrap();

        let response = service
            .handle(request(
                Method::GET,
                "/v1/lakecat/databases/db/tables/t/partitions",
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_body(&response).resource_type, Some(ResourceType::Table));

        catalog
            .create_table(&Identifier::new("db", "t"), schema(), false)
            .await
            .unwrap();
        let response = service
            .handle(request(
                Method::POST,
                "/v1/lakecat/databases/db/tables/t/partitions",
                Some(json!({"specs": [{"dt": "2024-01-01"}]})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

        let partitioned = schema()
            .with_partition_keys(["dt"])
            .with_option(METASTORE_PARTITIONED_TABLE, "true");
        catalog
            .create_table(&Identifier::new("db", "p"), partitioned, false)
            .await
            .unwrap();
        let response = service
            .handle(request(
                Method::POST,
                "/v1/lakecat/databases/db/tables/p/partitions",
                Some(json!({"specs": [{"dt": "2024-01-01"}]})),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let partitions = catalog
            .list_partitions(&Identifier::new("db", "p"))
            .await
            .unwrap();
        assert_eq!(partitions.len(), 1);
    }

    #[tokio::test]
    async fn commit_and_load_snapshot() {
        let (catalog, service) = service();
        catalog
            .create_database("db", false, BTreeMap::new())
            .await
            .unwrap();
        let identifier = Identifier::new("db", "t");
        catalog
            .create_table(&identifier, schema(), false)
            .await
            .unwrap();

        let response = service
            .handle(request(
                Method::GET,
                "/v1/lakecat/databases/db/tables/t/snapshot",
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            error_body(&response).resource_type,
            Some(ResourceType::Snapshot)
        );

        let table = catalog.get_table(&identifier).await.unwrap();
        let snapshot = table
            .new_snapshot(CommitKind::Append, vec![Bytes::from_static(b"m")], 1)
            .await
            .unwrap();
        let body = serde_json::to_value(CommitTableRequest {
            branch: None,
            snapshot,
            statistics: vec![],
        })
        .unwrap();

        for expected in [true, false] {
            let response = service
                .handle(request(
                    Method::POST,
                    "/v1/lakecat/databases/db/tables/t/commit",
                    Some(body.clone()),
                ))
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            let commit: CommitTableResponse = serde_json::from_slice(response.body()).unwrap();
            assert_eq!(commit.success, expected);
        }

        let response = service
            .handle(request(
                Method::GET,
                "/v1/lakecat/databases/db/tables/t/snapshot",
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn serve_over_http() {
        let (_, service) = service();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(Arc::new(service), listener, shutdown.clone()));

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{addr}/v1/lakecat/databases"))
            .bearer_auth(TOKEN)
            .json(&json!({"name": "db"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let response = client
            .get(format!("http://{addr}/v1/lakecat/databases"))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap();
        let list: ListDatabasesResponse = response.json().await.unwrap();
        assert_eq!(list.databases, vec!["db".to_string()]);

        let response = client
            .get(format!("http://{addr}/v1/lakecat/databases"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 401);

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }
}
