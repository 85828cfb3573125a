//! List resources of a running lakecat server
use std::sync::Arc;

use lakecat_catalog::{Catalog, CatalogError};
use lakecat_client::{HttpTransport, RestCatalog};
use lakecat_time::SystemProvider;
use object_store::memory::InMemory;

use super::common::LakecatConfig;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error(transparent)]
    Client(#[from] lakecat_client::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub(crate) type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(subcommand)]
    cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
enum SubCommand {
    /// List the databases of the catalog
    Databases(DatabasesConfig),

    /// List the tables of a database
    Tables(TablesConfig),
}

#[derive(Debug, clap::Args)]
struct DatabasesConfig {
    #[clap(flatten)]
    lakecat_config: LakecatConfig,
}

#[derive(Debug, clap::Args)]
struct TablesConfig {
    #[clap(flatten)]
    lakecat_config: LakecatConfig,

    /// The database to list the tables of
    #[clap(short = 'd', long = "database", env = "LAKECAT_DATABASE_NAME")]
    database_name: String,
}

pub(crate) async fn command(config: Config) -> Result<()> {
    let names = match config.cmd {
        SubCommand::Databases(DatabasesConfig { lakecat_config }) => {
            connect(lakecat_config).await?.list_databases().await?
        }
        SubCommand::Tables(TablesConfig {
            lakecat_config,
            database_name,
        }) => {
            connect(lakecat_config)
                .await?
                .list_tables(&database_name)
                .await?
        }
    };

    for name in names {
        println!("{name}");
    }
    Ok(())
}

async fn connect(config: LakecatConfig) -> Result<RestCatalog> {
    let transport = HttpTransport::new(config.host_url)?;
    // listing never reads table files, so no warehouse store is needed
    let catalog = RestCatalog::try_new(
        Arc::new(transport),
        config.auth_token,
        Arc::new(InMemory::new()),
        Arc::new(SystemProvider::new()),
    )
    .await?;
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn tables_require_a_database() {
        let err = Config::try_parse_from(["show", "tables", "--token", "t"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let config =
            Config::try_parse_from(["show", "tables", "--token", "t", "-d", "db"]).unwrap();
        match config.cmd {
            SubCommand::Tables(tables) => {
                assert_eq!(tables.database_name, "db");
                assert_eq!(
                    tables.lakecat_config.host_url.as_str(),
                    "http://127.0.0.1:8181/"
                );
            }
            other => panic!("unexpected subcommand {other:?}"),
        }
    }
}
