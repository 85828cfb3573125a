//! CLI config for the object store that holds the warehouse
use std::{fs, path::PathBuf, sync::Arc};

use object_store::{ObjectStore, local::LocalFileSystem, memory::InMemory};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unable to create data directory {path:?}: {source}")]
    CreatingDataDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to create local store {path:?}: {source}")]
    CreateLocalFileSystem {
        path: PathBuf,
        source: object_store::Error,
    },

    #[error("the file object store requires --data-dir")]
    MissingDataDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ObjectStoreType {
    /// In-memory, lost on restart
    Memory,

    /// Local filesystem below `--data-dir`
    File,
}

impl ObjectStoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File => "file",
        }
    }
}

/// Where snapshot, manifest and data files of the warehouse are kept
#[derive(Debug, Clone, clap::Parser)]
pub struct ObjectStoreConfig {
    /// Which object store to use for the warehouse.
    ///
    /// Possible values (case insensitive):
    ///
    /// * memory (default): effectively no object persistence.
    /// * file: the local filesystem. Must also set `--data-dir`.
    #[clap(
        value_enum,
        long = "object-store",
        env = "LAKECAT_OBJECT_STORE",
        ignore_case = true,
        default_value = "memory",
        action,
        verbatim_doc_comment
    )]
    pub object_store: ObjectStoreType,

    /// The directory the file object store writes to.
    #[clap(long = "data-dir", env = "LAKECAT_DATA_DIR", action)]
    pub data_dir: Option<PathBuf>,
}

impl ObjectStoreConfig {
    pub fn make_object_store(&self) -> Result<Arc<dyn ObjectStore>, ParseError> {
        if let Some(data_dir) = &self.data_dir {
            if self.object_store != ObjectStoreType::File {
                warn!(
                    ?data_dir,
                    object_store_type = self.object_store.as_str(),
                    "--data-dir ignored, it only affects the file object store"
                );
            }
        }

        match self.object_store {
            ObjectStoreType::Memory => {
                info!(object_store_type = "Memory", "Object Store");
                Ok(Arc::new(InMemory::new()))
            }
            ObjectStoreType::File => {
                let path = self.data_dir.as_ref().ok_or(ParseError::MissingDataDir)?;
                info!(?path, object_store_type = "Directory", "Object Store");
                fs::create_dir_all(path).map_err(|source| ParseError::CreatingDataDirectory {
                    path: path.clone(),
                    source,
                })?;
                let store = LocalFileSystem::new_with_prefix(path).map_err(|source| {
                    ParseError::CreateLocalFileSystem {
                        path: path.clone(),
                        source,
                    }
                })?;
                Ok(Arc::new(store))
            }
        }
    }
}
