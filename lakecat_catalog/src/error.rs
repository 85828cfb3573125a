use thiserror::Error;

use crate::{Identifier, SnapshotId};

/// Errors raised by catalog operations
///
/// Every backend reports the same conditions so that the caching layer and the wire protocol can
/// treat them uniformly. See [`CatalogError::kind`] for the coarse classification.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Database {database} does not exist.")]
    DatabaseNotExist { database: String },

    #[error("Database {database} already exists.")]
    DatabaseAlreadyExist { database: String },

    #[error("Database {database} is not empty.")]
    DatabaseNotEmpty { database: String },

    #[error("Table {identifier} does not exist.")]
    TableNotExist { identifier: Identifier },

    #[error("Table {identifier} already exists.")]
    TableAlreadyExist { identifier: Identifier },

    #[error("Column {column} does not exist in the {identifier} table.")]
    ColumnNotExist {
        identifier: Identifier,
        column: String,
    },

    #[error("Column {column} already exists in the {identifier} table.")]
    ColumnAlreadyExist {
        identifier: Identifier,
        column: String,
    },

    #[error("View {identifier} does not exist.")]
    ViewNotExist { identifier: Identifier },

    #[error("View {identifier} already exists.")]
    ViewAlreadyExist { identifier: Identifier },

    #[error("Snapshot {snapshot_id} of table {identifier} does not exist.")]
    SnapshotNotExist {
        identifier: Identifier,
        snapshot_id: SnapshotId,
    },

    #[error("{message}")]
    InvalidArgument { message: String },

    #[error("{message}")]
    Unsupported { message: String },

    #[error("{message}")]
    Internal { message: String },

    /// A remote catalog failed in a way that does not map onto any other variant
    #[error("catalog service responded with status {status}: {message}")]
    Service { status: u16, message: String },

    #[error("object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Coarse classification of a [`CatalogError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The referenced resource does not exist, the caller may create it or fix the reference
    NotExist,
    /// The resource already exists, the caller may rename or use if-not-exists semantics
    AlreadyExist,
    /// A caller bug, never retried
    InvalidArgument,
    /// The operation is not supported for the resource
    Unsupported,
    /// An internal invariant was violated
    Internal,
    /// Anything else, e.g. I/O failures
    Unrecognized,
}

impl CatalogError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn table_not_exist(identifier: &Identifier) -> Self {
        Self::TableNotExist {
            identifier: identifier.clone(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DatabaseNotExist { .. }
            | Self::TableNotExist { .. }
            | Self::ColumnNotExist { .. }
            | Self::ViewNotExist { .. }
            | Self::SnapshotNotExist { .. } => ErrorKind::NotExist,
            Self::DatabaseAlreadyExist { .. }
            | Self::TableAlreadyExist { .. }
            | Self::ColumnAlreadyExist { .. }
            | Self::ViewAlreadyExist { .. } => ErrorKind::AlreadyExist,
            Self::DatabaseNotEmpty { .. } | Self::InvalidArgument { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Internal { .. } => ErrorKind::Internal,
            Self::Service { .. } | Self::ObjectStore(_) | Self::Serde(_) => {
                ErrorKind::Unrecognized
            }
        }
    }

    pub fn is_not_exist(&self) -> bool {
        self.kind() == ErrorKind::NotExist
    }

    pub fn is_already_exist(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExist
    }
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;
