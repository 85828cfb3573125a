//! Table and view identifiers
//!
//! An object name may carry a branch suffix and/or a system table suffix:
//!
//! ```text
//! tbl                      base table
//! tbl$branch_b1            branch `b1` of `tbl`
//! tbl$snapshots            `snapshots` system table of `tbl`
//! tbl$branch_b1$snapshots  `snapshots` system table of branch `b1`
//! ```
//!
//! The system table keyword is case-insensitive and is normalized to lower case. Table and branch
//! names are case-sensitive.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{CatalogError, MAIN_BRANCH};

pub(crate) const SYSTEM_TABLE_SPLITTER: char = '$';
pub(crate) const BRANCH_PREFIX: &str = "branch_";

/// Identifies a table or view within a database
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "IdentifierRepr", from = "IdentifierRepr")]
pub struct Identifier {
    database: String,
    table: String,
    branch: Option<String>,
    system_table: Option<String>,
}

impl Identifier {
    /// Create an identifier from a database name and a (possibly suffixed) object name
    pub fn new(database: impl Into<String>, object: &str) -> Self {
        let mut parts = object.splitn(3, SYSTEM_TABLE_SPLITTER);
        let table = parts.next().unwrap_or_default().to_string();
        let (branch, system_table) = match (parts.next(), parts.next()) {
            (None, _) => (None, None),
            (Some(suffix), None) => match suffix.strip_prefix(BRANCH_PREFIX) {
                Some(branch) => (Some(branch.to_string()), None),
                None => (None, Some(suffix.to_lowercase())),
            },
            (Some(suffix), Some(system)) => match suffix.strip_prefix(BRANCH_PREFIX) {
                Some(branch) => (Some(branch.to_string()), Some(system.to_lowercase())),
                // an unknown system table name, it will never resolve
                None => (
                    None,
                    Some(format!("{suffix}{SYSTEM_TABLE_SPLITTER}{system}").to_lowercase()),
                ),
            },
        };
        Self {
            database: database.into(),
            table,
            branch,
            system_table,
        }
    }

    /// Create an identifier from its parts
    pub fn from_parts(
        database: impl Into<String>,
        table: impl Into<String>,
        branch: Option<&str>,
        system_table: Option<&str>,
    ) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            branch: branch.filter(|b| *b != MAIN_BRANCH).map(ToString::to_string),
            system_table: system_table.map(str::to_lowercase),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// The base table name, without any branch or system table suffix
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    /// The branch, or `main` if this does not name a branch
    pub fn branch_or_default(&self) -> &str {
        self.branch.as_deref().unwrap_or(MAIN_BRANCH)
    }

    pub fn system_table(&self) -> Option<&str> {
        self.system_table.as_deref()
    }

    pub fn is_system_table(&self) -> bool {
        self.system_table.is_some()
    }

    /// The object name including its suffixes, e.g. `tbl$branch_b1$files`
    pub fn object_name(&self) -> String {
        let mut name = self.table.clone();
        if let Some(branch) = &self.branch {
            name.push(SYSTEM_TABLE_SPLITTER);
            name.push_str(BRANCH_PREFIX);
            name.push_str(branch);
        }
        if let Some(system_table) = &self.system_table {
            name.push(SYSTEM_TABLE_SPLITTER);
            name.push_str(system_table);
        }
        name
    }

    /// The normalized dotted name, e.g. `db.tbl$branch_b1$files`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.database, self.object_name())
    }

    /// This identifier with any system table suffix removed
    pub fn without_system_table(&self) -> Self {
        Self {
            system_table: None,
            ..self.clone()
        }
    }

    /// The base table this identifier derives from
    pub fn base(&self) -> Self {
        Self {
            database: self.database.clone(),
            table: self.table.clone(),
            branch: None,
            system_table: None,
        }
    }

    /// Whether `self` is a branch or system table derived from `parent`
    ///
    /// For a base table parent that is every branch and system table of it, for a branch parent
    /// it is the system tables of that branch. An identifier is not a derivative of itself.
    pub fn is_derivative_of(&self, parent: &Self) -> bool {
        self != parent
            && parent.system_table.is_none()
            && self.database == parent.database
            && self.table == parent.table
            && (parent.branch.is_none() || self.branch == parent.branch)
    }

    /// Whether `self` is a system table of `parent` on the same branch
    pub fn is_system_table_of(&self, parent: &Self) -> bool {
        self.is_derivative_of(parent) && self.is_system_table() && self.branch == parent.branch
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.object_name())
    }
}

impl FromStr for Identifier {
    type Err = CatalogError;

    /// Parse a dotted `database.object` name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((database, object)) if !database.is_empty() && !object.is_empty() => {
                Ok(Self::new(database, object))
            }
            _ => Err(CatalogError::invalid_argument(format!(
                "Cannot get splits from '{s}' to get database and object"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentifierRepr {
    database: String,
    object: String,
}

impl From<Identifier> for IdentifierRepr {
    fn from(id: Identifier) -> Self {
        Self {
            object: id.object_name(),
            database: id.database,
        }
    }
}

impl From<IdentifierRepr> for Identifier {
    fn from(repr: IdentifierRepr) -> Self {
        Self::new(repr.database, &repr.object)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_suffixes() {
        let id = Identifier::new("db", "tbl");
        assert_eq!(id.table(), "tbl");
        assert_eq!(id.branch(), None);
        assert_eq!(id.system_table(), None);
        assert_eq!(id.full_name(), "db.tbl");

        let id = Identifier::new("db", "tbl$branch_b1");
        assert_eq!(id.branch(), Some("b1"));
        assert_eq!(id.system_table(), None);
        assert_eq!(id.branch_or_default(), "b1");

        let id = Identifier::new("db", "tbl$FILES");
        assert_eq!(id.branch(), None);
        assert_eq!(id.system_table(), Some("files"));
        assert_eq!(id.full_name(), "db.tbl$files");

        let id = Identifier::new("db", "tbl$branch_b1$Snapshots");
        assert_eq!(id.branch(), Some("b1"));
        assert_eq!(id.system_table(), Some("snapshots"));
        assert_eq!(id.to_string(), "db.tbl$branch_b1$snapshots");
        assert_eq!(id.without_system_table().full_name(), "db.tbl$branch_b1");
        assert_eq!(id.base().full_name(), "db.tbl");
    }

    #[test]
    fn system_table_suffix_is_case_insensitive() {
        assert_eq!(
            Identifier::new("db", "tbl$SNAPSHOTS"),
            Identifier::new("db", "tbl$snapshots")
        );
        assert_ne!(Identifier::new("db", "Tbl"), Identifier::new("db", "tbl"));
        assert_ne!(
            Identifier::new("db", "tbl$branch_B1"),
            Identifier::new("db", "tbl$branch_b1")
        );
    }

    #[test]
    fn derivatives() {
        let base = Identifier::new("db", "tbl");
        let branch = Identifier::new("db", "tbl$branch_b1");
        let sys = Identifier::new("db", "tbl$files");
        let branch_sys = Identifier::new("db", "tbl$branch_b1$files");
        let other = Identifier::new("db", "tbl2");

        assert!(!base.is_derivative_of(&base));
        assert!(branch.is_derivative_of(&base));
        assert!(sys.is_derivative_of(&base));
        assert!(branch_sys.is_derivative_of(&base));
        assert!(!other.is_derivative_of(&base));

        assert!(branch_sys.is_derivative_of(&branch));
        assert!(!sys.is_derivative_of(&branch));

        assert!(sys.is_system_table_of(&base));
        assert!(!branch.is_system_table_of(&base));
        assert!(!branch_sys.is_system_table_of(&base));
        assert!(branch_sys.is_system_table_of(&branch));
    }

    #[test]
    fn from_str() {
        let id: Identifier = "db.tbl$branch_b1".parse().unwrap();
        assert_eq!(id, Identifier::new("db", "tbl$branch_b1"));
        assert!("no_dot".parse::<Identifier>().is_err());
        assert!(".tbl".parse::<Identifier>().is_err());
    }

    #[test]
    fn wire_form() {
        let id = Identifier::new("db", "tbl$branch_b1$OPTIONS");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"database": "db", "object": "tbl$branch_b1$options"})
        );
        let back: Identifier = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}
