//! Path layout of the catalog API
//!
//! Every resource path lives under `/v1/{prefix}`. Path segments taken from resource names are
//! percent-encoded, so names containing `/`, `$` or spaces survive the trip.
use lakecat_catalog::Identifier;

pub const API_VERSION: &str = "v1";
pub const CONFIG_PATH: &str = "/v1/config";
pub const DEFAULT_PREFIX: &str = "lakecat";

/// Builds resource paths for a configured prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePaths {
    base: String,
}

impl ResourcePaths {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_matches('/');
        let base = if prefix.is_empty() {
            format!("/{API_VERSION}")
        } else {
            format!("/{API_VERSION}/{}", urlencoding::encode(prefix))
        };
        Self { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn config() -> &'static str {
        CONFIG_PATH
    }

    pub fn databases(&self) -> String {
        format!("{}/databases", self.base)
    }

    pub fn database(&self, name: &str) -> String {
        format!("{}/databases/{}", self.base, urlencoding::encode(name))
    }

    pub fn tables(&self, database: &str) -> String {
        format!("{}/tables", self.database(database))
    }

    /// The path of a table, including its branch suffix if it has one
    pub fn table(&self, identifier: &Identifier) -> String {
        format!(
            "{}/{}",
            self.tables(identifier.database()),
            urlencoding::encode(&identifier.object_name())
        )
    }

    pub fn commit_table(&self, identifier: &Identifier) -> String {
        format!("{}/commit", self.table(identifier))
    }

    pub fn rename_table(&self, identifier: &Identifier) -> String {
        format!("{}/rename", self.table(identifier))
    }

    pub fn table_token(&self, identifier: &Identifier) -> String {
        format!("{}/token", self.table(identifier))
    }

    pub fn table_snapshot(&self, identifier: &Identifier) -> String {
        format!("{}/snapshot", self.table(identifier))
    }

    pub fn partitions(&self, identifier: &Identifier) -> String {
        format!("{}/partitions", self.table(identifier))
    }

    pub fn drop_partitions(&self, identifier: &Identifier) -> String {
        format!("{}/drop", self.partitions(identifier))
    }

    pub fn alter_partitions(&self, identifier: &Identifier) -> String {
        format!("{}/alter", self.partitions(identifier))
    }

    pub fn mark_done_partitions(&self, identifier: &Identifier) -> String {
        format!("{}/mark", self.partitions(identifier))
    }

    pub fn branches(&self, identifier: &Identifier) -> String {
        format!("{}/branches", self.table(identifier))
    }

    pub fn branch(&self, identifier: &Identifier, branch: &str) -> String {
        format!(
            "{}/{}",
            self.branches(identifier),
            urlencoding::encode(branch)
        )
    }

    pub fn views(&self, database: &str) -> String {
        format!("{}/views", self.database(database))
    }

    pub fn view(&self, identifier: &Identifier) -> String {
        format!(
            "{}/{}",
            self.views(identifier.database()),
            urlencoding::encode(&identifier.object_name())
        )
    }

    pub fn rename_view(&self, identifier: &Identifier) -> String {
        format!("{}/rename", self.view(identifier))
    }
}

impl Default for ResourcePaths {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn paths() {
        let paths = ResourcePaths::default();
        assert_eq!(paths.databases(), "/v1/lakecat/databases");

        let identifier = Identifier::new("db", "tbl$branch_b1");
        assert_eq!(
            paths.commit_table(&identifier),
            "/v1/lakecat/databases/db/tables/tbl%24branch_b1/commit"
        );
        assert_eq!(
            paths.branch(&Identifier::new("my db", "t"), "b/1"),
            "/v1/lakecat/databases/my%20db/tables/t/branches/b%2F1"
        );
        assert_eq!(
            ResourcePaths::new("").view(&Identifier::new("db", "v")),
            "/v1/databases/db/views/v"
        );
    }
}
