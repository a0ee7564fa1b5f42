//! The validated, caller-facing shape of a grant.
//!
//! This mirrors what a declarative layer hands over after it has checked
//! field presence, mutual exclusivity and permission tokens. Each resource
//! kind is its own optional field here; [`crate::locator`] turns that into a
//! single [`ResourceLocator`](crate::locator::ResourceLocator).

use serde::{Deserialize, Serialize};

use crate::permission::PermissionSet;

/// A registered storage location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DataLocationSpec {
    /// Catalog owning the location. Defaults to the caller's account catalog.
    #[serde(default)]
    pub catalog_id: Option<String>,
    /// ARN of the registered location
    pub arn: String,
}

/// A database in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatabaseSpec {
    /// Catalog owning the database. Defaults to the caller's account catalog.
    #[serde(default)]
    pub catalog_id: Option<String>,
    /// Database name
    pub name: String,
}

/// A table, or every table in a database when `wildcard` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TableSpec {
    /// Catalog owning the table. Defaults to the caller's account catalog.
    #[serde(default)]
    pub catalog_id: Option<String>,
    /// Database holding the table
    pub database_name: String,
    /// Table name. Unused when `wildcard` is set.
    #[serde(default)]
    pub name: Option<String>,
    /// All tables in the database
    #[serde(default)]
    pub wildcard: bool,
}

/// A table restricted to some columns.
///
/// `column_names` and `excluded_column_names` are mutually exclusive. A
/// non-empty exclusion list means "every column except these".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TableWithColumnsSpec {
    /// Catalog owning the table. Defaults to the caller's account catalog.
    #[serde(default)]
    pub catalog_id: Option<String>,
    /// Database holding the table
    pub database_name: String,
    /// Table name
    pub name: String,
    /// Columns the grant applies to
    #[serde(default)]
    pub column_names: Vec<String>,
    /// Columns excluded from a column wildcard
    #[serde(default)]
    pub excluded_column_names: Vec<String>,
}

/// The resource fields of a request. At most one is populated upstream;
/// when none is, the request falls through to `table_with_columns`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ResourceSpec {
    /// Grant on the whole catalog
    #[serde(default)]
    pub catalog_resource: bool,
    /// Grant on a storage location
    #[serde(default)]
    pub data_location: Option<DataLocationSpec>,
    /// Grant on a database
    #[serde(default)]
    pub database: Option<DatabaseSpec>,
    /// Grant on a table or all tables of a database
    #[serde(default)]
    pub table: Option<TableSpec>,
    /// Grant on a column subset of a table
    #[serde(default)]
    pub table_with_columns: Option<TableWithColumnsSpec>,
}

/// A fully validated grant request for one principal on one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct GrantRequest {
    /// IAM user or role ARN, account id, or federated identity
    pub principal: String,
    /// Catalog to issue the call against
    #[serde(default)]
    pub catalog_id: Option<String>,
    /// What access is granted on
    #[serde(flatten)]
    pub resource: ResourceSpec,
    /// Permissions granted to the principal
    pub permissions: PermissionSet,
    /// Permissions the principal may pass on to others
    #[serde(default)]
    pub permissions_with_grant_option: PermissionSet,
}

impl GrantRequest {
    /// Convenience constructor for a request with no grant option.
    pub fn new(principal: &str, resource: ResourceSpec, permissions: PermissionSet) -> Self {
        Self {
            principal: principal.to_owned(),
            resource,
            permissions,
            ..Default::default()
        }
    }

    /// The catalog id, treating an empty string as unset.
    pub(crate) fn catalog_id(&self) -> Option<String> {
        non_empty(&self.catalog_id)
    }
}

impl ResourceSpec {
    /// The whole catalog
    pub fn catalog() -> Self {
        Self {
            catalog_resource: true,
            ..Default::default()
        }
    }

    /// A registered storage location
    pub fn data_location(arn: &str) -> Self {
        Self {
            data_location: Some(DataLocationSpec {
                catalog_id: None,
                arn: arn.to_owned(),
            }),
            ..Default::default()
        }
    }

    /// A database
    pub fn database(name: &str) -> Self {
        Self {
            database: Some(DatabaseSpec {
                catalog_id: None,
                name: name.to_owned(),
            }),
            ..Default::default()
        }
    }

    /// A single table
    pub fn table(database_name: &str, name: &str) -> Self {
        Self {
            table: Some(TableSpec {
                catalog_id: None,
                database_name: database_name.to_owned(),
                name: Some(name.to_owned()),
                wildcard: false,
            }),
            ..Default::default()
        }
    }

    /// Every table in a database
    pub fn all_tables(database_name: &str) -> Self {
        Self {
            table: Some(TableSpec {
                catalog_id: None,
                database_name: database_name.to_owned(),
                name: None,
                wildcard: true,
            }),
            ..Default::default()
        }
    }

    /// A table restricted to the given columns
    pub fn columns(database_name: &str, name: &str, column_names: &[&str]) -> Self {
        Self {
            table_with_columns: Some(TableWithColumnsSpec {
                catalog_id: None,
                database_name: database_name.to_owned(),
                name: name.to_owned(),
                column_names: column_names.iter().map(|c| c.to_string()).collect(),
                excluded_column_names: vec![],
            }),
            ..Default::default()
        }
    }

    /// Every column of a table except the given ones
    pub fn columns_excluding(database_name: &str, name: &str, excluded: &[&str]) -> Self {
        Self {
            table_with_columns: Some(TableWithColumnsSpec {
                catalog_id: None,
                database_name: database_name.to_owned(),
                name: name.to_owned(),
                column_names: vec![],
                excluded_column_names: excluded.iter().map(|c| c.to_string()).collect(),
            }),
            ..Default::default()
        }
    }
}

/// Unset and empty strings are the same thing to the service.
pub(crate) fn non_empty(val: &Option<String>) -> Option<String> {
    val.as_ref().filter(|v| !v.is_empty()).cloned()
}
