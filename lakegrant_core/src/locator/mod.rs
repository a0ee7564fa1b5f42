//! Resource locators
//!
//! A [`ResourceLocator`] names exactly one thing access is granted on. It is
//! built from the caller's [`GrantRequest`] and compared against what the
//! service reports back when listing permissions.

pub mod compare;
pub mod select;

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::request::{
    non_empty, DataLocationSpec, DatabaseSpec, GrantRequest, ResourceSpec, TableSpec,
    TableWithColumnsSpec,
};

pub use compare::locators_match;
pub use select::select_permissions_locator;

/// The kind of resource a request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// The whole catalog
    Catalog,
    /// A registered storage location
    DataLocation,
    /// A database
    Database,
    /// A table, or all tables in a database
    Table,
    /// A column subset of a table
    TableWithColumns,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            ResourceKind::Catalog => "CATALOG",
            ResourceKind::DataLocation => "DATA_LOCATION",
            ResourceKind::Database => "DATABASE",
            ResourceKind::Table => "TABLE",
            ResourceKind::TableWithColumns => "TABLE_WITH_COLUMNS",
        };
        write!(f, "{kind}")
    }
}

/// A storage location as the service sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataLocationResource {
    /// Owning catalog, filled in by the service when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
    /// Location ARN
    pub resource_arn: String,
}

/// A database as the service sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatabaseResource {
    /// Owning catalog, filled in by the service when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
    /// Database name
    pub name: String,
}

/// A table (or table wildcard) as the service sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableResource {
    /// Owning catalog, filled in by the service when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
    /// Database holding the table
    pub database_name: String,
    /// Table name, absent for a wildcard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// All tables in the database
    #[serde(default)]
    pub table_wildcard: bool,
}

/// "All columns", optionally minus some.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ColumnWildcard {
    /// Columns left out of the wildcard
    #[serde(default)]
    pub excluded_column_names: Vec<String>,
}

/// A column-restricted table as the service sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableWithColumnsResource {
    /// Owning catalog, filled in by the service when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
    /// Database holding the table
    pub database_name: String,
    /// Table name
    pub name: String,
    /// Explicit column list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_names: Vec<String>,
    /// Column wildcard, exclusive with `column_names`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_wildcard: Option<ColumnWildcard>,
}

/// Exactly one resource access can be granted on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum ResourceLocator {
    /// The whole catalog
    Catalog,
    /// A registered storage location
    DataLocation(DataLocationResource),
    /// A database
    Database(DatabaseResource),
    /// A table or every table in a database
    Table(TableResource),
    /// A column subset of a table
    TableWithColumns(TableWithColumnsResource),
}

impl ResourceLocator {
    /// The kind of this locator.
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceLocator::Catalog => ResourceKind::Catalog,
            ResourceLocator::DataLocation(_) => ResourceKind::DataLocation,
            ResourceLocator::Database(_) => ResourceKind::Database,
            ResourceLocator::Table(_) => ResourceKind::Table,
            ResourceLocator::TableWithColumns(_) => ResourceKind::TableWithColumns,
        }
    }

    /// The catalog id carried by the locator, if any.
    pub fn catalog_id(&self) -> Option<&str> {
        match self {
            ResourceLocator::Catalog => None,
            ResourceLocator::DataLocation(r) => r.catalog_id.as_deref(),
            ResourceLocator::Database(r) => r.catalog_id.as_deref(),
            ResourceLocator::Table(r) => r.catalog_id.as_deref(),
            ResourceLocator::TableWithColumns(r) => r.catalog_id.as_deref(),
        }
    }
}

/// Decide which resource a request refers to.
///
/// Fields are checked in a fixed order: catalog, data location, database,
/// table. A request with none of those set is a table-with-columns request.
/// List filtering depends on this, so the order must not change.
pub fn classify(resource: &ResourceSpec) -> ResourceKind {
    if resource.catalog_resource {
        ResourceKind::Catalog
    } else if resource.data_location.is_some() {
        ResourceKind::DataLocation
    } else if resource.database.is_some() {
        ResourceKind::Database
    } else if resource.table.is_some() {
        ResourceKind::Table
    } else {
        ResourceKind::TableWithColumns
    }
}

/// Build the wire locator for a request.
///
/// With `squash_columns`, a table-with-columns request becomes a plain table
/// locator. Listing can't filter by column-level resources, so reads list the
/// whole table and post-filter.
pub fn normalize(request: &GrantRequest, squash_columns: bool) -> ResourceLocator {
    let resource = &request.resource;
    match classify(resource) {
        ResourceKind::Catalog => ResourceLocator::Catalog,
        ResourceKind::DataLocation => ResourceLocator::DataLocation(
            resource
                .data_location
                .as_ref()
                .map(DataLocationResource::from)
                .unwrap_or_default(),
        ),
        ResourceKind::Database => ResourceLocator::Database(
            resource
                .database
                .as_ref()
                .map(DatabaseResource::from)
                .unwrap_or_default(),
        ),
        ResourceKind::Table => ResourceLocator::Table(
            resource
                .table
                .as_ref()
                .map(TableResource::from)
                .unwrap_or_default(),
        ),
        ResourceKind::TableWithColumns => {
            let columns = resource.table_with_columns.clone().unwrap_or_default();
            if squash_columns {
                ResourceLocator::Table(TableResource {
                    catalog_id: non_empty(&columns.catalog_id),
                    database_name: columns.database_name,
                    name: Some(columns.name).filter(|n| !n.is_empty()),
                    table_wildcard: false,
                })
            } else {
                ResourceLocator::TableWithColumns(TableWithColumnsResource::from(&columns))
            }
        }
    }
}

impl From<&DataLocationSpec> for DataLocationResource {
    fn from(spec: &DataLocationSpec) -> Self {
        Self {
            catalog_id: non_empty(&spec.catalog_id),
            resource_arn: spec.arn.to_owned(),
        }
    }
}

impl From<&DatabaseSpec> for DatabaseResource {
    fn from(spec: &DatabaseSpec) -> Self {
        Self {
            catalog_id: non_empty(&spec.catalog_id),
            name: spec.name.to_owned(),
        }
    }
}

impl From<&TableSpec> for TableResource {
    fn from(spec: &TableSpec) -> Self {
        Self {
            catalog_id: non_empty(&spec.catalog_id),
            database_name: spec.database_name.to_owned(),
            name: non_empty(&spec.name),
            table_wildcard: spec.wildcard,
        }
    }
}

impl From<&TableWithColumnsSpec> for TableWithColumnsResource {
    fn from(spec: &TableWithColumnsSpec) -> Self {
        Self {
            catalog_id: non_empty(&spec.catalog_id),
            database_name: spec.database_name.to_owned(),
            name: spec.name.to_owned(),
            column_names: spec.column_names.to_owned(),
            column_wildcard: if spec.excluded_column_names.is_empty() {
                None
            } else {
                Some(ColumnWildcard {
                    excluded_column_names: spec.excluded_column_names.to_owned(),
                })
            },
        }
    }
}

/// Surface a locator back in request form.
impl From<&ResourceLocator> for ResourceSpec {
    fn from(locator: &ResourceLocator) -> Self {
        match locator {
            ResourceLocator::Catalog => ResourceSpec::catalog(),
            ResourceLocator::DataLocation(r) => ResourceSpec {
                data_location: Some(DataLocationSpec {
                    catalog_id: r.catalog_id.to_owned(),
                    arn: r.resource_arn.to_owned(),
                }),
                ..Default::default()
            },
            ResourceLocator::Database(r) => ResourceSpec {
                database: Some(DatabaseSpec {
                    catalog_id: r.catalog_id.to_owned(),
                    name: r.name.to_owned(),
                }),
                ..Default::default()
            },
            ResourceLocator::Table(r) => ResourceSpec {
                table: Some(TableSpec {
                    catalog_id: r.catalog_id.to_owned(),
                    database_name: r.database_name.to_owned(),
                    name: r.name.to_owned(),
                    wildcard: r.table_wildcard,
                }),
                ..Default::default()
            },
            ResourceLocator::TableWithColumns(r) => ResourceSpec {
                table_with_columns: Some(TableWithColumnsSpec {
                    catalog_id: r.catalog_id.to_owned(),
                    database_name: r.database_name.to_owned(),
                    name: r.name.to_owned(),
                    column_names: r.column_names.to_owned(),
                    excluded_column_names: r
                        .column_wildcard
                        .as_ref()
                        .map(|w| w.excluded_column_names.to_owned())
                        .unwrap_or_default(),
                }),
                ..Default::default()
            },
        }
    }
}
