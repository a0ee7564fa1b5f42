//! Deciding whether two locators name the same resource.
//!
//! The service fills in the caller's account catalog when a catalog id is
//! omitted, so a declared locator without one must still match what the
//! service reports back.

use std::collections::BTreeSet;

use super::{
    ColumnWildcard, DataLocationResource, DatabaseResource, ResourceLocator, TableResource,
    TableWithColumnsResource,
};

/// Whether `declared` and `reported` refer to the same resource.
///
/// Neither argument is modified: the default fill happens on scratch copies.
pub fn locators_match(declared: &ResourceLocator, reported: &ResourceLocator) -> bool {
    let declared_filled = declared.with_default_catalog(reported);
    let reported_filled = reported.with_default_catalog(declared);
    same_resource(&declared_filled, &reported_filled)
}

impl ResourceLocator {
    /// Copy of this locator with an unset catalog id taken from `other`, when
    /// both are the same kind.
    fn with_default_catalog(&self, other: &ResourceLocator) -> ResourceLocator {
        let mut scratch = self.clone();
        if scratch.kind() != other.kind() {
            return scratch;
        }
        let fill = other.catalog_id().map(str::to_owned);
        match &mut scratch {
            ResourceLocator::Catalog => (),
            ResourceLocator::DataLocation(r) => fill_catalog_id(&mut r.catalog_id, fill),
            ResourceLocator::Database(r) => fill_catalog_id(&mut r.catalog_id, fill),
            ResourceLocator::Table(r) => fill_catalog_id(&mut r.catalog_id, fill),
            ResourceLocator::TableWithColumns(r) => fill_catalog_id(&mut r.catalog_id, fill),
        }
        scratch
    }
}

fn fill_catalog_id(target: &mut Option<String>, fill: Option<String>) {
    if target.is_none() {
        *target = fill;
    }
}

fn same_resource(a: &ResourceLocator, b: &ResourceLocator) -> bool {
    match (a, b) {
        (ResourceLocator::Catalog, ResourceLocator::Catalog) => true,
        (ResourceLocator::DataLocation(a), ResourceLocator::DataLocation(b)) => {
            same_data_location(a, b)
        }
        (ResourceLocator::Database(a), ResourceLocator::Database(b)) => same_database(a, b),
        (ResourceLocator::Table(a), ResourceLocator::Table(b)) => same_table(a, b),
        (ResourceLocator::TableWithColumns(a), ResourceLocator::TableWithColumns(b)) => {
            same_table_with_columns(a, b)
        }
        _ => false,
    }
}

fn same_data_location(a: &DataLocationResource, b: &DataLocationResource) -> bool {
    a.catalog_id == b.catalog_id && a.resource_arn == b.resource_arn
}

fn same_database(a: &DatabaseResource, b: &DatabaseResource) -> bool {
    a.catalog_id == b.catalog_id && a.name == b.name
}

fn same_table(a: &TableResource, b: &TableResource) -> bool {
    a.catalog_id == b.catalog_id
        && a.database_name == b.database_name
        && a.name == b.name
        && a.table_wildcard == b.table_wildcard
}

fn same_table_with_columns(a: &TableWithColumnsResource, b: &TableWithColumnsResource) -> bool {
    a.catalog_id == b.catalog_id
        && a.database_name == b.database_name
        && a.name == b.name
        && same_columns(&a.column_names, &b.column_names)
        && same_column_wildcard(&a.column_wildcard, &b.column_wildcard)
}

fn same_column_wildcard(a: &Option<ColumnWildcard>, b: &Option<ColumnWildcard>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => same_columns(&a.excluded_column_names, &b.excluded_column_names),
        _ => false,
    }
}

/// Column lists are compared without regard to order.
fn same_columns(a: &[String], b: &[String]) -> bool {
    a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
}
