//! The select-on-all-columns split.
//!
//! The service stores SELECT on a table as a separate table-with-columns
//! entry for `{db}.{table}.*`, even though the grant was made on the plain
//! table. Reads have to look for that entry as well.

use super::{ColumnWildcard, ResourceLocator, TableWithColumnsResource};
use crate::request::{non_empty, GrantRequest};

/// The extra locator to match when reading a table grant, if there is one.
///
/// Only used while reading; never sent on grant or revoke.
pub fn select_permissions_locator(request: &GrantRequest) -> Option<ResourceLocator> {
    let table = request.resource.table.as_ref()?;
    if table.wildcard || table.database_name.is_empty() {
        return None;
    }
    let name = non_empty(&table.name)?;

    Some(ResourceLocator::TableWithColumns(TableWithColumnsResource {
        catalog_id: non_empty(&table.catalog_id),
        database_name: table.database_name.to_owned(),
        name,
        column_names: vec![],
        column_wildcard: Some(ColumnWildcard::default()),
    }))
}
