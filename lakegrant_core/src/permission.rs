//! Permission tokens and ordered permission lists.
//!

use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// A single permission the catalog service knows how to grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    /// Every permission applicable to the resource
    All,
    /// ALTER
    Alter,
    /// CREATE_DATABASE
    CreateDatabase,
    /// CREATE_TABLE
    CreateTable,
    /// DATA_LOCATION_ACCESS
    DataLocationAccess,
    /// DELETE
    Delete,
    /// DESCRIBE
    Describe,
    /// DROP
    Drop,
    /// INSERT
    Insert,
    /// SELECT
    Select,
}

impl Permission {
    /// All known permissions, in the order the service documents them.
    pub const VALUES: [Permission; 10] = [
        Permission::All,
        Permission::Select,
        Permission::Alter,
        Permission::Drop,
        Permission::Delete,
        Permission::Insert,
        Permission::Describe,
        Permission::CreateDatabase,
        Permission::CreateTable,
        Permission::DataLocationAccess,
    ];

    /// The wire token for this permission.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::All => "ALL",
            Permission::Alter => "ALTER",
            Permission::CreateDatabase => "CREATE_DATABASE",
            Permission::CreateTable => "CREATE_TABLE",
            Permission::DataLocationAccess => "DATA_LOCATION_ACCESS",
            Permission::Delete => "DELETE",
            Permission::Describe => "DESCRIBE",
            Permission::Drop => "DROP",
            Permission::Insert => "INSERT",
            Permission::Select => "SELECT",
        }
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Permission {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Permission::VALUES
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| anyhow!("unknown permission: {s}"))
    }
}

/// An ordered list of permissions.
///
/// Order is kept so that what the caller declared round-trips untouched, but
/// it carries no meaning: comparisons go through [`PermissionSet::same_permissions`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PermissionSet(pub Vec<Permission>);

impl PermissionSet {
    /// Create a new set from anything that yields permissions.
    pub fn new(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self(permissions.into_iter().collect())
    }

    /// Parse a list of wire tokens, failing on the first unknown one.
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Self> {
        tokens
            .iter()
            .map(|t| t.as_ref().parse())
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the permissions in their stored order.
    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.0.iter()
    }

    /// Compare as sets, ignoring order and repeats.
    pub fn same_permissions(&self, other: &PermissionSet) -> bool {
        self.0.iter().collect::<BTreeSet<_>>() == other.0.iter().collect::<BTreeSet<_>>()
    }

    /// Append another list without deduplicating.
    pub fn extend_from(&mut self, other: &PermissionSet) {
        self.0.extend(other.0.iter().copied());
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl Display for PermissionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tokens = self.0.iter().map(|p| p.as_str()).collect::<Vec<_>>();
        write!(f, "[{}]", tokens.join(", "))
    }
}
