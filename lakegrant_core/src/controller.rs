//! Create, read and delete a single grant against the permissions service.
//!
//! The service has no "get" call, so a grant is read back by listing the
//! principal's permissions on the resource and picking out the entries that
//! match what was declared.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use futures::{pin_mut, TryStreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RetryConfig;
use crate::error::{ConsistencyError, GrantError, Operation};
use crate::locator::{locators_match, normalize, select_permissions_locator, ResourceLocator};
use crate::log_runtime;
use crate::permission::PermissionSet;
use crate::remote::{
    list_permissions_pages, ErrorCode, ListPermissionsInput, PermissionsApi, PermissionsInput,
    PrincipalResourcePermissions, RemoteError,
};
use crate::request::{GrantRequest, ResourceSpec};
use crate::retry::{RetryError, RetryPolicy};

/// A grant as the service reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Principal holding the permissions
    pub principal: String,
    /// Resource the permissions are on
    pub resource: ResourceLocator,
    /// Permissions held, merged across matching entries
    pub permissions: PermissionSet,
    /// Permissions held with the grant option, merged across matching entries
    pub permissions_with_grant_option: PermissionSet,
}

impl Grant {
    /// Render the grant back into request form, e.g. to refresh stored state.
    pub fn to_request(&self, catalog_id: Option<String>) -> GrantRequest {
        GrantRequest {
            principal: self.principal.to_owned(),
            catalog_id,
            resource: ResourceSpec::from(&self.resource),
            permissions: self.permissions.to_owned(),
            permissions_with_grant_option: self.permissions_with_grant_option.to_owned(),
        }
    }
}

/// A stable reference to a created grant. It is derived from the grant
/// input, holds no state, and is the same every time the same grant is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrantHandle(pub Uuid);

impl GrantHandle {
    fn for_input(input: &PermissionsInput) -> Self {
        GrantHandle(Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            describe(input).as_bytes(),
        ))
    }
}

impl Display for GrantHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The result of a successful create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedGrant {
    /// External reference for the grant
    pub handle: GrantHandle,
    /// The grant as read back from the service
    pub grant: Grant,
}

/// Reconciles one (principal, resource) grant at a time.
///
/// Calls for the same principal and resource must not overlap; distinct
/// grants can be reconciled concurrently through clones of one controller.
#[derive(Clone)]
pub struct GrantController {
    api: Arc<dyn PermissionsApi>,
    retry: RetryPolicy,
}

impl GrantController {
    /// Create a controller that is never cancelled. Fails on an invalid
    /// retry config.
    pub fn new(api: Arc<dyn PermissionsApi>, config: RetryConfig) -> anyhow::Result<Self> {
        Self::with_cancellation(api, config, CancellationToken::new())
    }

    /// Create a controller whose retry loops stop when `cancel` fires.
    pub fn with_cancellation(
        api: Arc<dyn PermissionsApi>,
        config: RetryConfig,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            api,
            retry: RetryPolicy::new(config, cancel)?,
        })
    }

    /// Grant the requested permissions and read the result back.
    pub async fn create(&self, request: &GrantRequest) -> Result<CreatedGrant, GrantError> {
        check_request(request)?;
        let input = permissions_input(request);
        debug!(input = %describe(&input), "granting permissions");

        self.retry
            .run(Operation::Create, || self.api.grant_permissions(&input))
            .await
            .map_err(|e| wrap(Operation::Create, &input, e))?;

        let handle = GrantHandle::for_input(&input);
        info!(%handle, principal = %request.principal, "permissions granted");
        // A grant that can't be found right after creating it is an error,
        // not an absence.
        let grant = self.reconcile(request).await?;
        Ok(CreatedGrant { handle, grant })
    }

    /// Re-grant after a change. Granting is idempotent at the service.
    pub async fn update(&self, request: &GrantRequest) -> Result<CreatedGrant, GrantError> {
        self.create(request).await
    }

    /// Read the grant back from the service.
    ///
    /// Returns `Ok(None)` when the service says the principal/resource
    /// combination no longer exists. Finding no matching entries in a
    /// successful listing is a consistency error instead.
    pub async fn read(&self, request: &GrantRequest) -> Result<Option<Grant>, GrantError> {
        check_request(request)?;
        match self.reconcile(request).await {
            Err(GrantError::Remote { source, .. }) if source.code() == ErrorCode::EntityNotFound => {
                warn!(
                    principal = %request.principal,
                    "permissions not found, treating grant as gone"
                );
                Ok(None)
            }
            res => res.map(Some),
        }
    }

    /// Revoke the requested permissions. Revoking something already gone
    /// succeeds.
    pub async fn delete(&self, request: &GrantRequest) -> Result<(), GrantError> {
        check_request(request)?;
        let input = permissions_input(request);
        debug!(input = %describe(&input), "revoking permissions");

        match self
            .retry
            .run(Operation::Delete, || self.api.revoke_permissions(&input))
            .await
        {
            Ok(()) => Ok(()),
            Err(RetryError::Failed(e)) if already_revoked(&e) => {
                debug!(error = %e, "nothing to revoke");
                Ok(())
            }
            Err(e) => Err(wrap(Operation::Delete, &input, e)),
        }
    }

    /// List the principal's permissions on the resource and fold the
    /// matching entries into one grant.
    async fn reconcile(&self, request: &GrantRequest) -> Result<Grant, GrantError> {
        let input = ListPermissionsInput {
            catalog_id: request.catalog_id(),
            principal: request.principal.to_owned(),
            resource: Some(normalize(request, true)),
        };
        let declared = normalize(request, false);
        let select = select_permissions_locator(request);
        debug!(kind = %declared.kind(), input = %describe(&input), "reading permissions");

        let matched = log_runtime!(
            "listing permissions",
            self.retry
                .run(Operation::Read, || {
                    self.matching_entries(&input, &declared, select.as_ref())
                })
                .await
        )
        .map_err(|e| wrap(Operation::Read, &input, e))?;

        merge_entries(matched)
    }

    /// Walk every page of the listing, keeping entries on the declared
    /// resource or its select-on-all-columns twin.
    async fn matching_entries(
        &self,
        input: &ListPermissionsInput,
        declared: &ResourceLocator,
        select: Option<&ResourceLocator>,
    ) -> Result<Vec<PrincipalResourcePermissions>, RemoteError> {
        let pages = list_permissions_pages(self.api.as_ref(), input);
        pin_mut!(pages);

        let mut matched = vec![];
        while let Some(page) = pages.try_next().await? {
            for entry in page.principal_resource_permissions {
                let is_match = locators_match(declared, &entry.resource)
                    || select.map_or(false, |s| locators_match(s, &entry.resource));
                if is_match {
                    matched.push(entry);
                }
            }
        }
        Ok(matched)
    }
}

/// Fold matched entries into a grant.
///
/// At most two entries may match: the resource itself and, for SELECT on a
/// table, the column wildcard entry the service keeps alongside it.
fn merge_entries(entries: Vec<PrincipalResourcePermissions>) -> Result<Grant, GrantError> {
    let first = match entries.len() {
        0 => return Err(ConsistencyError::NoPermissionsFound.into()),
        n if n > 2 => return Err(ConsistencyError::MultiplePermissionsFound(n).into()),
        _ => &entries[0],
    };

    let mut grant = Grant {
        principal: first.principal.to_owned(),
        resource: first.resource.to_owned(),
        permissions: PermissionSet::default(),
        permissions_with_grant_option: PermissionSet::default(),
    };
    for entry in &entries {
        grant.permissions.extend_from(&entry.permissions);
        grant
            .permissions_with_grant_option
            .extend_from(&entry.permissions_with_grant_option);
    }
    Ok(grant)
}

fn permissions_input(request: &GrantRequest) -> PermissionsInput {
    PermissionsInput {
        catalog_id: request.catalog_id(),
        principal: request.principal.to_owned(),
        resource: normalize(request, false),
        permissions: request.permissions.to_owned(),
        permissions_with_grant_option: request.permissions_with_grant_option.to_owned(),
    }
}

fn check_request(request: &GrantRequest) -> Result<(), GrantError> {
    if request.principal.is_empty() {
        return Err(GrantError::InvalidRequest("principal is empty".to_owned()));
    }
    if request.permissions.is_empty() {
        return Err(GrantError::InvalidRequest(
            "at least one permission is required".to_owned(),
        ));
    }
    Ok(())
}

/// The service reports revoking something that isn't there in two ways.
fn already_revoked(err: &RemoteError) -> bool {
    err.is(ErrorCode::EntityNotFound, "") || err.is(ErrorCode::InvalidInput, "No permissions revoked")
}

fn wrap<I: Serialize + Debug>(operation: Operation, input: &I, err: RetryError) -> GrantError {
    match err {
        RetryError::Failed(source) => GrantError::Remote {
            operation,
            input: describe(input),
            source,
        },
        RetryError::Cancelled => GrantError::Cancelled { operation },
    }
}

/// Compact JSON rendering of a service input, for logs and errors.
fn describe<I: Serialize + Debug>(input: &I) -> String {
    serde_json::to_string(input).unwrap_or_else(|_| format!("{input:?}"))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use mockall::{mock, predicate};

    use super::*;
    use crate::locator::{
        ColumnWildcard, DatabaseResource, TableResource, TableWithColumnsResource,
    };
    use crate::permission::Permission;
    use crate::remote::ListPermissionsPage;

    mock! {
        pub Api {}

        #[async_trait]
        impl PermissionsApi for Api {
            async fn grant_permissions(&self, input: &PermissionsInput) -> Result<(), RemoteError>;
            async fn revoke_permissions(&self, input: &PermissionsInput) -> Result<(), RemoteError>;
            async fn list_permissions(
                &self,
                input: &ListPermissionsInput,
                next_token: Option<String>,
            ) -> Result<ListPermissionsPage, RemoteError>;
        }
    }

    const ACCOUNT: &str = "123456789012";

    fn controller(api: MockApi) -> GrantController {
        GrantController::new(Arc::new(api), RetryConfig::default()).unwrap()
    }

    fn database_request() -> GrantRequest {
        GrantRequest::new(
            "role/X",
            ResourceSpec::database("db1"),
            PermissionSet::new([Permission::Select, Permission::Alter]),
        )
    }

    fn database_entry(permissions: &[Permission]) -> PrincipalResourcePermissions {
        PrincipalResourcePermissions {
            principal: "role/X".to_owned(),
            resource: ResourceLocator::Database(DatabaseResource {
                catalog_id: Some(ACCOUNT.to_owned()),
                name: "db1".to_owned(),
            }),
            permissions: PermissionSet::new(permissions.iter().copied()),
            permissions_with_grant_option: PermissionSet::default(),
        }
    }

    fn single_page(entries: Vec<PrincipalResourcePermissions>) -> ListPermissionsPage {
        ListPermissionsPage {
            principal_resource_permissions: entries,
            next_token: None,
        }
    }

    fn expect_listing(api: &mut MockApi, entries: Vec<PrincipalResourcePermissions>) {
        let page = single_page(entries);
        api.expect_list_permissions()
            .with(predicate::always(), predicate::eq(None))
            .returning(move |_, _| Ok(page.clone()));
    }

    #[tokio::test]
    async fn create_grants_database_locator_and_reads_back() -> anyhow::Result<()> {
        let mut api = MockApi::new();
        api.expect_grant_permissions()
            .withf(|input: &PermissionsInput| {
                input.principal == "role/X"
                    && input.catalog_id.is_none()
                    && input.resource
                        == ResourceLocator::Database(DatabaseResource {
                            catalog_id: None,
                            name: "db1".to_owned(),
                        })
                    && input.permissions.0 == vec![Permission::Select, Permission::Alter]
            })
            .times(1)
            .returning(|_| Ok(()));
        expect_listing(
            &mut api,
            vec![database_entry(&[Permission::Select, Permission::Alter])],
        );

        let created = controller(api).create(&database_request()).await?;
        assert_eq!(
            created.grant.permissions.0,
            vec![Permission::Select, Permission::Alter]
        );
        assert_eq!(created.grant.principal, "role/X");
        Ok(())
    }

    #[tokio::test]
    async fn handle_is_stable_for_the_same_request() -> anyhow::Result<()> {
        let mut api = MockApi::new();
        api.expect_grant_permissions().times(2).returning(|_| Ok(()));
        expect_listing(&mut api, vec![database_entry(&[Permission::Select])]);
        let controller = controller(api);

        let first = controller.create(&database_request()).await?;
        let second = controller.create(&database_request()).await?;
        assert_eq!(first.handle, second.handle);
        Ok(())
    }

    #[tokio::test]
    async fn read_lists_by_table_for_column_grants() -> anyhow::Result<()> {
        let mut api = MockApi::new();
        api.expect_list_permissions()
            .withf(|input: &ListPermissionsInput, _| {
                input.resource
                    == Some(ResourceLocator::Table(TableResource {
                        catalog_id: None,
                        database_name: "db1".to_owned(),
                        name: Some("t1".to_owned()),
                        table_wildcard: false,
                    }))
            })
            .returning(|_, _| {
                Ok(single_page(vec![PrincipalResourcePermissions {
                    principal: "role/X".to_owned(),
                    resource: ResourceLocator::TableWithColumns(TableWithColumnsResource {
                        catalog_id: Some(ACCOUNT.to_owned()),
                        database_name: "db1".to_owned(),
                        name: "t1".to_owned(),
                        column_names: vec![],
                        column_wildcard: Some(ColumnWildcard {
                            excluded_column_names: vec!["ssn".to_owned()],
                        }),
                    }),
                    permissions: PermissionSet::new([Permission::Select]),
                    permissions_with_grant_option: PermissionSet::default(),
                }]))
            });

        let request = GrantRequest::new(
            "role/X",
            ResourceSpec::columns_excluding("db1", "t1", &["ssn"]),
            PermissionSet::new([Permission::Select]),
        );
        let grant = controller(api).read(&request).await?.expect("grant exists");
        let surfaced = grant.to_request(None);
        assert_eq!(
            surfaced
                .resource
                .table_with_columns
                .map(|t| t.excluded_column_names),
            Some(vec!["ssn".to_owned()])
        );
        Ok(())
    }

    #[tokio::test]
    async fn read_with_one_match_returns_its_permissions() -> anyhow::Result<()> {
        let mut api = MockApi::new();
        let unrelated = PrincipalResourcePermissions {
            resource: ResourceLocator::Database(DatabaseResource {
                catalog_id: Some(ACCOUNT.to_owned()),
                name: "db2".to_owned(),
            }),
            ..database_entry(&[Permission::Drop])
        };
        expect_listing(
            &mut api,
            vec![unrelated, database_entry(&[Permission::Describe])],
        );

        let grant = controller(api).read(&database_request()).await?;
        assert_eq!(
            grant.map(|g| g.permissions),
            Some(PermissionSet::new([Permission::Describe]))
        );
        Ok(())
    }

    #[tokio::test]
    async fn read_with_no_match_is_a_consistency_error() {
        let mut api = MockApi::new();
        expect_listing(&mut api, vec![]);

        let err = controller(api).read(&database_request()).await.unwrap_err();
        assert!(matches!(
            err,
            GrantError::Consistency(ConsistencyError::NoPermissionsFound)
        ));
    }

    #[tokio::test]
    async fn read_with_three_matches_is_a_consistency_error() {
        let mut api = MockApi::new();
        expect_listing(
            &mut api,
            vec![
                database_entry(&[Permission::Select]),
                database_entry(&[Permission::Alter]),
                database_entry(&[Permission::Drop]),
            ],
        );

        let err = controller(api).read(&database_request()).await.unwrap_err();
        assert!(matches!(
            err,
            GrantError::Consistency(ConsistencyError::MultiplePermissionsFound(3))
        ));
    }

    #[tokio::test]
    async fn read_follows_pages() -> anyhow::Result<()> {
        let mut api = MockApi::new();
        api.expect_list_permissions()
            .with(predicate::always(), predicate::eq(None))
            .times(1)
            .returning(|_, _| {
                Ok(ListPermissionsPage {
                    principal_resource_permissions: vec![],
                    next_token: Some("page-2".to_owned()),
                })
            });
        api.expect_list_permissions()
            .with(predicate::always(), predicate::eq(Some("page-2".to_owned())))
            .times(1)
            .returning(|_, _| Ok(single_page(vec![database_entry(&[Permission::Alter])])));

        let grant = controller(api).read(&database_request()).await?;
        assert!(grant.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn entity_not_found_reads_as_absent() -> anyhow::Result<()> {
        let mut api = MockApi::new();
        api.expect_list_permissions().returning(|_, _| {
            Err(RemoteError::EntityNotFound {
                message: "Database db1 not found".to_owned(),
            })
        });

        assert_eq!(controller(api).read(&database_request()).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn entity_not_found_right_after_create_is_an_error() {
        let mut api = MockApi::new();
        api.expect_grant_permissions().returning(|_| Ok(()));
        api.expect_list_permissions().returning(|_, _| {
            Err(RemoteError::EntityNotFound {
                message: "Database db1 not found".to_owned(),
            })
        });

        let err = controller(api).create(&database_request()).await.unwrap_err();
        assert!(matches!(
            err,
            GrantError::Remote {
                operation: Operation::Read,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn terminal_grant_error_is_wrapped_with_input() {
        let mut api = MockApi::new();
        api.expect_grant_permissions().times(1).returning(|_| {
            Err(RemoteError::InvalidInput {
                message: "Permissions modification is invalid".to_owned(),
            })
        });

        let err = controller(api).create(&database_request()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("error creating permissions (input: {"));
        assert!(message.contains(r#""Principal":"role/X""#));
        assert!(message.ends_with("InvalidInputException: Permissions modification is invalid"));
    }

    #[tokio::test]
    async fn delete_of_missing_grant_succeeds() -> anyhow::Result<()> {
        let mut api = MockApi::new();
        api.expect_revoke_permissions().times(1).returning(|_| {
            Err(RemoteError::InvalidInput {
                message: "No permissions revoked. Grantee has no ALTER permission".to_owned(),
            })
        });

        controller(api).delete(&database_request()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn delete_surfaces_other_errors() {
        let mut api = MockApi::new();
        api.expect_revoke_permissions().times(1).returning(|_| {
            Err(RemoteError::AccessDenied {
                message: "role/admin may not revoke".to_owned(),
            })
        });

        let err = controller(api).delete(&database_request()).await.unwrap_err();
        assert!(matches!(
            err,
            GrantError::Remote {
                operation: Operation::Delete,
                source: RemoteError::AccessDenied { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancelled_controller_makes_no_calls() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let controller = GrantController::with_cancellation(
            Arc::new(MockApi::new()),
            RetryConfig::default(),
            cancel,
        )
        .unwrap();

        let err = controller.delete(&database_request()).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn empty_principal_is_rejected_before_any_call() {
        let request = GrantRequest {
            principal: String::new(),
            ..database_request()
        };
        let err = controller(MockApi::new()).create(&request).await.unwrap_err();
        assert!(matches!(err, GrantError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn read_lists_in_the_declared_catalog() -> anyhow::Result<()> {
        let mut api = MockApi::new();
        api.expect_list_permissions()
            .withf(|input: &ListPermissionsInput, _| {
                input.catalog_id.as_deref() == Some("210987654321") && input.principal == "role/X"
            })
            .times(1)
            .returning(|_, _| {
                let mut entry = database_entry(&[Permission::Alter]);
                if let ResourceLocator::Database(db) = &mut entry.resource {
                    db.catalog_id = Some("210987654321".to_owned());
                }
                Ok(single_page(vec![entry]))
            });

        let request = GrantRequest {
            catalog_id: Some("210987654321".to_owned()),
            ..database_request()
        };
        assert!(controller(api).read(&request).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn read_leaves_an_empty_catalog_out_of_the_listing() -> anyhow::Result<()> {
        let mut api = MockApi::new();
        api.expect_list_permissions()
            .withf(|input: &ListPermissionsInput, _| input.catalog_id.is_none())
            .times(1)
            .returning(|_, _| Ok(single_page(vec![database_entry(&[Permission::Alter])])));

        let request = GrantRequest {
            catalog_id: Some(String::new()),
            ..database_request()
        };
        assert!(controller(api).read(&request).await?.is_some());
        Ok(())
    }

    #[test]
    fn invalid_retry_config_fails_construction() {
        let config = RetryConfig {
            propagation_timeout_secs: u64::MAX,
            ..Default::default()
        };
        assert!(GrantController::new(Arc::new(MockApi::new()), config).is_err());
    }
}
