//! The remote permissions service
//!
//! The service only offers grant, revoke and a paginated list. Anything that
//! talks to it (an SDK client, a test fake) implements [`PermissionsApi`].

use std::fmt::Display;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::locator::ResourceLocator;
use crate::permission::PermissionSet;

/// Input for both granting and revoking.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PermissionsInput {
    /// Catalog to act on, the caller's account catalog when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
    /// Principal identifier
    pub principal: String,
    /// What the permissions apply to
    pub resource: ResourceLocator,
    /// Permissions to grant or revoke
    pub permissions: PermissionSet,
    /// Permissions to grant or revoke with the grant option
    #[serde(default, skip_serializing_if = "PermissionSet::is_empty")]
    pub permissions_with_grant_option: PermissionSet,
}

/// Filter for listing permissions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListPermissionsInput {
    /// Catalog to list from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_id: Option<String>,
    /// Only list permissions held by this principal
    pub principal: String,
    /// Only list permissions on this resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceLocator>,
}

/// One permission record as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PrincipalResourcePermissions {
    /// Principal holding the permissions
    pub principal: String,
    /// Resource the permissions are on
    pub resource: ResourceLocator,
    /// Granted permissions
    #[serde(default)]
    pub permissions: PermissionSet,
    /// Permissions held with the grant option
    #[serde(default)]
    pub permissions_with_grant_option: PermissionSet,
}

/// A single page of list results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListPermissionsPage {
    /// Records on this page
    #[serde(default)]
    pub principal_resource_permissions: Vec<PrincipalResourcePermissions>,
    /// Token for the next page. `None` marks the last page.
    #[serde(default)]
    pub next_token: Option<String>,
}

/// The error codes the service reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// InvalidInputException
    InvalidInput,
    /// ConcurrentModificationException
    ConcurrentModification,
    /// AccessDeniedException
    AccessDenied,
    /// EntityNotFoundException
    EntityNotFound,
    /// Anything else
    Other,
}

/// An error returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The request was rejected as malformed. Some messages are transient.
    #[error("InvalidInputException: {message}")]
    InvalidInput {
        /// Service message
        message: String,
    },
    /// Someone else changed the same permissions at the same time.
    #[error("ConcurrentModificationException: {message}")]
    ConcurrentModification {
        /// Service message
        message: String,
    },
    /// The caller may not do this (possibly not yet).
    #[error("AccessDeniedException: {message}")]
    AccessDenied {
        /// Service message
        message: String,
    },
    /// The principal/resource combination does not exist.
    #[error("EntityNotFoundException: {message}")]
    EntityNotFound {
        /// Service message
        message: String,
    },
    /// Any other service or transport failure.
    #[error("{code}: {message}")]
    Other {
        /// Raw error code
        code: String,
        /// Service message
        message: String,
    },
}

impl RemoteError {
    /// The code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            RemoteError::InvalidInput { .. } => ErrorCode::InvalidInput,
            RemoteError::ConcurrentModification { .. } => ErrorCode::ConcurrentModification,
            RemoteError::AccessDenied { .. } => ErrorCode::AccessDenied,
            RemoteError::EntityNotFound { .. } => ErrorCode::EntityNotFound,
            RemoteError::Other { .. } => ErrorCode::Other,
        }
    }

    /// The service message.
    pub fn message(&self) -> &str {
        match self {
            RemoteError::InvalidInput { message }
            | RemoteError::ConcurrentModification { message }
            | RemoteError::AccessDenied { message }
            | RemoteError::EntityNotFound { message }
            | RemoteError::Other { message, .. } => message,
        }
    }

    /// Whether this error has the given code and its message contains
    /// `fragment`. An empty fragment matches any message.
    pub fn is(&self, code: ErrorCode, fragment: &str) -> bool {
        self.code() == code && self.message().contains(fragment)
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            ErrorCode::InvalidInput => "InvalidInputException",
            ErrorCode::ConcurrentModification => "ConcurrentModificationException",
            ErrorCode::AccessDenied => "AccessDeniedException",
            ErrorCode::EntityNotFound => "EntityNotFoundException",
            ErrorCode::Other => "UnknownError",
        };
        write!(f, "{code}")
    }
}

/// The operations the permissions service exposes.
#[async_trait]
pub trait PermissionsApi: Send + Sync {
    /// Grant permissions. Granting what is already held is a no-op.
    async fn grant_permissions(&self, input: &PermissionsInput) -> Result<(), RemoteError>;
    /// Revoke permissions.
    async fn revoke_permissions(&self, input: &PermissionsInput) -> Result<(), RemoteError>;
    /// Fetch one page of permissions. `next_token` is `None` for the first page.
    async fn list_permissions(
        &self,
        input: &ListPermissionsInput,
        next_token: Option<String>,
    ) -> Result<ListPermissionsPage, RemoteError>;
}

/// Lazily walk every page of a listing, stopping after the last page or the
/// first error.
pub fn list_permissions_pages<'a>(
    api: &'a dyn PermissionsApi,
    input: &'a ListPermissionsInput,
) -> impl Stream<Item = Result<ListPermissionsPage, RemoteError>> + 'a {
    // `Some(token)` means there is a page left to fetch.
    stream::try_unfold(Some(None), move |state: Option<Option<String>>| async move {
        let token = match state {
            Some(token) => token,
            None => return Ok::<_, RemoteError>(None),
        };
        let page = api.list_permissions(input, token).await?;
        let next = page.next_token.clone().map(Some);
        Ok::<_, RemoteError>(Some((page, next)))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::TryStreamExt;

    use super::*;

    /// Serves a fixed number of empty pages and records the tokens it saw.
    struct PagedApi {
        pages: usize,
        seen: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl PermissionsApi for PagedApi {
        async fn grant_permissions(&self, _input: &PermissionsInput) -> Result<(), RemoteError> {
            unimplemented!()
        }

        async fn revoke_permissions(&self, _input: &PermissionsInput) -> Result<(), RemoteError> {
            unimplemented!()
        }

        async fn list_permissions(
            &self,
            _input: &ListPermissionsInput,
            next_token: Option<String>,
        ) -> Result<ListPermissionsPage, RemoteError> {
            let index = next_token
                .as_deref()
                .map(|t| t.parse::<usize>().unwrap())
                .unwrap_or(0);
            self.seen.lock().unwrap().push(next_token);
            if index == 99 {
                return Err(RemoteError::Other {
                    code: "InternalServiceException".to_owned(),
                    message: "boom".to_owned(),
                });
            }
            Ok(ListPermissionsPage {
                principal_resource_permissions: vec![],
                next_token: (index + 1 < self.pages).then(|| (index + 1).to_string()),
            })
        }
    }

    fn input() -> ListPermissionsInput {
        ListPermissionsInput {
            catalog_id: None,
            principal: "role/X".to_owned(),
            resource: None,
        }
    }

    #[tokio::test]
    async fn pages_are_followed_until_last_marker() -> anyhow::Result<()> {
        let api = PagedApi {
            pages: 3,
            seen: Mutex::new(vec![]),
        };
        let input = input();
        let pages: Vec<_> = list_permissions_pages(&api, &input).try_collect().await?;
        assert_eq!(pages.len(), 3);
        assert_eq!(
            *api.seen.lock().unwrap(),
            vec![None, Some("1".to_owned()), Some("2".to_owned())]
        );
        Ok(())
    }

    #[tokio::test]
    async fn first_error_ends_the_walk() {
        let api = PagedApi {
            pages: 100,
            seen: Mutex::new(vec![]),
        };
        let input = input();
        let res: Result<Vec<_>, _> = list_permissions_pages(&api, &input).try_collect().await;
        assert!(matches!(res, Err(RemoteError::Other { .. })));
        assert_eq!(api.seen.lock().unwrap().len(), 100);
    }

    #[test]
    fn error_matching_uses_code_and_fragment() {
        let err = RemoteError::InvalidInput {
            message: "Invalid principal: role/X".to_owned(),
        };
        assert!(err.is(ErrorCode::InvalidInput, "Invalid principal"));
        assert!(err.is(ErrorCode::InvalidInput, ""));
        assert!(!err.is(ErrorCode::AccessDenied, "Invalid principal"));
        assert_eq!(err.to_string(), "InvalidInputException: Invalid principal: role/X");
    }
}
