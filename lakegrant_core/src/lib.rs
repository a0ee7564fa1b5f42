//!
//! Lake Formation grant reconciliation
//!
//! Declares permission grants on catalog resources, applies them through the
//! permissions service and reads them back, riding out the service's
//! eventual consistency along the way.
#![deny(missing_docs)]

pub use config::{LakegrantConfig, RetryConfig};
pub use controller::{CreatedGrant, Grant, GrantController, GrantHandle};
pub use error::{ConsistencyError, GrantError, Operation};
pub use permission::{Permission, PermissionSet};
pub use remote::{PermissionsApi, RemoteError};
pub use request::{GrantRequest, ResourceSpec};

pub mod config;
pub mod controller;
pub mod error;
pub mod locator;
pub mod logging;
pub mod permission;
pub mod remote;
pub mod request;
pub mod retry;

#[macro_export]
/// Time the code inside the macro. Write the elapsed time to debug logs.
/// Derived from https://notes.iveselov.info/programming/time_it-a-case-study-in-rust-macros
macro_rules! log_runtime {
    ($context:literal, $($tt:tt)+) => {
        {
            debug!("{}: starting", $context);
            let timer = std::time::Instant::now();
            let x =
            $(
                $tt
            )+;
            debug!("{}: {:?}", $context, timer.elapsed());
            x
        }
    }
}
