//! Microsoft Graph client for offboarding access discovery and revocation.
//!
//! Wraps the parts of the Graph REST surface that show what a departed
//! user can still do, and the calls that take it away:
//!
//! - user resolution by principal name
//! - delegated permission grants (list, delete, scope down)
//! - app-role assignments (list, delete)
//! - registered devices and sign-in audit logs
//! - session revocation
//! - service principal display metadata, cached with a TTL
//!
//! List operations follow `@odata.nextLink` until exhausted. Deletes are
//! idempotent: an object that is already gone counts as deleted, so callers
//! can retry blindly without a list-then-act race.
//!
//! # Example
//!
//! ```no_run
//! use offboard_graph::{DirectoryApi, GraphClient, GraphSettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = GraphSettings::from_env()?;
//! if let Some(client) = GraphClient::from_settings(&settings)? {
//!     if let Some(user) = client.get_user_by_principal("jane@contoso.com").await? {
//!         let grants = client.list_user_oauth_grants(&user.id).await?;
//!         println!("{} grants", grants.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod app_roles;
mod auth;
mod config;
mod directory;
mod error;
mod graph_client;
mod grants;
mod memory;
pub mod models;
mod retry;
mod service_principals;
mod sign_ins;
mod users;

pub use auth::TokenCache;
pub use config::{CloudEnvironment, GraphCredentials, GraphSettings};
pub use directory::DirectoryApi;
pub use error::{required_permission, ErrorKind, GraphError, GraphResult};
pub use graph_client::{GraphClient, MAX_PAGES};
pub use memory::{DirectoryCall, InMemoryDirectory, InjectedFailure};
pub use models::{
    split_scopes, AppRole, AppRoleAssignment, DirectoryRecord, GraphUser, OAuthGrant,
    RegisteredDevice, ServicePrincipal, SignInEvent, SignInStatus,
};
pub use retry::RetryPolicy;
pub use service_principals::ServicePrincipalCache;
