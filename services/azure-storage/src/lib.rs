//! Azure Blob Storage request authorization.
//!
//! Two schemes are supported:
//!
//! - [`SharedKeySigner`]: signs a canonical form of the request with the account key.
//! - [`ServicePrincipalAuthorizer`]: attaches an OAuth2 bearer token obtained with the
//!   client credentials of a service principal, cached until it expires.
//!
//! [`Authorizer`] holds whichever of the two a [`Config`] resolves to.
//!
//! # Example
//!
//! ```rust,no_run
//! use blobauth_azure_storage::{Authorizer, Config};
//! use blobauth_core::{Context, OsEnv, RequestDescriptor, Result, SignRequest};
//! use blobauth_http_send_reqwest::ReqwestHttpSend;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let ctx = Context::new()
//!         .with_http_send(ReqwestHttpSend::default())
//!         .with_env(OsEnv);
//!
//!     // Picks a service principal if AZURE_CLIENT_ID, AZURE_CLIENT_SECRET and
//!     // AZURE_TENANT_ID are set, the account key otherwise.
//!     let config = Config::default().from_env(&ctx)?;
//!     let authorizer = Authorizer::from_config(&config)?;
//!
//!     let mut req = RequestDescriptor::new(
//!         http::Method::GET,
//!         "https://account.blob.core.windows.net/container?restype=container&comp=list",
//!     )?;
//!     authorizer.sign_request(&ctx, &mut req).await?;
//!
//!     println!("authorized url: {}", req.uri()?);
//!     Ok(())
//! }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

mod constants;
pub use constants::{AZURE_VERSION, BEARER_NO_TOKEN};

mod connection_string;

mod config;
pub use config::Config;

mod credential;
pub use credential::{ServicePrincipalCredential, SharedKeyCredential};

mod shared_key;
pub use shared_key::{BoundSharedKeySigner, SharedKeySigner};

mod token;
pub use token::CachedToken;

mod cache;
pub use cache::TokenCache;

mod observer;
pub use observer::{FnObserver, LogObserver, ObserveTokenFailure, TokenFetchFailure};

mod service_principal;
pub use service_principal::{BoundServicePrincipalAuthorizer, ServicePrincipalAuthorizer};

mod authorizer;
pub use authorizer::Authorizer;
