//! Core components for authorizing blob storage requests.
//!
//! This crate provides the service-agnostic building blocks of the blobauth ecosystem.
//!
//! ## Overview
//!
//! - **RequestDescriptor**: the unsigned form of an outgoing request (method, url, ordered
//!   query, headers and a body whose length may be unknown).
//! - **Context**: a container for the transport ([`HttpSend`]) and the environment ([`Env`])
//!   an authorizer may need.
//! - **SignRequest**: the trait every authorization scheme implements.
//!
//! ## Example
//!
//! ```no_run
//! use blobauth_core::{Context, RequestDescriptor, Result, SignRequest};
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! struct StaticBearer(String);
//!
//! #[async_trait]
//! impl SignRequest for StaticBearer {
//!     async fn sign_request(&self, _: &Context, req: &mut RequestDescriptor) -> Result<()> {
//!         req.header_insert(http::header::AUTHORIZATION, &format!("Bearer {}", self.0))
//!     }
//! }
//!
//! # async fn example() -> Result<()> {
//! let ctx = Context::new();
//! let mut req = RequestDescriptor::new(http::Method::GET, "https://example.com/container")?;
//! StaticBearer("token".to_string()).sign_request(&ctx, &mut req).await?;
//! # Ok(())
//! # }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod error;
pub use error::{Error, ErrorKind, Result};

mod context;
pub use context::{Context, Env, HttpSend, NoopEnv, NoopHttpSend, OsEnv, StaticEnv};

mod api;
pub use api::{SignRequest, SigningCredential};

mod request;
pub use request::{Body, RequestDescriptor, QUERY_ENCODE_SET};
