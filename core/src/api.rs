use crate::{Context, RequestDescriptor, Result};
use std::fmt::Debug;

/// SigningCredential is the trait for credentials that may go stale.
pub trait SigningCredential: Clone + Debug + Send + Sync + Unpin + 'static {
    /// Check if the credential can still be used.
    fn is_valid(&self) -> bool;
}

/// SignRequest decorates an outgoing request with proof of authorization.
///
/// Implementations only add or overwrite headers, they never send the request.
#[async_trait::async_trait]
pub trait SignRequest: Debug + Send + Sync + Unpin + 'static {
    /// Authorize the request in place.
    ///
    /// `ctx` provides the transport for schemes that need to talk to a token
    /// endpoint first.
    async fn sign_request(&self, ctx: &Context, req: &mut RequestDescriptor) -> Result<()>;
}
