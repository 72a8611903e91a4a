use std::fmt::Debug;

use http::StatusCode;
use log::warn;

/// Structured description of a failed token acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenFetchFailure {
    /// Client id of the credential the token was requested for.
    pub client_id: String,
    /// Tenant id of the credential the token was requested for.
    pub tenant_id: String,
    /// Status returned by the token endpoint, `None` if no response was received.
    pub status: Option<StatusCode>,
    /// Response body or error message.
    pub reason: String,
}

/// ObserveTokenFailure is notified every time a bearer token could not be acquired.
///
/// Failures never reach the caller of
/// [`add_bearer_token`](crate::ServicePrincipalAuthorizer::add_bearer_token), this is
/// the only place they surface.
pub trait ObserveTokenFailure: Debug + Send + Sync + 'static {
    /// Called once per failed acquisition.
    fn on_failure(&self, failure: &TokenFetchFailure);
}

/// LogObserver reports failures through the `log` facade at `warn` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl ObserveTokenFailure for LogObserver {
    fn on_failure(&self, failure: &TokenFetchFailure) {
        match failure.status {
            Some(status) => warn!(
                "failed to acquire bearer token for client {} in tenant {}: status {}: {}",
                failure.client_id, failure.tenant_id, status, failure.reason
            ),
            None => warn!(
                "failed to acquire bearer token for client {} in tenant {}: {}",
                failure.client_id, failure.tenant_id, failure.reason
            ),
        }
    }
}

/// Adapts a closure into an [`ObserveTokenFailure`].
pub struct FnObserver<F>(pub F);

impl<F> Debug for FnObserver<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnObserver")
    }
}

impl<F> ObserveTokenFailure for FnObserver<F>
where
    F: Fn(&TokenFetchFailure) + Send + Sync + 'static,
{
    fn on_failure(&self, failure: &TokenFetchFailure) {
        (self.0)(failure)
    }
}
