use async_trait::async_trait;
use blobauth_core::{Context, Error, RequestDescriptor, Result, SignRequest};
use log::debug;

use crate::{
    Config, ServicePrincipalAuthorizer, ServicePrincipalCredential, SharedKeyCredential,
    SharedKeySigner, TokenCache,
};

/// Authorizer is the scheme picked for a storage account, decided once when the
/// configuration is resolved.
#[derive(Debug, Clone)]
pub enum Authorizer {
    /// Sign every request with the account key.
    SharedKey {
        /// The signer in use.
        signer: SharedKeySigner,
        /// Account name and key.
        credential: SharedKeyCredential,
    },
    /// Attach a bearer token obtained for a service principal.
    ServicePrincipal {
        /// The authorizer holding the token cache.
        authorizer: ServicePrincipalAuthorizer,
        /// Client id, secret and tenant.
        credential: ServicePrincipalCredential,
    },
}

impl Authorizer {
    /// Build a shared key authorizer with the default signer.
    pub fn shared_key(credential: SharedKeyCredential) -> Self {
        Self::SharedKey {
            signer: SharedKeySigner::new(),
            credential,
        }
    }

    /// Build a service principal authorizer with its own token cache.
    pub fn service_principal(credential: ServicePrincipalCredential) -> Self {
        Self::ServicePrincipal {
            authorizer: ServicePrincipalAuthorizer::new(),
            credential,
        }
    }

    /// Pick the authorizer matching the credentials present in `config`.
    ///
    /// A complete service principal (client id, secret and tenant) is preferred,
    /// then account name and key. Anything else is a
    /// [`ConfigInvalid`](blobauth_core::ErrorKind::ConfigInvalid) error.
    pub fn from_config(config: &Config) -> Result<Self> {
        if let (Some(client_id), Some(client_secret), Some(tenant_id)) =
            (&config.client_id, &config.client_secret, &config.tenant_id)
        {
            debug!("authorize as service principal {client_id} in tenant {tenant_id}");
            return Ok(Self::ServicePrincipal {
                authorizer: ServicePrincipalAuthorizer::new()
                    .with_authority_host(config.authority_host()),
                credential: ServicePrincipalCredential::new(client_id, client_secret, tenant_id),
            });
        }

        if let (Some(account_name), Some(account_key)) = (&config.account_name, &config.account_key)
        {
            debug!("authorize with shared key of account {account_name}");
            let mut signer = SharedKeySigner::new();
            if let Some(version) = &config.version {
                signer = signer.with_version(version);
            }
            return Ok(Self::SharedKey {
                signer,
                credential: SharedKeyCredential::new(account_name, account_key),
            });
        }

        Err(Error::config_invalid(
            "neither a service principal nor an account key is configured",
        ))
    }

    /// Share `cache` between this authorizer and others built from the same scope.
    ///
    /// Shared key authorizers have nothing to cache and are returned unchanged.
    pub fn with_token_cache(self, cache: TokenCache) -> Self {
        match self {
            Self::ServicePrincipal {
                authorizer,
                credential,
            } => Self::ServicePrincipal {
                authorizer: authorizer.with_cache(cache),
                credential,
            },
            other => other,
        }
    }

    /// Authorize the request in place.
    ///
    /// Shared key errors are returned. The service principal variant never fails,
    /// see [`ServicePrincipalAuthorizer::add_bearer_token`].
    pub async fn authorize(&self, ctx: &Context, req: &mut RequestDescriptor) -> Result<()> {
        match self {
            Self::SharedKey { signer, credential } => signer.sign(req, credential, None),
            Self::ServicePrincipal {
                authorizer,
                credential,
            } => {
                authorizer.add_bearer_token(ctx, req, credential).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl SignRequest for Authorizer {
    async fn sign_request(&self, ctx: &Context, req: &mut RequestDescriptor) -> Result<()> {
        self.authorize(ctx, req).await
    }
}
