// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::sync::Arc;

use async_trait::async_trait;
use blobauth_core::{Context, Error, RequestDescriptor, Result, SignRequest, SigningCredential};
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderValue, Method, StatusCode};
use log::debug;
use serde::Deserialize;

use crate::constants::*;
use crate::{
    CachedToken, LogObserver, ObserveTokenFailure, ServicePrincipalCredential, TokenCache,
    TokenFetchFailure,
};

/// ServicePrincipalAuthorizer attaches OAuth2 bearer tokens obtained with the
/// client credentials flow.
///
/// Tokens are cached per credential triple and reused until the `exp` claim of the
/// token has passed. An expired token is refreshed by the first caller that notices,
/// concurrent callers may all refresh and the last write wins.
///
/// Reference: <https://learn.microsoft.com/en-us/azure/active-directory/develop/v2-oauth2-client-creds-grant-flow>
#[derive(Debug, Clone)]
pub struct ServicePrincipalAuthorizer {
    authority_host: String,
    scope: String,
    cache: TokenCache,
    observer: Arc<dyn ObserveTokenFailure>,
}

impl Default for ServicePrincipalAuthorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ServicePrincipalAuthorizer {
    /// Create a new authorizer with its own token cache.
    pub fn new() -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            scope: STORAGE_SCOPE.to_string(),
            cache: TokenCache::new(),
            observer: Arc::new(LogObserver),
        }
    }

    /// Set the authority host, `https://login.microsoftonline.com` by default.
    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into();
        self
    }

    /// Set the requested scope, `https://storage.azure.com/.default` by default.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Use a cache shared with other authorizers.
    pub fn with_cache(mut self, cache: TokenCache) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the observer notified about failed token acquisitions.
    pub fn with_observer(mut self, observer: impl ObserveTokenFailure) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// The token cache used by this authorizer.
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Get a valid token for this credential, fetching a new one if needed.
    ///
    /// Failures are returned as-is and are NOT reported to the observer.
    pub async fn token(
        &self,
        ctx: &Context,
        cred: &ServicePrincipalCredential,
    ) -> Result<CachedToken> {
        self.acquire(ctx, cred).await.map_err(|f| f.error)
    }

    /// Attach `Authorization: Bearer <token>` to the request.
    ///
    /// This never fails. If no token can be acquired the failure goes to the
    /// observer and the request carries `Bearer No token`, so it's rejected by the
    /// storage service like any other unauthorized request.
    pub async fn add_bearer_token(
        &self,
        ctx: &Context,
        req: &mut RequestDescriptor,
        cred: &ServicePrincipalCredential,
    ) {
        let value = match self.acquire(ctx, cred).await {
            Ok(token) => HeaderValue::from_str(&format!("Bearer {}", token.access_token))
                .map_err(|e| {
                    Failure::from(
                        Error::token_invalid("access token is not a valid header value")
                            .with_source(e),
                    )
                }),
            Err(failure) => Err(failure),
        };

        let mut value = value.unwrap_or_else(|failure| {
            self.report(cred, failure);
            HeaderValue::from_static(BEARER_NO_TOKEN)
        });
        value.set_sensitive(true);
        req.headers.insert(AUTHORIZATION, value);
    }

    /// Bind this authorizer to a credential so it can be used as a [`SignRequest`].
    pub fn bind(self, cred: ServicePrincipalCredential) -> BoundServicePrincipalAuthorizer {
        BoundServicePrincipalAuthorizer {
            authorizer: self,
            cred,
        }
    }

    async fn acquire(
        &self,
        ctx: &Context,
        cred: &ServicePrincipalCredential,
    ) -> std::result::Result<CachedToken, Failure> {
        match self.cache.get(cred) {
            Some(token) if token.is_valid() => {
                debug!("reuse cached bearer token for client {}", cred.client_id);
                return Ok(token);
            }
            Some(token) => debug!(
                "bearer token for client {} expired at {}, refreshing",
                cred.client_id, token.expires_at
            ),
            None => debug!("no bearer token cached for client {}", cred.client_id),
        }

        let token = self.fetch_token(ctx, cred).await?;
        self.cache.insert(cred.clone(), token.clone());
        Ok(token)
    }

    async fn fetch_token(
        &self,
        ctx: &Context,
        cred: &ServicePrincipalCredential,
    ) -> std::result::Result<CachedToken, Failure> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            cred.tenant_id
        );

        let body = form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &cred.client_id)
            .append_pair("client_secret", &cred.client_secret)
            .append_pair("scope", &self.scope)
            .finish();

        let req = http::Request::builder()
            .method(Method::POST)
            .uri(&url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Bytes::from(body))
            .map_err(Error::from)?;

        let resp = ctx.http_send(req).await?;
        let status = resp.status();
        if status != StatusCode::OK {
            let body = String::from_utf8_lossy(resp.body()).to_string();
            let reason = if body.is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                body
            };
            return Err(Failure {
                status: Some(status),
                error: Error::token_invalid(format!(
                    "token request failed with status {status}: {reason}"
                )),
                reason: Some(reason),
            });
        }

        let token: TokenResponse = serde_json::from_slice(resp.body()).map_err(|e| {
            Error::token_invalid("failed to parse token response").with_source(e)
        })?;
        Ok(CachedToken::from_access_token(&token.access_token)?)
    }

    fn report(&self, cred: &ServicePrincipalCredential, failure: Failure) {
        self.observer.on_failure(&TokenFetchFailure {
            client_id: cred.client_id.clone(),
            tenant_id: cred.tenant_id.clone(),
            status: failure.status,
            reason: failure.reason.unwrap_or_else(|| failure.error.to_string()),
        });
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Why a token could not be acquired.
struct Failure {
    status: Option<StatusCode>,
    reason: Option<String>,
    error: Error,
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self {
            status: None,
            reason: None,
            error,
        }
    }
}

/// A [`ServicePrincipalAuthorizer`] together with the credential it authorizes with.
#[derive(Debug, Clone)]
pub struct BoundServicePrincipalAuthorizer {
    authorizer: ServicePrincipalAuthorizer,
    cred: ServicePrincipalCredential,
}

#[async_trait]
impl SignRequest for BoundServicePrincipalAuthorizer {
    async fn sign_request(&self, ctx: &Context, req: &mut RequestDescriptor) -> Result<()> {
        self.authorizer.add_bearer_token(ctx, req, &self.cred).await;
        Ok(())
    }
}
