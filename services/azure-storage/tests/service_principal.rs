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

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use blobauth_azure_storage::{
    Authorizer, CachedToken, Config, FnObserver, ServicePrincipalAuthorizer, ServicePrincipalCredential,
    SharedKeyCredential, TokenCache, TokenFetchFailure, BEARER_NO_TOKEN,
};
use blobauth_core::hash::base64_encode;
use blobauth_core::time::now;
use blobauth_core::{Context, Error, ErrorKind, HttpSend, RequestDescriptor, Result, SignRequest};
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::{Method, StatusCode};
use pretty_assertions::assert_eq;
use tokio::sync::Notify;

/// Build an unsigned token expiring at `exp`.
fn token_with_exp(exp: i64) -> String {
    let payload = base64_encode(format!(r#"{{"exp":{exp}}}"#).as_bytes());
    format!("eyJhbGciOiJub25lIn0.{}.c2ln", payload.trim_end_matches('='))
}

#[derive(Clone)]
enum Reply {
    Token { expires_in: i64 },
    Status(StatusCode, &'static str),
    Body(String),
    Fail,
}

/// A token endpoint that counts calls and records every request it receives.
#[derive(Debug, Clone, Default)]
struct MockTokenEndpoint {
    state: Arc<State>,
}

#[derive(Default)]
struct State {
    calls: AtomicUsize,
    requests: Mutex<Vec<http::Request<Bytes>>>,
    replies: Mutex<HashMap<String, Reply>>,
    arrived: Notify,
    release: Notify,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("calls", &self.calls)
            .finish()
    }
}

impl MockTokenEndpoint {
    /// Every tenant gets a token valid for an hour unless told otherwise.
    fn new() -> Self {
        Self::default()
    }

    fn reply(&self, tenant_id: &str, reply: Reply) {
        self.state
            .replies
            .lock()
            .unwrap()
            .insert(tenant_id.to_string(), reply);
    }

    fn calls(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> (String, String) {
        let requests = self.state.requests.lock().unwrap();
        let req = requests.last().expect("no request received");
        (
            req.uri().to_string(),
            String::from_utf8(req.body().to_vec()).unwrap(),
        )
    }

    fn context(&self) -> Context {
        Context::new().with_http_send(self.clone())
    }
}

#[async_trait]
impl HttpSend for MockTokenEndpoint {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);

        // `{authority}/{tenant}/oauth2/v2.0/token`
        let tenant_id = req
            .uri()
            .path()
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        self.state.requests.lock().unwrap().push(req);

        if tenant_id == "slow" {
            self.state.arrived.notify_one();
            self.state.release.notified().await;
        }

        let reply = self
            .state
            .replies
            .lock()
            .unwrap()
            .get(&tenant_id)
            .cloned()
            .unwrap_or(Reply::Token { expires_in: 3600 });

        let (status, body) = match reply {
            Reply::Token { expires_in } => (
                StatusCode::OK,
                format!(
                    r#"{{"token_type":"Bearer","expires_in":{expires_in},"access_token":"{}"}}"#,
                    token_with_exp(now().timestamp() + expires_in)
                ),
            ),
            Reply::Status(status, body) => (status, body.to_string()),
            Reply::Body(body) => (StatusCode::OK, body),
            Reply::Fail => return Err(Error::unexpected("connection refused")),
        };

        Ok(http::Response::builder()
            .status(status)
            .body(Bytes::from(body))
            .unwrap())
    }
}

fn recorder() -> (
    Arc<Mutex<Vec<TokenFetchFailure>>>,
    FnObserver<impl Fn(&TokenFetchFailure) + Send + Sync + 'static>,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let observer = {
        let seen = seen.clone();
        FnObserver(move |f: &TokenFetchFailure| seen.lock().unwrap().push(f.clone()))
    };
    (seen, observer)
}

fn blob_request() -> RequestDescriptor {
    RequestDescriptor::new(
        Method::GET,
        "https://account.blob.core.windows.net/container/blob",
    )
    .unwrap()
}

fn authorization(req: &RequestDescriptor) -> String {
    req.headers
        .get(AUTHORIZATION)
        .expect("authorization must be set")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_token_reused_within_validity() {
    let _ = env_logger::builder().is_test(true).try_init();

    let endpoint = MockTokenEndpoint::new();
    let ctx = endpoint.context();
    let authorizer = ServicePrincipalAuthorizer::new();
    let cred = ServicePrincipalCredential::new("c", "s", "t");

    let mut first = blob_request();
    authorizer.add_bearer_token(&ctx, &mut first, &cred).await;
    let mut second = blob_request();
    authorizer.add_bearer_token(&ctx, &mut second, &cred).await;

    assert_eq!(endpoint.calls(), 1);
    assert!(authorization(&first).starts_with("Bearer eyJ"));
    assert_eq!(authorization(&first), authorization(&second));
}

#[tokio::test]
async fn test_client_credentials_end_to_end() {
    let endpoint = MockTokenEndpoint::new();
    let payload = base64_encode(format!(r#"{{"exp": {}}}"#, now().timestamp() + 100).as_bytes());
    let access_token = format!("a.{payload}");
    endpoint.reply(
        "t",
        Reply::Body(format!(r#"{{"access_token": "{access_token}"}}"#)),
    );
    let ctx = endpoint.context();
    let authorizer = ServicePrincipalAuthorizer::new();
    let cred = ServicePrincipalCredential::new("c", "s", "t");

    let mut req = blob_request();
    authorizer.add_bearer_token(&ctx, &mut req, &cred).await;
    assert_eq!(endpoint.calls(), 1);
    assert_eq!(authorization(&req), format!("Bearer {access_token}"));

    let mut req = blob_request();
    authorizer.add_bearer_token(&ctx, &mut req, &cred).await;
    assert_eq!(endpoint.calls(), 1);
    assert_eq!(authorization(&req), format!("Bearer {access_token}"));
}

#[tokio::test]
async fn test_expired_token_is_refreshed() {
    let endpoint = MockTokenEndpoint::new();
    endpoint.reply("t", Reply::Token { expires_in: -100 });
    let ctx = endpoint.context();
    let authorizer = ServicePrincipalAuthorizer::new();
    let cred = ServicePrincipalCredential::new("c", "s", "t");

    for calls in 1..=3 {
        let mut req = blob_request();
        authorizer.add_bearer_token(&ctx, &mut req, &cred).await;
        assert_eq!(endpoint.calls(), calls);
    }

    endpoint.reply("t", Reply::Token { expires_in: 100 });
    let mut req = blob_request();
    authorizer.add_bearer_token(&ctx, &mut req, &cred).await;
    assert_eq!(endpoint.calls(), 4);

    let cached = authorizer.cache().get(&cred).unwrap();
    assert!(cached.expires_at > now());
    assert_eq!(authorization(&req), format!("Bearer {}", cached.access_token));

    let mut req = blob_request();
    authorizer.add_bearer_token(&ctx, &mut req, &cred).await;
    assert_eq!(endpoint.calls(), 4);
}

#[tokio::test]
async fn test_rejected_credentials_fall_back_to_sentinel() {
    let endpoint = MockTokenEndpoint::new();
    endpoint.reply(
        "t",
        Reply::Status(
            StatusCode::FORBIDDEN,
            r#"{"error":"invalid_client","error_description":"AADSTS7000215"}"#,
        ),
    );
    let ctx = endpoint.context();
    let (seen, observer) = recorder();
    let authorizer = ServicePrincipalAuthorizer::new().with_observer(observer);
    let cred = ServicePrincipalCredential::new("c", "s", "t");

    let mut req = blob_request();
    authorizer.add_bearer_token(&ctx, &mut req, &cred).await;

    assert_eq!(authorization(&req), BEARER_NO_TOKEN);
    assert!(authorizer.cache().is_empty());

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].client_id, "c");
    assert_eq!(seen[0].tenant_id, "t");
    assert_eq!(seen[0].status, Some(StatusCode::FORBIDDEN));
    assert!(seen[0].reason.contains("invalid_client"));
}

#[tokio::test]
async fn test_failed_refresh_keeps_expired_token() {
    let endpoint = MockTokenEndpoint::new();
    endpoint.reply("t", Reply::Status(StatusCode::FORBIDDEN, "forbidden"));
    let ctx = endpoint.context();
    let authorizer = ServicePrincipalAuthorizer::new();
    let cred = ServicePrincipalCredential::new("c", "s", "t");

    let expired =
        CachedToken::from_access_token(&token_with_exp(now().timestamp() - 100)).unwrap();
    authorizer.cache().insert(cred.clone(), expired.clone());

    let mut req = blob_request();
    authorizer.add_bearer_token(&ctx, &mut req, &cred).await;
    assert_eq!(endpoint.calls(), 1);
    assert_eq!(authorization(&req), BEARER_NO_TOKEN);
    assert_eq!(authorizer.cache().get(&cred), Some(expired.clone()));

    // Still expired, so the next call goes back to the endpoint.
    let mut req = blob_request();
    authorizer.add_bearer_token(&ctx, &mut req, &cred).await;
    assert_eq!(endpoint.calls(), 2);
    assert_eq!(authorization(&req), BEARER_NO_TOKEN);
    assert_eq!(authorizer.cache().get(&cred), Some(expired));
}

#[tokio::test]
async fn test_failure_is_retried_on_next_call() {
    let endpoint = MockTokenEndpoint::new();
    endpoint.reply("t", Reply::Status(StatusCode::INTERNAL_SERVER_ERROR, ""));
    let ctx = endpoint.context();
    let (seen, observer) = recorder();
    let authorizer = ServicePrincipalAuthorizer::new().with_observer(observer);
    let cred = ServicePrincipalCredential::new("c", "s", "t");

    let mut req = blob_request();
    authorizer.add_bearer_token(&ctx, &mut req, &cred).await;
    assert_eq!(authorization(&req), BEARER_NO_TOKEN);
    assert_eq!(seen.lock().unwrap()[0].reason, "Internal Server Error");

    endpoint.reply("t", Reply::Token { expires_in: 3600 });
    let mut req = blob_request();
    authorizer.add_bearer_token(&ctx, &mut req, &cred).await;

    assert_eq!(endpoint.calls(), 2);
    assert!(authorization(&req).starts_with("Bearer eyJ"));
    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_transport_error_is_reported() {
    let endpoint = MockTokenEndpoint::new();
    endpoint.reply("t", Reply::Fail);
    let ctx = endpoint.context();
    let (seen, observer) = recorder();
    let authorizer = ServicePrincipalAuthorizer::new().with_observer(observer);
    let cred = ServicePrincipalCredential::new("c", "s", "t");

    let mut req = blob_request();
    authorizer.add_bearer_token(&ctx, &mut req, &cred).await;

    assert_eq!(authorization(&req), BEARER_NO_TOKEN);
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].status, None);
    assert!(seen[0].reason.contains("connection refused"));
}

#[tokio::test]
async fn test_malformed_token_response() {
    let endpoint = MockTokenEndpoint::new();
    endpoint.reply("t", Reply::Body(r#"{"access_token":"not-a-jwt"}"#.to_string()));
    endpoint.reply("u", Reply::Body(r#"{"error":"nope"}"#.to_string()));
    let ctx = endpoint.context();
    let (seen, observer) = recorder();
    let authorizer = ServicePrincipalAuthorizer::new().with_observer(observer);

    let err = authorizer
        .token(&ctx, &ServicePrincipalCredential::new("c", "s", "t"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TokenInvalid);

    let err = authorizer
        .token(&ctx, &ServicePrincipalCredential::new("c", "s", "u"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TokenInvalid);

    // `token` returns errors instead of reporting them.
    assert!(seen.lock().unwrap().is_empty());
    assert!(authorizer.cache().is_empty());
}

#[tokio::test]
async fn test_token_request_shape() {
    let endpoint = MockTokenEndpoint::new();
    let ctx = endpoint.context();
    let authorizer =
        ServicePrincipalAuthorizer::new().with_authority_host("https://login.example.com/");
    let cred = ServicePrincipalCredential::new("my client", "s&cret=1", "tenant-1");

    authorizer.token(&ctx, &cred).await.unwrap();

    let (url, body) = endpoint.last_request();
    assert_eq!(url, "https://login.example.com/tenant-1/oauth2/v2.0/token");
    let form: HashMap<String, String> = form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect();
    assert_eq!(form["grant_type"], "client_credentials");
    assert_eq!(form["client_id"], "my client");
    assert_eq!(form["client_secret"], "s&cret=1");
    assert_eq!(form["scope"], "https://storage.azure.com/.default");
}

#[tokio::test]
async fn test_credential_triples_are_isolated() {
    let endpoint = MockTokenEndpoint::new();
    let ctx = endpoint.context();
    let authorizer = ServicePrincipalAuthorizer::new();

    let creds = [
        ServicePrincipalCredential::new("c", "s", "t"),
        ServicePrincipalCredential::new("c", "s2", "t"),
        ServicePrincipalCredential::new("c", "s", "t2"),
    ];
    for cred in &creds {
        let mut req = blob_request();
        authorizer.add_bearer_token(&ctx, &mut req, cred).await;
    }
    for cred in &creds {
        let mut req = blob_request();
        authorizer.add_bearer_token(&ctx, &mut req, cred).await;
    }

    assert_eq!(endpoint.calls(), 3);
    assert_eq!(authorizer.cache().len(), 3);
}

#[tokio::test]
async fn test_independent_caches() {
    let endpoint = MockTokenEndpoint::new();
    let ctx = endpoint.context();
    let cred = ServicePrincipalCredential::new("c", "s", "t");

    let shared = TokenCache::new();
    let a = ServicePrincipalAuthorizer::new().with_cache(shared.clone());
    let b = ServicePrincipalAuthorizer::new().with_cache(shared);
    let c = ServicePrincipalAuthorizer::new();

    a.token(&ctx, &cred).await.unwrap();
    b.token(&ctx, &cred).await.unwrap();
    assert_eq!(endpoint.calls(), 1);

    c.token(&ctx, &cred).await.unwrap();
    assert_eq!(endpoint.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_refresh_does_not_block_other_credentials() {
    let endpoint = MockTokenEndpoint::new();
    let ctx = endpoint.context();
    let authorizer = ServicePrincipalAuthorizer::new();

    let slow = {
        let (ctx, authorizer) = (ctx.clone(), authorizer.clone());
        tokio::spawn(async move {
            let mut req = blob_request();
            let cred = ServicePrincipalCredential::new("c", "s", "slow");
            authorizer.add_bearer_token(&ctx, &mut req, &cred).await;
            req
        })
    };

    // The slow refresh is parked inside the endpoint from here on.
    tokio::time::timeout(Duration::from_secs(5), endpoint.state.arrived.notified())
        .await
        .expect("slow refresh must reach the endpoint");
    assert_eq!(endpoint.calls(), 1);

    let mut req = blob_request();
    let cred = ServicePrincipalCredential::new("c", "s", "fast");
    tokio::time::timeout(
        Duration::from_secs(5),
        authorizer.add_bearer_token(&ctx, &mut req, &cred),
    )
    .await
    .expect("refresh of another credential must not block");
    assert!(authorization(&req).starts_with("Bearer eyJ"));
    assert_eq!(endpoint.calls(), 2);
    assert!(!slow.is_finished());

    endpoint.state.release.notify_one();
    let req = slow.await.unwrap();
    assert!(authorization(&req).starts_with("Bearer eyJ"));
    assert_eq!(authorizer.cache().len(), 2);
}

#[tokio::test]
async fn test_concurrent_callers_share_cache() {
    let endpoint = MockTokenEndpoint::new();
    let ctx = endpoint.context();
    let authorizer = ServicePrincipalAuthorizer::new();
    let cred = ServicePrincipalCredential::new("c", "s", "t");

    authorizer.token(&ctx, &cred).await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let (ctx, authorizer, cred) = (ctx.clone(), authorizer.clone(), cred.clone());
            tokio::spawn(async move {
                let mut req = blob_request();
                authorizer.add_bearer_token(&ctx, &mut req, &cred).await;
                authorization(&req)
            })
        })
        .collect();

    let expected = format!(
        "Bearer {}",
        authorizer.cache().get(&cred).unwrap().access_token
    );
    for handle in handles {
        assert_eq!(handle.await.unwrap(), expected);
    }
    assert_eq!(endpoint.calls(), 1);
}

#[tokio::test]
async fn test_authorizer_from_config() {
    let endpoint = MockTokenEndpoint::new();
    let ctx = endpoint.context();
    let config = Config {
        client_id: Some("c".to_string()),
        client_secret: Some("s".to_string()),
        tenant_id: Some("t".to_string()),
        authority_host: Some("https://login.example.com".to_string()),
        ..Default::default()
    };

    let authorizer = Authorizer::from_config(&config).unwrap();
    let mut req = blob_request();
    authorizer.sign_request(&ctx, &mut req).await.unwrap();

    assert!(authorization(&req).starts_with("Bearer eyJ"));
    let (url, _) = endpoint.last_request();
    assert_eq!(url, "https://login.example.com/t/oauth2/v2.0/token");
}

#[tokio::test]
async fn test_shared_key_never_calls_endpoint() {
    let endpoint = MockTokenEndpoint::new();
    let ctx = endpoint.context();
    let authorizer = Authorizer::shared_key(SharedKeyCredential::new(
        "devstoreaccount1",
        "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==",
    ));

    let mut req = blob_request();
    authorizer.sign_request(&ctx, &mut req).await.unwrap();

    assert!(authorization(&req).starts_with("SharedKey devstoreaccount1:"));
    assert_eq!(endpoint.calls(), 0);
}
