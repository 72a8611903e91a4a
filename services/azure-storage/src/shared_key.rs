use std::collections::BTreeMap;
use std::fmt::Write;

use async_trait::async_trait;
use blobauth_core::hash::{base64_decode, base64_hmac_sha256};
use blobauth_core::time::{format_http_date, now, DateTime};
use blobauth_core::{Body, Context, Error, RequestDescriptor, Result, SignRequest};
use http::header::{self, HeaderName};
use http::HeaderValue;
use log::debug;

use crate::constants::*;
use crate::SharedKeyCredential;

/// SharedKeySigner implements Azure Storage Shared Key authorization.
///
/// Signing is pure: no I/O happens and the signer holds no mutable state, so a
/// single signer can be shared by any number of concurrent requests.
///
/// - [Authorize with Shared Key](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key)
#[derive(Debug, Clone)]
pub struct SharedKeySigner {
    time: Option<DateTime>,
    version: String,
}

impl Default for SharedKeySigner {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedKeySigner {
    /// Create a new signer pinned to [`AZURE_VERSION`].
    pub fn new() -> Self {
        Self {
            time: None,
            version: AZURE_VERSION.to_string(),
        }
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Override the `x-ms-version` sent with every request.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sign the request in place.
    ///
    /// `x-ms-date` and `x-ms-version` are injected before signing and stay on the
    /// request next to the `Authorization` header. `content_type` is used when the
    /// request carries no `Content-Type` header of its own.
    ///
    /// Returns a [`CredentialInvalid`](blobauth_core::ErrorKind::CredentialInvalid)
    /// error if the account key is not valid base64; the request is left untouched then.
    ///
    /// Header values must be visible ASCII. A signed header carrying other bytes
    /// (obs-text such as Latin-1) can't be canonicalized and fails with
    /// [`RequestInvalid`](blobauth_core::ErrorKind::RequestInvalid), after
    /// `x-ms-date` and `x-ms-version` have already been set.
    pub fn sign(
        &self,
        req: &mut RequestDescriptor,
        cred: &SharedKeyCredential,
        content_type: Option<&str>,
    ) -> Result<()> {
        let key = base64_decode(&cred.account_key).map_err(|e| {
            Error::credential_invalid("account key is not valid base64").with_source(e)
        })?;

        let now_time = self.time.unwrap_or_else(now);
        req.header_insert(
            HeaderName::from_static(X_MS_DATE),
            &format_http_date(now_time),
        )?;
        req.header_insert(HeaderName::from_static(X_MS_VERSION), &self.version)?;
        if let Some(content_type) = content_type {
            if !req.headers.contains_key(header::CONTENT_TYPE) {
                req.header_insert(header::CONTENT_TYPE, content_type)?;
            }
        }

        let string_to_sign = string_to_sign(req, &cred.account_name)?;
        let signature = base64_hmac_sha256(&key, string_to_sign.as_bytes());

        let mut value =
            HeaderValue::from_str(&format!("SharedKey {}:{signature}", cred.account_name))?;
        value.set_sensitive(true);
        req.headers.insert(header::AUTHORIZATION, value);

        Ok(())
    }

    /// Bind this signer to a credential so it can be used as a [`SignRequest`].
    pub fn bind(self, cred: SharedKeyCredential) -> BoundSharedKeySigner {
        BoundSharedKeySigner { signer: self, cred }
    }
}

/// A [`SharedKeySigner`] together with the credential it signs with.
#[derive(Debug, Clone)]
pub struct BoundSharedKeySigner {
    signer: SharedKeySigner,
    cred: SharedKeyCredential,
}

#[async_trait]
impl SignRequest for BoundSharedKeySigner {
    async fn sign_request(&self, _: &Context, req: &mut RequestDescriptor) -> Result<()> {
        self.signer.sign(req, &self.cred, None)
    }
}

/// Construct string to sign
///
/// ## Format
///
/// ```text
/// VERB + "\n" +
/// Content-Encoding + "\n" +
/// Content-Language + "\n" +
/// Content-Length + "\n" +
/// Content-MD5 + "\n" +
/// Content-Type + "\n" +
/// Date + "\n" +
/// If-Modified-Since + "\n" +
/// If-Match + "\n" +
/// If-None-Match + "\n" +
/// If-Unmodified-Since + "\n" +
/// Range + "\n" +
/// CanonicalizedHeaders +
/// CanonicalizedResource;
/// ```
///
/// `Date` is always empty since the time travels in `x-ms-date`.
///
/// ## Reference
///
/// - [Blob, Queue, and File Services (Shared Key authorization)](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key)
pub(crate) fn string_to_sign(req: &RequestDescriptor, account_name: &str) -> Result<String> {
    let mut s = String::with_capacity(256);

    writeln!(&mut s, "{}", req.method.as_str())?;
    writeln!(&mut s, "{}", req.header_get_or_default(&header::CONTENT_ENCODING)?)?;
    writeln!(&mut s, "{}", req.header_get_or_default(&header::CONTENT_LANGUAGE)?)?;
    writeln!(&mut s, "{}", canonicalize_content_length(req)?)?;
    writeln!(
        &mut s,
        "{}",
        req.header_get_or_default(&HeaderName::from_static(CONTENT_MD5))?
    )?;
    writeln!(&mut s, "{}", req.header_get_or_default(&header::CONTENT_TYPE)?)?;
    writeln!(&mut s)?;
    writeln!(&mut s, "{}", req.header_get_or_default(&header::IF_MODIFIED_SINCE)?)?;
    writeln!(&mut s, "{}", req.header_get_or_default(&header::IF_MATCH)?)?;
    writeln!(&mut s, "{}", req.header_get_or_default(&header::IF_NONE_MATCH)?)?;
    writeln!(&mut s, "{}", req.header_get_or_default(&header::IF_UNMODIFIED_SINCE)?)?;
    writeln!(&mut s, "{}", req.header_get_or_default(&header::RANGE)?)?;
    write!(&mut s, "{}", canonicalize_header(req)?)?;
    write!(&mut s, "{}", canonicalize_resource(req, account_name))?;

    debug!("string to sign: {}", &s);

    Ok(s)
}

/// Zero and unknown lengths are both rendered as an empty line.
///
/// A streamed body never contributes a length even if the caller set a
/// `Content-Length` header.
fn canonicalize_content_length(req: &RequestDescriptor) -> Result<String> {
    let length = match &req.body {
        Body::Stream => None,
        Body::Empty => {
            let v = req.header_get_or_default(&header::CONTENT_LENGTH)?;
            (!v.is_empty() && v != "0").then(|| v.to_string())
        }
        body => body
            .content_length()
            .filter(|n| *n > 0)
            .map(|n| n.to_string()),
    };

    Ok(length.unwrap_or_default())
}

/// Every `x-ms-*` header as `name:value\n`, sorted by name.
///
/// A header sent more than once is folded into a single `name:v1,v2` line,
/// values kept in the order they were added.
///
/// ## Reference
///
/// - [Constructing the canonicalized headers string](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key#constructing-the-canonicalized-headers-string)
fn canonicalize_header(req: &RequestDescriptor) -> Result<String> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (k, v) in req.header_to_vec_with_prefix("x-ms-")? {
        grouped.entry(k).or_default().push(v);
    }
    if grouped.is_empty() {
        return Ok(String::new());
    }

    let headers = grouped
        .into_iter()
        .map(|(k, vs)| (k, vs.join(",")))
        .collect();
    let mut s = RequestDescriptor::header_to_string(headers, ":", "\n");
    s.push('\n');
    Ok(s)
}

/// ## Reference
///
/// - [Constructing the canonicalized resource string](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key#constructing-the-canonicalized-resource-string)
pub(crate) fn canonicalize_resource(req: &RequestDescriptor, account_name: &str) -> String {
    let mut s = format!("/{}{}", account_name, req.path);

    let mut query: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (k, v) in &req.query {
        query.entry(k.to_lowercase()).or_default().push(v);
    }

    for (k, vs) in query {
        s.push('\n');
        s.push_str(&k);
        s.push(':');
        s.push_str(&vs.join(","));
    }

    s
}
