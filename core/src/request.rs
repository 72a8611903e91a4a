use std::mem;
use std::str::FromStr;

use bytes::Bytes;
use http::header::HeaderName;
use http::uri::Authority;
use http::uri::PathAndQuery;
use http::uri::Scheme;
use http::HeaderMap;
use http::HeaderValue;
use http::Method;
use http::Uri;
use percent_encoding::utf8_percent_encode;
use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;

use crate::{Error, Result};

/// Characters left as-is when query keys and values are written back to the url.
pub static QUERY_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Body of the request that is about to be authorized.
///
/// Signers never read the payload itself, only its length.
#[derive(Debug, Clone, Default)]
pub enum Body {
    /// No body at all.
    #[default]
    Empty,
    /// Body held in memory.
    Bytes(Bytes),
    /// Body whose length is known upfront but which is produced elsewhere.
    Length(u64),
    /// Body produced lazily, its length is unknown until it has been sent.
    Stream,
}

impl Body {
    /// Length of the body if it's known upfront.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            Body::Empty | Body::Stream => None,
            Body::Bytes(bs) => Some(bs.len() as u64),
            Body::Length(n) => Some(*n),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bs: Bytes) -> Self {
        Body::Bytes(bs)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bs: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bs))
    }
}

/// RequestDescriptor is the unsigned form of an outgoing request.
///
/// Query parameters are kept in their decoded form and in caller order, repeated
/// keys are allowed. Authorizers only ever add or overwrite headers.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method.
    pub method: Method,
    /// HTTP scheme.
    pub scheme: Scheme,
    /// HTTP authority.
    pub authority: Authority,
    /// HTTP path, as it will be sent on the wire.
    pub path: String,
    /// HTTP query parameters.
    pub query: Vec<(String, String)>,
    /// HTTP headers.
    pub headers: HeaderMap,
    /// HTTP body.
    pub body: Body,
}

impl RequestDescriptor {
    /// Build a descriptor from method and url.
    pub fn new(method: Method, uri: &str) -> Result<Self> {
        let uri = Uri::from_str(uri)?;
        Self::from_uri(method, uri, HeaderMap::new(), Body::Empty)
    }

    /// Build a descriptor from http::request::Parts.
    ///
    /// Headers are taken out of `parts` to avoid copy, [`RequestDescriptor::apply`]
    /// gives them back.
    pub fn from_parts(parts: &mut http::request::Parts, body: Body) -> Result<Self> {
        let uri = mem::take(&mut parts.uri);
        let headers = mem::take(&mut parts.headers);
        Self::from_uri(parts.method.clone(), uri, headers, body)
    }

    fn from_uri(method: Method, uri: Uri, headers: HeaderMap, body: Body) -> Result<Self> {
        let uri = uri.into_parts();
        let paq = uri
            .path_and_query
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Ok(RequestDescriptor {
            method,
            scheme: uri.scheme.unwrap_or(Scheme::HTTPS),
            authority: uri
                .authority
                .ok_or_else(|| Error::request_invalid("request without authority is invalid"))?,
            path: paq.path().to_string(),
            query: paq
                .query()
                .map(|v| {
                    form_urlencoded::parse(v.as_bytes())
                        .map(|(k, v)| (k.into_owned(), v.into_owned()))
                        .collect()
                })
                .unwrap_or_default(),
            headers,
            body,
        })
    }

    /// Apply the descriptor back to http::request::Parts.
    pub fn apply(self, parts: &mut http::request::Parts) -> Result<()> {
        parts.uri = self.uri()?;
        parts.method = self.method;
        parts.headers = self.headers;
        Ok(())
    }

    /// Build the target url, query values are percent encoded.
    pub fn uri(&self) -> Result<Uri> {
        let mut paq = self.path.clone();
        if !self.query.is_empty() {
            paq.push('?');
            for (i, (k, v)) in self.query.iter().enumerate() {
                if i > 0 {
                    paq.push('&');
                }

                paq.extend(utf8_percent_encode(k, &QUERY_ENCODE_SET));
                if !v.is_empty() {
                    paq.push('=');
                    paq.extend(utf8_percent_encode(v, &QUERY_ENCODE_SET));
                }
            }
        }

        let mut uri = http::uri::Parts::default();
        uri.scheme = Some(self.scheme.clone());
        uri.authority = Some(self.authority.clone());
        uri.path_and_query = Some(PathAndQuery::from_str(&paq)?);
        Ok(Uri::from_parts(uri)?)
    }

    /// Replace the body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Insert a header, see [`RequestDescriptor::header_insert`].
    pub fn with_header(mut self, key: HeaderName, value: &str) -> Result<Self> {
        self.header_insert(key, value)?;
        Ok(self)
    }

    /// Push a query pair, see [`RequestDescriptor::query_push`].
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_push(key, value);
        self
    }

    /// Push a new query pair into query list.
    #[inline]
    pub fn query_push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.query.push((key.into(), value.into()));
    }

    /// Insert a header, replacing all previous values of it.
    pub fn header_insert(&mut self, key: HeaderName, value: &str) -> Result<()> {
        self.headers.insert(key, HeaderValue::from_str(value)?);
        Ok(())
    }

    /// Get header value by name.
    ///
    /// Returns empty string if header not found.
    #[inline]
    pub fn header_get_or_default(&self, key: &HeaderName) -> Result<&str> {
        match self.headers.get(key) {
            Some(v) => Ok(v.to_str()?),
            None => Ok(""),
        }
    }

    /// Get headers whose name starts with given prefix.
    ///
    /// Names are matched and returned in lower case, values are kept as-is.
    pub fn header_to_vec_with_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let prefix = prefix.to_lowercase();
        self.headers
            .iter()
            .filter(|(k, _)| k.as_str().starts_with(&prefix))
            .map(|(k, v)| Ok::<_, Error>((k.as_str().to_lowercase(), v.to_str()?.to_string())))
            .collect()
    }

    /// Convert sorted headers to string.
    ///
    /// ```shell
    /// [(a, b), (c, d)] => "a:b\nc:d"
    /// ```
    pub fn header_to_string(mut headers: Vec<(String, String)>, sep: &str, join: &str) -> String {
        let mut s = String::with_capacity(16);

        // Sort via header name, values of the same header keep their order.
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        for (idx, (k, v)) in headers.into_iter().enumerate() {
            if idx != 0 {
                s.push_str(join);
            }

            s.push_str(&k);
            s.push_str(sep);
            s.push_str(&v);
        }

        s
    }
}
