use std::fmt::{Debug, Formatter};

use blobauth_core::utils::Redact;
use blobauth_core::{Context, Result};

use crate::connection_string;
use crate::constants::*;

/// Config carries the already-resolved settings an [`Authorizer`](crate::Authorizer)
/// is built from.
///
/// Every field can be set directly. [`Config::from_env`] only fills the fields
/// that are still `None`.
#[derive(Clone, Default)]
#[cfg_attr(test, derive(PartialEq))]
pub struct Config {
    /// `account_name` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AZURE_STORAGE_ACCOUNT_NAME`]
    /// - `AccountName` of the connection string in [`AZURE_STORAGE_CONNECTION_STRING`]
    pub account_name: Option<String>,
    /// `account_key` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AZURE_STORAGE_ACCOUNT_KEY`]
    /// - `AccountKey` of the connection string in [`AZURE_STORAGE_CONNECTION_STRING`]
    pub account_key: Option<String>,
    /// `client_id` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AZURE_CLIENT_ID`]
    pub client_id: Option<String>,
    /// `client_secret` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AZURE_CLIENT_SECRET`]
    pub client_secret: Option<String>,
    /// `tenant_id` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AZURE_TENANT_ID`]
    pub tenant_id: Option<String>,
    /// `authority_host` will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AZURE_AUTHORITY_HOST`]
    ///
    /// `https://login.microsoftonline.com` is used if it's still unset.
    pub authority_host: Option<String>,
    /// Blob service endpoint, will be loaded from
    ///
    /// - this field if it's `is_some`
    /// - env value: [`AZURE_STORAGE_ENDPOINT`]
    /// - the connection string in [`AZURE_STORAGE_CONNECTION_STRING`]
    ///
    /// Authorizers don't use it, it's resolved here for the blob client.
    pub endpoint: Option<String>,
    /// `x-ms-version` sent by shared key authorizers.
    ///
    /// Never read from the environment, `2019-12-12` is used if it's unset.
    pub version: Option<String>,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("account_name", &self.account_name)
            .field("account_key", &Redact::from(&self.account_key))
            .field("client_id", &self.client_id)
            .field("client_secret", &Redact::from(&self.client_secret))
            .field("tenant_id", &self.tenant_id)
            .field("authority_host", &self.authority_host)
            .field("endpoint", &self.endpoint)
            .field("version", &self.version)
            .finish()
    }
}

impl Config {
    /// Fill unset fields from the environment of `ctx`.
    ///
    /// Returns an error only if [`AZURE_STORAGE_CONNECTION_STRING`] is set but malformed.
    pub fn from_env(mut self, ctx: &Context) -> Result<Self> {
        let envs = ctx.env_vars();
        let get = |key: &str| envs.get(key).filter(|v| !v.is_empty()).cloned();

        self.account_name = self.account_name.or_else(|| get(AZURE_STORAGE_ACCOUNT_NAME));
        self.account_key = self.account_key.or_else(|| get(AZURE_STORAGE_ACCOUNT_KEY));
        self.client_id = self.client_id.or_else(|| get(AZURE_CLIENT_ID));
        self.client_secret = self.client_secret.or_else(|| get(AZURE_CLIENT_SECRET));
        self.tenant_id = self.tenant_id.or_else(|| get(AZURE_TENANT_ID));
        self.authority_host = self.authority_host.or_else(|| get(AZURE_AUTHORITY_HOST));
        self.endpoint = self.endpoint.or_else(|| get(AZURE_STORAGE_ENDPOINT));

        if let Some(conn_str) = get(AZURE_STORAGE_CONNECTION_STRING) {
            let parsed = Self::from_connection_string(&conn_str)?;
            self.account_name = self.account_name.or(parsed.account_name);
            self.account_key = self.account_key.or(parsed.account_key);
            self.endpoint = self.endpoint.or(parsed.endpoint);
        }

        Ok(self)
    }

    /// Parses an [Azure connection string][1] into a configuration object.
    ///
    /// An example of a connection string looks like:
    ///
    /// ```txt
    /// AccountName=mystorageaccount;
    /// AccountKey=Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==;
    /// BlobEndpoint=https://mystorageaccount.blob.core.windows.net
    /// ```
    ///
    /// [1]: https://learn.microsoft.com/en-us/azure/storage/common/storage-configure-connection-string
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        connection_string::parse(conn_str)
    }

    /// The authority host to request tokens from.
    pub fn authority_host(&self) -> &str {
        self.authority_host
            .as_deref()
            .unwrap_or(DEFAULT_AUTHORITY_HOST)
    }
}
