use std::collections::HashMap;

use blobauth_core::{Error, Result};

use crate::Config;

// Azurite defaults.
const DEVELOPMENT_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEVELOPMENT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEVELOPMENT_BLOB_URI: &str = "http://127.0.0.1:10000";

/// Parses an [Azure connection string][1] for the blob service.
///
/// Only shared key settings and the blob endpoint are picked up, other fields
/// are ignored.
///
/// [1]: https://learn.microsoft.com/en-us/azure/storage/common/storage-configure-connection-string
pub(crate) fn parse(conn_str: &str) -> Result<Config> {
    let fields = parse_fields(conn_str)?;

    if fields.get("UseDevelopmentStorage").map(String::as_str) == Some("true") {
        return Ok(development_config(&fields));
    }

    Ok(Config {
        account_name: fields.get("AccountName").cloned(),
        account_key: fields.get("AccountKey").cloned(),
        endpoint: blob_endpoint(&fields)?,
        ..Default::default()
    })
}

fn parse_fields(conn_str: &str) -> Result<HashMap<String, String>> {
    conn_str
        .replace('\n', "")
        .split(';')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| {
            let (key, value) = field.split_once('=').ok_or_else(|| {
                Error::config_invalid(format!(
                    "invalid connection string, expected '=' in field: {field}"
                ))
            })?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn development_config(fields: &HashMap<String, String>) -> Config {
    let account_name = fields
        .get("AccountName")
        .cloned()
        .unwrap_or_else(|| DEVELOPMENT_ACCOUNT_NAME.to_string());
    let account_key = fields
        .get("AccountKey")
        .cloned()
        .unwrap_or_else(|| DEVELOPMENT_ACCOUNT_KEY.to_string());
    let proxy_uri = fields
        .get("DevelopmentStorageProxyUri")
        .map(String::as_str)
        .unwrap_or(DEVELOPMENT_BLOB_URI);

    Config {
        endpoint: Some(format!("{proxy_uri}/{account_name}")),
        account_name: Some(account_name),
        account_key: Some(account_key),
        ..Default::default()
    }
}

/// `BlobEndpoint` wins, otherwise the endpoint is built from the account name
/// and `EndpointSuffix`. Neither being present is not an error.
fn blob_endpoint(fields: &HashMap<String, String>) -> Result<Option<String>> {
    if let Some(endpoint) = fields.get("BlobEndpoint") {
        return Ok(Some(endpoint.clone()));
    }

    let (Some(account_name), Some(suffix)) =
        (fields.get("AccountName"), fields.get("EndpointSuffix"))
    else {
        return Ok(None);
    };

    let protocol = fields
        .get("DefaultEndpointsProtocol")
        .map(String::as_str)
        .unwrap_or("https");
    if protocol != "http" && protocol != "https" {
        return Err(Error::config_invalid(format!(
            "invalid DefaultEndpointsProtocol: {protocol}"
        )));
    }

    Ok(Some(format!("{protocol}://{account_name}.blob.{suffix}")))
}
