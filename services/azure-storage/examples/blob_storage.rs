use anyhow::Result;
use blobauth_azure_storage::{Authorizer, Config, SharedKeyCredential};
use blobauth_core::{Context, OsEnv, RequestDescriptor, SignRequest};
use blobauth_http_send_reqwest::ReqwestHttpSend;
use reqwest::Client;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let client = Client::new();
    let ctx = Context::new()
        .with_http_send(ReqwestHttpSend::new(client.clone()))
        .with_env(OsEnv);

    // AZURE_STORAGE_CONNECTION_STRING, AZURE_STORAGE_ACCOUNT_NAME + AZURE_STORAGE_ACCOUNT_KEY
    // or AZURE_CLIENT_ID + AZURE_CLIENT_SECRET + AZURE_TENANT_ID.
    let config = Config::default().from_env(&ctx)?;
    let (authorizer, demo_mode) = match Authorizer::from_config(&config) {
        Ok(authorizer) => (authorizer, false),
        Err(err) => {
            println!("{err}, using demo mode with the Azurite account");
            println!();
            let config = Config::from_connection_string("UseDevelopmentStorage=true")?;
            let authorizer = Authorizer::shared_key(SharedKeyCredential::new(
                config.account_name.unwrap_or_default(),
                config.account_key.unwrap_or_default(),
            ));
            (authorizer, true)
        }
    };

    let endpoint = config.endpoint.clone().unwrap_or_else(|| {
        format!(
            "https://{}.blob.core.windows.net",
            config.account_name.as_deref().unwrap_or("mystorageaccount")
        )
    });

    println!("List containers of {endpoint}");
    let mut req = RequestDescriptor::new(http::Method::GET, &format!("{endpoint}/?comp=list"))?;
    authorizer.sign_request(&ctx, &mut req).await?;
    for (name, value) in req.headers.iter() {
        if name == http::header::AUTHORIZATION {
            println!("  {name}: <redacted>");
        } else {
            println!("  {name}: {}", value.to_str()?);
        }
    }

    if demo_mode {
        println!("Demo mode, request not sent");
        return Ok(());
    }

    let resp = client
        .get(req.uri()?.to_string())
        .headers(req.headers.clone())
        .send()
        .await?;
    println!("Response: {}", resp.status());
    if resp.status().is_success() {
        println!("{}", resp.text().await?);
    }

    Ok(())
}
