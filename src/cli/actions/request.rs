use crate::cli::globals::GlobalArgs;
use crate::provider::http::HttpProvider;
use crate::recovery::request::{
    RecoveryRequest, RequestOutcome, CONFIRMATION_MESSAGE, LATEST_LINK_NOTICE,
};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub email: String,
    pub redirect_url: Url,
}

/// Handle the request action
pub async fn execute(globals: &GlobalArgs, args: Args) -> Result<()> {
    let provider = Arc::new(HttpProvider::new(
        &globals.provider_url,
        globals.api_key.clone(),
    )?);

    let mut requests = RecoveryRequest::new(provider, args.redirect_url);

    match requests.send(&args.email).await {
        RequestOutcome::Accepted => {
            println!("{CONFIRMATION_MESSAGE}");
            println!("{LATEST_LINK_NOTICE}");
            Ok(())
        }
        RequestOutcome::InvalidEmail => Err(anyhow!("invalid email address")),
        RequestOutcome::CoolingDown { remaining } => Err(anyhow!(
            "a reset email was sent moments ago, try again in {}s",
            remaining.as_secs()
        )),
    }
}
