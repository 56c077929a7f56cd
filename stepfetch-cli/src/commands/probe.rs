//! The `probe` subcommand: resolve redirects and check range support.

use clap::Args;
use stepfetch::{probe_total_size, RedirectResolver, ReqwestClient, UrlResolver};

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// URL to probe
    pub url: String,
}

pub fn run(args: ProbeArgs) -> Result<(), CliError> {
    let client = ReqwestClient::new().map_err(|e| CliError::HttpClient(e.to_string()))?;

    let resolver_client = ReqwestClient::new().map_err(|e| CliError::HttpClient(e.to_string()))?;
    let resolved = RedirectResolver::new(resolver_client, &args.url)
        .resolve()
        .map_err(|e| CliError::Probe(e.to_string()))?
        .ok_or_else(|| CliError::Probe("could not resolve a download URL".to_string()))?;

    println!("Resolved URL: {}", resolved);

    match probe_total_size(&client, &resolved) {
        Some(size) => {
            println!("Size:         {} bytes", size);
            println!("Ranges:       supported");
            Ok(())
        }
        None => Err(CliError::Probe(
            "the server did not pass the range-support probe (status, content type or Accept-Ranges)"
                .to_string(),
        )),
    }
}
