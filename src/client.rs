//! Construction of S3 clients from command line switches.
//!
//! Most stores used with these tools are S3 compatible services rather
//! than AWS itself, so a custom endpoint and static credentials can be
//! provided. Without them the default AWS region and credential chain are
//! used, as described in the [AWS Documentation]
//! (https://docs.aws.amazon.com/cli/latest/userguide/cli-environment.html).
use clap::ArgMatches;
use rusoto_core::credential::{ChainProvider, StaticProvider};
use rusoto_core::region::Region;
use rusoto_core::HttpClient;
use rusoto_s3::S3Client;

use std::time::Duration;

use crate::types::UtilResult;

/// Region used to sign requests against custom endpoints.
const DEFAULT_REGION: &str = "us-east-1";

/// Creates a new `S3Client` based on the provided arguments.
pub fn s3(args: &ArgMatches<'_>) -> UtilResult<S3Client> {
    // create client options
    let client = HttpClient::new()?;
    let region = region(args.value_of("endpoint"), args.value_of("region"));

    debug!("Connecting to S3 in {:?}", region);

    // static keys win over anything configured in the environment
    let keys = (args.value_of("access_key"), args.value_of("secret_key"));
    if let (Some(access), Some(secret)) = keys {
        let provider = StaticProvider::new_minimal(access.to_string(), secret.to_string());
        return Ok(S3Client::new_with(client, provider, region));
    }

    // create provided with timeout
    let mut chain = ChainProvider::new();
    chain.set_timeout(Duration::from_millis(500));

    Ok(S3Client::new_with(client, chain, region))
}

/// Resolves the region to use from an optional endpoint and name.
pub fn region(endpoint: Option<&str>, name: Option<&str>) -> Region {
    match endpoint {
        Some(endpoint) => Region::Custom {
            name: name.unwrap_or(DEFAULT_REGION).to_string(),
            endpoint: normalize_endpoint(endpoint),
        },
        None => name
            .and_then(|name| name.parse::<Region>().ok())
            .unwrap_or_default(),
    }
}

/// Ensures an endpoint carries a scheme, defaulting to HTTPS.
fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", endpoint.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use rusoto_core::region::Region;

    #[test]
    fn resolving_custom_endpoints() {
        let region = super::region(Some("storage.example.com:9001"), None);

        assert_eq!(
            region,
            Region::Custom {
                name: "us-east-1".into(),
                endpoint: "https://storage.example.com:9001".into(),
            }
        );
    }

    #[test]
    fn keeping_explicit_schemes() {
        let region = super::region(Some("http://localhost:9000/"), Some("eu-west-1"));

        assert_eq!(
            region,
            Region::Custom {
                name: "eu-west-1".into(),
                endpoint: "http://localhost:9000".into(),
            }
        );
    }

    #[test]
    fn resolving_named_regions() {
        assert_eq!(super::region(None, Some("eu-west-2")), Region::EuWest2);
    }
}
