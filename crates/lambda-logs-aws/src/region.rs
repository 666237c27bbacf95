use tracing::debug;

/// Region used when neither the flag, the config file nor the AWS CLI has one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Pick the region to talk to.
///
/// An explicit region wins; otherwise the AWS CLI configuration is asked
/// (`aws configure get region`), falling back to [`DEFAULT_REGION`].
pub async fn resolve_region(explicit: Option<&str>) -> String {
    if let Some(region) = explicit.map(str::trim).filter(|r| !r.is_empty()) {
        return region.to_string();
    }

    if let Some(region) = region_from_cli().await {
        debug!(%region, "using region from AWS CLI configuration");
        return region;
    }

    debug!(region = DEFAULT_REGION, "no region configured, using fallback");
    DEFAULT_REGION.to_string()
}

async fn region_from_cli() -> Option<String> {
    let output = tokio::process::Command::new("aws")
        .args(["configure", "get", "region"])
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    parse_cli_output(&output.stdout)
}

fn parse_cli_output(stdout: &[u8]) -> Option<String> {
    let region = String::from_utf8_lossy(stdout).trim().to_string();
    (!region.is_empty()).then_some(region)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_explicit_region_wins() {
        assert_eq!(resolve_region(Some(" eu-west-1 ")).await, "eu-west-1");
    }

    #[test]
    fn test_parse_cli_output() {
        assert_eq!(parse_cli_output(b"eu-central-1\n"), Some("eu-central-1".to_string()));
        assert_eq!(parse_cli_output(b"  \n"), None);
        assert_eq!(parse_cli_output(b""), None);
    }
}
