use std::time::Duration;

use ostool_common::{CleanupError, CleanupResult};
use ostool_providers::openstack::OpenStackCredentials;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_INTERFACE: &str = "public";

const REQUIRED_ENV: [&str; 5] = [
    "OS_AUTH_URL",
    "OS_USERNAME",
    "OS_PASSWORD",
    "OS_PROJECT_NAME",
    "OS_DOMAIN_NAME",
];

/// Read OpenStack credentials from the process environment.
pub fn openstack_credentials_from_env() -> CleanupResult<OpenStackCredentials> {
    openstack_credentials_from_lookup(|key| std::env::var(key).ok())
}

/// Same as [`openstack_credentials_from_env`], reading variables through `lookup`.
/// Blank values count as unset.
pub fn openstack_credentials_from_lookup<F>(lookup: F) -> CleanupResult<OpenStackCredentials>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    // Region first: without it no endpoint can be picked from the catalog.
    let region = get("OS_REGION_NAME")
        .ok_or_else(|| CleanupError::Configuration("OS_REGION_NAME not set".to_string()))?;

    for key in REQUIRED_ENV {
        if get(key).is_none() {
            return Err(CleanupError::Configuration(format!(
                "missing required environment variable: {}",
                key
            )));
        }
    }
    let required = |key: &str| get(key).unwrap_or_default();

    let domain = required("OS_DOMAIN_NAME");
    let timeout = match get("OS_TIMEOUT_SECONDS") {
        None => DEFAULT_HTTP_TIMEOUT,
        Some(raw) => match raw.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                tracing::warn!(
                    value = %raw,
                    "invalid OS_TIMEOUT_SECONDS, using default timeout {:?}",
                    DEFAULT_HTTP_TIMEOUT
                );
                DEFAULT_HTTP_TIMEOUT
            }
        },
    };

    Ok(OpenStackCredentials {
        auth_url: required("OS_AUTH_URL"),
        username: required("OS_USERNAME"),
        password: required("OS_PASSWORD"),
        project_name: required("OS_PROJECT_NAME"),
        user_domain_name: get("OS_USER_DOMAIN_NAME").unwrap_or_else(|| domain.clone()),
        project_domain_name: get("OS_PROJECT_DOMAIN_NAME").unwrap_or_else(|| domain.clone()),
        region,
        interface: get("OS_INTERFACE").unwrap_or_else(|| DEFAULT_INTERFACE.to_string()),
        timeout,
    })
}
