use crate::{inventory, ComputeDirectory};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

// Nova only returns the extended server attributes we match on to admin tokens.
const ATTR_HYPERVISOR_HOSTNAME: &str = "OS-EXT-SRV-ATTR:hypervisor_hostname";
const ATTR_INSTANCE_NAME: &str = "OS-EXT-SRV-ATTR:instance_name";

// Upper bound on followed `next` links per listing.
const MAX_PAGES: usize = 1000;

/// Keystone v3 password credentials plus the endpoint selection inputs.
#[derive(Clone)]
pub struct OpenStackCredentials {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub project_name: String,
    pub user_domain_name: String,
    pub project_domain_name: String,
    pub region: String,
    pub interface: String,
    pub timeout: Duration,
}

impl fmt::Debug for OpenStackCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenStackCredentials")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("project_name", &self.project_name)
            .field("user_domain_name", &self.user_domain_name)
            .field("project_domain_name", &self.project_domain_name)
            .field("region", &self.region)
            .field("interface", &self.interface)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

pub struct OpenStackDirectory {
    client: Client,
    token: String,
    identity_url: String,
    compute_url: String,
}

impl OpenStackDirectory {
    /// Issue a project-scoped token and resolve the identity and compute
    /// endpoints from its service catalog.
    pub async fn authenticate(creds: &OpenStackCredentials) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(creds.timeout)
            .build()
            .context("failed to build HTTP client")?;

        let url = format!("{}/auth/tokens", identity_v3_base(&creds.auth_url));
        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": creds.username,
                            "domain": { "name": creds.user_domain_name },
                            "password": creds.password
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": creds.project_name,
                        "domain": { "name": creds.project_domain_name }
                    }
                }
            }
        });

        tracing::debug!(url = %url, user = %creds.username, project = %creds.project_name, "requesting Keystone token");
        let resp = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!(
                "Keystone authentication failed: status={} body={}",
                status.as_u16(),
                text
            );
        }

        let token = resp
            .headers()
            .get("X-Subject-Token")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("No X-Subject-Token header in Keystone response"))?;

        let json_resp: Value = resp.json().await.context("invalid Keystone token response")?;
        let catalog = json_resp["token"]["catalog"]
            .as_array()
            .ok_or_else(|| anyhow!("No service catalog in Keystone token response"))?;

        let identity_url = identity_v3_base(&endpoint_from_catalog(
            catalog,
            "identity",
            &creds.region,
            &creds.interface,
        )?);
        let compute_url = endpoint_from_catalog(catalog, "compute", &creds.region, &creds.interface)?;
        tracing::debug!(identity = %identity_url, compute = %compute_url, "resolved endpoints");

        Ok(Self {
            client,
            token,
            identity_url,
            compute_url,
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .header("X-Auth-Token", &self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("GET {} failed: status={} body={}", url, status.as_u16(), text);
        }
        resp.json().await.with_context(|| format!("invalid JSON from {}", url))
    }

    /// Collect `collection` across pages by following `links_key` next links.
    async fn get_paginated(&self, first_url: String, collection: &str, links_key: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut url = first_url;

        for _ in 0..MAX_PAGES {
            let page = self.get_json(&url).await?;
            let entries = page[collection]
                .as_array()
                .ok_or_else(|| anyhow!("No '{}' array in response from {}", collection, url))?;
            items.extend(entries.iter().cloned());

            match next_link(&page, links_key) {
                Some(next) if next != url && !entries.is_empty() => url = next,
                _ => return Ok(items),
            }
        }
        bail!("pagination of '{}' did not terminate after {} pages", collection, MAX_PAGES)
    }
}

#[async_trait]
impl ComputeDirectory for OpenStackDirectory {
    async fn verify_identity(&self) -> Result<()> {
        let url = format!("{}/auth/tokens", self.identity_url);
        let resp = self
            .client
            .get(&url)
            .header("X-Auth-Token", &self.token)
            .header("X-Subject-Token", &self.token)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("identity service rejected token: status={} body={}", status.as_u16(), text);
        }
        Ok(())
    }

    async fn list_hypervisors(&self) -> Result<Vec<inventory::HypervisorRecord>> {
        let url = format!("{}/os-hypervisors/detail", self.compute_url);
        let raw = self.get_paginated(url, "hypervisors", "hypervisors_links").await?;
        Ok(raw.iter().filter_map(parse_hypervisor).collect())
    }

    async fn list_projects(&self) -> Result<Vec<inventory::ProjectRecord>> {
        let url = format!("{}/projects", self.identity_url);
        let raw = self.get_paginated(url, "projects", "links").await?;
        Ok(raw.iter().filter_map(parse_project).collect())
    }

    async fn list_instances(&self, tenant_id: &str) -> Result<Vec<inventory::ServerRecord>> {
        let url = format!(
            "{}/servers/detail?all_tenants=true&tenant_id={}",
            self.compute_url, tenant_id
        );
        let raw = self.get_paginated(url, "servers", "servers_links").await?;
        Ok(raw.iter().map(parse_server).collect())
    }
}

/// Normalize an identity URL to its `/v3` root.
fn identity_v3_base(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.ends_with("/v3") {
        trimmed.to_string()
    } else {
        format!("{}/v3", trimmed)
    }
}

fn endpoint_from_catalog(catalog: &[Value], service_type: &str, region: &str, interface: &str) -> Result<String> {
    let service = catalog
        .iter()
        .find(|s| s["type"].as_str() == Some(service_type))
        .ok_or_else(|| anyhow!("No '{}' service in catalog", service_type))?;

    let endpoints = service["endpoints"]
        .as_array()
        .ok_or_else(|| anyhow!("No endpoints for '{}' service", service_type))?;

    endpoints
        .iter()
        .filter(|e| e["interface"].as_str() == Some(interface))
        .find(|e| e["region_id"].as_str() == Some(region) || e["region"].as_str() == Some(region))
        .and_then(|e| e["url"].as_str())
        .map(|u| u.trim_end_matches('/').to_string())
        .ok_or_else(|| {
            anyhow!(
                "No {} endpoint for '{}' in region {}",
                interface,
                service_type,
                region
            )
        })
}

/// Keystone uses `{"links": {"next": url}}`, Nova `{"x_links": [{"rel": "next", "href": url}]}`.
fn next_link(page: &Value, links_key: &str) -> Option<String> {
    let links = &page[links_key];
    if let Some(next) = links["next"].as_str() {
        return Some(next.to_string());
    }
    links
        .as_array()?
        .iter()
        .find(|l| l["rel"].as_str() == Some("next"))
        .and_then(|l| l["href"].as_str())
        .map(|s| s.to_string())
}

fn parse_hypervisor(v: &Value) -> Option<inventory::HypervisorRecord> {
    let host_ip = v["host_ip"].as_str()?.trim();
    let hypervisor_hostname = v["hypervisor_hostname"].as_str()?.trim();
    Some(inventory::HypervisorRecord {
        host_ip: host_ip.to_string(),
        hypervisor_hostname: hypervisor_hostname.to_string(),
    })
}

fn parse_project(v: &Value) -> Option<inventory::ProjectRecord> {
    Some(inventory::ProjectRecord {
        id: v["id"].as_str()?.to_string(),
        name: v["name"].as_str().unwrap_or("").to_string(),
    })
}

fn parse_server(v: &Value) -> inventory::ServerRecord {
    let non_empty = |key: &str| {
        v[key]
            .as_str()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    };
    inventory::ServerRecord {
        name: v["name"].as_str().unwrap_or("").to_string(),
        status: v["status"].as_str().unwrap_or("").to_string(),
        hypervisor_hostname: non_empty(ATTR_HYPERVISOR_HOSTNAME),
        instance_name: non_empty(ATTR_INSTANCE_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<Value> {
        json!([
            {
                "type": "identity",
                "endpoints": [
                    { "interface": "public", "region_id": "RegionOne", "url": "https://keystone.example:5000/" },
                    { "interface": "internal", "region_id": "RegionOne", "url": "http://10.0.0.2:5000" }
                ]
            },
            {
                "type": "compute",
                "endpoints": [
                    { "interface": "public", "region_id": "RegionTwo", "url": "https://nova2.example:8774/v2.1" },
                    { "interface": "public", "region": "RegionOne", "url": "https://nova.example:8774/v2.1/" }
                ]
            }
        ])
        .as_array()
        .cloned()
        .unwrap()
    }

    #[test]
    fn identity_base_is_normalized_to_v3() {
        assert_eq!(identity_v3_base("https://k:5000"), "https://k:5000/v3");
        assert_eq!(identity_v3_base("https://k:5000/v3/"), "https://k:5000/v3");
        assert_eq!(identity_v3_base(" https://k:5000/identity/ "), "https://k:5000/identity/v3");
    }

    #[test]
    fn catalog_endpoint_selection() {
        let c = catalog();
        assert_eq!(
            endpoint_from_catalog(&c, "compute", "RegionOne", "public").unwrap(),
            "https://nova.example:8774/v2.1"
        );
        assert_eq!(
            endpoint_from_catalog(&c, "identity", "RegionOne", "internal").unwrap(),
            "http://10.0.0.2:5000"
        );
        assert!(endpoint_from_catalog(&c, "compute", "RegionThree", "public").is_err());
        assert!(endpoint_from_catalog(&c, "volumev3", "RegionOne", "public").is_err());
    }

    #[test]
    fn next_links_for_keystone_and_nova() {
        let keystone = json!({ "projects": [], "links": { "next": "https://k/v3/projects?marker=a", "self": "x" } });
        assert_eq!(next_link(&keystone, "links").as_deref(), Some("https://k/v3/projects?marker=a"));

        let keystone_last = json!({ "projects": [], "links": { "next": null } });
        assert_eq!(next_link(&keystone_last, "links"), None);

        let nova = json!({ "servers": [], "servers_links": [{ "rel": "next", "href": "https://n/servers/detail?marker=b" }] });
        assert_eq!(
            next_link(&nova, "servers_links").as_deref(),
            Some("https://n/servers/detail?marker=b")
        );
        assert_eq!(next_link(&json!({ "servers": [] }), "servers_links"), None);
    }

    #[test]
    fn server_extended_attributes() {
        let s = parse_server(&json!({
            "id": "5f3c",
            "name": "web-1",
            "status": "ACTIVE",
            "OS-EXT-SRV-ATTR:hypervisor_hostname": "nl-host-01",
            "OS-EXT-SRV-ATTR:instance_name": "web-1-5f3c0001"
        }));
        assert_eq!(s.hypervisor_hostname.as_deref(), Some("nl-host-01"));
        assert_eq!(s.instance_name.as_deref(), Some("web-1-5f3c0001"));

        // Non-admin tokens get neither attribute; blank counts as missing.
        let s = parse_server(&json!({ "name": "web-2", "status": "ACTIVE", "OS-EXT-SRV-ATTR:instance_name": "" }));
        assert_eq!(s.hypervisor_hostname, None);
        assert_eq!(s.instance_name, None);
    }

    #[test]
    fn hypervisor_requires_ip_and_hostname() {
        let h = parse_hypervisor(&json!({ "host_ip": "10.1.1.5", "hypervisor_hostname": "nl-host-01" })).unwrap();
        assert_eq!(h.host_ip, "10.1.1.5");
        assert!(parse_hypervisor(&json!({ "hypervisor_hostname": "nl-host-02" })).is_none());
    }
}
