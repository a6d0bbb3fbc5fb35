use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use ostool_providers::openstack::{OpenStackCredentials, OpenStackDirectory};
use ostool_providers::ssh::SshShell;
use ostool_providers::{ComputeDirectory, RemoteShell};

/// Produces an authenticated control-plane directory.
///
/// Authentication is a run stage of its own, so the run receives a connector
/// rather than a ready directory.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ComputeDirectory>>;
}

pub struct OpenStackConnector {
    credentials: OpenStackCredentials,
}

impl OpenStackConnector {
    pub fn new(credentials: OpenStackCredentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl DirectoryConnector for OpenStackConnector {
    async fn connect(&self) -> Result<Arc<dyn ComputeDirectory>> {
        let directory = OpenStackDirectory::authenticate(&self.credentials).await?;
        Ok(Arc::new(directory))
    }
}

pub struct ProviderManager;

impl ProviderManager {
    pub fn remote_shell(connect_timeout: Duration) -> Arc<dyn RemoteShell> {
        Arc::new(SshShell::new(connect_timeout))
    }
}

/// Hands out a directory that is already set up. Used with in-memory fakes.
#[cfg(test)]
pub struct StaticConnector(pub Arc<dyn ComputeDirectory>);

#[cfg(test)]
#[async_trait]
impl DirectoryConnector for StaticConnector {
    async fn connect(&self) -> Result<Arc<dyn ComputeDirectory>> {
        Ok(self.0.clone())
    }
}
