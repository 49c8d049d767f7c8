//! Control-plane abstraction
//!
//! The core is vendor-agnostic: everything it needs from the remote side
//! is this trait. The binary wires in the HTTP implementation; tests wire
//! in programmable mocks.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use nimbus_core::types::{LogRecord, StatusSnapshot, TimeWindow, UnitIdentity};
use nimbus_package::PackageTarget;
use serde_json::{json, Value};

/// Lifecycle methods the remote side distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleMethod {
    Deploy,
    Remove,
}

impl LifecycleMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleMethod::Deploy => "deploy",
            LifecycleMethod::Remove => "remove",
        }
    }
}

/// Options forwarded with a lifecycle call
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleOptions {
    /// Redeploy even when nothing changed
    pub force: bool,

    /// The previous cache manifest was unusable for this pass
    pub cache_outdated: bool,
}

/// Filter for instance listing
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub org: Option<String>,
    pub app: Option<String>,
    pub stage: Option<String>,
    pub name: Option<String>,
}

/// Operations the core requires from the remote control plane
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Pre-signed package destinations for one unit identity
    async fn cache_manifest(&self, identity: &UnitIdentity) -> Result<PackageTarget>;

    /// Issue the create/update or remove call
    async fn run_lifecycle(
        &self,
        identity: &UnitIdentity,
        inputs: &Value,
        method: LifecycleMethod,
        options: LifecycleOptions,
    ) -> Result<()>;

    /// Current status snapshot for one instance
    async fn status(&self, identity: &UnitIdentity) -> Result<StatusSnapshot>;

    /// Status snapshots for every instance matching the filter
    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<StatusSnapshot>>;

    /// Code-only fast path for function-kind instances
    async fn update_code(
        &self,
        identity: &UnitIdentity,
        package: Vec<u8>,
        region: Option<&str>,
    ) -> Result<()>;

    /// Time-windowed log search for a function's log topic
    async fn search_logs(
        &self,
        topic: &str,
        window: TimeWindow,
        query: Option<&str>,
        region: Option<&str>,
    ) -> Result<Vec<LogRecord>>;
}

/// HTTP implementation of the control-plane surface
pub struct HttpControlPlane {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpControlPlane {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn instance_url(&self, identity: &UnitIdentity, suffix: &str) -> String {
        format!(
            "{}/apps/{}/stages/{}/instances/{}/{}",
            self.base_url, identity.app, identity.stage, identity.name, suffix
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.bearer_auth(&self.token)
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn cache_manifest(&self, identity: &UnitIdentity) -> Result<PackageTarget> {
        let url = self.instance_url(identity, "package-target");
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .context("Package target request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Package target request for '{}' failed: HTTP {}",
                identity,
                response.status()
            ));
        }
        response
            .json()
            .await
            .context("Failed to parse package target response")
    }

    async fn run_lifecycle(
        &self,
        identity: &UnitIdentity,
        inputs: &Value,
        method: LifecycleMethod,
        options: LifecycleOptions,
    ) -> Result<()> {
        let url = self.instance_url(identity, "lifecycle");
        let body = json!({
            "org": identity.org,
            "component": identity.component,
            "method": method.as_str(),
            "inputs": inputs,
            "options": {
                "force": options.force,
                "cacheOutdated": options.cache_outdated,
            },
        });

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .context("Lifecycle request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Lifecycle '{}' for '{}' failed: HTTP {}",
                method.as_str(),
                identity,
                response.status()
            ));
        }
        Ok(())
    }

    async fn status(&self, identity: &UnitIdentity) -> Result<StatusSnapshot> {
        let url = self.instance_url(identity, "status");
        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .context("Status request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Status request for '{}' failed: HTTP {}",
                identity,
                response.status()
            ));
        }
        response
            .json()
            .await
            .context("Failed to parse status response")
    }

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<StatusSnapshot>> {
        let mut request = self.client.get(format!("{}/instances", self.base_url));
        for (key, value) in [
            ("org", &filter.org),
            ("app", &filter.app),
            ("stage", &filter.stage),
            ("name", &filter.name),
        ] {
            if let Some(value) = value {
                request = request.query(&[(key, value)]);
            }
        }

        let response = self
            .authorized(request)
            .send()
            .await
            .context("List request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("List request failed: HTTP {}", response.status()));
        }
        response
            .json()
            .await
            .context("Failed to parse list response")
    }

    async fn update_code(
        &self,
        identity: &UnitIdentity,
        package: Vec<u8>,
        region: Option<&str>,
    ) -> Result<()> {
        let mut request = self
            .client
            .post(self.instance_url(identity, "code"))
            .body(package);
        if let Some(region) = region {
            request = request.query(&[("region", region)]);
        }

        let response = self
            .authorized(request)
            .send()
            .await
            .context("Code update request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Code update for '{}' failed: HTTP {}",
                identity,
                response.status()
            ));
        }
        Ok(())
    }

    async fn search_logs(
        &self,
        topic: &str,
        window: TimeWindow,
        query: Option<&str>,
        region: Option<&str>,
    ) -> Result<Vec<LogRecord>> {
        let mut request = self
            .client
            .get(format!("{}/logs/{}", self.base_url, topic))
            .query(&[
                ("start", window.start.to_rfc3339()),
                ("end", window.end.to_rfc3339()),
            ]);
        if let Some(query_text) = query {
            request = request.query(&[("query", query_text)]);
        }
        if let Some(region) = region {
            request = request.query(&[("region", region)]);
        }

        let response = self
            .authorized(request)
            .send()
            .await
            .context("Log search request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Log search for '{}' failed: HTTP {}",
                topic,
                response.status()
            ));
        }
        response
            .json()
            .await
            .context("Failed to parse log search response")
    }
}
