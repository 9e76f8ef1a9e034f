//! DigitalOcean droplet API client.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::application::ports::{ControlPlane, InstanceSpec};
use crate::domain::{ControlPlaneError, InstanceDescriptor, InstanceId, NetworkAddress};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `ControlPlane` over the DigitalOcean v2 REST API.
#[derive(Clone)]
pub struct DigitalOceanClient {
    http: Client,
    base_url: String,
    token: String,
}

impl DigitalOceanClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        Self::with_builder(Client::builder(), base_url, token)
    }

    fn with_builder(
        builder: reqwest::ClientBuilder,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        let http = builder
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("mc-auto/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
        })
    }

    fn droplet_url(&self, id: InstanceId) -> String {
        format!("{}/v2/droplets/{id}", self.base_url)
    }

    async fn droplet(response: Response, operation: &'static str) -> Result<InstanceDescriptor> {
        let envelope: DropletEnvelope = checked(response, operation)
            .await?
            .json()
            .await
            .with_context(|| format!("{operation}: decoding response"))?;
        Ok(envelope.droplet.into())
    }
}

/// Pass a success response through; turn anything else into a
/// `ControlPlaneError::Status` carrying the body.
async fn checked(response: Response, operation: &'static str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ControlPlaneError::Status {
        operation,
        status,
        body,
    }
    .into())
}

impl ControlPlane for DigitalOceanClient {
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<InstanceDescriptor> {
        let body = CreateDroplet::from(spec);
        let response = self
            .http
            .post(format!("{}/v2/droplets", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("create droplet request")?;
        Self::droplet(response, "create droplet").await
    }

    async fn fetch_instance(&self, id: InstanceId) -> Result<InstanceDescriptor> {
        let response = self
            .http
            .get(self.droplet_url(id))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("get droplet request")?;
        Self::droplet(response, "get droplet").await
    }

    async fn rebuild_instance(&self, id: InstanceId, image: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/actions", self.droplet_url(id)))
            .bearer_auth(&self.token)
            .json(&DropletAction {
                kind: "rebuild",
                image,
            })
            .send()
            .await
            .context("rebuild droplet request")?;
        checked(response, "rebuild droplet").await?;
        Ok(())
    }

    async fn delete_instance(&self, id: InstanceId) -> Result<u16> {
        let response = self
            .http
            .delete(self.droplet_url(id))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("delete droplet request")?;
        Ok(response.status().as_u16())
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CreateDroplet<'a> {
    name: &'a str,
    region: &'a str,
    size: &'a str,
    image: &'a str,
    ssh_keys: Vec<serde_json::Value>,
}

impl<'a> From<&'a InstanceSpec> for CreateDroplet<'a> {
    fn from(spec: &'a InstanceSpec) -> Self {
        Self {
            name: &spec.name,
            region: &spec.region,
            size: &spec.size,
            image: &spec.image,
            // The API takes numeric ids as numbers and fingerprints as strings.
            ssh_keys: spec
                .ssh_keys
                .iter()
                .map(|key| match key.parse::<u64>() {
                    Ok(id) => serde_json::Value::from(id),
                    Err(_) => serde_json::Value::from(key.as_str()),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DropletAction<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct DropletEnvelope {
    droplet: Droplet,
}

#[derive(Debug, Deserialize)]
struct Droplet {
    id: InstanceId,
    #[serde(default)]
    status: String,
    #[serde(default)]
    networks: Networks,
}

#[derive(Debug, Default, Deserialize)]
struct Networks {
    #[serde(default)]
    v4: Vec<V4Network>,
}

#[derive(Debug, Deserialize)]
struct V4Network {
    ip_address: String,
    #[serde(rename = "type", default)]
    kind: String,
}

impl From<Droplet> for InstanceDescriptor {
    fn from(droplet: Droplet) -> Self {
        Self {
            id: droplet.id,
            status: droplet.status,
            addresses: droplet
                .networks
                .v4
                .into_iter()
                .map(|n| NetworkAddress {
                    public: n.kind == "public",
                    ip: n.ip_address,
                })
                .collect(),
        }
    }
}
