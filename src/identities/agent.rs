//! Identities held by a remote git-age agent.
//!
//! The agent speaks the Connect protocol; every call is a unary JSON `POST` to
//! `{base}/{service}/{method}`. Before joining a chain the agent must answer a
//! standard gRPC health check with `SERVING`.
//!
//! The endpoint is an `http(s)://` base URL or `unix:///path/to/agent.sock`.

#[cfg(unix)]
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{default_comment, GenerateIdentity, IdentitiesQuery, IdentitySource};
use crate::crypto::Identity;
use crate::error::{GitAgeError, Result};

/// Connect service name of the agent's identity store
pub const IDENTITIES_SERVICE: &str = "agent.v1.IdentitiesStoreService";

const HEALTH_CHECK: &str = "grpc.health.v1.Health/Check";
const SERVING: &str = "SERVING";
const UNIX_SCHEME: &str = "unix://";
#[cfg(unix)]
const UNIX_BASE_URL: &str = "http://localhost";

#[derive(Serialize)]
struct HealthCheckRequest<'a> {
    service: &'a str,
}

#[derive(Deserialize)]
struct HealthCheckResponse {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Serialize)]
struct GetIdentitiesRequest<'a> {
    remotes: &'a [String],
}

#[derive(Deserialize)]
struct GetIdentitiesResponse {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreIdentityRequest<'a> {
    public_key: &'a str,
    private_key: &'a str,
    comment: &'a str,
    remote: &'a str,
}

#[derive(Deserialize)]
struct StoreIdentityResponse {}

pub struct AgentIdentitySource {
    base_url: String,
    client: Client,
}

impl AgentIdentitySource {
    /// Client for `endpoint`, either an `http(s)://` base URL or `unix://SOCKET_PATH`
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        let mut default_headers = HeaderMap::new();
        default_headers.insert("Connect-Protocol-Version", HeaderValue::from_static("1"));
        let builder = Client::builder()
            .default_headers(default_headers)
            .connect_timeout(Duration::from_secs(30));

        let (builder, base_url) = match endpoint.strip_prefix(UNIX_SCHEME) {
            Some("") => (builder, String::new()),
            Some(socket) => over_unix_socket(builder, socket)?,
            None => (builder, endpoint.trim_end_matches('/').to_string()),
        };

        Ok(Self {
            base_url,
            client: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<Req, Resp>(
        &self,
        cancel: &CancellationToken,
        procedure: &str,
        request: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, procedure);
        debug!(url = %url, "Calling agent");

        let exchange = async {
            let response = self.client.post(&url).json(request).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GitAgeError::Agent(format!(
                    "{procedure} failed with {status}: {body}"
                )));
            }
            Ok(response.json::<Resp>().await?)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GitAgeError::Cancelled),
            result = exchange => result,
        }
    }
}

/// Requests go to the socket; the URL only supplies the path
#[cfg(unix)]
fn over_unix_socket(builder: ClientBuilder, socket: &str) -> Result<(ClientBuilder, String)> {
    debug!(socket, "Connecting to agent over Unix socket");
    Ok((
        builder.unix_socket(PathBuf::from(socket)),
        UNIX_BASE_URL.to_string(),
    ))
}

#[cfg(not(unix))]
fn over_unix_socket(_builder: ClientBuilder, socket: &str) -> Result<(ClientBuilder, String)> {
    Err(GitAgeError::Agent(format!(
        "Unix socket endpoints are only available on Unix: {socket}"
    )))
}

#[async_trait]
impl IdentitySource for AgentIdentitySource {
    fn name(&self) -> &'static str {
        "agent"
    }

    async fn is_valid(&self, cancel: &CancellationToken) -> Result<bool> {
        if self.base_url.is_empty() {
            return Ok(false);
        }

        let response: HealthCheckResponse = self
            .call(
                cancel,
                HEALTH_CHECK,
                &HealthCheckRequest {
                    service: IDENTITIES_SERVICE,
                },
            )
            .await?;

        let status = response.status.unwrap_or_else(|| "UNKNOWN".to_string());
        if status != SERVING {
            info!(status = %status, "Agent health check failed");
            return Ok(false);
        }
        Ok(true)
    }

    async fn identities(
        &self,
        cancel: &CancellationToken,
        query: &IdentitiesQuery,
    ) -> Result<Vec<Identity>> {
        let response: GetIdentitiesResponse = self
            .call(
                cancel,
                &format!("{IDENTITIES_SERVICE}/GetIdentities"),
                &GetIdentitiesRequest {
                    remotes: &query.remotes,
                },
            )
            .await?;

        response
            .keys
            .iter()
            .map(|raw| Identity::parse(raw.trim()))
            .collect()
    }

    async fn generate(
        &self,
        cancel: &CancellationToken,
        cmd: &GenerateIdentity,
    ) -> Result<String> {
        let identity = Identity::generate();
        let public_key = identity.to_public().to_string();
        let private_key = identity.to_secret_string();
        let comment = if cmd.comment.is_empty() {
            default_comment()
        } else {
            cmd.comment.clone()
        };

        let _: StoreIdentityResponse = self
            .call(
                cancel,
                &format!("{IDENTITIES_SERVICE}/StoreIdentity"),
                &StoreIdentityRequest {
                    public_key: &public_key,
                    private_key: &private_key,
                    comment: &comment,
                    remote: &cmd.remote,
                },
            )
            .await?;

        Ok(public_key)
    }
}
