//! Authenticated OpenStack REST client
//!
//! Handles:
//! - Keystone v3 password authentication (token + service catalog)
//! - Endpoint resolution per subsystem
//! - Transparent pagination over `next` links

mod catalog;

pub use catalog::{CatalogEndpoint, CatalogEntry, ServiceCatalog, ServiceKind};

use crate::config::OpenStackConfig;
use crate::error::{AuthError, FetchError};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

const TOKEN_HEADER: &str = "X-Subject-Token";
const AUTH_HEADER: &str = "X-Auth-Token";

/// One page of a paginated listing
pub trait Page: DeserializeOwned {
    type Item;

    /// Split the page into its items and the URL of the next page, if any
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

/// Nova/Cinder style `*_links` entry
#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub rel: String,
    #[serde(default)]
    pub href: String,
}

/// Href of the `rel = "next"` link, if present
pub fn next_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|link| link.rel == "next" && !link.href.is_empty())
        .map(|link| link.href.clone())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

/// Client handle holding a scoped token and the catalog it came with
pub struct CloudClient {
    http: reqwest::Client,
    token: String,
    catalog: ServiceCatalog,
    identity_base: String,
}

impl CloudClient {
    /// Authenticate against Keystone and keep the resulting token
    pub async fn authenticate(config: &OpenStackConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("symbion-agent-openstack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(AuthError::Client)?;

        let identity_base = identity_base(&config.identity_endpoint);
        let url = format!("{}/v3/auth/tokens", identity_base);

        let response = http
            .post(&url)
            .json(&auth_request(config))
            .send()
            .await
            .map_err(|source| AuthError::Transport {
                endpoint: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected(status));
        }

        let token = response
            .headers()
            .get(TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(AuthError::MissingToken)?;

        let body = response
            .bytes()
            .await
            .map_err(|source| AuthError::Transport {
                endpoint: url.clone(),
                source,
            })?;
        let parsed: TokenResponse = serde_json::from_slice(&body).map_err(AuthError::Decode)?;

        let catalog = ServiceCatalog::new(
            parsed.token.catalog,
            &config.interface,
            config.region.as_deref(),
        );

        info!(
            "Authenticated as {}@{} ({} catalog services)",
            config.username,
            config.project,
            catalog.len()
        );

        Ok(Self {
            http,
            token,
            catalog,
            identity_base,
        })
    }

    /// Base URL of a subsystem, without trailing slash
    ///
    /// Identity falls back to the configured endpoint when the catalog
    /// does not advertise one.
    pub fn endpoint(&self, kind: ServiceKind) -> Result<String, FetchError> {
        match (kind, self.catalog.url_for(kind)) {
            (ServiceKind::Identity, Some(url)) => Ok(identity_base(url)),
            (ServiceKind::Identity, None) => Ok(self.identity_base.clone()),
            (_, Some(url)) => Ok(url.trim_end_matches('/').to_string()),
            (_, None) => Err(FetchError::NoEndpoint(kind)),
        }
    }

    /// Follow pagination from `first_url` and merge every page
    pub async fn list_all<P: Page>(
        &self,
        resource: &'static str,
        first_url: String,
    ) -> Result<Vec<P::Item>, FetchError> {
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(first_url);

        while let Some(url) = next.take() {
            if !visited.insert(url.clone()) {
                warn!("Pagination loop detected while listing {} at {}", resource, url);
                break;
            }

            let page: P = self.get_json(resource, &url).await?;
            let (mut batch, link) = page.into_parts();
            debug!("Fetched {} {} from {}", batch.len(), resource, url);

            items.append(&mut batch);
            next = link;
        }

        Ok(items)
    }

    /// GET a URL with the token and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        resource: &'static str,
        url: &str,
    ) -> Result<T, FetchError> {
        let response = self
            .http
            .get(url)
            .header(AUTH_HEADER, &self.token)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| FetchError::List { resource, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { resource, status });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::List { resource, source })?;

        serde_json::from_slice(&body).map_err(|source| FetchError::Extract { resource, source })
    }
}

/// Identity URL without trailing slash or API version suffix
pub fn identity_base(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    trimmed
        .strip_suffix("/v3")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

/// Keystone v3 password authentication body, project scoped
fn auth_request(config: &OpenStackConfig) -> serde_json::Value {
    let password = config
        .password
        .as_ref()
        .map(|p| p.expose())
        .unwrap_or_default();

    json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": config.username,
                        "domain": { "name": config.domain },
                        "password": password,
                    }
                }
            },
            "scope": {
                "project": {
                    "name": config.project,
                    "domain": { "name": config.domain },
                }
            }
        }
    })
}
