//! HTTP implementation of [`KubeApi`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use crate::api::{KubeApi, WatchStream};
use crate::config::KubeConfig;
use crate::error::KubeError;
use crate::types::{Binding, Deployment, List, Node, Status};
use crate::watch::{split_lines, MAX_WATCH_LINE_BYTES};

const MERGE_PATCH: &str = "application/merge-patch+json";

/// Kubernetes API client.
#[derive(Debug, Clone)]
pub struct KubeClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: std::time::Duration,
}

impl KubeClient {
    /// Create a new client from connection settings.
    pub fn new(config: &KubeConfig) -> Result<Self, KubeError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| KubeError::Config("token contains invalid characters".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout);

        if let Some(ca) = &config.ca_pem {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(ca)?);
        }
        if let Some(identity) = &config.identity_pem {
            builder = builder.identity(reqwest::Identity::from_pem(identity)?);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Decode a successful response, or turn a failed one into [`KubeError::Api`].
    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, KubeError> {
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

fn api_error(status: StatusCode, body: &[u8]) -> KubeError {
    let message = serde_json::from_slice::<Status>(body)
        .map(|s| s.message)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

    KubeError::Api {
        status: status.as_u16(),
        message,
    }
}

fn namespace_or_default(namespace: &str) -> &str {
    if namespace.is_empty() {
        "default"
    } else {
        namespace
    }
}

#[async_trait]
impl KubeApi for KubeClient {
    #[instrument(skip(self))]
    async fn list_nodes(&self) -> Result<Vec<Node>, KubeError> {
        let response = self
            .client
            .get(self.url("/api/v1/nodes"))
            .timeout(self.request_timeout)
            .send()
            .await?;

        let list: List<Node> = Self::handle_response(response).await?;
        debug!(node_count = list.items.len(), "Listed nodes");
        Ok(list.items)
    }

    async fn watch_pods(&self, resource_version: Option<&str>) -> Result<WatchStream, KubeError> {
        let mut query = vec![("watch", "true")];
        if let Some(version) = resource_version {
            query.push(("resourceVersion", version));
        }
        debug!(resource_version, "Opening pod watch");

        let response = self
            .client
            .get(self.url("/api/v1/pods"))
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await?;
            return Err(api_error(status, &body));
        }

        Ok(split_lines(response.bytes_stream(), MAX_WATCH_LINE_BYTES))
    }

    #[instrument(skip(self))]
    async fn bind(&self, namespace: &str, pod: &str, node: &str) -> Result<Status, KubeError> {
        let namespace = namespace_or_default(namespace);
        let binding = Binding::new(namespace, pod, node);

        let response = self
            .client
            .post(self.url(&format!("/api/v1/namespaces/{namespace}/bindings")))
            .json(&binding)
            .timeout(self.request_timeout)
            .send()
            .await?;

        // Bindings answer with a Status envelope on success and failure alike
        let http_status = response.status();
        let body = response.bytes().await?;
        match serde_json::from_slice::<Status>(&body) {
            Ok(mut status) => {
                if status.code == 0 {
                    status.code = http_status.as_u16();
                }
                Ok(status)
            }
            Err(_) if !http_status.is_success() => Err(api_error(http_status, &body)),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn list_deployments(
        &self,
        namespace: &str,
        field_selector: &str,
    ) -> Result<Vec<Deployment>, KubeError> {
        let namespace = namespace_or_default(namespace);
        let response = self
            .client
            .get(self.url(&format!("/apis/apps/v1/namespaces/{namespace}/deployments")))
            .query(&[("fieldSelector", field_selector)])
            .timeout(self.request_timeout)
            .send()
            .await?;

        let list: List<Deployment> = Self::handle_response(response).await?;
        Ok(list.items)
    }

    #[instrument(skip(self, deployment), fields(deployment = %deployment.metadata.name))]
    async fn update_deployment_scheduler_name(
        &self,
        deployment: &Deployment,
        scheduler_name: &str,
    ) -> Result<Status, KubeError> {
        let namespace = namespace_or_default(&deployment.metadata.namespace);
        let patch = json!({
            "spec": { "template": { "spec": { "schedulerName": scheduler_name } } }
        });

        let response = self
            .client
            .patch(self.url(&format!(
                "/apis/apps/v1/namespaces/{namespace}/deployments/{}",
                deployment.metadata.name
            )))
            .header(CONTENT_TYPE, MERGE_PATCH)
            .body(serde_json::to_vec(&patch)?)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let http_status = response.status();
        if !http_status.is_success() {
            let body = response.bytes().await?;
            return Err(api_error(http_status, &body));
        }

        Ok(Status {
            status: "Success".to_string(),
            code: http_status.as_u16(),
            ..Default::default()
        })
    }
}
