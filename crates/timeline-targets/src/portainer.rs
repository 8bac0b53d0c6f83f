use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use timeline_core::{template, TimelineConfig, TimelineError, Variant};
use tracing::{debug, info, warn};

use crate::{error::TargetError, target::UpdateTarget};

/// Portainer's stack status code for a running stack.
const STACK_STATUS_ACTIVE: u32 = 1;

/// Redeploys a Portainer stack with a compose file rendered for the variant.
///
/// Each update is three calls: list stacks to find ours, PUT the new compose
/// content (keeping the stack's env, pruning and pulling the image), then
/// read the stack back to confirm it is active.
pub struct PortainerTarget {
    client: reqwest::Client,
    /// `<scheme>://<hostname>/api`
    base_url: String,
    stack_name: String,
    headers: HeaderMap,
    template_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct Stack {
    #[serde(rename = "Id")]
    id: u64,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "EndpointId")]
    endpoint_id: u64,
    #[serde(rename = "Env", default)]
    env: serde_json::Value,
    #[serde(rename = "Status", default)]
    status: Option<u32>,
}

impl PortainerTarget {
    pub fn new(
        base_url: String,
        stack_name: String,
        headers: HeaderMap,
        template_path: PathBuf,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            stack_name,
            headers,
            template_path,
        }
    }

    pub fn from_config(config: &TimelineConfig) -> timeline_core::Result<Self> {
        let cfg = &config.portainer;
        let missing = |field: &str| TimelineError::Config(format!("portainer.{field} is required"));

        let hostname = cfg.hostname.as_deref().ok_or_else(|| missing("hostname"))?;
        let stack_name = cfg.stack_name.clone().ok_or_else(|| missing("stack_name"))?;
        let template_path = config.template_path().ok_or_else(|| missing("template"))?;
        if !template_path.is_file() {
            return Err(TimelineError::TemplateNotFound {
                path: template_path,
            });
        }

        let mut headers = HeaderMap::new();
        for header in &cfg.header {
            let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|e| {
                TimelineError::Config(format!("invalid header name {}: {e}", header.name))
            })?;
            let value = HeaderValue::from_str(&header.value).map_err(|e| {
                TimelineError::Config(format!("invalid value for header {}: {e}", header.name))
            })?;
            headers.insert(name, value);
        }

        Ok(Self::new(
            format!("{}://{}/api", cfg.scheme, hostname),
            stack_name,
            headers,
            template_path,
        ))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<T, TargetError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(%url, "portainer GET");
        let resp = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .send()
            .await?;
        let resp = check_status(endpoint, resp).await?;
        resp.json()
            .await
            .map_err(|e| TargetError::Parse(format!("{endpoint}: {e}")))
    }

    async fn put_json(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
        query: &[(&str, String)],
    ) -> Result<(), TargetError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(%url, "portainer PUT");
        let resp = self
            .client
            .put(&url)
            .headers(self.headers.clone())
            .query(query)
            .json(body)
            .send()
            .await?;
        check_status(endpoint, resp).await?;
        Ok(())
    }
}

async fn check_status(
    endpoint: &str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, TargetError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    warn!(status, %endpoint, body = %message, "Portainer API error");
    Err(TargetError::Api {
        endpoint: endpoint.to_string(),
        status,
        message,
    })
}

#[async_trait]
impl UpdateTarget for PortainerTarget {
    fn name(&self) -> &str {
        "portainer"
    }

    async fn update_variant(&self, variant: &Variant) -> Result<(), TargetError> {
        let template = template::load_template(&self.template_path)?;
        let compose = template::render_compose(&template, variant)?;
        info!(stack = %self.stack_name, "updating Portainer stack");

        let stacks: Vec<Stack> = self.get_json("stacks").await?;
        let stack = stacks
            .into_iter()
            .find(|s| s.name == self.stack_name)
            .ok_or_else(|| TargetError::StackNotFound(self.stack_name.clone()))?;

        let body = serde_json::json!({
            "env": stack.env,
            "prune": true,
            "pullImage": true,
            "stackFileContent": compose,
        });
        self.put_json(
            &format!("stacks/{}", stack.id),
            &body,
            &[("endpointId", stack.endpoint_id.to_string())],
        )
        .await?;

        let updated: Stack = self.get_json(&format!("stacks/{}", stack.id)).await?;
        match updated.status {
            Some(STACK_STATUS_ACTIVE) => {
                info!(stack = %self.stack_name, id = updated.id, "Portainer stack redeployed");
            }
            other => {
                warn!(
                    stack = %self.stack_name,
                    status = ?other,
                    "Portainer stack updated but is not reported as active"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn variant() -> Variant {
        Variant {
            index: 3,
            pack: "modded".to_string(),
            server_image: "itzg/minecraft-server:java17".to_string(),
            server_type: "FORGE".to_string(),
            server_version: "1.19.2".to_string(),
            additional_envs: BTreeMap::from([("MEMORY".to_string(), "6G".to_string())]),
        }
    }

    fn target(server: &MockServer, dir: &tempfile::TempDir) -> PortainerTarget {
        let template = dir.path().join("compose.yml");
        std::fs::write(
            &template,
            "image: {server_image}\nenv:\n  TYPE: {server_type}\n  {server_additional_envs}\n",
        )
        .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secret"));
        PortainerTarget::new(
            format!("{}/api", server.uri()),
            "minecraft".to_string(),
            headers,
            template,
        )
    }

    fn stacks_body() -> serde_json::Value {
        serde_json::json!([
            {"Id": 1, "Name": "proxy", "EndpointId": 2, "Env": [], "Status": 1},
            {"Id": 7, "Name": "minecraft", "EndpointId": 2,
             "Env": [{"name": "EULA", "value": "TRUE"}], "Status": 1}
        ])
    }

    #[tokio::test]
    async fn redeploys_stack_with_rendered_compose() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/api/stacks"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stacks_body()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/stacks/7"))
            .and(query_param("endpointId", "2"))
            .and(body_partial_json(serde_json::json!({
                "env": [{"name": "EULA", "value": "TRUE"}],
                "prune": true,
                "pullImage": true,
                "stackFileContent":
                    "image: itzg/minecraft-server:java17\nenv:\n  TYPE: FORGE\n  MEMORY: \"6G\"\n",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/stacks/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(
                {"Id": 7, "Name": "minecraft", "EndpointId": 2, "Env": [], "Status": 1}
            )))
            .expect(1)
            .mount(&server)
            .await;

        target(&server, &dir).update_variant(&variant()).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_stack_fails_without_put() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/api/stacks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = target(&server, &dir).update_variant(&variant()).await.unwrap_err();
        assert!(matches!(err, TargetError::StackNotFound(ref name) if name == "minecraft"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_api_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        Mock::given(method("GET"))
            .and(path("/api/stacks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stacks_body()))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/stacks/7"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = target(&server, &dir).update_variant(&variant()).await.unwrap_err();
        match err {
            TargetError::Api { status, message, .. } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }
}
