//! HTTP call execution provider client

use super::{CallExecutor, DispatchError, DispatchRequest, DispatchResponse};
use async_trait::async_trait;
use dialwave_common::config::DialerConfig;
use dialwave_common::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Optional JSON body of a provider answer
#[derive(Debug, Default, Deserialize)]
struct ProviderAnswer {
    #[serde(default)]
    accepted: Option<bool>,
    #[serde(default)]
    reason: Option<String>,
}

/// Posts dispatch requests as JSON to a provider endpoint
///
/// 2xx means accepted unless the body says `{"accepted": false}`; 4xx is a
/// rejection; 5xx and network errors are transport failures.
pub struct HttpCallExecutor {
    http_client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpCallExecutor {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// Build from configuration; `None` when no endpoint is set
    pub fn from_config(config: &DialerConfig) -> Result<Option<Self>> {
        config
            .endpoint
            .as_ref()
            .map(|endpoint| {
                Self::new(
                    endpoint.clone(),
                    config.api_key.clone(),
                    Duration::from_secs(config.timeout_secs),
                )
            })
            .transpose()
    }
}

#[async_trait]
impl CallExecutor for HttpCallExecutor {
    async fn dispatch(&self, request: &DispatchRequest) -> std::result::Result<DispatchResponse, DispatchError> {
        let mut http_request = self.http_client.post(&self.endpoint).json(request);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DispatchError::Transport(e.to_string()))?;

        debug!(
            queue_item_id = %request.queue_item_id,
            status = status.as_u16(),
            "Provider answered dispatch"
        );

        if status.is_success() {
            if body.trim().is_empty() {
                return Ok(DispatchResponse::Accepted);
            }
            let answer: ProviderAnswer = serde_json::from_str(&body)
                .map_err(|e| DispatchError::InvalidResponse(e.to_string()))?;
            return Ok(match answer.accepted {
                Some(false) => DispatchResponse::Rejected {
                    reason: answer.reason.unwrap_or_else(|| "rejected by provider".to_string()),
                },
                _ => DispatchResponse::Accepted,
            });
        }

        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            let reason = serde_json::from_str::<ProviderAnswer>(&body)
                .ok()
                .and_then(|a| a.reason)
                .unwrap_or_else(|| format!("provider returned {}", status));
            return Ok(DispatchResponse::Rejected { reason });
        }

        Err(DispatchError::Provider {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> DispatchRequest {
        DispatchRequest {
            queue_item_id: Uuid::new_v4(),
            contact_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            phone_number_id: None,
            to_number: "+15550001111".to_string(),
            agent_id: None,
            attempt_number: 1,
        }
    }

    async fn executor(server: &MockServer) -> HttpCallExecutor {
        HttpCallExecutor::new(
            format!("{}/v1/calls", server.uri()),
            Some("test-key".to_string()),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_accepted_dispatch() {
        let server = MockServer::start().await;
        let req = request();
        Mock::given(method("POST"))
            .and(path("/v1/calls"))
            .and(header("Authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "queue_item_id": req.queue_item_id,
                "to_number": "+15550001111",
            })))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "accepted": true,
                "call_id": "c-1",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = executor(&server).await.dispatch(&req).await.unwrap();
        assert_eq!(result, DispatchResponse::Accepted);
    }

    #[tokio::test]
    async fn test_client_error_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "reason": "caller id not verified",
            })))
            .mount(&server)
            .await;

        let result = executor(&server).await.dispatch(&request()).await.unwrap();
        assert_eq!(
            result,
            DispatchResponse::Rejected {
                reason: "caller id not verified".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_server_error_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = executor(&server).await.dispatch(&request()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Provider { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_provider() {
        let executor = HttpCallExecutor::new(
            "http://127.0.0.1:9/v1/calls",
            None,
            Duration::from_millis(500),
        )
        .unwrap();
        let err = executor.dispatch(&request()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }
}
