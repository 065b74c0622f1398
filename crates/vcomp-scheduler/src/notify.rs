//! Webhook delivery for terminal job transitions.

use std::time::Duration;

use tracing::{debug, warn};

use vcomp_models::WebhookPayload;

/// Delivery timeout per attempt.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Fires completion webhooks. Delivery is best-effort: one attempt, no
/// retries, failures logged and swallowed so a dead endpoint can never
/// affect job state.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookNotifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Deliver the payload to the given URL.
    pub async fn notify(&self, url: &str, payload: &WebhookPayload) {
        let result = self
            .client
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(payload)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(job_id = %payload.job_id, url, "Webhook delivered");
            }
            Ok(response) => {
                warn!(
                    job_id = %payload.job_id,
                    url,
                    status = %response.status(),
                    "Webhook endpoint returned an error"
                );
            }
            Err(e) => {
                warn!(job_id = %payload.job_id, url, "Webhook delivery failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vcomp_models::{JobId, JobStatus};
    use wiremock::matchers::{body_json_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> WebhookPayload {
        WebhookPayload {
            job_id: JobId::from_string("job-1"),
            status: JobStatus::Completed,
            completed_at: None,
            output_path: Some("generated/job-1.mp4".into()),
            preview_path: None,
            error_message: None,
            file_size: Some(42),
            duration_seconds: Some(8.0),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_delivers_payload_as_json() {
        let server = MockServer::start().await;
        let expected = serde_json::to_string(&payload()).unwrap();
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json_string(&expected))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        WebhookNotifier::new()
            .notify(&format!("{}/hook", server.uri()), &payload())
            .await;
    }

    #[tokio::test]
    async fn test_endpoint_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        // Must not panic or error.
        WebhookNotifier::new()
            .notify(&format!("{}/hook", server.uri()), &payload())
            .await;
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_swallowed() {
        WebhookNotifier::new()
            .notify("http://127.0.0.1:1/hook", &payload())
            .await;
    }
}
