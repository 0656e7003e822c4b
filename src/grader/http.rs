//! HTTP client for the grading worker

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{Grader, GraderError, GradingRequest, Result, WorkerReport};

/// Grader client configuration
#[derive(Debug, Clone)]
pub struct HttpGraderConfig {
    pub base_url: String,
    pub enqueue_path: String,
    pub status_path: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub token: Option<String>,
    pub user_agent: String,
}

impl Default for HttpGraderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            enqueue_path: "/tasks".to_string(),
            status_path: "/tasks".to_string(),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            token: None,
            user_agent: concat!("GradeBox/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EnqueueResponse {
    task_id: String,
}

pub struct HttpGrader {
    client: Client,
    config: HttpGraderConfig,
}

impl HttpGrader {
    pub fn new(config: HttpGraderConfig) -> Result<Self> {
        if !(config.base_url.starts_with("http://") || config.base_url.starts_with("https://")) {
            return Err(GraderError::InvalidUrl(config.base_url));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| GraderError::RequestFailed(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await.map_err(map_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GraderError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Grader for HttpGrader {
    async fn enqueue(&self, request: &GradingRequest) -> Result<String> {
        let url = self.url(&self.config.enqueue_path);
        debug!(%url, job_id = %request.job_id, "Enqueueing grading task");

        let response = self.send(self.client.post(&url).json(request)).await?;
        let body: EnqueueResponse = response
            .json()
            .await
            .map_err(|e| GraderError::InvalidResponse(e.to_string()))?;

        if body.task_id.is_empty() {
            return Err(GraderError::InvalidResponse("empty task_id".to_string()));
        }
        debug!(job_id = %request.job_id, task_id = %body.task_id, "Grading task enqueued");
        Ok(body.task_id)
    }

    async fn poll_status(&self, task_id: &str) -> Result<WorkerReport> {
        let url = format!(
            "{}/{}",
            self.url(self.config.status_path.trim_end_matches('/')),
            task_id
        );
        debug!(%url, task_id, "Polling grading task");

        let response = self.send(self.client.get(&url)).await?;
        response
            .json()
            .await
            .map_err(|e| GraderError::InvalidResponse(e.to_string()))
    }
}

fn map_reqwest(e: reqwest::Error) -> GraderError {
    if e.is_timeout() {
        GraderError::Timeout
    } else {
        GraderError::RequestFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_defaults() {
        let config = HttpGraderConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.enqueue_path, "/tasks");
        assert!(config.token.is_none());
        assert!(config.user_agent.starts_with("GradeBox/"));
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let config = HttpGraderConfig {
            base_url: "ftp://grader".to_string(),
            ..HttpGraderConfig::default()
        };
        assert!(matches!(HttpGrader::new(config), Err(GraderError::InvalidUrl(_))));
    }

    #[test]
    fn test_url_joining() {
        let grader = HttpGrader::new(HttpGraderConfig {
            base_url: "http://grader:9000/".to_string(),
            ..HttpGraderConfig::default()
        })
        .unwrap();
        assert_eq!(grader.url("/tasks"), "http://grader:9000/tasks");
    }

    #[tokio::test]
    async fn test_unreachable_grader_is_request_error() {
        let grader = HttpGrader::new(HttpGraderConfig {
            // Port 9 (discard) on localhost is closed in test environments.
            base_url: "http://127.0.0.1:9".to_string(),
            connect_timeout: Duration::from_millis(200),
            request_timeout: Duration::from_millis(500),
            ..HttpGraderConfig::default()
        })
        .unwrap();

        let err = grader.poll_status("abc").await.unwrap_err();
        assert!(matches!(
            err,
            GraderError::RequestFailed(_) | GraderError::Timeout
        ));
    }
}
