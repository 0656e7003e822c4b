use crate::codes::CodeSettings;
use crate::grader::HttpGraderConfig;
use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub codes: CodesConfig,
    #[serde(default)]
    pub grader: GraderConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_fjall_path")]
    pub fjall_path: PathBuf,
    #[serde(default)]
    pub api: ApiLimits,
}

/// API request limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiLimits {
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: ByteSize,
    /// Upper bound for `?limit=` on transaction history
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            fjall_path: default_fjall_path(),
            api: ApiLimits::default(),
        }
    }
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            max_history: default_max_history(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

fn default_fjall_path() -> PathBuf {
    PathBuf::from("data/gradebox")
}

fn default_max_body_bytes() -> ByteSize {
    ByteSize(1024 * 1024) // 1 MB
}

fn default_max_history() -> usize {
    200
}

/// What a submission costs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BillingConfig {
    #[serde(default = "default_submission_fee")]
    pub submission_fee: i64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            submission_fee: default_submission_fee(),
        }
    }
}

fn default_submission_fee() -> i64 {
    10
}

/// Redeemable code generation
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CodesConfig {
    #[serde(default = "default_expire_days")]
    pub default_expire_days: u32,
    #[serde(default = "default_max_generate_count")]
    pub max_generate_count: usize,
}

impl Default for CodesConfig {
    fn default() -> Self {
        Self {
            default_expire_days: default_expire_days(),
            max_generate_count: default_max_generate_count(),
        }
    }
}

impl CodesConfig {
    pub fn settings(&self) -> CodeSettings {
        CodeSettings {
            default_expire_days: self.default_expire_days,
            max_generate_count: self.max_generate_count,
        }
    }
}

fn default_expire_days() -> u32 {
    30
}

fn default_max_generate_count() -> usize {
    200
}

/// External grading worker
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GraderConfig {
    #[serde(default = "default_grader_url")]
    pub base_url: String,
    #[serde(default = "default_tasks_path")]
    pub enqueue_path: String,
    #[serde(default = "default_tasks_path")]
    pub status_path: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: HumanDuration,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: HumanDuration,
    /// Bearer token (loaded from environment, not from config file)
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            base_url: default_grader_url(),
            enqueue_path: default_tasks_path(),
            status_path: default_tasks_path(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            token: None,
        }
    }
}

impl GraderConfig {
    pub fn http_config(&self) -> HttpGraderConfig {
        HttpGraderConfig {
            base_url: self.base_url.clone(),
            enqueue_path: self.enqueue_path.clone(),
            status_path: self.status_path.clone(),
            connect_timeout: self.connect_timeout.as_duration(),
            request_timeout: self.request_timeout.as_duration(),
            token: self.token.clone(),
            ..HttpGraderConfig::default()
        }
    }
}

fn default_grader_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_tasks_path() -> String {
    "/tasks".to_string()
}

fn default_connect_timeout() -> HumanDuration {
    HumanDuration::from_secs(2)
}

fn default_request_timeout() -> HumanDuration {
    HumanDuration::from_secs(5)
}

/// Dispatch worker pool
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_channel_size")]
    pub channel_size: usize,
    /// Default age after which an undispatched job counts as orphaned
    #[serde(default = "default_orphan_after")]
    pub orphan_after: HumanDuration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            channel_size: default_channel_size(),
            orphan_after: default_orphan_after(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_channel_size() -> usize {
    256
}

fn default_orphan_after() -> HumanDuration {
    HumanDuration::from_secs(600)
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}
