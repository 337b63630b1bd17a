use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// 匹配容差允许范围 (百分比)
pub const MAX_TOLERANCE_PERCENT: f64 = 20.0;
pub const DEFAULT_TOLERANCE_PERCENT: f64 = 5.0;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub matching: MatchingConfig,
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 未配置时使用内存存储
    pub url: Option<String>,
    pub max_connections: u32,
    /// 获取连接的等待上限
    pub acquire_timeout_secs: u64,
    /// 超过该耗时的语句以 WARN 记录
    pub slow_statement_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// 系统设置不可读时使用的默认容差
    pub tolerance_percent: f64,
    /// PO / 附件查询超时, 超时视为差异
    pub lookup_timeout_ms: u64,
    /// 抽取置信度低于该值时进入人工复核
    pub hil_confidence_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// 并发冲突后重新评估并重试的次数
    pub conflict_retries: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                acquire_timeout_secs: 10,
                slow_statement_ms: 2000,
            },
            matching: MatchingConfig {
                tolerance_percent: DEFAULT_TOLERANCE_PERCENT,
                lookup_timeout_ms: 3000,
                hil_confidence_threshold: 0.8,
            },
            workflow: WorkflowConfig { conflict_retries: 1 },
        }
    }
}

impl AppConfig {
    /// 加载配置, 优先级从低到高:
    /// 1. 默认值
    /// 2. invoice-flow.toml (存在时)
    /// 3. 环境变量 INVOICE_FLOW__<SECTION>__<KEY>, 以及 DATABASE_URL
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();
        let mut builder = Config::builder()
            .set_default("server.host", defaults.server.host.clone())?
            .set_default("server.port", defaults.server.port as i64)?
            .set_default("database.max_connections", defaults.database.max_connections as i64)?
            .set_default("database.acquire_timeout_secs", defaults.database.acquire_timeout_secs as i64)?
            .set_default("database.slow_statement_ms", defaults.database.slow_statement_ms as i64)?
            .set_default("matching.tolerance_percent", defaults.matching.tolerance_percent)?
            .set_default("matching.lookup_timeout_ms", defaults.matching.lookup_timeout_ms as i64)?
            .set_default(
                "matching.hil_confidence_threshold",
                defaults.matching.hil_confidence_threshold,
            )?
            .set_default("workflow.conflict_retries", defaults.workflow.conflict_retries as i64)?;

        if Path::new("invoice-flow.toml").exists() {
            builder = builder.add_source(File::with_name("invoice-flow"));
        }

        builder = builder.add_source(
            Environment::with_prefix("INVOICE_FLOW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut app_config: AppConfig = builder.build()?.try_deserialize()?;

        if app_config.database.url.is_none() {
            app_config.database.url = std::env::var("DATABASE_URL").ok();
        }

        app_config.validate()?;
        Ok(app_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tolerance = self.matching.tolerance_percent;
        if !(0.0..=MAX_TOLERANCE_PERCENT).contains(&tolerance) {
            return Err(ConfigError::Invalid(format!(
                "matching.tolerance_percent must be within 0-{}, got {}",
                MAX_TOLERANCE_PERCENT, tolerance
            )));
        }
        let threshold = self.matching.hil_confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "matching.hil_confidence_threshold must be within 0-1, got {}",
                threshold
            )));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be positive".to_string(),
            ));
        }
        if self.database.acquire_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "database.acquire_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
