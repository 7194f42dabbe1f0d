use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use taskq_persistence::StoreConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub broker: NetworkConfig,
    pub persistence: PersistenceConfig,
    pub retry: RetryConfig,
    pub workers: WorkersConfig,
    pub api: ApiConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    pub queue_depth_threshold: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Rocksdb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub backend: StoreBackend,
    pub data_dir: PathBuf,
    /// How long terminal results stay queryable
    pub result_retention_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    pub heartbeat_timeout_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub rest_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub prometheus_port: u16,
    pub log_level: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            host: "0.0.0.0".to_string(),
            port: 6379,
            queue_depth_threshold: 100_000,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            backend: StoreBackend::Rocksdb,
            data_dir: PathBuf::from("./data"),
            result_retention_secs: 86_400,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            base_delay_secs: 5,
            max_delay_secs: 3_600,
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        WorkersConfig {
            heartbeat_timeout_secs: 30,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig { rest_port: 8080 }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        MonitoringConfig {
            prometheus_port: 9091,
            log_level: "info".to_string(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            broker: NetworkConfig::default(),
            persistence: PersistenceConfig::default(),
            retry: RetryConfig::default(),
            workers: WorkersConfig::default(),
            api: ApiConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl BrokerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: BrokerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_store_config(&self) -> StoreConfig {
        StoreConfig {
            data_dir: self.persistence.data_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_falls_back_to_defaults() {
        let yaml = r#"
broker:
  host: 127.0.0.1
  port: 7000
  queue_depth_threshold: 10
persistence:
  backend: memory
  data_dir: /tmp/taskq
  result_retention_secs: 60
"#;
        let config: BrokerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.broker.port, 7000);
        assert_eq!(config.persistence.backend, StoreBackend::Memory);
        assert_eq!(config.retry.base_delay_secs, 5);
        assert_eq!(config.retry.max_delay_secs, 3_600);
        assert_eq!(config.workers.heartbeat_timeout_secs, 30);
        assert_eq!(config.monitoring.log_level, "info");
    }
}
