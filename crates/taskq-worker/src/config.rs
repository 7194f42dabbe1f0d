use serde::{Deserialize, Serialize};
use taskq_core::tasks;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub broker_address: String,
    pub worker_id: Option<String>,
    pub concurrency: usize,
    pub heartbeat_interval_secs: u64,
    pub graceful_shutdown_timeout_secs: u64,
    /// Applied when an invocation does not carry its own timeout
    pub task_timeout_secs: u64,
    pub violin: ViolinConfig,
}

/// External program used by `run_violin`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViolinConfig {
    /// Interpreter to launch
    pub command: String,
    /// Script passed to the interpreter, relative to the target directory
    pub script: String,
    /// File the script must leave in the target directory
    pub output: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            broker_address: "127.0.0.1:6379".to_string(),
            worker_id: None,
            concurrency: 4,
            heartbeat_interval_secs: 15,
            graceful_shutdown_timeout_secs: 60,
            task_timeout_secs: 300,
            violin: ViolinConfig::default(),
        }
    }
}

impl Default for ViolinConfig {
    fn default() -> Self {
        ViolinConfig {
            command: tasks::VIOLIN_COMMAND.to_string(),
            script: tasks::VIOLIN_SCRIPT.to_string(),
            output: tasks::VIOLIN_OUTPUT.to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Configured id, or `hostname-pid-random`
    pub fn generate_worker_id(&self) -> String {
        if let Some(id) = &self.worker_id {
            return id.clone();
        }

        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());

        let random = uuid::Uuid::new_v4().simple().to_string();

        format!("{}-{}-{}", hostname, std::process::id(), &random[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violin_defaults() {
        let config: WorkerConfig = serde_yaml::from_str("concurrency: 2\n").unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.violin.command, "Rscript");
        assert_eq!(config.violin.script, "run_violin_plot.R");
        assert_eq!(config.violin.output, "violin_plot.pdf");
    }

    #[test]
    fn test_violin_override() {
        let yaml = "violin:\n  command: /usr/local/bin/Rscript\n";
        let config: WorkerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.violin.command, "/usr/local/bin/Rscript");
        assert_eq!(config.violin.output, "violin_plot.pdf");
    }

    #[test]
    fn test_generated_worker_id() {
        let config = WorkerConfig::default();
        let a = config.generate_worker_id();
        let b = config.generate_worker_id();
        assert_ne!(a, b);
        assert!(a.contains(&std::process::id().to_string()));

        let fixed = WorkerConfig {
            worker_id: Some("worker-7".to_string()),
            ..WorkerConfig::default()
        };
        assert_eq!(fixed.generate_worker_id(), "worker-7");
    }
}
