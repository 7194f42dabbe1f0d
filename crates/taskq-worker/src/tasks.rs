//! Built-in task bodies.

use crate::config::ViolinConfig;
use crate::handler::{HandlerResult, RegistryError, TaskHandler, TaskRegistry};
use async_trait::async_trait;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use taskq_core::{tasks, FailureKind, TaskFailure};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// `add(x, y)`
pub struct AddTask;

#[async_trait]
impl TaskHandler for AddTask {
    fn params(&self) -> &'static [&'static str] {
        tasks::ADD_PARAMS
    }

    async fn execute(&self, args: Vec<u8>) -> HandlerResult {
        let (x, y) = tasks::decode_add_args(&args)?;
        encode(&tasks::add(&x, &y)?)
    }
}

/// `run_violin(path)`
pub struct RunViolinTask {
    config: ViolinConfig,
}

impl RunViolinTask {
    pub fn new(config: ViolinConfig) -> Self {
        RunViolinTask { config }
    }
}

#[async_trait]
impl TaskHandler for RunViolinTask {
    fn params(&self) -> &'static [&'static str] {
        tasks::RUN_VIOLIN_PARAMS
    }

    async fn execute(&self, args: Vec<u8>) -> HandlerResult {
        let dir = tasks::decode_violin_args(&args)?;
        let output = run_violin(&dir, &self.config).await?;
        encode(&output.to_string_lossy())
    }
}

/// Registry holding `add` and `run_violin`
pub fn builtin_registry(violin: ViolinConfig) -> Result<TaskRegistry, RegistryError> {
    let registry = TaskRegistry::new();
    registry.register(tasks::ADD, AddTask)?;
    registry.register(tasks::RUN_VIOLIN, RunViolinTask::new(violin))?;
    Ok(registry)
}

/// Run the configured script inside `dir` and return `dir` joined with the
/// output file name, exactly as the caller spelled `dir`.
///
/// The child process gets `dir` as its working directory; the calling
/// process's working directory is never touched.
pub async fn run_violin(dir: &Path, config: &ViolinConfig) -> Result<PathBuf, TaskFailure> {
    // Resolve symlinks and relative parts for the checks only
    let resolved = match tokio::fs::canonicalize(dir).await {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(TaskFailure::not_found(format!(
                "directory {} does not exist",
                dir.display()
            )))
        }
        Err(e) => {
            return Err(TaskFailure::new(
                FailureKind::Environment,
                format!("cannot resolve {}: {}", dir.display(), e),
            ))
        }
    };

    if !is_dir(&resolved).await {
        return Err(TaskFailure::not_found(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let script = resolved.join(&config.script);
    if !is_file(&script).await {
        return Err(TaskFailure::not_found(format!(
            "{} not found in {}",
            config.script,
            dir.display()
        )));
    }

    info!("Running {} {} in {}", config.command, config.script, dir.display());

    let output = Command::new(&config.command)
        .arg(&config.script)
        .current_dir(&resolved)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| {
            TaskFailure::external_process(
                format!("failed to start {}: {}", config.command, e),
                None,
                "",
            )
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        warn!(
            "{} {} failed in {} (exit code {:?})",
            config.command,
            config.script,
            dir.display(),
            output.status.code()
        );
        return Err(TaskFailure::external_process(
            format!("{} {} exited with {}", config.command, config.script, output.status),
            output.status.code(),
            stderr,
        ));
    }
    if !stderr.is_empty() {
        debug!("{} stderr: {}", config.script, stderr);
    }

    // Check the output
    if !is_file(&resolved.join(&config.output)).await {
        return Err(TaskFailure::new(
            FailureKind::OutputMissing,
            format!(
                "{} exited successfully but {} was not created",
                config.script,
                config.output
            ),
        ));
    }

    Ok(dir.join(&config.output))
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

fn encode<T: Serialize + ?Sized>(value: &T) -> HandlerResult {
    serde_json::to_vec(value).map_err(|e| {
        TaskFailure::new(
            FailureKind::Environment,
            format!("failed to encode result: {}", e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn shell_config() -> ViolinConfig {
        ViolinConfig {
            command: "sh".to_string(),
            ..ViolinConfig::default()
        }
    }

    fn dir_with_script(body: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(tasks::VIOLIN_SCRIPT), body).unwrap();
        dir
    }

    fn canonical(dir: &TempDir) -> PathBuf {
        std::fs::canonicalize(dir.path()).unwrap()
    }

    #[tokio::test]
    async fn test_add_task() {
        let out = AddTask.execute(b"[2, 3]".to_vec()).await.unwrap();
        assert_eq!(out, b"5");

        let err = AddTask.execute(b"[2]".to_vec()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Argument);
    }

    #[tokio::test]
    async fn test_run_violin_returns_output_path() {
        let dir = dir_with_script("echo plot > violin_plot.pdf\n");
        let cwd_before = std::env::current_dir().unwrap();

        let output = run_violin(dir.path(), &shell_config()).await.unwrap();

        assert_eq!(output, dir.path().join(tasks::VIOLIN_OUTPUT));
        assert!(output.exists());
        assert_eq!(std::env::current_dir().unwrap(), cwd_before);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_path_keeps_the_callers_spelling() {
        let target = dir_with_script("echo plot > violin_plot.pdf\n");
        let links = TempDir::new().unwrap();
        let linked = links.path().join("experiment1");
        std::os::unix::fs::symlink(target.path(), &linked).unwrap();

        let output = run_violin(&linked, &shell_config()).await.unwrap();
        assert_eq!(output, linked.join(tasks::VIOLIN_OUTPUT));
        assert!(output.exists());

        let dotted = linked.join("..").join("experiment1");
        let output = run_violin(&dotted, &shell_config()).await.unwrap();
        assert_eq!(output, dotted.join(tasks::VIOLIN_OUTPUT));
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_code_and_stderr() {
        let dir = dir_with_script("echo 'object not found' >&2\nexit 3\n");
        let cwd_before = std::env::current_dir().unwrap();

        let err = run_violin(dir.path(), &shell_config()).await.unwrap_err();

        assert_eq!(err.kind, FailureKind::ExternalProcess);
        assert_eq!(err.exit_code, Some(3));
        assert_eq!(err.stderr.as_deref(), Some("object not found"));
        assert_eq!(std::env::current_dir().unwrap(), cwd_before);
    }

    #[tokio::test]
    async fn test_missing_output_is_a_failure() {
        let dir = dir_with_script("true\n");
        let err = run_violin(dir.path(), &shell_config()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::OutputMissing);
    }

    #[tokio::test]
    async fn test_missing_directory_and_script() {
        let missing = Path::new("/nonexistent/taskq/experiment");
        let err = run_violin(missing, &shell_config()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::NotFound);

        let empty = TempDir::new().unwrap();
        let err = run_violin(empty.path(), &shell_config()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::NotFound);
        assert!(err.message.contains(tasks::VIOLIN_SCRIPT));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let dir = dir_with_script("echo plot > violin_plot.pdf\n");
        let config = ViolinConfig {
            command: "taskq-no-such-interpreter".to_string(),
            ..ViolinConfig::default()
        };

        let err = run_violin(dir.path(), &config).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::ExternalProcess);
        assert_eq!(err.exit_code, None);
    }

    #[tokio::test]
    async fn test_concurrent_calls_see_their_own_directory() {
        let script = "pwd -P > seen.txt\necho plot > violin_plot.pdf\n";
        let first = dir_with_script(script);
        let second = dir_with_script(script);
        let config = shell_config();

        let (a, b) = tokio::join!(
            run_violin(first.path(), &config),
            run_violin(second.path(), &config)
        );
        assert_eq!(a.unwrap(), first.path().join(tasks::VIOLIN_OUTPUT));
        assert_eq!(b.unwrap(), second.path().join(tasks::VIOLIN_OUTPUT));

        for dir in [&first, &second] {
            let seen = std::fs::read_to_string(dir.path().join("seen.txt")).unwrap();
            assert_eq!(PathBuf::from(seen.trim()), canonical(dir));
        }
    }

    #[tokio::test]
    async fn test_violin_task_encodes_path_as_json_string() {
        let dir = dir_with_script("echo plot > violin_plot.pdf\n");
        let args = serde_json::to_vec(&[dir.path().to_string_lossy()]).unwrap();

        let out = RunViolinTask::new(shell_config())
            .execute(args)
            .await
            .unwrap();
        let path: String = serde_json::from_slice(&out).unwrap();
        assert!(path.ends_with("violin_plot.pdf"));
    }

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry(ViolinConfig::default()).unwrap();
        assert_eq!(
            registry.task_names(),
            vec![tasks::ADD.to_string(), tasks::RUN_VIOLIN.to_string()]
        );
        assert_eq!(registry.get(tasks::ADD).unwrap().params(), tasks::ADD_PARAMS);
    }
}
