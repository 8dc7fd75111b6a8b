//! Instance supervision.
//!
//! Single mode resolves one configuration source and blocks on its instance.
//! Directory mode runs one instance per regular file found under a directory,
//! concurrently, and waits for all of them; a failing or panicking instance
//! never takes its siblings down.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::config::{ClientCommonConfig, ConfigSource};
use crate::error::LauncherError;
use crate::logging;
use crate::resolver::Resolver;
use crate::tunnel::{LifecycleController, ServiceFactory, TriggerFactory};

/// Pause between two directory-mode spawns.
pub const SPAWN_STAGGER: Duration = Duration::from_millis(1);

/// A directory-mode instance that did not finish cleanly.
#[derive(Debug)]
pub struct WorkerFailure {
    pub path: PathBuf,
    pub error: LauncherError,
}

/// Outcome of a directory-mode run.
#[derive(Debug, Default)]
pub struct DirectoryReport {
    /// Number of configuration files an instance was started for
    pub attempted: usize,
    /// Failures in completion order
    pub failures: Vec<WorkerFailure>,
}

impl DirectoryReport {
    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Collapse into the first failure, if any.
    pub fn into_result(self) -> Result<(), LauncherError> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure.error),
            None => Ok(()),
        }
    }
}

/// Resolves configuration sources and runs their instances.
#[derive(Clone)]
pub struct Supervisor {
    resolver: Arc<Resolver>,
    factory: Arc<dyn ServiceFactory>,
    shutdown_trigger: Option<TriggerFactory>,
    stagger: Duration,
    log_guard: Arc<OnceLock<WorkerGuard>>,
}

impl Supervisor {
    pub fn new(resolver: Resolver, factory: Arc<dyn ServiceFactory>) -> Self {
        Supervisor {
            resolver: Arc::new(resolver),
            factory,
            shutdown_trigger: None,
            stagger: SPAWN_STAGGER,
            log_guard: Arc::new(OnceLock::new()),
        }
    }

    /// Replace the OS termination signal for every instance.
    pub fn with_shutdown_trigger(mut self, trigger: TriggerFactory) -> Self {
        self.shutdown_trigger = Some(trigger);
        self
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = stagger;
        self
    }

    /// Run one configuration source to completion.
    pub async fn run_single(&self, source: ConfigSource) -> Result<(), LauncherError> {
        self.launch(source).await
    }

    /// Run every regular file under `dir` concurrently and wait for all of them.
    ///
    /// Only a failure to read `dir` itself is returned as an error; per-file
    /// failures are collected in the report.
    pub async fn run_directory(&self, dir: &Path) -> Result<DirectoryReport, LauncherError> {
        let files = collect_config_files(dir).await?;
        if files.is_empty() {
            warn!(dir = %dir.display(), "No config files found");
        } else {
            info!(
                dir = %dir.display(),
                count = files.len(),
                "Starting services for config directory"
            );
        }

        let mut report = DirectoryReport {
            attempted: files.len(),
            failures: Vec::new(),
        };

        let mut workers = JoinSet::new();
        for path in files {
            let supervisor = self.clone();
            workers.spawn(async move {
                let source_id = path.display().to_string();
                let launch = supervisor.launch(ConfigSource::Local(path.clone()));
                let result = match AssertUnwindSafe(launch).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(LauncherError::Worker {
                        source_id,
                        message: panic_message(panic.as_ref()),
                    }),
                };
                (path, result)
            });
            tokio::time::sleep(self.stagger).await;
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((path, Err(error))) => {
                    error!(
                        path = %path.display(),
                        error = %error,
                        "Service for config file failed"
                    );
                    report.failures.push(WorkerFailure { path, error });
                }
                Err(join_error) => {
                    error!(error = %join_error, "Config file worker did not complete");
                    report.failures.push(WorkerFailure {
                        path: PathBuf::new(),
                        error: LauncherError::Worker {
                            source_id: String::new(),
                            message: join_error.to_string(),
                        },
                    });
                }
            }
        }

        info!(
            attempted = report.attempted,
            failed = report.failures.len(),
            "All services for config directory stopped"
        );
        Ok(report)
    }

    async fn launch(&self, source: ConfigSource) -> Result<(), LauncherError> {
        let ctx = self.resolver.resolve(&source).await?;
        self.init_logging(&ctx.common);

        if self.resolver.options().remove_after_use {
            if let Some(path) = source.local_path() {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => {
                        warn!(path = %path.display(), "Removed config file after reading it")
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Failed to remove config file")
                    }
                }
            }
        }

        let mut controller = LifecycleController::new(ctx, self.factory.clone());
        if let Some(trigger) = &self.shutdown_trigger {
            controller = controller.with_shutdown_trigger(trigger.clone());
        }

        controller.run().await.map_err(|error| LauncherError::Startup {
            source_id: source.to_string(),
            error,
        })
    }

    /// The first resolved configuration decides the process-wide log setup.
    fn init_logging(&self, common: &ClientCommonConfig) {
        if let Some(guard) = logging::init_logging_from_config(common) {
            let _ = self.log_guard.set(guard);
        }
    }
}

/// Regular files under `root`, recursively, in sorted order.
///
/// Symlinks to files are followed. Symlinks to directories are not descended
/// into, so a link cycle cannot make the walk revisit a directory.
async fn collect_config_files(root: &Path) -> Result<Vec<PathBuf>, LauncherError> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if dir.as_path() == root => {
                return Err(LauncherError::Io { path: dir, error });
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Failed to list directory");
                    break;
                }
            };

            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                files.push(path);
            } else if file_type.is_symlink() {
                match tokio::fs::metadata(&path).await {
                    Ok(meta) if meta.is_file() => files.push(path),
                    Ok(meta) if meta.is_dir() => {
                        debug!(path = %path.display(), "Not following directory symlink")
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping broken symlink")
                    }
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
