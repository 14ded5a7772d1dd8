//! Worker process lifecycle: spawn, liveness, termination, reaping.
//!
//! The launcher never owns a running worker's handle; the handle lives on the
//! [`WorkerInstance`] it belongs to. Only handles that were asked to terminate
//! move into the launcher, which reaps them without blocking and escalates to
//! SIGKILL when a worker ignores SIGTERM for too long.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use super::log_rotation::log_file;
use super::types::{LaunchInfo, LogRotationConfig};
use crate::constants::DEFAULT_KILL_AFTER_SECS;
use crate::error::{Error, Result};
use crate::manifest::SupervisorSettings;
use crate::plan::WorkerInstance;

/// A terminated worker that has not been reaped yet.
#[derive(Debug)]
struct Draining {
    instance: String,
    child: Child,
    since: Instant,
    killed: bool,
}

/// Starts, inspects and terminates worker processes.
#[derive(Debug)]
pub struct ProcessLauncher {
    default_interpreter: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    rotation: LogRotationConfig,
    kill_after: Duration,
    draining: Vec<Draining>,
}

impl ProcessLauncher {
    pub fn new(settings: &SupervisorSettings) -> Self {
        Self {
            default_interpreter: settings.interpreter.clone(),
            log_dir: settings.log_dir.clone(),
            rotation: LogRotationConfig::from(settings),
            kill_after: Duration::from_secs(DEFAULT_KILL_AFTER_SECS),
            draining: Vec::new(),
        }
    }

    /// Override the delay before a draining worker is force-killed.
    #[must_use]
    pub const fn with_kill_after(mut self, kill_after: Duration) -> Self {
        self.kill_after = kill_after;
        self
    }

    /// Number of terminated workers still waiting to be reaped.
    pub fn draining(&self) -> usize {
        self.draining.len()
    }

    /// Start a fresh process for `worker`.
    ///
    /// A handle still held by the instance is terminated first. On success
    /// the new handle and pid are recorded on the instance. On failure the
    /// instance is left without a handle; the caller logs the error and moves
    /// on to the next worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Launch`] if the log file cannot be prepared or the
    /// process cannot be spawned (missing executable, resource exhaustion).
    pub fn launch(&mut self, worker: &mut WorkerInstance) -> Result<LaunchInfo> {
        if worker.process.is_some()
            && let Err(e) = self.terminate(worker)
        {
            tracing::warn!(instance = %worker.id, error = %e, "Stale handle not terminated cleanly");
        }

        let mut config = worker.launch_config(self.default_interpreter.as_deref());
        config.script = std::path::absolute(&config.script)
            .map_err(|e| Error::launch(&config.instance_id, e))?;
        let working_dir = config
            .script
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);
        let (program, args) = config.program();

        let mut cmd = Command::new(&program);
        cmd.args(&args).envs(config.env_vars()).stdin(Stdio::null());
        if let Some(dir) = &working_dir {
            cmd.current_dir(dir);
        }

        let log_path = match &self.log_dir {
            Some(dir) => {
                let (stdout, stderr, path) = self
                    .open_log(dir, &config.instance_id)
                    .map_err(|e| Error::launch(&config.instance_id, e))?;
                cmd.stdout(stdout).stderr(stderr);
                Some(path)
            },
            None => None,
        };

        // Own process group: a Ctrl-C in the supervisor's terminal must not
        // reach the workers before the shutdown sweep does.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let child = cmd.spawn().map_err(|e| {
            Error::launch(
                &config.instance_id,
                format!("{}: {e}", program.display()),
            )
        })?;
        let pid = child.id();

        worker.process = Some(child);
        worker.pid = Some(pid);

        tracing::info!(
            instance = %config.instance_id,
            name = %config.instance_name,
            port = config.port,
            pid,
            "Launched worker"
        );

        Ok(LaunchInfo { pid, log_path })
    }

    fn open_log(
        &self,
        dir: &Path,
        instance_id: &str,
    ) -> Result<(fs::File, fs::File, PathBuf)> {
        fs::create_dir_all(dir)
            .map_err(|e| Error::io(format!("creating log dir {}", dir.display()), e))?;

        self.rotation.rotate(dir, instance_id)?;
        let path = log_file(dir, instance_id);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io(format!("opening worker log {}", path.display()), e))?;
        let stderr = file
            .try_clone()
            .map_err(|e| Error::io("duplicating worker log handle", e))?;

        Ok((file, stderr, path))
    }

    /// Non-blocking liveness check. An instance without a handle is not alive.
    pub fn is_alive(&self, worker: &mut WorkerInstance) -> bool {
        let Some(child) = worker.process.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::debug!(instance = %worker.id, %status, "Worker has exited");
                false
            },
            Err(e) => {
                tracing::warn!(instance = %worker.id, error = %e, "Liveness check failed");
                false
            },
        }
    }

    /// Ask the worker to stop and hand its handle over for reaping.
    ///
    /// On Unix the signal goes to the worker's whole process group, so a
    /// wrapper script that does not `exec` its server takes the server down
    /// with it.
    ///
    /// Idempotent: an instance without a handle, a process that has already
    /// exited, and a pid that no longer exists all return `Ok(())`. Does not
    /// wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Terminate`] if the signal could not be delivered for
    /// another reason (e.g., permissions). The handle is still kept for
    /// reaping.
    pub fn terminate(&mut self, worker: &mut WorkerInstance) -> Result<()> {
        let Some(mut child) = worker.process.take() else {
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            tracing::debug!(instance = %worker.id, %status, "Worker already exited");
            // Anything the worker left behind in its group goes too.
            if let Err(reason) = signal_group(&mut child, GroupSignal::Term) {
                tracing::debug!(instance = %worker.id, %reason, "Group cleanup failed");
            }
            return Ok(());
        }

        let result = signal_group(&mut child, GroupSignal::Term)
            .map_err(|reason| Error::terminate(&worker.id, reason));
        if result.is_ok() {
            tracing::info!(instance = %worker.id, pid = child.id(), "Sent termination signal");
        }

        self.draining.push(Draining {
            instance: worker.id.clone(),
            child,
            since: Instant::now(),
            killed: false,
        });
        result
    }

    /// Collect exited workers; force-kill the ones past the kill deadline.
    pub fn reap(&mut self) {
        let kill_after = self.kill_after;
        self.draining.retain_mut(|d| match d.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(instance = %d.instance, %status, "Reaped worker");
                false
            },
            Ok(None) => {
                if !d.killed && d.since.elapsed() >= kill_after {
                    tracing::warn!(
                        instance = %d.instance,
                        pid = d.child.id(),
                        "Worker ignored termination, killing"
                    );
                    if let Err(reason) = signal_group(&mut d.child, GroupSignal::Kill) {
                        tracing::warn!(instance = %d.instance, %reason, "Kill failed");
                    }
                    d.killed = true;
                }
                true
            },
            Err(e) => {
                tracing::warn!(instance = %d.instance, error = %e, "Failed to reap worker");
                false
            },
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Term,
    Kill,
}

/// Signal the process group led by `child`. A group that no longer exists
/// counts as delivered.
#[cfg(unix)]
fn signal_group(child: &mut Child, which: GroupSignal) -> std::result::Result<(), String> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let signal = match which {
        GroupSignal::Term => Signal::SIGTERM,
        GroupSignal::Kill => Signal::SIGKILL,
    };
    // Workers are spawned with `process_group(0)`: pgid == pid.
    let pgid = i32::try_from(child.id()).map_err(|e| e.to_string())?;
    match killpg(Pid::from_raw(pgid), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _which: GroupSignal) -> std::result::Result<(), String> {
    match child.kill() {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}
