use std::io;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use tokio::process::Child;
use tokio::sync::{oneshot, watch};

use super::error::SupervisorError;
use super::process;
use super::types::{ControlResult, ExitDetail, ProcessState, ProcessStatus};
use crate::config::SupervisorConfig;

#[derive(Debug)]
struct Inner {
    status: ProcessStatus,
    /// Bumped on every launch so a late exit report from an older child is
    /// ignored.
    run_id: u64,
    stop_requested: bool,
    terminate: Option<oneshot::Sender<()>>,
    /// Pending `stop()` calls for the current run, answered when it settles.
    stop_waiters: Vec<oneshot::Sender<ProcessStatus>>,
}

/// Owns the lifecycle of the external receiver process.
///
/// Every transition happens under one lock. Exit observation runs in a
/// background task per launch and reports back through [`Supervisor::on_exit`].
pub struct Supervisor {
    config: SupervisorConfig,
    inner: StdMutex<Inner>,
    status_tx: watch::Sender<ProcessStatus>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ProcessStatus::default());
        Arc::new(Self {
            config,
            inner: StdMutex::new(Inner {
                status: ProcessStatus::default(),
                run_id: 0,
                stop_requested: false,
                terminate: None,
                stop_waiters: Vec::new(),
            }),
            status_tx,
        })
    }

    pub fn profiles(&self) -> impl Iterator<Item = &str> {
        self.config.profiles.keys().map(String::as_str)
    }

    pub fn status(&self) -> ProcessStatus {
        self.status_tx.borrow().clone()
    }

    /// Receives every status change.
    pub fn subscribe(&self) -> watch::Receiver<ProcessStatus> {
        self.status_tx.subscribe()
    }

    /// Launches `profile` and returns once the process is running or the
    /// launch has failed.
    pub async fn start(self: &Arc<Self>, profile: &str) -> ControlResult {
        let result = self.try_start(profile).await;
        self.control_result(result)
    }

    /// Stops the running process and waits until its exit is confirmed.
    /// The returned status is the one the stopped run settled in.
    pub async fn stop(&self) -> ControlResult {
        let (message, status) = self.try_stop().await;
        ControlResult {
            ok: true,
            error: None,
            message,
            status,
        }
    }

    async fn try_start(self: &Arc<Self>, name: &str) -> Result<String, SupervisorError> {
        let profile = self
            .config
            .profiles
            .get(name)
            .ok_or_else(|| SupervisorError::UnknownProfile(name.to_string()))?;

        let run_id = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.status.state.is_idle() {
                return Err(SupervisorError::Busy(inner.status.state));
            }
            inner.run_id += 1;
            inner.stop_requested = false;
            inner.terminate = None;
            inner.stop_waiters.clear();
            let last_exit = inner.status.last_exit.take();
            inner.status = ProcessStatus {
                state: ProcessState::Starting,
                profile: Some(name.to_string()),
                pid: None,
                started_at: None,
                last_exit,
                message: format!("starting profile {}", name),
            };
            self.publish(&inner);
            inner.run_id
        };

        // Spawning happens outside the lock so status() and stop() stay
        // responsive; the Starting state keeps other launches out.
        let spawned = process::spawn(&self.config, name, profile).await;

        let mut inner = self.inner.lock().unwrap();
        let child = match spawned {
            Ok(child) => child,
            Err(source) => {
                log::error!("Failed to launch profile {}: {}", name, source);
                inner.status.message = format!("failed to launch profile {}: {}", name, source);
                if inner.stop_requested {
                    // A stop queued during the launch leaves nothing to fail.
                    inner.status.state = ProcessState::Stopped;
                    inner.status.profile = None;
                } else {
                    inner.status.state = ProcessState::Failed;
                }
                self.settle(&mut inner);
                return Err(SupervisorError::Spawn {
                    profile: name.to_string(),
                    source,
                });
            }
        };

        let (terminate_tx, terminate_rx) = oneshot::channel();
        inner.status.state = ProcessState::Running;
        inner.status.pid = child.id();
        inner.status.started_at = Some(Utc::now());
        inner.status.message = format!("running profile {}", name);
        inner.terminate = Some(terminate_tx);

        if inner.stop_requested {
            log::info!("Stop was requested while {} was starting", name);
            inner.status.state = ProcessState::Stopping;
            inner.status.message = format!("stopping profile {}", name);
            if let Some(tx) = inner.terminate.take() {
                let _ = tx.send(());
            }
        }

        let message = inner.status.message.clone();
        self.publish(&inner);
        drop(inner);

        let supervisor = self.clone();
        let grace = self.config.stop_timeout;
        tokio::spawn(async move {
            let exit = observe(child, terminate_rx, grace).await;
            supervisor.on_exit(run_id, exit);
        });

        Ok(message)
    }

    async fn try_stop(&self) -> (String, ProcessStatus) {
        let settled = {
            let mut inner = self.inner.lock().unwrap();
            match inner.status.state {
                ProcessState::Stopped => {
                    return ("already stopped".to_string(), inner.status.clone());
                }
                ProcessState::Failed => {
                    inner.status.state = ProcessState::Stopped;
                    inner.status.profile = None;
                    inner.status.message = "cleared failed state".to_string();
                    self.publish(&inner);
                    return (inner.status.message.clone(), inner.status.clone());
                }
                ProcessState::Starting => {
                    // Picked up by try_start once the spawn resolves.
                    inner.stop_requested = true;
                }
                ProcessState::Running => {
                    inner.stop_requested = true;
                    inner.status.state = ProcessState::Stopping;
                    inner.status.message = match &inner.status.profile {
                        Some(p) => format!("stopping profile {}", p),
                        None => "stopping".to_string(),
                    };
                    if let Some(tx) = inner.terminate.take() {
                        let _ = tx.send(());
                    }
                    self.publish(&inner);
                }
                ProcessState::Stopping => {}
            }
            let (tx, rx) = oneshot::channel();
            inner.stop_waiters.push(tx);
            rx
        };

        match settled.await {
            Ok(status) => (status.message.clone(), status),
            Err(_) => {
                let status = self.status();
                (status.message.clone(), status)
            }
        }
    }

    fn on_exit(&self, run_id: u64, exit: io::Result<ExitStatus>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.run_id != run_id {
            return;
        }

        let detail = match &exit {
            Ok(status) => ExitDetail::from_status(status),
            Err(e) => {
                log::error!("Waiting on supervised process failed: {}", e);
                ExitDetail::unknown()
            }
        };
        let profile = inner.status.profile.clone().unwrap_or_default();

        inner.terminate = None;
        inner.status.pid = None;
        if inner.stop_requested {
            log::info!("Profile {} stopped ({})", profile, detail);
            inner.status.state = ProcessState::Stopped;
            inner.status.message = format!("stopped profile {} ({})", profile, detail);
            inner.status.profile = None;
        } else {
            log::error!("Profile {} exited unexpectedly ({})", profile, detail);
            inner.status.state = ProcessState::Failed;
            inner.status.message = format!("profile {} exited unexpectedly ({})", profile, detail);
        }
        inner.status.last_exit = Some(detail);
        self.settle(&mut inner);
    }

    fn publish(&self, inner: &Inner) {
        self.status_tx.send_replace(inner.status.clone());
    }

    /// Publishes the idle state a run ended in and answers its stop waiters.
    fn settle(&self, inner: &mut Inner) {
        self.publish(inner);
        for waiter in inner.stop_waiters.drain(..) {
            let _ = waiter.send(inner.status.clone());
        }
    }

    fn control_result(&self, result: Result<String, SupervisorError>) -> ControlResult {
        let status = self.status();
        match result {
            Ok(message) => ControlResult {
                ok: true,
                error: None,
                message,
                status,
            },
            Err(e) => ControlResult {
                ok: false,
                error: Some(e.code().to_string()),
                message: e.to_string(),
                status,
            },
        }
    }
}

async fn observe(
    mut child: Child,
    terminate_rx: oneshot::Receiver<()>,
    grace: Duration,
) -> io::Result<ExitStatus> {
    tokio::select! {
        status = child.wait() => status,
        _ = terminate_rx => process::terminate(&mut child, grace).await,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ProfileConfig;
    use std::collections::BTreeMap;
    use std::path::Path;

    fn shell(script: &str) -> ProfileConfig {
        ProfileConfig {
            config_file: None,
            program: Some("sh".to_string()),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    fn supervisor(profiles: &[(&str, ProfileConfig)]) -> Arc<Supervisor> {
        supervisor_logging_to(None, profiles)
    }

    /// With a log directory, launches yield to the runtime while the log
    /// files are opened, so the supervisor is observable in `Starting`.
    fn supervisor_logging_to(
        log_dir: Option<&Path>,
        profiles: &[(&str, ProfileConfig)],
    ) -> Arc<Supervisor> {
        Supervisor::new(SupervisorConfig {
            program: "gnss-sdr".to_string(),
            stop_timeout: Duration::from_millis(500),
            log_dir: log_dir.map(Path::to_path_buf),
            profiles: profiles
                .iter()
                .map(|(name, p)| (name.to_string(), p.clone()))
                .collect::<BTreeMap<_, _>>(),
        })
    }

    async fn settle(sup: &Supervisor, state: ProcessState) -> ProcessStatus {
        let mut rx = sup.subscribe();
        let status = tokio::time::timeout(
            Duration::from_secs(10),
            rx.wait_for(|s| s.state == state),
        )
        .await
        .expect("timed out waiting for state")
        .expect("status channel closed")
        .clone();
        status
    }

    #[tokio::test]
    async fn starts_in_stopped_state() {
        let sup = supervisor(&[]);
        let status = sup.status();
        assert_eq!(status.state, ProcessState::Stopped);
        assert!(status.profile.is_none());
    }

    #[tokio::test]
    async fn unsolicited_exit_is_recorded_as_failure() {
        let sup = supervisor(&[("conf1", shell("sleep 0.3; exit 1"))]);

        let result = sup.start("conf1").await;
        assert!(result.ok, "{}", result.message);
        assert_eq!(result.status.state, ProcessState::Running);
        assert_eq!(result.status.profile.as_deref(), Some("conf1"));
        assert!(result.status.pid.is_some());

        let status = settle(&sup, ProcessState::Failed).await;
        assert_eq!(status.last_exit.as_ref().and_then(|e| e.code), Some(1));
        assert_eq!(status.profile.as_deref(), Some("conf1"));
    }

    #[tokio::test]
    async fn start_while_running_is_busy() {
        let sup = supervisor(&[("conf1", shell("sleep 30")), ("conf2", shell("sleep 30"))]);

        assert!(sup.start("conf1").await.ok);
        let second = sup.start("conf2").await;
        assert!(!second.ok);
        assert_eq!(second.error.as_deref(), Some("busy"));
        assert_eq!(second.status.profile.as_deref(), Some("conf1"));

        assert!(sup.stop().await.ok);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_launch_exactly_one_process() {
        let sup = supervisor(&[("conf1", shell("sleep 30")), ("conf2", shell("sleep 30"))]);

        let a = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.start("conf1").await })
        };
        let b = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.start("conf2").await })
        };
        let (a, b) = (a.await.unwrap(), b.await.unwrap());

        assert_eq!([a.ok, b.ok].iter().filter(|ok| **ok).count(), 1);
        let rejected = if a.ok { &b } else { &a };
        assert_eq!(rejected.error.as_deref(), Some("busy"));
        assert_eq!(sup.status().state, ProcessState::Running);

        assert!(sup.stop().await.ok);
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let sup = supervisor(&[("conf1", shell("sleep 30"))]);
        assert!(sup.start("conf1").await.ok);

        let first = sup.stop().await;
        assert!(first.ok);
        assert_eq!(first.status.state, ProcessState::Stopped);
        assert!(first.status.last_exit.is_some());

        let second = sup.stop().await;
        assert!(second.ok);
        assert_eq!(second.status.state, ProcessState::Stopped);
    }

    #[tokio::test]
    async fn stop_kills_a_process_that_ignores_sigterm() {
        let sup = supervisor(&[("stubborn", shell("trap '' TERM; exec sleep 30"))]);
        assert!(sup.start("stubborn").await.ok);
        // Give the shell time to install the trap before signalling.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let result = sup.stop().await;
        assert!(result.ok);
        assert_eq!(result.status.state, ProcessState::Stopped);
        assert_eq!(
            result.status.last_exit.as_ref().and_then(|e| e.signal),
            Some(libc::SIGKILL)
        );
    }

    #[tokio::test]
    async fn unknown_profile_changes_nothing() {
        let sup = supervisor(&[("conf1", shell("sleep 30"))]);
        let result = sup.start("conf9").await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("unknown_profile"));
        assert_eq!(result.status.state, ProcessState::Stopped);
    }

    #[tokio::test]
    async fn spawn_failure_moves_to_failed_and_allows_retry() {
        let broken = ProfileConfig {
            program: Some("/nonexistent/gnss-sdr".to_string()),
            ..ProfileConfig::default()
        };
        let sup = supervisor(&[("broken", broken), ("conf1", shell("sleep 30"))]);

        let result = sup.start("broken").await;
        assert!(!result.ok);
        assert_eq!(result.error.as_deref(), Some("spawn_failed"));
        assert_eq!(result.status.state, ProcessState::Failed);

        assert!(sup.start("conf1").await.ok);
        assert!(sup.stop().await.ok);
    }

    #[tokio::test]
    async fn stop_after_failure_clears_it() {
        let sup = supervisor(&[("conf1", shell("exit 3"))]);
        assert!(sup.start("conf1").await.ok);
        settle(&sup, ProcessState::Failed).await;

        let result = sup.stop().await;
        assert!(result.ok);
        assert_eq!(result.status.state, ProcessState::Stopped);
        assert_eq!(
            result.status.last_exit.as_ref().and_then(|e| e.code),
            Some(3)
        );
    }

    #[tokio::test]
    async fn stop_while_starting_takes_effect_once_running() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor_logging_to(Some(dir.path()), &[("conf1", shell("sleep 30"))]);

        let launch = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.start("conf1").await })
        };
        settle(&sup, ProcessState::Starting).await;

        let stopped = tokio::time::timeout(Duration::from_secs(10), sup.stop())
            .await
            .expect("stop() did not return");
        assert!(stopped.ok);
        assert_eq!(stopped.status.state, ProcessState::Stopped);
        assert!(stopped.status.last_exit.is_some());

        let started = launch.await.unwrap();
        assert!(started.ok, "{}", started.message);
        assert_eq!(started.message, "stopping profile conf1");
        assert_eq!(sup.status().state, ProcessState::Stopped);
    }

    #[tokio::test]
    async fn spawn_failure_with_a_queued_stop_ends_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let broken = ProfileConfig {
            program: Some("/nonexistent/gnss-sdr".to_string()),
            ..ProfileConfig::default()
        };
        let sup = supervisor_logging_to(
            Some(dir.path()),
            &[("broken", broken), ("conf1", shell("sleep 30"))],
        );

        let launch = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.start("broken").await })
        };
        settle(&sup, ProcessState::Starting).await;

        let stopped = tokio::time::timeout(Duration::from_secs(10), sup.stop())
            .await
            .expect("stop() did not return");
        assert!(stopped.ok);
        assert_eq!(stopped.status.state, ProcessState::Stopped);
        assert!(stopped.message.contains("failed to launch profile broken"));

        let started = launch.await.unwrap();
        assert!(!started.ok);
        assert_eq!(started.error.as_deref(), Some("spawn_failed"));
        assert_eq!(started.status.state, ProcessState::Stopped);

        assert!(sup.start("conf1").await.ok);
        assert!(sup.stop().await.ok);
    }

    #[tokio::test]
    async fn pending_stop_completes_when_a_new_run_starts_first() {
        let sup = supervisor(&[("conf1", shell("sleep 30"))]);
        assert!(sup.start("conf1").await.ok);

        let mut stopping = Box::pin(sup.stop());
        assert!(futures::poll!(&mut stopping).is_pending());
        settle(&sup, ProcessState::Stopped).await;
        // The next run is already up before the first stop() is polled again.
        assert!(sup.start("conf1").await.ok);

        let stopped = tokio::time::timeout(Duration::from_secs(3), stopping)
            .await
            .expect("stop() missed the end of its run");
        assert!(stopped.ok);
        assert_eq!(stopped.status.state, ProcessState::Stopped);
        assert_eq!(sup.status().state, ProcessState::Running);

        assert!(sup.stop().await.ok);
    }

    #[tokio::test]
    async fn config_file_is_passed_to_the_program() {
        let dir = tempfile::tempdir().unwrap();
        let profile = ProfileConfig {
            config_file: Some("conf/leo.conf".into()),
            program: Some("echo".to_string()),
            args: vec!["--log_dir=/tmp".to_string()],
        };
        let sup = Supervisor::new(SupervisorConfig {
            program: "gnss-sdr".to_string(),
            stop_timeout: Duration::from_millis(500),
            log_dir: Some(dir.path().to_path_buf()),
            profiles: [("conf3".to_string(), profile)].into_iter().collect(),
        });

        assert!(sup.start("conf3").await.ok);
        // echo returns on its own, which counts as an unsolicited exit.
        let status = settle(&sup, ProcessState::Failed).await;
        assert_eq!(status.last_exit.as_ref().and_then(|e| e.code), Some(0));

        let stdout = std::fs::read_to_string(dir.path().join("conf3_stdout.log")).unwrap();
        assert_eq!(stdout.trim(), "--config_file=conf/leo.conf --log_dir=/tmp");
    }
}
