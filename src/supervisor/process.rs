use std::{
    fs::{self, OpenOptions},
    io,
    path::Path,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use tokio::process::{Child, Command};

use crate::config::{ProfileConfig, SupervisorConfig};

pub async fn spawn(
    config: &SupervisorConfig,
    name: &str,
    profile: &ProfileConfig,
) -> io::Result<Child> {
    let program = profile.program.as_deref().unwrap_or(&config.program);

    let logs = match &config.log_dir {
        Some(dir) => {
            let (dir, name) = (dir.clone(), name.to_string());
            let opened = tokio::task::spawn_blocking(move || open_logs(&dir, &name))
                .await
                .map_err(io::Error::other)??;
            Some(opened)
        }
        None => None,
    };

    let mut command = Command::new(program);
    if let Some(config_file) = &profile.config_file {
        command.arg(format!("--config_file={}", config_file.display()));
    }
    command
        .args(&profile.args)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    match logs {
        Some((stdout, stderr)) => {
            command.stdout(stdout).stderr(stderr);
        }
        None => {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }

    log::info!("Launching profile {}: {} {:?}", name, program, profile.args);

    let child = command.spawn()?;

    log::info!("Profile {} spawned (PID: {:?})", name, child.id());

    Ok(child)
}

fn open_logs(dir: &Path, name: &str) -> io::Result<(Stdio, Stdio)> {
    fs::create_dir_all(dir)?;

    let stdout_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dir.join(format!("{}_stdout.log", name)))?;

    let stderr_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dir.join(format!("{}_stderr.log", name)))?;

    Ok((Stdio::from(stdout_file), Stdio::from(stderr_file)))
}

/// Asks the child to exit and waits up to `grace` before killing it.
pub async fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    request_exit(child);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            log::warn!(
                "PID {:?} still alive after {:?}, killing",
                child.id(),
                grace
            );
            child.kill().await?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: kill(2) has no memory-safety preconditions; the pid belongs
        // to a child we have not reaped yet.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            log::warn!(
                "SIGTERM to PID {} failed: {}",
                pid,
                io::Error::last_os_error()
            );
        }
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        log::warn!("Failed to signal PID {:?}: {}", child.id(), e);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn config(log_dir: &Path) -> SupervisorConfig {
        SupervisorConfig {
            program: "gnss-sdr".to_string(),
            stop_timeout: Duration::from_millis(500),
            log_dir: Some(log_dir.to_path_buf()),
            profiles: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn output_goes_to_profile_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let log_dir = tmp.path().join("runs").join("today");
        let profile = ProfileConfig {
            program: Some("sh".to_string()),
            args: vec!["-c".to_string(), "echo fix; echo lost >&2".to_string()],
            ..ProfileConfig::default()
        };

        let mut child = spawn(&config(&log_dir), "conf1", &profile).await.unwrap();
        assert!(child.wait().await.unwrap().success());

        let stdout = fs::read_to_string(log_dir.join("conf1_stdout.log")).unwrap();
        let stderr = fs::read_to_string(log_dir.join("conf1_stderr.log")).unwrap();
        assert_eq!(stdout, "fix\n");
        assert_eq!(stderr, "lost\n");
    }

    #[tokio::test]
    async fn unusable_log_dir_fails_the_launch() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        fs::write(&file, b"").unwrap();
        let profile = ProfileConfig {
            program: Some("true".to_string()),
            ..ProfileConfig::default()
        };

        assert!(spawn(&config(&file.join("logs")), "conf1", &profile)
            .await
            .is_err());
    }
}
