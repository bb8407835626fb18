//! Background process supervision: PID file, log file, signals.
//!
//! Liveness is always checked with `kill(pid, 0)`; a PID file whose process is
//! gone is stale and gets removed.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    os::unix::process::CommandExt,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use crate::{config::env_path, errors::Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ProcessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// How long to wait after spawning before declaring the start successful.
    pub startup_grace: Duration,
    /// How long to wait after SIGTERM before sending SIGKILL.
    pub stop_timeout: Duration,
}

impl SupervisorConfig {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            pid_file: PathBuf::from("fxa.pid"),
            log_file: PathBuf::from("logs/fxa.log"),
            program: program.into(),
            args,
            startup_grace: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(2),
        }
    }

    /// `FXA_PID_FILE` / `FXA_LOG_FILE` override the default locations.
    pub fn from_env(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let mut cfg = Self::new(program, args);
        if let Some(p) = env_path("FXA_PID_FILE") {
            cfg.pid_file = p;
        }
        if let Some(p) = env_path("FXA_LOG_FILE") {
            cfg.log_file = p;
        }
        cfg
    }
}

#[derive(Clone, Debug)]
pub struct StatusReport {
    pub pid: i32,
    pub state: ProcessState,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
}

pub struct Supervisor {
    cfg: SupervisorConfig,
    state: ProcessState,
    // Kept so our own children can be reaped (a zombie still answers kill(pid, 0)).
    child: Option<Child>,
}

impl Supervisor {
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            state: ProcessState::Stopped,
            child: None,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// PID of the recorded process if it is alive.
    pub fn running_pid(&mut self) -> Result<Option<i32>> {
        let Some(pid) = read_pid(&self.cfg.pid_file)? else {
            return Ok(None);
        };
        if self.is_alive(pid) {
            Ok(Some(pid))
        } else {
            Ok(None)
        }
    }

    pub fn start(&mut self) -> Result<i32> {
        if let Some(pid) = self.running_pid()? {
            self.state = ProcessState::Running;
            return Err(Error::AlreadyRunning { pid });
        }

        if self.cfg.pid_file.exists() {
            tracing::info!(pid_file = %self.cfg.pid_file.display(), "removing stale pid file");
            fs::remove_file(&self.cfg.pid_file)?;
        }

        self.state = ProcessState::Starting;
        let child = match self.spawn() {
            Ok(c) => c,
            Err(e) => {
                self.state = ProcessState::Stopped;
                return Err(e);
            }
        };
        let pid = child.id() as i32;
        self.child = Some(child);

        if let Some(parent) = non_empty_parent(&self.cfg.pid_file) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.cfg.pid_file, format!("{pid}\n"))?;

        thread::sleep(self.cfg.startup_grace);
        if !self.is_alive(pid) {
            self.state = ProcessState::Stopped;
            let _ = fs::remove_file(&self.cfg.pid_file);
            return Err(Error::External(format!(
                "process exited during startup, see {}",
                self.cfg.log_file.display()
            )));
        }

        self.state = ProcessState::Running;
        tracing::info!(pid, "started");
        Ok(pid)
    }

    /// SIGTERM, then SIGKILL after `stop_timeout`. Returns the stopped PID.
    pub fn stop(&mut self) -> Result<i32> {
        let Some(pid) = self.running_pid()? else {
            if self.cfg.pid_file.exists() {
                let _ = fs::remove_file(&self.cfg.pid_file);
            }
            self.state = ProcessState::Stopped;
            return Err(Error::NotRunning);
        };

        self.state = ProcessState::Stopping;
        signal(pid, libc::SIGTERM)?;

        let deadline = Instant::now() + self.cfg.stop_timeout;
        while self.is_alive(pid) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(100));
        }

        if self.is_alive(pid) {
            tracing::warn!(pid, "did not exit after SIGTERM, sending SIGKILL");
            signal(pid, libc::SIGKILL)?;
            thread::sleep(Duration::from_millis(100));
            let _ = self.is_alive(pid); // reap
        }

        let _ = fs::remove_file(&self.cfg.pid_file);
        self.state = ProcessState::Stopped;
        tracing::info!(pid, "stopped");
        Ok(pid)
    }

    pub fn restart(&mut self) -> Result<i32> {
        match self.stop() {
            Ok(_) | Err(Error::NotRunning) => {}
            Err(e) => return Err(e),
        }
        self.start()
    }

    pub fn status(&mut self) -> Result<StatusReport> {
        let Some(pid) = self.running_pid()? else {
            self.state = ProcessState::Stopped;
            return Err(Error::NotRunning);
        };
        self.state = ProcessState::Running;
        Ok(StatusReport {
            pid,
            state: self.state,
            pid_file: self.cfg.pid_file.clone(),
            log_file: self.cfg.log_file.clone(),
        })
    }

    /// Last `lines` lines of the log file.
    pub fn tail_logs(&self, lines: usize) -> Result<Vec<String>> {
        let contents = fs::read_to_string(&self.cfg.log_file)?;
        let all: Vec<&str> = contents.lines().collect();
        let start = all.len().saturating_sub(lines);
        Ok(all[start..].iter().map(|l| l.to_string()).collect())
    }

    /// Copy new log output to `out` until `stop()` returns true.
    pub fn follow_logs(&self, out: &mut impl Write, stop: impl Fn() -> bool) -> Result<()> {
        let mut file = File::open(&self.cfg.log_file)?;
        let mut pos = file.seek(SeekFrom::End(0))?;
        let mut buf = Vec::new();

        while !stop() {
            let len = file.metadata()?.len();
            if len < pos {
                // Truncated or rotated.
                pos = file.seek(SeekFrom::Start(0))?;
            }
            buf.clear();
            let read = file.read_to_end(&mut buf)?;
            if read > 0 {
                out.write_all(&buf)?;
                out.flush()?;
                pos += read as u64;
            } else {
                thread::sleep(Duration::from_millis(500));
            }
        }
        Ok(())
    }

    fn spawn(&self) -> Result<Child> {
        if let Some(parent) = non_empty_parent(&self.cfg.log_file) {
            fs::create_dir_all(parent)?;
        }
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.cfg.log_file)?;
        let log_err = log.try_clone()?;

        let child = Command::new(&self.cfg.program)
            .args(&self.cfg.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            // Own process group: a Ctrl-C in the launching terminal must not reach it.
            .process_group(0)
            .spawn()?;
        Ok(child)
    }

    fn is_alive(&mut self, pid: i32) -> bool {
        if let Some(child) = self.child.as_mut() {
            if child.id() as i32 == pid {
                match child.try_wait() {
                    Ok(Some(_)) => {
                        self.child = None;
                        return false;
                    }
                    Ok(None) => return true,
                    Err(_) => {}
                }
            }
        }
        pid_alive(pid)
    }
}

/// `kill(pid, 0)`: the process exists (EPERM means it exists but is not ours).
pub fn pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

fn signal(pid: i32, sig: i32) -> Result<()> {
    let rc = unsafe { libc::kill(pid, sig) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Already gone.
        return Ok(());
    }
    Err(Error::Io(err))
}

/// A garbage PID file counts as no PID file.
fn read_pid(path: &Path) -> Result<Option<i32>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(raw.trim().parse::<i32>().ok().filter(|p| *p > 0)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn non_empty_parent(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}
