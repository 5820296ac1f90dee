//! External player process
//!
//! Playback is delegated to a command-line player (ffplay, pw-play, aplay,
//! ...). The playback worker is the only owner of a running process and holds
//! it through a [`ProcessGuard`], which stops the process on every exit path.

use crate::error::{ClipError, Result};
use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Players tried in order when none is configured, with the flags that make
/// them play a file once without a window
const PLAYER_CANDIDATES: &[(&str, &[&str])] = &[
    ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet"]),
    ("pw-play", &[]),
    ("paplay", &[]),
    ("aplay", &["-q"]),
    ("afplay", &[]),
];

/// Poll interval while waiting for a terminated process to exit
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Result of a non-blocking status check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    /// Exit code, `None` when killed by a signal
    Exited(Option<i32>),
}

/// A running player process
pub trait PlayerProcess: Send {
    /// Check the process without blocking
    fn poll(&mut self) -> io::Result<ProcessStatus>;

    /// Ask the process to exit
    fn terminate(&mut self) -> io::Result<()>;

    /// Force the process to exit
    fn kill(&mut self) -> io::Result<()>;
}

/// Something that can start a player on an audio file
pub trait PlayerBackend: Send + Sync {
    fn name(&self) -> &str;

    fn spawn(&self, path: &Path) -> Result<Box<dyn PlayerProcess>>;
}

/// A player run as `program [args...] <file>`
#[derive(Clone, Debug)]
pub struct CommandPlayer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandPlayer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parse a configured command line such as `"ffplay -nodisp -autoexit"`
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts.map(str::to_string).collect()))
    }

    /// Find the first known player on `PATH`
    pub fn detect() -> Option<Self> {
        PLAYER_CANDIDATES.iter().find_map(|(name, args)| {
            which::which(name).ok().map(|program| {
                debug!("Using player {}", program.display());
                Self::new(program, args.iter().map(|a| a.to_string()).collect())
            })
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl PlayerBackend for CommandPlayer {
    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("player")
    }

    fn spawn(&self, path: &Path) -> Result<Box<dyn PlayerProcess>> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                ClipError::PlayerUnavailable(format!("Failed to start {}: {}", self.program.display(), e))
            })?;

        debug!("Spawned {} (pid {}) for {}", self.name(), child.id(), path.display());
        Ok(Box::new(ChildProcess { child }))
    }
}

/// A `std::process::Child` running a player
struct ChildProcess {
    child: Child,
}

impl PlayerProcess for ChildProcess {
    fn poll(&mut self) -> io::Result<ProcessStatus> {
        Ok(match self.child.try_wait()? {
            Some(status) => ProcessStatus::Exited(status.code()),
            None => ProcessStatus::Running,
        })
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        let pid = self.child.id() as libc::pid_t;
        // SAFETY: kill(2) has no memory-safety preconditions; the pid belongs
        // to a child we have not reaped yet.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.kill()?;
        self.child.wait().map(|_| ())
    }
}

/// Owns a player process and stops it when dropped.
///
/// Stopping is terminate, then up to `timeout` of polling, then kill.
pub struct ProcessGuard {
    process: Box<dyn PlayerProcess>,
    timeout: Duration,
    finished: bool,
}

impl ProcessGuard {
    pub fn new(process: Box<dyn PlayerProcess>, timeout: Duration) -> Self {
        Self {
            process,
            timeout,
            finished: false,
        }
    }

    /// Non-blocking status check
    pub fn poll(&mut self) -> io::Result<ProcessStatus> {
        let status = self.process.poll()?;
        if matches!(status, ProcessStatus::Exited(_)) {
            self.finished = true;
        }
        Ok(status)
    }

    /// Stop the process if it is still running. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        match self.process.poll() {
            Ok(ProcessStatus::Exited(_)) => return,
            Ok(ProcessStatus::Running) => {}
            Err(e) => warn!("Failed to query player process: {}", e),
        }

        if let Err(e) = self.process.terminate() {
            debug!("Terminate failed, killing player: {}", e);
            self.force_kill();
            return;
        }

        let deadline = Instant::now() + self.timeout;
        while Instant::now() < deadline {
            match self.process.poll() {
                Ok(ProcessStatus::Exited(_)) => {
                    debug!("Player terminated");
                    return;
                }
                Ok(ProcessStatus::Running) => thread::sleep(EXIT_POLL_INTERVAL),
                Err(e) => {
                    warn!("Failed to query player process: {}", e);
                    break;
                }
            }
        }

        debug!("Player did not terminate within {:?}, killing", self.timeout);
        self.force_kill();
    }

    fn force_kill(&mut self) {
        if let Err(e) = self.process.kill() {
            warn!("Failed to kill player process: {}", e);
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory player used by playback tests

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    pub struct FakeProcessState {
        pub exited: Mutex<Option<Option<i32>>>,
        pub terminated: AtomicBool,
        pub killed: AtomicBool,
        /// Ignore terminate requests, forcing the kill fallback
        pub stubborn: AtomicBool,
        pub path: PathBuf,
        pub file_len: u64,
    }

    impl FakeProcessState {
        pub fn finish(&self, code: Option<i32>) {
            *self.exited.lock().unwrap() = Some(code);
        }

        pub fn is_running(&self) -> bool {
            self.exited.lock().unwrap().is_none()
        }
    }

    pub struct FakeProcess {
        pub state: Arc<FakeProcessState>,
    }

    impl PlayerProcess for FakeProcess {
        fn poll(&mut self) -> io::Result<ProcessStatus> {
            Ok(match *self.state.exited.lock().unwrap() {
                Some(code) => ProcessStatus::Exited(code),
                None => ProcessStatus::Running,
            })
        }

        fn terminate(&mut self) -> io::Result<()> {
            self.state.terminated.store(true, Ordering::SeqCst);
            if !self.state.stubborn.load(Ordering::SeqCst) {
                self.state.finish(None);
            }
            Ok(())
        }

        fn kill(&mut self) -> io::Result<()> {
            self.state.killed.store(true, Ordering::SeqCst);
            self.state.finish(None);
            Ok(())
        }
    }

    /// Records every spawn; can be told to fail
    #[derive(Clone, Default)]
    pub struct FakePlayer {
        pub spawned: Arc<Mutex<Vec<Arc<FakeProcessState>>>>,
        pub fail: Arc<AtomicBool>,
    }

    impl FakePlayer {
        pub fn spawn_count(&self) -> usize {
            self.spawned.lock().unwrap().len()
        }

        pub fn last(&self) -> Option<Arc<FakeProcessState>> {
            self.spawned.lock().unwrap().last().cloned()
        }

        pub fn running_count(&self) -> usize {
            self.spawned
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.is_running())
                .count()
        }
    }

    impl PlayerBackend for FakePlayer {
        fn name(&self) -> &str {
            "fake"
        }

        fn spawn(&self, path: &Path) -> Result<Box<dyn PlayerProcess>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ClipError::PlayerUnavailable("fake player refused".into()));
            }
            let state = Arc::new(FakeProcessState {
                path: path.to_path_buf(),
                file_len: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
                ..Default::default()
            });
            self.spawned.lock().unwrap().push(state.clone());
            Ok(Box::new(FakeProcess { state }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn fake_guard(stubborn: bool) -> (ProcessGuard, Arc<FakeProcessState>) {
        let state = Arc::new(FakeProcessState::default());
        state.stubborn.store(stubborn, Ordering::SeqCst);
        let guard = ProcessGuard::new(
            Box::new(FakeProcess { state: state.clone() }),
            Duration::from_millis(30),
        );
        (guard, state)
    }

    #[test]
    fn test_guard_terminates_on_drop() {
        let (guard, state) = fake_guard(false);
        drop(guard);
        assert!(state.terminated.load(Ordering::SeqCst));
        assert!(!state.killed.load(Ordering::SeqCst));
        assert!(!state.is_running());
    }

    #[test]
    fn test_guard_kills_stubborn_process() {
        let (mut guard, state) = fake_guard(true);
        guard.shutdown();
        assert!(state.terminated.load(Ordering::SeqCst));
        assert!(state.killed.load(Ordering::SeqCst));
        assert!(!state.is_running());
    }

    #[test]
    fn test_guard_leaves_exited_process_alone() {
        let (mut guard, state) = fake_guard(false);
        state.finish(Some(0));
        assert_eq!(guard.poll().unwrap(), ProcessStatus::Exited(Some(0)));
        drop(guard);
        assert!(!state.terminated.load(Ordering::SeqCst));
    }

    #[test]
    fn test_command_line_parsing() {
        let player = CommandPlayer::from_command_line("ffplay -nodisp -autoexit").unwrap();
        assert_eq!(player.program(), Path::new("ffplay"));
        assert_eq!(player.args, vec!["-nodisp", "-autoexit"]);
        assert_eq!(player.name(), "ffplay");
        assert!(CommandPlayer::from_command_line("   ").is_none());
    }

    #[test]
    fn test_missing_program_is_unavailable() {
        let player = CommandPlayer::new("/nonexistent/clipper-player", Vec::new());
        let result = player.spawn(Path::new("clip.wav"));
        assert!(matches!(result, Err(ClipError::PlayerUnavailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_real_process_is_terminated() {
        // `sh -c 'sleep 5' <file>` stands in for a player; the file becomes $0
        let player = CommandPlayer::new("sh", vec!["-c".into(), "sleep 5".into()]);
        let process = player.spawn(Path::new("clip.wav")).unwrap();
        let mut guard = ProcessGuard::new(process, Duration::from_millis(500));
        assert_eq!(guard.poll().unwrap(), ProcessStatus::Running);

        let started = Instant::now();
        guard.shutdown();
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
