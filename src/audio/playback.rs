//! Playback state machine with a live cursor
//!
//! The controller lives on the UI context and owns [`PlaybackState`]. Each
//! play request starts a worker thread that exports the clip tail to a temp
//! WAV, spawns the external player and then opens a readiness barrier with
//! the instant playback began. The UI ticks the controller; each tick
//! recomputes the cursor from the clock instead of accumulating it.
//!
//! Only the worker touches the player process. Pause and stop are requests
//! written to an atomic intent flag that the worker polls.

use super::buffer::AudioBuffer;
use super::codec;
use super::edit;
use super::player::{PlayerBackend, ProcessGuard, ProcessStatus};
use super::temp::{self, TempAudioFile};
use crate::error::{ClipError, Result};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
}

/// Wall clock backed by `Instant`
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Phase of the playback state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackPhase {
    Stopped,
    Playing,
    Paused,
}

/// Everything the renderer needs to draw the cursor
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    pub phase: PlaybackPhase,
    /// Cursor position in seconds
    pub cursor: f64,
    /// Where playback was paused, if it was
    pub paused_at: Option<f64>,
    /// Clip position the current (or last) playback started from
    pub start_position: f64,
}

impl PlaybackState {
    pub fn is_playing(&self) -> bool {
        self.phase == PlaybackPhase::Playing
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            phase: PlaybackPhase::Stopped,
            cursor: 0.0,
            paused_at: None,
            start_position: 0.0,
        }
    }
}

/// What a tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// Not playing
    Idle,
    /// Playing, but the player has not started yet
    Waiting,
    /// Cursor moved to this position
    Advanced(f64),
    /// Reached the end of the clip; back to `Stopped`
    Finished,
    /// Playback failed; back to `Stopped`
    Failed(ClipError),
}

/// Timing and location settings for playback
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    pub temp_dir: PathBuf,
    /// How long to wait after terminate before killing the player
    pub terminate_timeout: Duration,
    /// Delay before removing the exported temp file
    pub cleanup_grace: Duration,
    /// How often the worker checks the intent flag and the process
    pub poll_interval: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            temp_dir: temp::default_temp_dir(),
            terminate_timeout: Duration::from_millis(500),
            cleanup_grace: Duration::from_millis(300),
            poll_interval: Duration::from_millis(20),
        }
    }
}

/// Requests from the UI context to the worker
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
enum WorkerIntent {
    Run = 0,
    Pause = 1,
    Stop = 2,
}

impl WorkerIntent {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerIntent::Run,
            1 => WorkerIntent::Pause,
            _ => WorkerIntent::Stop,
        }
    }
}

/// State of the readiness barrier
#[derive(Clone, Debug, PartialEq)]
enum Readiness {
    Pending,
    /// Player spawned at this clock time
    Ready { started_at: Duration },
    Failed(String),
    Cancelled,
}

/// One-shot barrier the worker opens once the player is running
struct Barrier {
    state: Mutex<Readiness>,
    cond: Condvar,
}

impl Barrier {
    fn new() -> Self {
        Self {
            state: Mutex::new(Readiness::Pending),
            cond: Condvar::new(),
        }
    }

    /// Move out of `Pending`; later transitions are ignored
    fn resolve(&self, next: Readiness) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == Readiness::Pending {
            *state = next;
            self.cond.notify_all();
        }
    }

    fn peek(&self) -> Readiness {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn wait(&self, timeout: Duration) -> Readiness {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (state, _) = self
            .cond
            .wait_timeout_while(state, timeout, |s| *s == Readiness::Pending)
            .unwrap_or_else(|e| e.into_inner());
        state.clone()
    }
}

/// Sentinel for "exited without an exit code"
const NO_EXIT_CODE: i32 = i32::MIN;

/// Shared between the controller and one worker
struct WorkerShared {
    intent: AtomicU8,
    barrier: Barrier,
    process_exited: AtomicBool,
    exit_code: AtomicI32,
    worker_done: AtomicBool,
}

impl WorkerShared {
    fn new() -> Self {
        Self {
            intent: AtomicU8::new(WorkerIntent::Run as u8),
            barrier: Barrier::new(),
            process_exited: AtomicBool::new(false),
            exit_code: AtomicI32::new(NO_EXIT_CODE),
            worker_done: AtomicBool::new(false),
        }
    }

    fn intent(&self) -> WorkerIntent {
        WorkerIntent::from_u8(self.intent.load(Ordering::Acquire))
    }

    /// Ask the worker to let go of the player. Only the first request sticks.
    fn request(&self, intent: WorkerIntent) {
        let _ = self.intent.compare_exchange(
            WorkerIntent::Run as u8,
            intent as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn mark_exited(&self, code: Option<i32>) {
        self.exit_code.store(code.unwrap_or(NO_EXIT_CODE), Ordering::Relaxed);
        self.process_exited.store(true, Ordering::Release);
    }

    /// Exit code of the player if it has exited on its own
    fn exit_status(&self) -> Option<Option<i32>> {
        if self.process_exited.load(Ordering::Acquire) {
            let code = self.exit_code.load(Ordering::Relaxed);
            Some((code != NO_EXIT_CODE).then_some(code))
        } else {
            None
        }
    }
}

/// Marks the worker finished on every exit path, including unwinding
struct WorkerExitGuard(Arc<WorkerShared>);

impl Drop for WorkerExitGuard {
    fn drop(&mut self) {
        self.0.barrier.resolve(Readiness::Failed(
            "playback worker stopped before the player started".to_string(),
        ));
        self.0.worker_done.store(true, Ordering::Release);
    }
}

struct Worker {
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<()>>,
}

/// Everything a worker needs, moved into its thread
struct PlaybackJob {
    buffer: AudioBuffer,
    start: f64,
    backend: Arc<dyn PlayerBackend>,
    clock: Arc<dyn Clock>,
    config: PlaybackConfig,
}

/// Drives the external player and the playback cursor
pub struct PlaybackController {
    buffer: AudioBuffer,
    state: PlaybackState,
    backend: Option<Arc<dyn PlayerBackend>>,
    clock: Arc<dyn Clock>,
    config: PlaybackConfig,
    worker: Option<Worker>,
}

impl PlaybackController {
    pub fn new(backend: Option<Arc<dyn PlayerBackend>>, config: PlaybackConfig) -> Self {
        Self::with_clock(backend, config, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(
        backend: Option<Arc<dyn PlayerBackend>>,
        config: PlaybackConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            buffer: AudioBuffer::default(),
            state: PlaybackState::default(),
            backend,
            clock,
            config,
            worker: None,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.state.phase
    }

    pub fn cursor(&self) -> f64 {
        self.state.cursor
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn duration(&self) -> f64 {
        self.buffer.duration()
    }

    /// Replace the clip. Stops any playback and resets the cursor.
    pub fn set_buffer(&mut self, buffer: AudioBuffer) {
        self.stop();
        self.buffer = buffer;
        self.state = PlaybackState::default();
    }

    /// Start or resume playback.
    ///
    /// Resumes from the paused position when paused, otherwise plays from the
    /// cursor. Does nothing while already playing.
    pub fn play(&mut self) -> Result<()> {
        if self.state.phase == PlaybackPhase::Playing {
            return Ok(());
        }
        if self.buffer.is_empty() {
            return Err(ClipError::NoAudio);
        }
        let backend = self.backend.clone().ok_or_else(|| {
            ClipError::PlayerUnavailable(
                "no audio player found (install ffplay, pw-play or aplay)".to_string(),
            )
        })?;

        let duration = self.buffer.duration();
        let mut start = match (self.state.phase, self.state.paused_at) {
            (PlaybackPhase::Paused, Some(paused_at)) => paused_at,
            _ => self.state.cursor,
        };
        if start >= duration {
            start = 0.0;
        }

        // The new worker joins the old one before spawning, so at most one
        // player process exists at any time.
        let previous = self.worker.take().and_then(|mut worker| {
            worker.shared.request(WorkerIntent::Stop);
            worker.handle.take()
        });

        let shared = Arc::new(WorkerShared::new());
        let job = PlaybackJob {
            buffer: self.buffer.clone(),
            start,
            backend,
            clock: self.clock.clone(),
            config: self.config.clone(),
        };
        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name("clipper-playback".to_string())
            .spawn(move || run_playback_worker(job, worker_shared, previous))
            .map_err(|e| ClipError::PlayerUnavailable(format!("Failed to start playback thread: {}", e)))?;

        self.worker = Some(Worker {
            shared,
            handle: Some(handle),
        });
        self.state = PlaybackState {
            phase: PlaybackPhase::Playing,
            cursor: start,
            paused_at: None,
            start_position: start,
        };
        info!("Playback started at {:.3}s of {:.3}s", start, duration);
        Ok(())
    }

    /// Pause, keeping the cursor where it is. No-op unless playing.
    pub fn pause(&mut self) {
        if self.state.phase != PlaybackPhase::Playing {
            return;
        }
        if let Some(position) = self.clock_position() {
            self.state.cursor = position.min(self.buffer.duration());
        }
        self.request_worker(WorkerIntent::Pause);
        self.state.phase = PlaybackPhase::Paused;
        self.state.paused_at = Some(self.state.cursor);
        info!("Playback paused at {:.3}s", self.state.cursor);
    }

    /// Stop and rewind to the start. No-op when already stopped.
    pub fn stop(&mut self) {
        if self.state.phase == PlaybackPhase::Stopped {
            return;
        }
        self.request_worker(WorkerIntent::Stop);
        self.reset_to_stopped();
        info!("Playback stopped");
    }

    /// Pause when playing, otherwise play
    pub fn toggle(&mut self) -> Result<()> {
        if self.state.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Move the cursor while stopped or paused
    pub fn seek(&mut self, position: f64) -> Result<()> {
        if !position.is_finite() {
            return Err(ClipError::InvalidPosition(position));
        }
        if self.state.phase == PlaybackPhase::Playing {
            return Err(ClipError::SeekWhilePlaying);
        }
        self.state.cursor = position.clamp(0.0, self.buffer.duration());
        self.state.paused_at = None;
        debug!("Cursor moved to {:.3}s", self.state.cursor);
        Ok(())
    }

    /// Advance the cursor. Never blocks.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state.phase != PlaybackPhase::Playing {
            return TickOutcome::Idle;
        }
        let Some(shared) = self.worker.as_ref().map(|w| w.shared.clone()) else {
            self.reset_to_stopped();
            return TickOutcome::Failed(ClipError::PlayerUnavailable("no playback worker".to_string()));
        };

        let started_at = match shared.barrier.peek() {
            Readiness::Pending => return TickOutcome::Waiting,
            Readiness::Ready { started_at } => started_at,
            Readiness::Failed(reason) => {
                warn!("Playback failed: {}", reason);
                self.reset_to_stopped();
                return TickOutcome::Failed(ClipError::PlayerUnavailable(reason));
            }
            Readiness::Cancelled => {
                self.reset_to_stopped();
                return TickOutcome::Failed(ClipError::PlayerUnavailable(
                    "playback was cancelled".to_string(),
                ));
            }
        };

        let duration = self.buffer.duration();
        let elapsed = self.clock.now().saturating_sub(started_at).as_secs_f64();
        let position = (self.state.start_position + elapsed).max(self.state.cursor);

        if position >= duration {
            self.finish();
            return TickOutcome::Finished;
        }

        match shared.exit_status() {
            Some(Some(0)) => {
                debug!("Player exited at {:.3}s", position);
                self.finish();
                return TickOutcome::Finished;
            }
            Some(code) => {
                let reason = match code {
                    Some(code) => format!("player exited with status {}", code),
                    None => "player was terminated".to_string(),
                };
                warn!("Playback failed: {}", reason);
                self.reset_to_stopped();
                return TickOutcome::Failed(ClipError::PlayerUnavailable(reason));
            }
            None => {}
        }

        if shared.worker_done.load(Ordering::Acquire) {
            self.reset_to_stopped();
            return TickOutcome::Failed(ClipError::PlayerUnavailable(
                "playback worker stopped unexpectedly".to_string(),
            ));
        }

        self.state.cursor = position;
        TickOutcome::Advanced(position)
    }

    /// Block until the player has started, failed, or `timeout` passes.
    ///
    /// Returns `Ok(true)` once playing, `Ok(false)` on timeout or when not
    /// playing. For callers off the UI context.
    pub fn wait_ready(&self, timeout: Duration) -> Result<bool> {
        if self.state.phase != PlaybackPhase::Playing {
            return Ok(false);
        }
        let Some(worker) = &self.worker else {
            return Ok(false);
        };
        match worker.shared.barrier.wait(timeout) {
            Readiness::Ready { .. } => Ok(true),
            Readiness::Pending | Readiness::Cancelled => Ok(false),
            Readiness::Failed(reason) => Err(ClipError::PlayerUnavailable(reason)),
        }
    }

    /// Stop playback and wait for the worker to release the player and its temp file
    pub fn shutdown(&mut self) {
        self.stop();
        if let Some(mut worker) = self.worker.take() {
            worker.shared.request(WorkerIntent::Stop);
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    warn!("Playback worker panicked");
                }
            }
        }
    }

    /// Cursor position implied by the clock, if the player has started
    fn clock_position(&self) -> Option<f64> {
        let worker = self.worker.as_ref()?;
        match worker.shared.barrier.peek() {
            Readiness::Ready { started_at } => {
                let elapsed = self.clock.now().saturating_sub(started_at).as_secs_f64();
                Some((self.state.start_position + elapsed).max(self.state.cursor))
            }
            _ => None,
        }
    }

    fn request_worker(&self, intent: WorkerIntent) {
        if let Some(worker) = &self.worker {
            worker.shared.request(intent);
        }
    }

    /// Natural end of clip: the cursor always goes back to the start
    fn finish(&mut self) {
        self.request_worker(WorkerIntent::Stop);
        self.reset_to_stopped();
        info!("Playback finished");
    }

    fn reset_to_stopped(&mut self) {
        self.request_worker(WorkerIntent::Stop);
        self.state.phase = PlaybackPhase::Stopped;
        self.state.cursor = 0.0;
        self.state.paused_at = None;
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Playback worker: export, spawn, then watch the process until asked to stop
fn run_playback_worker(job: PlaybackJob, shared: Arc<WorkerShared>, previous: Option<JoinHandle<()>>) {
    let _exit_guard = WorkerExitGuard(shared.clone());

    if let Some(previous) = previous {
        if previous.join().is_err() {
            warn!("Previous playback worker panicked");
        }
    }

    if shared.intent() != WorkerIntent::Run {
        debug!("Playback cancelled before export");
        shared.barrier.resolve(Readiness::Cancelled);
        return;
    }

    let segment = edit::slice_from(&job.buffer, job.start);
    let temp = match TempAudioFile::create(&job.config.temp_dir, "playback", "wav", job.config.cleanup_grace) {
        Ok(temp) => temp,
        Err(e) => {
            shared.barrier.resolve(Readiness::Failed(e.to_string()));
            return;
        }
    };
    if let Err(e) = codec::write_wav(temp.path(), &segment) {
        shared.barrier.resolve(Readiness::Failed(format!(
            "Failed to export playback audio to {}: {}",
            temp.path().display(),
            e
        )));
        return;
    }

    if shared.intent() != WorkerIntent::Run {
        debug!("Playback cancelled during export");
        shared.barrier.resolve(Readiness::Cancelled);
        return;
    }

    let process = match job.backend.spawn(temp.path()) {
        Ok(process) => process,
        Err(e) => {
            shared.barrier.resolve(Readiness::Failed(e.to_string()));
            return;
        }
    };
    let mut guard = ProcessGuard::new(process, job.config.terminate_timeout);
    shared.barrier.resolve(Readiness::Ready {
        started_at: job.clock.now(),
    });
    debug!("Player {} started on {:.3}s of audio", job.backend.name(), segment.duration());

    loop {
        let intent = shared.intent();
        if intent != WorkerIntent::Run {
            debug!("Player released on {:?} request", intent);
            break;
        }
        match guard.poll() {
            Ok(ProcessStatus::Running) => {}
            Ok(ProcessStatus::Exited(code)) => {
                debug!("Player exited with {:?}", code);
                shared.mark_exited(code);
                break;
            }
            Err(e) => {
                warn!("Lost track of player process: {}", e);
                shared.mark_exited(None);
                break;
            }
        }
        thread::sleep(job.config.poll_interval);
    }

    // Stop the process before the temp file goes away
    drop(guard);
    drop(temp);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Clock;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Clock that only moves when told to
    #[derive(Default)]
    pub struct ManualClock {
        now: Mutex<Duration>,
    }

    impl ManualClock {
        pub fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            *self.now.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;
    use crate::audio::player::testing::FakePlayer;

    const RATE: u32 = 44100;
    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        controller: PlaybackController,
        player: FakePlayer,
        clock: Arc<ManualClock>,
        _dir: tempfile::TempDir,
    }

    fn harness(seconds: u32) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let player = FakePlayer::default();
        let clock = Arc::new(ManualClock::default());
        let config = PlaybackConfig {
            temp_dir: dir.path().to_path_buf(),
            terminate_timeout: Duration::from_millis(50),
            cleanup_grace: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
        };
        let mut controller = PlaybackController::with_clock(
            Some(Arc::new(player.clone())),
            config,
            clock.clone(),
        );
        controller.set_buffer(AudioBuffer::new(vec![100; (RATE * seconds) as usize], RATE));
        Harness {
            controller,
            player,
            clock,
            _dir: dir,
        }
    }

    fn secs(value: f64) -> Duration {
        Duration::from_secs_f64(value)
    }

    #[test]
    fn test_end_of_clip_rewinds() {
        let mut h = harness(10);
        h.controller.seek(4.0).unwrap();
        h.controller.play().unwrap();
        assert!(h.controller.wait_ready(WAIT).unwrap());
        assert_eq!(h.controller.state().start_position, 4.0);

        // Six seconds of audio were exported
        let process = h.player.last().unwrap();
        assert!(process.file_len >= 6 * RATE as u64 * 2);

        h.clock.advance(secs(6.1));
        assert!(matches!(h.controller.tick(), TickOutcome::Finished));
        assert_eq!(h.controller.phase(), PlaybackPhase::Stopped);
        assert_eq!(h.controller.cursor(), 0.0);
        assert!(!h.controller.is_playing());

        h.controller.shutdown();
        assert!(!process.is_running());
        assert!(!process.path.exists());
    }

    #[test]
    fn test_pause_and_resume_from_same_spot() {
        let mut h = harness(10);
        h.controller.play().unwrap();
        assert!(h.controller.wait_ready(WAIT).unwrap());

        h.clock.advance(secs(3.5));
        match h.controller.tick() {
            TickOutcome::Advanced(position) => assert!((position - 3.5).abs() < 1e-9),
            other => panic!("unexpected tick {:?}", other),
        }

        h.controller.pause();
        assert_eq!(h.controller.phase(), PlaybackPhase::Paused);
        assert_eq!(h.controller.state().paused_at, Some(3.5));

        h.controller.play().unwrap();
        assert!((h.controller.state().start_position - 3.5).abs() < 1e-9);
        assert!(h.controller.wait_ready(WAIT).unwrap());

        // The new worker joined the old one before spawning
        assert_eq!(h.player.spawn_count(), 2);
        assert_eq!(h.player.running_count(), 1);
    }

    #[test]
    fn test_stop_and_pause_are_idempotent() {
        let mut h = harness(2);
        h.controller.stop();
        h.controller.pause();
        assert_eq!(*h.controller.state(), PlaybackState::default());

        h.controller.play().unwrap();
        h.controller.pause();
        let paused = h.controller.state().clone();
        h.controller.pause();
        assert_eq!(*h.controller.state(), paused);

        h.controller.stop();
        let stopped = h.controller.state().clone();
        h.controller.stop();
        assert_eq!(*h.controller.state(), stopped);
        assert_eq!(stopped.cursor, 0.0);
        assert_eq!(stopped.paused_at, None);
    }

    #[test]
    fn test_cursor_is_monotonic_while_playing() {
        let mut h = harness(10);
        h.controller.play().unwrap();
        assert!(h.controller.wait_ready(WAIT).unwrap());

        let mut last = h.controller.cursor();
        for _ in 0..20 {
            h.clock.advance(secs(0.05));
            match h.controller.tick() {
                TickOutcome::Advanced(position) => {
                    assert!(position >= last);
                    last = position;
                }
                other => panic!("unexpected tick {:?}", other),
            }
        }
        assert!((last - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_tick_waits_for_barrier() {
        let mut h = harness(1);
        assert!(matches!(h.controller.tick(), TickOutcome::Idle));
        h.controller.play().unwrap();
        // Either still pending or already running; never moved by a clock that hasn't advanced
        match h.controller.tick() {
            TickOutcome::Waiting => {}
            TickOutcome::Advanced(position) => assert_eq!(position, 0.0),
            other => panic!("unexpected tick {:?}", other),
        }
    }

    #[test]
    fn test_seek_rules() {
        let mut h = harness(10);
        h.controller.seek(25.0).unwrap();
        assert_eq!(h.controller.cursor(), 10.0);
        h.controller.seek(-1.0).unwrap();
        assert_eq!(h.controller.cursor(), 0.0);
        assert!(matches!(
            h.controller.seek(f64::NAN),
            Err(ClipError::InvalidPosition(_))
        ));

        h.controller.play().unwrap();
        assert!(matches!(h.controller.seek(1.0), Err(ClipError::SeekWhilePlaying)));

        h.controller.pause();
        h.controller.seek(7.0).unwrap();
        assert_eq!(h.controller.state().paused_at, None);
        h.controller.play().unwrap();
        assert_eq!(h.controller.state().start_position, 7.0);
    }

    #[test]
    fn test_play_from_end_restarts() {
        let mut h = harness(2);
        h.controller.seek(2.0).unwrap();
        h.controller.play().unwrap();
        assert_eq!(h.controller.state().start_position, 0.0);
    }

    #[test]
    fn test_play_while_playing_is_noop() {
        let mut h = harness(2);
        h.controller.play().unwrap();
        assert!(h.controller.wait_ready(WAIT).unwrap());
        h.controller.play().unwrap();
        assert_eq!(h.player.spawn_count(), 1);
    }

    #[test]
    fn test_missing_player_stays_stopped() {
        let mut controller = PlaybackController::new(None, PlaybackConfig::default());
        controller.set_buffer(AudioBuffer::new(vec![0; 100], RATE));
        assert!(matches!(controller.play(), Err(ClipError::PlayerUnavailable(_))));
        assert_eq!(controller.phase(), PlaybackPhase::Stopped);
    }

    #[test]
    fn test_empty_clip_cannot_play() {
        let mut h = harness(0);
        assert!(matches!(h.controller.play(), Err(ClipError::NoAudio)));
        assert_eq!(h.player.spawn_count(), 0);
    }

    #[test]
    fn test_failed_spawn_returns_to_stopped() {
        let mut h = harness(2);
        h.player.fail.store(true, Ordering::SeqCst);
        h.controller.play().unwrap();
        assert!(matches!(
            h.controller.wait_ready(WAIT),
            Err(ClipError::PlayerUnavailable(_))
        ));
        assert!(matches!(
            h.controller.tick(),
            TickOutcome::Failed(ClipError::PlayerUnavailable(_))
        ));
        assert_eq!(h.controller.phase(), PlaybackPhase::Stopped);
    }

    #[test]
    fn test_player_exit_finishes_playback() {
        let mut h = harness(10);
        h.controller.play().unwrap();
        assert!(h.controller.wait_ready(WAIT).unwrap());
        h.player.last().unwrap().finish(Some(0));

        let deadline = Instant::now() + WAIT;
        loop {
            match h.controller.tick() {
                TickOutcome::Finished => break,
                TickOutcome::Advanced(_) if Instant::now() < deadline => {
                    thread::sleep(Duration::from_millis(2))
                }
                other => panic!("unexpected tick {:?}", other),
            }
        }
        assert_eq!(h.controller.cursor(), 0.0);
    }

    #[test]
    fn test_rapid_toggling_keeps_one_process() {
        let mut h = harness(5);
        for _ in 0..5 {
            h.controller.toggle().unwrap();
            h.controller.toggle().unwrap();
        }
        h.controller.play().unwrap();
        assert!(h.controller.wait_ready(WAIT).unwrap());
        assert_eq!(h.player.running_count(), 1);

        h.controller.shutdown();
        assert_eq!(h.player.running_count(), 0);
    }

    #[test]
    fn test_new_buffer_stops_playback() {
        let mut h = harness(3);
        h.controller.play().unwrap();
        assert!(h.controller.wait_ready(WAIT).unwrap());
        h.controller.set_buffer(AudioBuffer::new(vec![0; 10], RATE));
        assert_eq!(*h.controller.state(), PlaybackState::default());
    }
}
