//! Microphone capture with level metering
//!
//! A capture worker holds the [`CaptureDevice`] while recording. Stopping
//! clears the active flag and interrupts any blocked read before joining.
//! Frames accumulate as raw s16le bytes in [`SharedCaptureState`], which the
//! UI also reads for volume metering.

use super::buffer::{calculate_peak, calculate_rms, AudioBuffer, DEFAULT_SAMPLE_RATE};
use crate::error::{ClipError, Result};
use log::{debug, info, warn};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// Frames requested from the device per read
pub const CHUNK_FRAMES: usize = 1024;

/// Number of level values kept for the live meter
const LEVEL_HISTORY_LEN: usize = 96;

/// Chunks averaged into one level history value
const LEVEL_DECIMATION: u32 = 4;

/// Raw sample encodings a device can deliver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleFormat {
    S16Le,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
        }
    }
}

/// What to ask the capture device for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
}

impl CaptureSpec {
    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channels.max(1) as usize
    }
}

impl Default for CaptureSpec {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            format: SampleFormat::S16Le,
        }
    }
}

/// Wakes a capture worker blocked in [`CaptureDevice::read`]
pub type CaptureInterrupt = Arc<dyn Fn() + Send + Sync>;

/// A source of raw audio frames
pub trait CaptureDevice: Send {
    fn open(&mut self, spec: &CaptureSpec) -> Result<()>;

    /// Read up to `chunk_frames` frames; `None` once the device has ended
    fn read(&mut self, chunk_frames: usize) -> Result<Option<Vec<u8>>>;

    fn close(&mut self);

    /// Handle that unblocks a pending `read` from another thread.
    ///
    /// Devices whose reads return on their own within a short timeout need
    /// not provide one.
    fn interrupt_handle(&self) -> Option<CaptureInterrupt> {
        None
    }
}

/// Current state of audio capture
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
    Error,
}

/// Shared state for audio capture - thread-safe
#[derive(Clone)]
pub struct SharedCaptureState {
    inner: Arc<Mutex<CaptureStateInner>>,
}

struct CaptureStateInner {
    /// Smoothed RMS level (0.0 - 1.0)
    volume_level: f32,
    /// Peak level with slow decay
    peak_level: f32,
    /// Recent averaged levels for the live meter
    level_history: Vec<f32>,
    /// Captured frames, s16le
    frames: Vec<u8>,
    /// Captured duration in seconds
    duration: f64,
    state: CaptureState,
    error: Option<String>,
    level_counter: u32,
    level_rms_sum: f32,
}

impl SharedCaptureState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CaptureStateInner {
                volume_level: 0.0,
                peak_level: 0.0,
                level_history: Vec::with_capacity(LEVEL_HISTORY_LEN),
                frames: Vec::new(),
                duration: 0.0,
                state: CaptureState::Idle,
                error: None,
                level_counter: 0,
                level_rms_sum: 0.0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CaptureStateInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn volume_level(&self) -> f32 {
        self.lock().volume_level
    }

    pub fn peak_level(&self) -> f32 {
        self.lock().peak_level
    }

    pub fn level_history(&self) -> Vec<f32> {
        self.lock().level_history.clone()
    }

    pub fn state(&self) -> CaptureState {
        self.lock().state
    }

    pub fn duration(&self) -> f64 {
        self.lock().duration
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn set_state(&self, state: CaptureState) {
        self.lock().state = state;
    }

    pub fn set_error(&self, error: String) {
        let mut inner = self.lock();
        inner.error = Some(error);
        inner.state = CaptureState::Error;
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.frames.clear();
        inner.level_history.clear();
        inner.duration = 0.0;
        inner.volume_level = 0.0;
        inner.peak_level = 0.0;
        inner.error = None;
        inner.state = CaptureState::Idle;
        inner.level_counter = 0;
        inner.level_rms_sum = 0.0;
    }

    /// Take the captured frames, leaving the buffer empty
    fn take_frames(&self) -> Vec<u8> {
        std::mem::take(&mut self.lock().frames)
    }

    /// Append one chunk from the device and update the meters
    pub fn process_chunk(&self, chunk: &[u8], spec: &CaptureSpec) {
        if chunk.is_empty() {
            return;
        }
        let samples: Vec<i16> = chunk
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let rms = calculate_rms(&samples);
        let peak = calculate_peak(&samples);

        let mut inner = self.lock();
        inner.volume_level = inner.volume_level * 0.7 + rms * 0.3;
        inner.peak_level = (inner.peak_level * 0.95).max(peak);

        inner.level_rms_sum += rms;
        inner.level_counter += 1;
        if inner.level_counter >= LEVEL_DECIMATION {
            let average = inner.level_rms_sum / LEVEL_DECIMATION as f32;
            inner.level_history.push(average);
            if inner.level_history.len() > LEVEL_HISTORY_LEN {
                inner.level_history.remove(0);
            }
            inner.level_counter = 0;
            inner.level_rms_sum = 0.0;
        }

        inner.frames.extend_from_slice(chunk);
        let frame_count = inner.frames.len() / spec.bytes_per_frame();
        inner.duration = frame_count as f64 / spec.sample_rate.max(1) as f64;
    }
}

impl Default for SharedCaptureState {
    fn default() -> Self {
        Self::new()
    }
}

/// The device, shared with the worker while recording.
///
/// It stays in the slot even if the worker panics, so a later session can
/// reuse it.
type DeviceSlot = Arc<Mutex<Option<Box<dyn CaptureDevice>>>>;

struct CaptureWorker {
    handle: JoinHandle<()>,
    interrupt: Option<CaptureInterrupt>,
}

/// Records from a [`CaptureDevice`] on a background thread
pub struct CaptureController {
    spec: CaptureSpec,
    state: SharedCaptureState,
    active: Arc<AtomicBool>,
    device: DeviceSlot,
    worker: Option<CaptureWorker>,
}

impl CaptureController {
    pub fn new(device: Box<dyn CaptureDevice>, spec: CaptureSpec) -> Self {
        Self {
            spec,
            state: SharedCaptureState::new(),
            active: Arc::new(AtomicBool::new(false)),
            device: Arc::new(Mutex::new(Some(device))),
            worker: None,
        }
    }

    fn lock_device(&self) -> MutexGuard<'_, Option<Box<dyn CaptureDevice>>> {
        self.device.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get shared capture state for UI updates
    pub fn shared_state(&self) -> SharedCaptureState {
        self.state.clone()
    }

    pub fn spec(&self) -> &CaptureSpec {
        &self.spec
    }

    /// True while the worker is pulling frames
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// True from `start_capture` until `stop_capture`, even if the device failed
    pub fn has_session(&self) -> bool {
        self.worker.is_some()
    }

    /// Start recording on a background thread
    pub fn start_capture(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(ClipError::CaptureActive);
        }
        let interrupt = match self.lock_device().as_ref() {
            Some(device) => device.interrupt_handle(),
            None => return Err(ClipError::CaptureDevice("capture device was lost".to_string())),
        };

        self.state.reset();
        self.state.set_state(CaptureState::Capturing);
        self.active.store(true, Ordering::SeqCst);

        let spec = self.spec;
        let device = self.device.clone();
        let state = self.state.clone();
        let active = self.active.clone();
        let handle = thread::Builder::new()
            .name("clipper-capture".to_string())
            .spawn(move || run_capture_loop(device, spec, state, active))
            .map_err(|e| {
                self.active.store(false, Ordering::SeqCst);
                self.state.set_state(CaptureState::Idle);
                ClipError::CaptureDevice(format!("Failed to start capture thread: {}", e))
            })?;

        self.worker = Some(CaptureWorker { handle, interrupt });
        info!("Capture started at {} Hz", self.spec.sample_rate);
        Ok(())
    }

    /// Stop recording and return what was captured
    pub fn stop_capture(&mut self) -> Result<AudioBuffer> {
        let worker = self.worker.take().ok_or(ClipError::CaptureInactive)?;
        self.active.store(false, Ordering::SeqCst);
        if let Some(interrupt) = &worker.interrupt {
            interrupt();
        }

        if worker.handle.join().is_err() {
            warn!("Capture worker panicked");
            if let Some(device) = self.lock_device().as_mut() {
                device.close();
            }
        }

        let error = self.state.error();
        let frames = self.state.take_frames();
        self.state.set_state(CaptureState::Idle);

        if frames.is_empty() {
            return Err(match error {
                Some(reason) => ClipError::CaptureDevice(reason),
                None => ClipError::NoFramesCaptured,
            });
        }
        if let Some(reason) = error {
            warn!("Capture ended early: {}", reason);
        }

        let buffer = frames_to_buffer(&frames, &self.spec);
        info!("Capture stopped: {:.2}s", buffer.duration());
        Ok(buffer)
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop_capture();
        }
    }
}

/// Convert interleaved s16le frames to a mono buffer
fn frames_to_buffer(frames: &[u8], spec: &CaptureSpec) -> AudioBuffer {
    let channels = spec.channels.max(1) as usize;
    if channels == 1 {
        return AudioBuffer::from_le_bytes(frames, spec.sample_rate);
    }
    let samples = frames
        .chunks_exact(spec.bytes_per_frame())
        .map(|frame| {
            let sum: i32 = frame
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as i32)
                .sum();
            (sum / channels as i32) as i16
        })
        .collect();
    AudioBuffer::new(samples, spec.sample_rate)
}

/// Clears the active flag on every worker exit path, including unwinding
struct CaptureExitGuard {
    state: SharedCaptureState,
    active: Arc<AtomicBool>,
}

impl Drop for CaptureExitGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.state.set_error("capture worker panicked".to_string());
        }
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Capture worker: read chunks until the active flag clears
fn run_capture_loop(
    slot: DeviceSlot,
    spec: CaptureSpec,
    state: SharedCaptureState,
    active: Arc<AtomicBool>,
) {
    let _exit_guard = CaptureExitGuard {
        state: state.clone(),
        active: active.clone(),
    };
    let mut held = slot.lock().unwrap_or_else(|e| e.into_inner());
    let Some(device) = held.as_mut() else {
        state.set_error("capture device was lost".to_string());
        return;
    };

    if let Err(e) = device.open(&spec) {
        warn!("Failed to open capture device: {}", e);
        state.set_error(e.to_string());
        return;
    }

    while active.load(Ordering::SeqCst) {
        match device.read(CHUNK_FRAMES) {
            Ok(Some(chunk)) => state.process_chunk(&chunk, &spec),
            // An interrupted read ends the stream; only an unrequested end is an error
            Ok(None) => {
                if active.load(Ordering::SeqCst) {
                    warn!("Capture device stopped delivering audio");
                    state.set_error("capture device ended unexpectedly".to_string());
                }
                break;
            }
            Err(e) => {
                if active.load(Ordering::SeqCst) {
                    warn!("Capture read failed: {}", e);
                    state.set_error(e.to_string());
                }
                break;
            }
        }
    }

    device.close();
    debug!("Capture worker finished");
}

/// Capture programs tried in order. `{rate}` and `{channels}` are substituted.
pub const CAPTURE_CANDIDATES: &[(&str, &[&str])] = &[
    (
        "parecord",
        &["--raw", "--format=s16le", "--rate={rate}", "--channels={channels}"],
    ),
    (
        "arecord",
        &["-q", "-t", "raw", "-f", "S16_LE", "-r", "{rate}", "-c", "{channels}"],
    ),
    (
        "pw-record",
        &["--rate", "{rate}", "--channels", "{channels}", "--format", "s16", "-"],
    ),
];

/// Capture device backed by a recorder process writing raw s16le to stdout
pub struct ProcessCaptureDevice {
    program: PathBuf,
    args: Vec<String>,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    bytes_per_frame: usize,
    /// Pid of the running recorder, 0 when none
    pid: Arc<AtomicU32>,
}

impl ProcessCaptureDevice {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: None,
            stdout: None,
            bytes_per_frame: 2,
            pid: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Parse a configured command line such as `"arecord -q -t raw -f S16_LE -r {rate}"`
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program, parts.map(str::to_string).collect()))
    }

    /// First capture program found on `PATH`
    pub fn detect() -> Option<Self> {
        CAPTURE_CANDIDATES.iter().find_map(|(name, args)| {
            let program = which::which(name).ok()?;
            debug!("Using capture program {}", program.display());
            Some(Self::new(program, args.iter().map(|a| a.to_string()).collect()))
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn expand_args(&self, spec: &CaptureSpec) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{rate}", &spec.sample_rate.to_string())
                    .replace("{channels}", &spec.channels.to_string())
            })
            .collect()
    }
}

impl CaptureDevice for ProcessCaptureDevice {
    fn open(&mut self, spec: &CaptureSpec) -> Result<()> {
        if self.child.is_some() {
            return Err(ClipError::CaptureDevice("capture device already open".to_string()));
        }
        let mut child = Command::new(&self.program)
            .args(self.expand_args(spec))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ClipError::CaptureDevice(format!("{}: {}", self.program.display(), e)))?;

        self.stdout = child.stdout.take();
        self.pid.store(child.id(), Ordering::SeqCst);
        self.child = Some(child);
        self.bytes_per_frame = spec.bytes_per_frame();
        debug!("Capture process {} started", self.program.display());
        Ok(())
    }

    fn read(&mut self, chunk_frames: usize) -> Result<Option<Vec<u8>>> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| ClipError::CaptureDevice("capture device is not open".to_string()))?;

        let mut chunk = vec![0u8; chunk_frames * self.bytes_per_frame];
        let mut filled = 0;
        while filled < chunk.len() {
            match stdout.read(&mut chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ClipError::CaptureDevice(e.to_string())),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        // Drop any partial trailing frame
        chunk.truncate(filled - filled % self.bytes_per_frame);
        Ok(Some(chunk))
    }

    fn close(&mut self) {
        self.pid.store(0, Ordering::SeqCst);
        self.stdout = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("Capture process already gone: {}", e);
            }
            let _ = child.wait();
            debug!("Capture process stopped");
        }
    }

    /// SIGTERM the recorder so a blocked read sees end of stream
    #[cfg(unix)]
    fn interrupt_handle(&self) -> Option<CaptureInterrupt> {
        let pid = self.pid.clone();
        Some(Arc::new(move || {
            let pid = pid.swap(0, Ordering::SeqCst);
            if pid == 0 {
                return;
            }
            // SAFETY: kill(2) has no memory-safety preconditions; the pid is
            // cleared before the child is reaped in `close`.
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                debug!("Failed to signal capture process: {}", std::io::Error::last_os_error());
            }
        }))
    }
}

impl Drop for ProcessCaptureDevice {
    fn drop(&mut self) {
        self.close();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeDevice;
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_capture_collects_frames() {
        let device = FakeDevice {
            amplitude: 8000,
            ..Default::default()
        };
        let reads = device.reads.clone();
        let closed = device.closed.clone();
        let mut controller = CaptureController::new(Box::new(device), CaptureSpec::default());

        controller.start_capture().unwrap();
        assert!(controller.is_active());
        wait_for(|| reads.load(Ordering::SeqCst) >= 3);

        let buffer = controller.stop_capture().unwrap();
        assert!(!controller.is_active());
        assert!(closed.load(Ordering::SeqCst));
        assert_eq!(buffer.sample_rate(), DEFAULT_SAMPLE_RATE);
        assert_eq!(buffer.len() % CHUNK_FRAMES, 0);
        assert!(buffer.len() >= 3 * CHUNK_FRAMES);
        assert!(buffer.samples().iter().all(|&s| s == 8000));
    }

    #[test]
    fn test_capture_meters_levels() {
        let device = FakeDevice {
            amplitude: i16::MAX / 2,
            ..Default::default()
        };
        let reads = device.reads.clone();
        let mut controller = CaptureController::new(Box::new(device), CaptureSpec::default());
        let state = controller.shared_state();

        controller.start_capture().unwrap();
        wait_for(|| reads.load(Ordering::SeqCst) >= 2 * LEVEL_DECIMATION as usize);
        assert!(state.volume_level() > 0.0);
        assert!((state.peak_level() - 0.5).abs() < 0.01);
        assert!(state.duration() > 0.0);
        controller.stop_capture().unwrap();
    }

    #[test]
    fn test_double_start_rejected() {
        let device = FakeDevice::default();
        let reads = device.reads.clone();
        let mut controller = CaptureController::new(Box::new(device), CaptureSpec::default());
        controller.start_capture().unwrap();
        assert!(matches!(controller.start_capture(), Err(ClipError::CaptureActive)));
        wait_for(|| reads.load(Ordering::SeqCst) >= 2);
        controller.stop_capture().unwrap();
    }

    #[test]
    fn test_worker_panic_releases_capture() {
        let device = FakeDevice {
            amplitude: 500,
            ..Default::default()
        };
        let panic_on_read = device.panic_on_read.clone();
        let closed = device.closed.clone();
        let reads = device.reads.clone();
        panic_on_read.store(true, Ordering::SeqCst);

        let mut controller = CaptureController::new(Box::new(device), CaptureSpec::default());
        let state = controller.shared_state();
        controller.start_capture().unwrap();
        wait_for(|| !controller.is_active());
        assert_eq!(state.state(), CaptureState::Error);
        assert!(matches!(controller.stop_capture(), Err(ClipError::CaptureDevice(_))));
        assert!(closed.load(Ordering::SeqCst));

        // Same device, next session
        panic_on_read.store(false, Ordering::SeqCst);
        controller.start_capture().unwrap();
        let before = reads.load(Ordering::SeqCst);
        wait_for(|| reads.load(Ordering::SeqCst) >= before + 2);
        let buffer = controller.stop_capture().unwrap();
        assert!(buffer.samples().iter().all(|&s| s == 500));
    }

    #[test]
    fn test_stop_without_start() {
        let mut controller = CaptureController::new(Box::new(FakeDevice::default()), CaptureSpec::default());
        assert!(matches!(controller.stop_capture(), Err(ClipError::CaptureInactive)));
    }

    #[test]
    fn test_no_frames_captured() {
        let device = FakeDevice {
            silent: true,
            ..Default::default()
        };
        let reads = device.reads.clone();
        let mut controller = CaptureController::new(Box::new(device), CaptureSpec::default());
        controller.start_capture().unwrap();
        wait_for(|| reads.load(Ordering::SeqCst) >= 2);
        assert!(matches!(controller.stop_capture(), Err(ClipError::NoFramesCaptured)));
    }

    #[test]
    fn test_device_ending_keeps_frames() {
        let device = FakeDevice {
            end_after: Some(2),
            amplitude: 100,
            ..Default::default()
        };
        let mut controller = CaptureController::new(Box::new(device), CaptureSpec::default());
        let state = controller.shared_state();
        controller.start_capture().unwrap();
        wait_for(|| !controller.is_active());
        assert_eq!(state.state(), CaptureState::Error);

        let buffer = controller.stop_capture().unwrap();
        assert_eq!(buffer.len(), 2 * CHUNK_FRAMES);
    }

    #[test]
    fn test_open_failure_marks_inactive() {
        let device = FakeDevice {
            fail_open: true,
            ..Default::default()
        };
        let mut controller = CaptureController::new(Box::new(device), CaptureSpec::default());
        let state = controller.shared_state();
        controller.start_capture().unwrap();
        wait_for(|| !controller.is_active());
        assert_eq!(state.state(), CaptureState::Error);
        assert!(controller.has_session());
        assert!(matches!(controller.stop_capture(), Err(ClipError::CaptureDevice(_))));

        // The device comes back and can be retried
        assert!(!controller.has_session());
        assert!(controller.start_capture().is_ok());
        let _ = controller.stop_capture();
    }

    #[test]
    fn test_stereo_frames_downmixed() {
        let spec = CaptureSpec {
            channels: 2,
            ..Default::default()
        };
        let frames: Vec<u8> = [1000i16, 3000, -2000, 0]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let buffer = frames_to_buffer(&frames, &spec);
        assert_eq!(buffer.samples(), &[2000, -1000]);
    }

    #[test]
    fn test_command_line_substitution() {
        let device = ProcessCaptureDevice::from_command_line("arecord -r {rate} -c {channels}").unwrap();
        assert_eq!(device.program(), Path::new("arecord"));
        assert_eq!(
            device.expand_args(&CaptureSpec::default()),
            vec!["-r", "44100", "-c", "1"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_process_device_reads_stdout() {
        // `head -c` stands in for a recorder writing raw PCM
        let mut device = ProcessCaptureDevice::new("head", vec!["-c".into(), "4096".into(), "/dev/zero".into()]);
        device.open(&CaptureSpec::default()).unwrap();
        let first = device.read(CHUNK_FRAMES).unwrap().unwrap();
        assert_eq!(first.len(), CHUNK_FRAMES * 2);
        let second = device.read(CHUNK_FRAMES).unwrap().unwrap();
        assert_eq!(second.len(), CHUNK_FRAMES * 2);
        assert!(device.read(CHUNK_FRAMES).unwrap().is_none());
        device.close();
    }

    #[cfg(unix)]
    #[test]
    fn test_stalled_recorder_does_not_block_stop() {
        // `sleep` never writes, so every read blocks until the process dies
        let device = ProcessCaptureDevice::new("sleep", vec!["30".into()]);
        let mut controller = CaptureController::new(Box::new(device), CaptureSpec::default());
        let state = controller.shared_state();
        controller.start_capture().unwrap();
        thread::sleep(Duration::from_millis(100));

        let started = Instant::now();
        assert!(matches!(controller.stop_capture(), Err(ClipError::NoFramesCaptured)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(state.error(), None);
    }
}
