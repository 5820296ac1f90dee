//! Native PipeWire capture device
//!
//! Runs a PipeWire main loop on its own thread and forwards each buffer as
//! s16le bytes over a channel; [`CaptureDevice::read`] drains that channel.

use super::capture::{CaptureDevice, CaptureSpec};
use crate::error::{ClipError, Result};
use log::{debug, warn};
use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long `read` waits for the next PipeWire buffer
const READ_TIMEOUT: Duration = Duration::from_millis(200);

enum PipeWireCommand {
    Stop,
}

/// Microphone capture through the PipeWire daemon
#[derive(Default)]
pub struct PipeWireCaptureDevice {
    receiver: Option<Receiver<Vec<u8>>>,
    sender: Option<pw::channel::Sender<PipeWireCommand>>,
    thread_handle: Option<JoinHandle<()>>,
    pending: Vec<u8>,
    bytes_per_frame: usize,
}

impl PipeWireCaptureDevice {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureDevice for PipeWireCaptureDevice {
    fn open(&mut self, spec: &CaptureSpec) -> Result<()> {
        if self.thread_handle.is_some() {
            return Err(ClipError::CaptureDevice("capture device already open".to_string()));
        }

        let (data_tx, data_rx) = mpsc::sync_channel::<Vec<u8>>(64);
        let (command_tx, command_rx) = pw::channel::channel::<PipeWireCommand>();
        let spec = *spec;

        let handle = thread::Builder::new()
            .name("clipper-pipewire".to_string())
            .spawn(move || {
                if let Err(e) = run_capture_loop(spec, data_tx, command_rx) {
                    warn!("PipeWire capture failed: {}", e);
                }
            })
            .map_err(|e| ClipError::CaptureDevice(format!("Failed to start PipeWire thread: {}", e)))?;

        self.receiver = Some(data_rx);
        self.sender = Some(command_tx);
        self.thread_handle = Some(handle);
        self.pending.clear();
        self.bytes_per_frame = spec.bytes_per_frame();
        Ok(())
    }

    fn read(&mut self, chunk_frames: usize) -> Result<Option<Vec<u8>>> {
        let receiver = self
            .receiver
            .as_ref()
            .ok_or_else(|| ClipError::CaptureDevice("capture device is not open".to_string()))?;

        let wanted = chunk_frames * self.bytes_per_frame;
        while self.pending.len() < wanted {
            match receiver.recv_timeout(READ_TIMEOUT) {
                Ok(bytes) => self.pending.extend_from_slice(&bytes),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) if self.pending.is_empty() => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let take = wanted.min(self.pending.len());
        let take = take - take % self.bytes_per_frame;
        Ok(Some(self.pending.drain(..take).collect()))
    }

    fn close(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(PipeWireCommand::Stop);
        }
        // Drop the receiver first so a blocked sender in the process callback wakes up
        self.receiver = None;
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
        self.pending.clear();
    }
}

impl Drop for PipeWireCaptureDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run the PipeWire capture loop until a stop command arrives
fn run_capture_loop(
    spec: CaptureSpec,
    data_tx: SyncSender<Vec<u8>>,
    receiver: pw::channel::Receiver<PipeWireCommand>,
) -> std::result::Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        PipeWireCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        data_tx: SyncSender<Vec<u8>>,
    }

    let user_data = UserData {
        format: Default::default(),
        data_tx,
    };

    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Capture",
        *pw::keys::MEDIA_ROLE => "Production",
        *pw::keys::APP_NAME => "Clipper",
    };

    let stream = pw::stream::StreamBox::new(&core, "clipper-capture", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .param_changed(|_, user_data, id, param| {
            let Some(param) = param else { return };
            if id != spa::param::ParamType::Format.as_raw() {
                return;
            }
            let Ok((media_type, media_subtype)) = format_utils::parse_format(param) else {
                return;
            };
            if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
                return;
            }
            if let Err(e) = user_data.format.parse(param) {
                warn!("Failed to parse PipeWire audio format: {:?}", e);
            }
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };
            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let size = data.chunk().size() as usize;
            if let Some(raw) = data.data() {
                let bytes = raw[..size.min(raw.len())].to_vec();
                if user_data.data_tx.try_send(bytes).is_err() {
                    debug!("Capture reader is behind, dropping a PipeWire buffer");
                }
            }
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

    // Ask PipeWire to convert to the requested rate and channel count
    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::S16LE);
    audio_info.set_rate(spec.sample_rate);
    audio_info.set_channels(spec.channels as u32);

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };

    let values: Vec<u8> = spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| format!("Failed to serialize audio format: {:?}", e))?
    .0
    .into_inner();

    let pod = Pod::from_bytes(&values).ok_or_else(|| "Invalid audio format pod".to_string())?;
    let mut params = [pod];

    stream
        .connect(
            spa::utils::Direction::Input,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    mainloop.run();
    debug!("PipeWire main loop finished");
    Ok(())
}
