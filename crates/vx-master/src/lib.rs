//! Session controller for the voxgraph audio host.
//!
//! Owns the engine, opens the configured backend on a dedicated audio
//! thread and renders offline through the null backend. The control side
//! talks to a running engine only through its task launcher and ports.

mod config;
mod wav;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use vx_audio::{AudioError, Backend, BackendEvent, CpalOutput, NullBackend};
use vx_engine::tasks::ReportBacklog;
use vx_engine::{Engine, Port, Shared, Task, TaskLauncher, Template, TemplateId, Topology};

pub use config::{BackendKind, ConfigError, SessionConfig};
pub use vx_ir::{Presets, SampleBuffer};
pub use wav::{slots_to_wav, write_wav};

/// How long [`Controller::run_task`] waits for a running engine.
const TASK_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors from the session controller.
#[derive(Debug)]
pub enum ControlError {
    Config(ConfigError),
    Audio(AudioError),
    /// The engine is on the audio thread; stop playback first.
    Busy,
    /// A task did not run within the timeout.
    Timeout,
    Io(std::io::Error),
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlError::Config(e) => write!(f, "{}", e),
            ControlError::Audio(e) => write!(f, "{}", e),
            ControlError::Busy => write!(f, "Engine is playing"),
            ControlError::Timeout => write!(f, "Task timed out"),
            ControlError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for ControlError {}

impl From<ConfigError> for ControlError {
    fn from(e: ConfigError) -> Self {
        ControlError::Config(e)
    }
}

impl From<AudioError> for ControlError {
    fn from(e: AudioError) -> Self {
        ControlError::Audio(e)
    }
}

impl From<std::io::Error> for ControlError {
    fn from(e: std::io::Error) -> Self {
        ControlError::Io(e)
    }
}

/// Session root: configuration snapshot, engine and playback thread.
pub struct Controller {
    config: Arc<SessionConfig>,
    /// `None` while the audio thread owns it.
    engine: Option<Engine>,
    launcher: Arc<TaskLauncher<Engine>>,
    shared: Arc<Shared>,
    templates: Vec<Arc<Template>>,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    stop_signal: Arc<AtomicBool>,
    buffers: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<Engine>>,
}

impl Controller {
    /// Build the engine over `topology` with the session's presets.
    pub fn new(config: SessionConfig, topology: Topology) -> Result<Self, ControlError> {
        config.validate()?;
        let engine = Engine::new(topology, config.presets, config.bpm);
        info!(
            backend = ?config.backend,
            samplerate = config.presets.samplerate,
            buffer_size = config.presets.buffer_size,
            "session created"
        );
        Ok(Self {
            config: Arc::new(config),
            launcher: engine.launcher(),
            shared: engine.shared().clone(),
            engine: Some(engine),
            templates: Vec::new(),
            playback: None,
        })
    }

    pub fn config(&self) -> &Arc<SessionConfig> {
        &self.config
    }

    pub fn launcher(&self) -> &Arc<TaskLauncher<Engine>> {
        &self.launcher
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// The engine, while nothing is playing.
    pub fn engine_mut(&mut self) -> Option<&mut Engine> {
        self.engine.as_mut()
    }

    pub fn add_template(&mut self, template: Template) -> Result<TemplateId, ControlError> {
        let engine = self.engine.as_mut().ok_or(ControlError::Busy)?;
        let id = engine.add_template(template);
        if let Some(t) = engine.template(id) {
            self.templates.push(t.clone());
        }
        Ok(id)
    }

    /// A template's port. Valid while playing.
    pub fn port(&self, template: TemplateId, name: &str) -> Option<Arc<Port>> {
        self.templates.get(template.index())?.port(name).cloned()
    }

    /// Run `task` against the engine and wait for it.
    ///
    /// While playing this is a hand-off to the audio thread; otherwise the
    /// task runs here.
    pub fn run_task(&mut self, task: impl Task<Engine> + 'static) -> Result<(), ControlError> {
        match self.engine.as_mut() {
            Some(engine) => {
                self.launcher.add_task(task);
                self.launcher.run(engine);
                Ok(())
            }
            None => {
                if self.launcher.sync_run_timeout(task, TASK_TIMEOUT) {
                    Ok(())
                } else {
                    Err(ControlError::Timeout)
                }
            }
        }
    }

    // --- Real-time playback ---

    pub fn play(&mut self) -> Result<(), ControlError> {
        let engine = self.engine.take().ok_or(ControlError::Busy)?;
        let config = self.config.clone();
        let stop_signal = Arc::new(AtomicBool::new(false));
        let buffers = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stop = stop_signal.clone();
        let count = buffers.clone();
        let done = finished.clone();

        let thread = std::thread::Builder::new()
            .name("vx-audio".into())
            .spawn(move || audio_thread(engine, config, stop, count, done))?;

        self.playback = Some(PlaybackHandle {
            stop_signal,
            buffers,
            finished,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Stop the audio thread and take the engine back.
    pub fn stop(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.thread.take() {
                match handle.join() {
                    Ok(engine) => self.engine = Some(engine),
                    Err(_) => error!("audio thread panicked"),
                }
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    /// Buffers produced by the current playback.
    pub fn buffers_rendered(&self) -> u64 {
        self.playback
            .as_ref()
            .map_or(0, |p| p.buffers.load(Ordering::Relaxed))
    }

    // --- Offline rendering ---

    /// Render `count` buffers through a null backend.
    pub fn render_offline(&mut self, count: usize) -> Result<Vec<SampleBuffer>, ControlError> {
        let engine = self.engine.as_mut().ok_or(ControlError::Busy)?;
        let mut backend = NullBackend::new(self.config.presets, self.config.slot_count)?;
        backend.start()?;
        for _ in 0..count {
            pump(engine, &mut backend)?;
        }
        backend.stop()?;
        Ok(backend.take_captured())
    }

    pub fn render_to_wav(&mut self, count: usize) -> Result<Vec<u8>, ControlError> {
        let slots = self.render_offline(count)?;
        Ok(wav::slots_to_wav(&slots, self.config.presets)?)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_backend(config: &SessionConfig) -> Result<Box<dyn Backend>, AudioError> {
    Ok(match config.backend {
        BackendKind::Cpal => Box::new(CpalOutput::new(config.presets, config.slot_count)?),
        BackendKind::Null => Box::new(NullBackend::new(config.presets, config.slot_count)?),
    })
}

/// Handle pending backend events, then fill and commit one slot if one is
/// free. Returns whether a slot was produced.
fn pump(engine: &mut Engine, backend: &mut dyn Backend) -> Result<bool, AudioError> {
    while let Some(event) = backend.poll_event() {
        match event {
            BackendEvent::Underrun => {
                warn!(buffer = engine.clock().buffers(), "backend underrun");
                engine.launcher().add_task(ReportBacklog);
            }
            BackendEvent::DeviceLost => {
                engine.backend_failed();
                return Err(AudioError::Playback("device lost".into()));
            }
        }
    }
    let Some(slot) = backend.get_next_slot() else {
        return Ok(false);
    };
    // tick zero-fills the slot before mixing into it
    let mut guard = backend.lock(slot)?;
    engine.tick(&mut guard);
    backend.unlock(guard);
    backend.commit()?;
    Ok(true)
}

fn audio_thread(
    mut engine: Engine,
    config: Arc<SessionConfig>,
    stop_signal: Arc<AtomicBool>,
    buffers: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
) -> Engine {
    let started = open_backend(&config).and_then(|mut backend| {
        backend.start()?;
        Ok(backend)
    });
    let mut backend = match started {
        Ok(backend) => backend,
        Err(e) => {
            error!(error = %e, "could not open audio backend");
            engine.backend_failed();
            finished.store(true, Ordering::Relaxed);
            return engine;
        }
    };
    info!(slots = backend.slot_count(), "audio thread running");

    while !stop_signal.load(Ordering::Relaxed) {
        match pump(&mut engine, backend.as_mut()) {
            Ok(true) => {
                buffers.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => std::thread::sleep(Duration::from_micros(500)),
            Err(e) => {
                error!(error = %e, "audio backend failed");
                break;
            }
        }
    }

    if let Err(e) = backend.stop() {
        warn!(error = %e, "backend stop failed");
    }
    debug!(buffers = buffers.load(Ordering::Relaxed), "audio thread stopped");
    finished.store(true, Ordering::Relaxed);
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use vx_engine::tasks::StartVoice;
    use vx_engine::{AudioFlags, AudioId, ChannelId, VoiceSpec};
    use vx_ir::{RecallFlags, RecallKind, SampleFormat, SoundScope};

    fn config() -> SessionConfig {
        SessionConfig {
            backend: BackendKind::Null,
            presets: Presets::new(1, 48000, 4, SampleFormat::S16),
            slot_count: 2,
            bpm: 120.0,
        }
    }

    fn session() -> (Controller, AudioId, ChannelId) {
        let presets = config().presets;
        let mut topo = Topology::new();
        let synth = topo.add_audio("synth", AudioFlags::all_abilities(), presets, (1, 1), (1, 1));
        let master = topo.add_audio("master", AudioFlags::all_abilities(), presets, (1, 1), (0, 0));
        let input = topo.audio(synth).unwrap().inputs[0];
        let output = topo.audio(synth).unwrap().outputs[0];
        let sink = topo.audio(master).unwrap().inputs[0];
        topo.link(output, sink);
        topo.set_master(master);

        let mut ctl = Controller::new(config(), topo).unwrap();
        ctl.add_template(Template::new("buffer", RecallKind::Buffer, synth).on_channel(input))
            .unwrap();
        ctl.add_template(
            Template::new("mix", RecallKind::Buffer, synth)
                .on_channel(output)
                .with_flags(RecallFlags::output().persistent()),
        )
        .unwrap();
        (ctl, synth, input)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = SessionConfig {
            slot_count: 1,
            ..config()
        };
        assert!(matches!(
            Controller::new(bad, Topology::new()),
            Err(ControlError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn offline_render_carries_a_voice() {
        let (mut ctl, synth, input) = session();
        let spec = VoiceSpec::new(1, synth, &[input]).with_samples(vec![0.5; 4]);
        ctl.run_task(StartVoice::new(SoundScope::Playback, spec, 0)).unwrap();
        let slots = ctl.render_offline(3).unwrap();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0], SampleBuffer::S16(vec![16384; 4]));
        assert!(slots[1].is_silent());
        // the ring has two slots, so the third buffer reuses the first one
        assert!(slots[2].is_silent());
    }

    #[test]
    fn wav_render_has_header() {
        let (mut ctl, _, _) = session();
        let wav = ctl.render_to_wav(2).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(wav.len(), 44 + 2 * 4 * 2);
    }

    #[test]
    fn play_hands_engine_to_thread_and_back() {
        let (mut ctl, synth, input) = session();
        ctl.play().unwrap();
        assert!(ctl.engine_mut().is_none());
        assert!(matches!(ctl.render_offline(1), Err(ControlError::Busy)));

        let spec = VoiceSpec::new(1, synth, &[input]).with_samples(vec![0.5; 4]);
        ctl.run_task(StartVoice::new(SoundScope::Playback, spec, 0)).unwrap();
        let started = ctl.buffers_rendered();
        while ctl.buffers_rendered() < started + 4 {
            std::thread::yield_now();
        }
        ctl.stop();
        assert!(!ctl.is_playing());
        let engine = ctl.engine_mut().unwrap();
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn ports_stay_reachable_while_playing() {
        let (mut ctl, synth, input) = session();
        let id = ctl
            .add_template(
                Template::new("vol", RecallKind::Volume, synth)
                    .on_channel(input)
                    .with_port(Port::new("volume", vx_engine::PortValue::Double(1.0))),
            )
            .unwrap();
        ctl.play().unwrap();
        let port = ctl.port(id, "volume").unwrap();
        port.safe_write(vx_engine::PortValue::Double(0.5)).unwrap();
        assert_eq!(port.read_f64(), 0.5);
        ctl.stop();
    }
}
