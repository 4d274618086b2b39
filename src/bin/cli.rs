//! voxgraph CLI: headless demo session, live or rendered to WAV.
//!
//! Usage:
//!   cargo run --bin vx-cli
//!   cargo run --bin vx-cli -- --config session.toml --wav out.wav --seconds 4

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use std::{env, fs};

use tracing::info;
use vx_engine::tasks::{ApplyAutomation, StopVoice};
use vx_engine::{
    AudioFlags, AudioId, ChannelId, Port, PortFlags, PortValue, Template, Topology, Units,
    VoiceEvent, VoiceSpec,
};
use vx_ir::{
    Automation, AutomationPoint, Conversion, CurveKind, RecallFlags, RecallKind, SoundScope,
    Timestamp,
};
use vx_master::{Controller, SessionConfig};

fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let args: Vec<String> = env::args().collect();
    let arg = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    let config = match arg("--config") {
        Some(path) => SessionConfig::load(Path::new(&path)).unwrap_or_else(|e| {
            eprintln!("Failed to load {}: {}", path, e);
            std::process::exit(1);
        }),
        None => SessionConfig::default(),
    };
    let seconds: f64 = arg("--seconds").and_then(|s| s.parse().ok()).unwrap_or(4.0);

    let (topology, synth, inputs, outputs) = demo_topology(&config);
    let mut ctrl = Controller::new(config, topology).unwrap_or_else(|e| {
        eprintln!("Failed to create session: {}", e);
        std::process::exit(1);
    });
    let volume = install_templates(&mut ctrl, synth, &inputs, &outputs);
    schedule_arpeggio(&mut ctrl, synth, &inputs);

    let buffers = (seconds / ctrl.config().presets.buffer_seconds()).ceil() as usize;
    match arg("--wav") {
        Some(path) => render_to_wav(&mut ctrl, &path, buffers),
        None => play_audio(&mut ctrl, volume, buffers),
    }
}

fn demo_topology(config: &SessionConfig) -> (Topology, AudioId, Vec<ChannelId>, Vec<ChannelId>) {
    let presets = config.presets;
    let lines = presets.pcm_channels as usize;
    let mut topo = Topology::new();
    let synth = topo.add_audio("synth", AudioFlags::all_abilities(), presets, (1, lines), (1, lines));
    let master = topo.add_audio("master", AudioFlags::all_abilities(), presets, (1, lines), (0, 0));
    let (inputs, outputs) = match topo.audio(synth) {
        Some(a) => (a.inputs.clone(), a.outputs.clone()),
        None => (Vec::new(), Vec::new()),
    };
    let sinks = topo.audio(master).map(|a| a.inputs.clone()).unwrap_or_default();
    for (out, sink) in outputs.iter().zip(&sinks) {
        topo.link(*out, *sink);
    }
    topo.set_master(master);
    (topo, synth, inputs, outputs)
}

/// Voice container with playback, fade-out and buffer recalls, an automated
/// volume, and the output mix.
fn install_templates(
    ctrl: &mut Controller,
    synth: AudioId,
    inputs: &[ChannelId],
    outputs: &[ChannelId],
) -> Arc<Port> {
    let add = |ctrl: &mut Controller, t: Template| {
        ctrl.add_template(t).unwrap_or_else(|e| {
            eprintln!("Failed to add template: {}", e);
            std::process::exit(1);
        })
    };

    let voice = add(
        ctrl,
        Template::new("voice", RecallKind::Container, synth).with_flags(RecallFlags::container()),
    );
    let volume = add(
        ctrl,
        Template::new("volume", RecallKind::Volume, synth).with_port(
            Port::new("volume", PortValue::Double(1.0))
                .with_flags(PortFlags {
                    convert_always: true,
                    ..Default::default()
                })
                .with_conversion(Conversion::linear(0.0, 1.0)),
        ),
    );
    let counter = add(
        ctrl,
        Template::new("length", RecallKind::Counter, synth)
            .child_of(voice)
            .with_port(Port::new("length", PortValue::Uint(40))),
    );
    add(
        ctrl,
        Template::new("fade", RecallKind::Fade, synth)
            .child_of(voice)
            .depends_on(counter)
            .with_port(Port::new("from", PortValue::Double(1.0)))
            .with_port(Port::new("to", PortValue::Double(0.0))),
    );
    for &input in inputs {
        add(
            ctrl,
            Template::new("play", RecallKind::Playback, synth)
                .on_channel(input)
                .child_of(voice),
        );
        add(
            ctrl,
            Template::new("buffer", RecallKind::Buffer, synth)
                .on_channel(input)
                .child_of(voice),
        );
    }
    for &output in outputs {
        add(
            ctrl,
            Template::new("mix", RecallKind::Buffer, synth)
                .on_channel(output)
                .with_flags(RecallFlags::output().persistent()),
        );
    }

    let port = ctrl.port(volume, "volume").unwrap_or_else(|| {
        eprintln!("volume port missing");
        std::process::exit(1);
    });
    port.bind_automation(Automation::new(
        &[
            AutomationPoint {
                dt: 0,
                value: 0.2,
                curve: CurveKind::SineQuarter,
            },
            AutomationPoint::linear(16, 0.8),
            AutomationPoint::linear(16, 0.2),
        ],
        true,
    ));
    port
}

fn sine(freq: f64, samplerate: u32, seconds: f64) -> Vec<f64> {
    let len = (samplerate as f64 * seconds) as usize;
    (0..len)
        .map(|i| 0.25 * (std::f64::consts::TAU * freq * i as f64 / samplerate as f64).sin())
        .collect()
}

fn schedule_arpeggio(ctrl: &mut Controller, synth: AudioId, inputs: &[ChannelId]) {
    let samplerate = ctrl.config().presets.samplerate;
    let Some(engine) = ctrl.engine_mut() else {
        return;
    };
    let notes = [220.0, 277.18, 329.63, 440.0];
    for (i, freq) in notes.iter().cycle().take(16).enumerate() {
        let spec = VoiceSpec::new(i as u64, synth, inputs).with_samples(sine(*freq, samplerate, 0.5));
        let time = Timestamp::with_offset(i as u64 * 2, 0.25);
        engine.schedule(VoiceEvent::start(time, SoundScope::Playback, spec));
    }
    // cut the last note short
    engine.schedule(VoiceEvent::stop(Timestamp::from_ticks(31), SoundScope::Playback, 15));
}

fn play_audio(ctrl: &mut Controller, volume: Arc<Port>, buffers: usize) {
    ctrl.launcher().add_cyclic_task(ApplyAutomation {
        port: volume,
        units: Units::Normalized,
    });
    if let Err(e) = ctrl.play() {
        eprintln!("Failed to start playback: {}", e);
        std::process::exit(1);
    }
    println!("Playing...");

    while ctrl.is_playing() && ctrl.buffers_rendered() < buffers as u64 {
        print!("\rBuffers: {:>6}", ctrl.buffers_rendered());
        let _ = std::io::stdout().flush();
        std::thread::sleep(Duration::from_millis(10));
    }
    let _ = ctrl.run_task(StopVoice {
        scope: SoundScope::Playback,
        tag: 15,
    });
    ctrl.stop();
    println!("\rDone.          ");
}

fn render_to_wav(ctrl: &mut Controller, path: &str, buffers: usize) {
    println!("Rendering {} buffers to {}...", buffers, path);
    let wav = ctrl.render_to_wav(buffers).unwrap_or_else(|e| {
        eprintln!("Failed to render: {}", e);
        std::process::exit(1);
    });
    info!(bytes = wav.len(), "rendered");

    fs::write(path, &wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path, e);
        std::process::exit(1);
    });
    println!("Done.");
}
