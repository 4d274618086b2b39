//! Control-side hand-off, scopes and the backend slot ring.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use vx_audio::{Backend, BackendEvent, NullBackend};
use vx_engine::tasks::{StartVoice, StopVoice};
use vx_engine::{AudioFlags, AudioId, ChannelId, Engine, Template, Topology, VoiceSpec};
use vx_ir::{Presets, RecallFlags, RecallKind, SampleBuffer, SampleFormat, SoundScope};
use vx_master::{BackendKind, Controller, SessionConfig};

fn presets() -> Presets {
    Presets::new(2, 48000, 4, SampleFormat::S16)
}

/// Stereo synth into a stereo master.
fn topology() -> (Topology, AudioId, Vec<ChannelId>) {
    let mut topo = Topology::new();
    let synth = topo.add_audio("synth", AudioFlags::all_abilities(), presets(), (1, 2), (1, 2));
    let master = topo.add_audio("master", AudioFlags::all_abilities(), presets(), (1, 2), (0, 0));
    let inputs = topo.audio(synth).unwrap().inputs.clone();
    let outputs = topo.audio(synth).unwrap().outputs.clone();
    let sinks = topo.audio(master).unwrap().inputs.clone();
    for (o, s) in outputs.iter().zip(&sinks) {
        topo.link(*o, *s);
    }
    topo.set_master(master);
    (topo, synth, inputs)
}

fn install(engine: &mut Engine, synth: AudioId) {
    let (inputs, outputs) = {
        let audio = engine.shared().topology.audio(synth).unwrap();
        (audio.inputs.clone(), audio.outputs.clone())
    };
    for input in inputs {
        engine.add_template(Template::new("buffer", RecallKind::Buffer, synth).on_channel(input));
    }
    for output in outputs {
        engine.add_template(
            Template::new("mix", RecallKind::Buffer, synth)
                .on_channel(output)
                .with_flags(RecallFlags::output().persistent()),
        );
    }
}

#[test]
fn voice_lines_land_on_interleaved_channels() {
    let (topo, synth, inputs) = topology();
    let mut engine = Engine::new(topo, presets(), 120.0);
    install(&mut engine, synth);
    let left = VoiceSpec::new(1, synth, &inputs[..1]).with_samples(vec![0.5; 4]);
    let right = VoiceSpec::new(2, synth, &inputs[1..]).with_samples(vec![-0.25; 4]);
    engine.start_voice(SoundScope::Playback, left, 0).unwrap();
    engine.start_voice(SoundScope::Playback, right, 0).unwrap();

    let mut slot = engine.new_slot();
    engine.tick(&mut slot);
    assert_eq!(
        slot,
        SampleBuffer::S16(vec![16384, -8192, 16384, -8192, 16384, -8192, 16384, -8192])
    );
}

#[test]
fn scopes_keep_separate_voices() {
    let (topo, synth, inputs) = topology();
    let mut engine = Engine::new(topo, presets(), 120.0);
    install(&mut engine, synth);
    let spec = VoiceSpec::new(1, synth, &inputs).with_samples(vec![0.25; 4]);
    engine.start_voice(SoundScope::Sequencer, spec.clone(), 0).unwrap();
    engine.start_voice(SoundScope::Notation, spec, 0).unwrap();

    assert!(engine.processor(SoundScope::Playback).voices().is_empty());
    assert_eq!(engine.processor(SoundScope::Sequencer).voices().len(), 1);
    assert_eq!(engine.processor(SoundScope::Notation).voices().len(), 1);

    // both scopes mix into the same master lines
    let mut slot = engine.new_slot();
    engine.tick(&mut slot);
    assert_eq!(slot, SampleBuffer::S16(vec![16384; 8]));
}

#[test]
fn sync_run_waits_for_the_audio_side() {
    let (topo, synth, inputs) = topology();
    let mut engine = Engine::new(topo, presets(), 120.0);
    install(&mut engine, synth);
    let launcher = engine.launcher();

    let worker = thread::spawn(move || {
        let mut slot = engine.new_slot();
        for _ in 0..10_000 {
            engine.tick(&mut slot);
            if engine.active_voices() > 0 {
                return true;
            }
            thread::sleep(Duration::from_micros(100));
        }
        false
    });

    let spec = VoiceSpec::new(1, synth, &inputs).with_samples(vec![0.5; 400]);
    launcher.sync_run(StartVoice::new(SoundScope::Playback, spec, 0));
    assert!(worker.join().unwrap());
}

#[test]
fn stop_voice_task_ends_the_voice() {
    let (topo, synth, inputs) = topology();
    let mut engine = Engine::new(topo, presets(), 120.0);
    install(&mut engine, synth);
    let launcher = engine.launcher();
    let spec = VoiceSpec::new(7, synth, &inputs).with_samples(vec![0.5; 400]);
    launcher.add_task(StartVoice::new(SoundScope::Playback, spec, 0));

    let mut slot = engine.new_slot();
    engine.tick(&mut slot);
    assert_eq!(engine.active_voices(), 1);
    launcher.add_task(StopVoice {
        scope: SoundScope::Playback,
        tag: 7,
    });
    engine.tick(&mut slot);
    assert_eq!(engine.active_voices(), 0);
}

#[test]
fn null_backend_rotates_through_every_slot() {
    let (topo, synth, inputs) = topology();
    let mut engine = Engine::new(topo, presets(), 120.0);
    install(&mut engine, synth);
    let spec = VoiceSpec::new(1, synth, &inputs).with_samples(vec![0.5; 8]);
    engine.start_voice(SoundScope::Playback, spec, 0).unwrap();

    let mut backend = NullBackend::new(presets(), 3).unwrap();
    let mut used = Vec::new();
    for _ in 0..6 {
        let slot = backend.get_next_slot().unwrap();
        used.push(slot);
        backend.clear(slot).unwrap();
        let mut guard = backend.lock(slot).unwrap();
        engine.tick(&mut guard);
        backend.unlock(guard);
        backend.commit().unwrap();
    }
    assert_eq!(used, vec![0, 1, 2, 0, 1, 2]);
    let captured = backend.captured();
    assert_eq!(captured[0], SampleBuffer::S16(vec![16384; 8]));
    assert_eq!(captured[1], SampleBuffer::S16(vec![16384; 8]));
    assert!(captured[2..].iter().all(SampleBuffer::is_silent));

    backend.inject(BackendEvent::Underrun);
    assert_eq!(backend.poll_event(), Some(BackendEvent::Underrun));
}

#[test]
fn controller_renders_through_config() {
    let (topo, synth, inputs) = topology();
    let config = SessionConfig::parse(
        r#"
        backend = "null"
        slot_count = 2

        [presets]
        pcm_channels = 2
        samplerate = 48000
        buffer_size = 4
        format = "s16"
        "#,
    )
    .unwrap();
    assert_eq!(config.backend, BackendKind::Null);

    let mut ctl = Controller::new(config, topo).unwrap();
    install(ctl.engine_mut().unwrap(), synth);
    let spec = VoiceSpec::new(1, synth, &inputs).with_samples(vec![0.5; 4]);
    ctl.run_task(StartVoice::new(SoundScope::Playback, spec, 0)).unwrap();

    let wav = ctl.render_to_wav(2).unwrap();
    assert_eq!(&wav[0..4], b"RIFF");
    let first = i16::from_le_bytes([wav[44], wav[45]]);
    assert_eq!(first, 16384);
    assert_eq!(Arc::strong_count(ctl.config()), 1);
}
