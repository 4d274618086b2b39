//! End-to-end routing: voices through the synth to the master lines.

use vx_engine::{
    route, AudioFlags, AudioId, AudioSignal, ChannelId, Engine, Port, PortValue, Shared, Template,
    Topology, VoiceSpec,
};
use vx_ir::{Presets, RecallFlags, RecallKind, SampleBuffer, SampleFormat, SoundScope};

struct Rig {
    engine: Engine,
    synth: AudioId,
    input: ChannelId,
}

fn rig(buffer_size: usize) -> Rig {
    let presets = Presets::new(1, 48000, buffer_size, SampleFormat::Float);
    let mut topo = Topology::new();
    let synth = topo.add_audio("synth", AudioFlags::all_abilities(), presets, (1, 1), (1, 1));
    let master = topo.add_audio("master", AudioFlags::all_abilities(), presets, (1, 1), (0, 0));
    let input = topo.audio(synth).unwrap().inputs[0];
    let output = topo.audio(synth).unwrap().outputs[0];
    let sink = topo.audio(master).unwrap().inputs[0];
    topo.link(output, sink);
    topo.set_master(master);

    let mut engine = Engine::new(topo, presets, 120.0);
    engine.add_template(Template::new("buffer", RecallKind::Buffer, synth).on_channel(input));
    engine.add_template(
        Template::new("mix", RecallKind::Buffer, synth)
            .on_channel(output)
            .with_flags(RecallFlags::output().persistent()),
    );
    Rig { engine, synth, input }
}

/// Distinct, exactly representable samples.
fn ramp(len: usize) -> Vec<f64> {
    (0..len).map(|i| (i as f64 + 1.0) / 1024.0).collect()
}

fn samples(buf: &SampleBuffer) -> Vec<f64> {
    (0..buf.len()).map(|i| buf.get_f64(i)).collect()
}

fn start(rig: &mut Rig, tag: u64, data: Vec<f64>, attack: usize) {
    let spec = VoiceSpec::new(tag, rig.synth, &[rig.input]).with_samples(data);
    rig.engine.start_voice(SoundScope::Playback, spec, attack).unwrap();
}

#[test]
fn aligned_voice_reaches_master_unchanged() {
    let mut rig = rig(512);
    let src = ramp(512);
    start(&mut rig, 1, src.clone(), 0);
    let mut slot = rig.engine.new_slot();
    rig.engine.tick(&mut slot);
    assert_eq!(samples(&slot), src);

    rig.engine.tick(&mut slot);
    assert!(slot.is_silent());
}

#[test]
fn attack_splits_voice_across_two_buffers() {
    let mut rig = rig(512);
    let src = ramp(512);
    start(&mut rig, 1, src.clone(), 128);
    let mut slot = rig.engine.new_slot();

    rig.engine.tick(&mut slot);
    let first = samples(&slot);
    assert!(first[..128].iter().all(|&s| s == 0.0));
    assert_eq!(&first[128..], &src[..384]);

    rig.engine.tick(&mut slot);
    let second = samples(&slot);
    assert_eq!(&second[..128], &src[384..]);
    assert!(second[128..].iter().all(|&s| s == 0.0));
}

#[test]
fn voices_on_one_output_are_summed() {
    let mut rig = rig(8);
    start(&mut rig, 1, vec![0.25; 8], 0);
    start(&mut rig, 2, vec![0.5; 8], 0);
    let mut slot = rig.engine.new_slot();
    rig.engine.tick(&mut slot);
    assert_eq!(slot, SampleBuffer::Float(vec![0.75; 8]));
}

#[test]
fn sibling_voice_is_not_delivered() {
    let presets = Presets::new(1, 48000, 8, SampleFormat::Float);
    let mut topo = Topology::new();
    let a = topo.add_audio("a", AudioFlags::all_abilities(), presets, (1, 2), (1, 2));
    let (inputs, outputs) = {
        let audio = topo.audio(a).unwrap();
        (audio.inputs.clone(), audio.outputs.clone())
    };
    let shared = Shared::new(topo);
    let src_a = shared.topology.recyclings_of(inputs[0])[0];
    let src_b = shared.topology.recyclings_of(inputs[1])[0];
    let dest = shared.topology.recyclings_of(outputs[0])[0];

    let (ctx_a, ctx_b) = {
        let mut contexts = shared.contexts();
        let root = contexts.create(&[]);
        let ctx_a = contexts.create(&[src_a, dest]);
        let ctx_b = contexts.create(&[src_b]);
        contexts.add_child(root, ctx_a);
        contexts.add_child(root, ctx_b);
        (ctx_a, ctx_b)
    };
    let add = |rec, ctx, value| {
        let mut rec = shared.topology.lock(rec).unwrap();
        let mut signal = AudioSignal::template(presets).instantiate(SoundScope::Playback, ctx, 0);
        signal.load_normalized(&[value; 8]);
        shared.contexts().retain(ctx);
        rec.add(signal)
    };
    let sig_a = add(src_a, ctx_a, 0.25);
    let sig_b = add(src_b, ctx_b, 0.5);

    let report_b = route(&shared, src_b, sig_b, &[dest]);
    assert_eq!((report_b.delivered, report_b.skipped), (0, 1));
    let report_a = route(&shared, src_a, sig_a, &[dest]);
    assert_eq!((report_a.delivered, report_a.skipped), (1, 0));

    let rec = shared.topology.lock(dest).unwrap();
    let id = rec.find_destination(SoundScope::Playback).unwrap();
    assert_eq!(
        rec.get(id).unwrap().current(),
        Some(&SampleBuffer::Float(vec![0.25; 8]))
    );
}

fn two_buffer_voice(rig: &mut Rig) -> Vec<f64> {
    let mut data = vec![0.25; 8];
    data.extend([0.5; 8]);
    start(rig, 1, data.clone(), 4);
    data
}

#[test]
fn without_backlog_the_tail_carries_over() {
    let mut rig = rig(8);
    two_buffer_voice(&mut rig);
    let mut slot = rig.engine.new_slot();
    rig.engine.tick(&mut slot);
    assert_eq!(samples(&slot), [0.0, 0.0, 0.0, 0.0, 0.25, 0.25, 0.25, 0.25]);
    rig.engine.tick(&mut slot);
    assert_eq!(samples(&slot), [0.25, 0.25, 0.25, 0.25, 0.5, 0.5, 0.5, 0.5]);
}

#[test]
fn backlog_resyncs_before_the_next_write() {
    let mut rig = rig(8);
    two_buffer_voice(&mut rig);
    let mut slot = rig.engine.new_slot();
    rig.engine.tick(&mut slot);
    rig.engine.report_backlog();
    rig.engine.tick(&mut slot);
    // the late buffer's tail is dropped, never mixed with the new write
    assert_eq!(samples(&slot), [0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.5, 0.5]);
}

#[test]
fn voice_runs_through_an_effect_chain() {
    let presets = Presets::new(1, 48000, 4, SampleFormat::Float);
    let mut topo = Topology::new();
    let synth = topo.add_audio("synth", AudioFlags::all_abilities(), presets, (1, 1), (1, 1));
    let fx = topo.add_audio("fx", AudioFlags::all_abilities(), presets, (1, 1), (1, 1));
    let master = topo.add_audio("master", AudioFlags::all_abilities(), presets, (1, 1), (0, 0));
    let synth_in = topo.audio(synth).unwrap().inputs[0];
    let synth_out = topo.audio(synth).unwrap().outputs[0];
    let fx_in = topo.audio(fx).unwrap().inputs[0];
    let fx_out = topo.audio(fx).unwrap().outputs[0];
    let sink = topo.audio(master).unwrap().inputs[0];
    assert!(topo.link(synth_out, fx_in));
    assert!(topo.link(fx_out, sink));
    topo.set_master(master);
    let fx_rec = topo.recyclings_of(fx_in)[0];

    let mut engine = Engine::new(topo, presets, 120.0);
    engine.add_template(Template::new("buffer", RecallKind::Buffer, synth).on_channel(synth_in));
    engine.add_template(
        Template::new("mix", RecallKind::Buffer, synth)
            .on_channel(synth_out)
            .with_flags(RecallFlags::output().persistent()),
    );
    engine.add_template(
        Template::new("fx volume", RecallKind::Volume, fx)
            .on_channel(fx_in)
            .with_port(Port::new("volume", PortValue::Double(0.5))),
    );
    engine.add_template(Template::new("fx buffer", RecallKind::Buffer, fx).on_channel(fx_in));
    engine.add_template(
        Template::new("fx mix", RecallKind::Buffer, fx)
            .on_channel(fx_out)
            .with_flags(RecallFlags::output().persistent()),
    );

    let spec = VoiceSpec::new(1, synth, &[synth_in]).with_samples(vec![0.5; 8]);
    engine.start_voice(SoundScope::Playback, spec, 0).unwrap();

    let mut slot = engine.new_slot();
    engine.tick(&mut slot);
    assert_eq!(slot, SampleBuffer::Float(vec![0.25; 4]));
    engine.tick(&mut slot);
    assert_eq!(slot, SampleBuffer::Float(vec![0.25; 4]));
    engine.tick(&mut slot);
    assert!(slot.is_silent());

    for _ in 0..12 {
        engine.tick(&mut slot);
    }
    assert_eq!(engine.active_voices(), 0);
    assert!(engine.shared().topology.lock(fx_rec).unwrap().is_empty());
}
