//! Step functions: what each recall kind does on one tick.
//!
//! Dispatch goes through a table indexed by [`RecallKind`]; there is no
//! per-kind type hierarchy.

use std::sync::Arc;

use tracing::warn;
use vx_ir::{RecallKind, SoundScope};

use crate::context::RecallId;
use crate::plugin::PluginIo;
use crate::recall::{InstanceData, InstanceId, RecallGraph, Template};
use crate::recycling::SignalId;
use crate::routing::route;
use crate::shared::Shared;
use crate::topology::{ChannelId, RecyclingId};

/// Everything a step function may touch besides the graph.
pub struct StepEnv<'a> {
    pub shared: &'a Shared,
    pub scope: SoundScope,
}

/// Whether the instance keeps running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    Done,
}

pub type StepFn = fn(&mut RecallGraph, InstanceId, &StepEnv<'_>) -> StepOutcome;

/// Step function per [`RecallKind`], in `RecallKind::index` order.
pub static STEPS: [StepFn; RecallKind::COUNT] = [
    step_container,
    step_buffer,
    step_playback,
    step_volume,
    step_counter,
    step_fade,
    step_plugin,
];

/// Run one tick of an instance, marking it done when its step finishes.
pub fn run_instance(graph: &mut RecallGraph, id: InstanceId, env: &StepEnv<'_>) -> StepOutcome {
    let Some(kind) = graph.template_of(id).map(|t| t.kind) else {
        return StepOutcome::Done;
    };
    let outcome = STEPS[kind.index()](graph, id, env);
    if outcome == StepOutcome::Done {
        if let Err(e) = graph.done(id) {
            warn!(scope = env.scope.name(), ?id, error = %e, "done failed");
        }
    }
    outcome
}

fn lookup(graph: &RecallGraph, id: InstanceId) -> Option<(Arc<Template>, RecallId)> {
    let inst = graph.instance(id)?;
    let template = graph.template(inst.template)?.clone();
    Some((template, inst.recall_id))
}

/// Channels a template works on: its own, or every input of its audio.
fn target_channels(env: &StepEnv<'_>, template: &Template) -> Vec<ChannelId> {
    match template.channel {
        Some(channel) => vec![channel],
        None => env
            .shared
            .topology
            .audio(template.audio)
            .map(|a| a.inputs.clone())
            .unwrap_or_default(),
    }
}

/// Signals on the template's channels owned by this voice.
fn voice_signals(env: &StepEnv<'_>, template: &Template, recall_id: RecallId) -> Vec<(RecyclingId, SignalId)> {
    let mut found = Vec::new();
    for channel in target_channels(env, template) {
        for &rec_id in env.shared.topology.recyclings_of(channel) {
            if let Some(rec) = env.shared.topology.lock(rec_id) {
                for sig in rec.find_by_context(env.scope, recall_id.context) {
                    found.push((rec_id, sig));
                }
            }
        }
    }
    found
}

/// Multiply the current buffer of every voice signal by `gain`.
fn apply_gain(env: &StepEnv<'_>, signals: &[(RecyclingId, SignalId)], gain: f64) {
    for &(rec_id, sig) in signals {
        if let Some(mut rec) = env.shared.topology.lock(rec_id) {
            if let Some(buffer) = rec.get_mut(sig).and_then(|s| s.current_mut()) {
                buffer.apply_gain(gain);
            }
        }
    }
}

fn port_or(template: &Template, name: &str, default: f64) -> f64 {
    template.port(name).map_or(default, |p| p.read_f64())
}

fn step_container(_: &mut RecallGraph, _: InstanceId, _: &StepEnv<'_>) -> StepOutcome {
    StepOutcome::Continue
}

/// Route every voice signal on the channel into its destinations. Done once
/// the voice's signals have all been retired.
fn step_buffer(graph: &mut RecallGraph, id: InstanceId, env: &StepEnv<'_>) -> StepOutcome {
    let Some((template, recall_id)) = lookup(graph, id) else {
        return StepOutcome::Done;
    };
    let mut finished = false;
    let mut remaining = false;
    for channel in target_channels(env, &template) {
        let destinations = env.shared.topology.destination_recyclings(channel);
        for &rec_id in env.shared.topology.recyclings_of(channel) {
            let signals = env
                .shared
                .topology
                .lock(rec_id)
                .map(|rec| rec.find_by_context(env.scope, recall_id.context))
                .unwrap_or_default();
            for sig in signals {
                if route(env.shared, rec_id, sig, &destinations).final_tick {
                    finished = true;
                } else {
                    remaining = true;
                }
            }
        }
    }
    if finished && !remaining {
        StepOutcome::Done
    } else {
        StepOutcome::Continue
    }
}

/// Done once no signal of the voice is left on the channel.
fn step_playback(graph: &mut RecallGraph, id: InstanceId, env: &StepEnv<'_>) -> StepOutcome {
    let Some((template, recall_id)) = lookup(graph, id) else {
        return StepOutcome::Done;
    };
    if voice_signals(env, &template, recall_id).is_empty() {
        StepOutcome::Done
    } else {
        StepOutcome::Continue
    }
}

fn step_volume(graph: &mut RecallGraph, id: InstanceId, env: &StepEnv<'_>) -> StepOutcome {
    let Some((template, recall_id)) = lookup(graph, id) else {
        return StepOutcome::Done;
    };
    let gain = port_or(&template, "volume", 1.0);
    apply_gain(env, &voice_signals(env, &template, recall_id), gain);
    StepOutcome::Continue
}

/// Count ticks up to the `length` port.
fn step_counter(graph: &mut RecallGraph, id: InstanceId, _: &StepEnv<'_>) -> StepOutcome {
    let Some((template, _)) = lookup(graph, id) else {
        return StepOutcome::Done;
    };
    let length = port_or(&template, "length", f64::INFINITY);
    let Some(InstanceData::Counter { ticks }) = graph.instance_mut(id).map(|i| &mut i.data) else {
        return StepOutcome::Continue;
    };
    *ticks += 1;
    if *ticks as f64 >= length {
        StepOutcome::Done
    } else {
        StepOutcome::Continue
    }
}

/// Counter progress in `[0, 1]`, if `id` is a counter with a length.
fn counter_progress(graph: &RecallGraph, id: InstanceId) -> Option<f64> {
    let template = graph.template_of(id)?;
    let length = template.port("length")?.read_f64();
    match graph.instance(id)?.data {
        InstanceData::Counter { ticks } if length > 0.0 => Some((ticks as f64 / length).min(1.0)),
        _ => None,
    }
}

/// Gain ramp from `from` to `to` following the dependent counter.
fn step_fade(graph: &mut RecallGraph, id: InstanceId, env: &StepEnv<'_>) -> StepOutcome {
    let Some((template, recall_id)) = lookup(graph, id) else {
        return StepOutcome::Done;
    };
    let Some(progress) = graph
        .dependency(id, 0)
        .and_then(|counter| counter_progress(graph, counter))
    else {
        return StepOutcome::Continue;
    };
    let from = port_or(&template, "from", 1.0);
    let to = port_or(&template, "to", 0.0);
    let gain = from + (to - from) * progress;
    apply_gain(env, &voice_signals(env, &template, recall_id), gain);
    StepOutcome::Continue
}

/// Push input ports, run the plugin over each voice buffer in place, and
/// publish its output controls.
fn step_plugin(graph: &mut RecallGraph, id: InstanceId, env: &StepEnv<'_>) -> StepOutcome {
    let Some((template, recall_id)) = lookup(graph, id) else {
        return StepOutcome::Done;
    };
    let signals = voice_signals(env, &template, recall_id);
    let Some(InstanceData::Plugin { plugin, input, output }) =
        graph.instance_mut(id).map(|i| &mut i.data)
    else {
        return StepOutcome::Continue;
    };

    for port in template.ports.iter().filter(|p| !p.flags().output) {
        plugin.set_control(port.name(), port.read_f64());
    }
    for (rec_id, sig) in signals {
        let Some(mut rec) = env.shared.topology.lock(rec_id) else {
            continue;
        };
        let Some(buffer) = rec.get_mut(sig).and_then(|s| s.current_mut()) else {
            continue;
        };
        let count = buffer.len();
        input.clear();
        input.extend((0..count).map(|i| buffer.get_f64(i) as f32));
        output.clear();
        output.resize(count, 0.0);
        plugin.run(
            PluginIo {
                input: input.as_slice(),
                output: output.as_mut_slice(),
            },
            count,
        );
        for (i, &s) in output.iter().enumerate() {
            buffer.set_f64(i, f64::from(s));
        }
    }
    for port in template.ports.iter().filter(|p| p.flags().output) {
        if let Some(value) = plugin.control_output(port.name()) {
            if let Err(e) = port.write_scalar_raw(value) {
                warn!(port = port.name(), error = %e, "plugin output not published");
            }
        }
    }
    StepOutcome::Continue
}
