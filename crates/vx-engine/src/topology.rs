//! Static topology: audios own channels, channels own recyclings.
//!
//! The topology is built once on the control thread and then shared
//! read-only. The only mutable state inside it is each recycling's signal
//! set, which sits behind the recycling's own lock.

use std::sync::{Mutex, MutexGuard, PoisonError};

use slotmap::SlotMap;
use vx_ir::{Presets, SoundScope};

use crate::recycling::Recycling;

slotmap::new_key_type! {
    /// Handle to an [`Audio`] in the topology arena.
    pub struct AudioId;
    /// Handle to a [`Channel`] in the topology arena.
    pub struct ChannelId;
    /// Handle to a [`Recycling`] in the topology arena.
    pub struct RecyclingId;
}

/// Ability and behaviour flags of an audio.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AudioFlags {
    pub playback: bool,
    pub sequencer: bool,
    pub notation: bool,
    /// Input line `i` feeds output line `lines - 1 - i`.
    pub reverse_mapping: bool,
}

impl AudioFlags {
    /// Whether the audio takes part in `scope`.
    pub fn has_ability(&self, scope: SoundScope) -> bool {
        match scope {
            SoundScope::Playback => self.playback,
            SoundScope::Sequencer => self.sequencer,
            SoundScope::Notation => self.notation,
        }
    }

    pub fn all_abilities() -> Self {
        Self {
            playback: true,
            sequencer: true,
            notation: true,
            ..Default::default()
        }
    }
}

/// Which line list a channel belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// A mixer unit: input and output channels laid out as pads of lines.
#[derive(Debug)]
pub struct Audio {
    pub name: String,
    pub flags: AudioFlags,
    pub presets: Presets,
    pub inputs: Vec<ChannelId>,
    pub outputs: Vec<ChannelId>,
}

impl Audio {
    pub fn channels(&self, direction: Direction) -> &[ChannelId] {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }
}

/// One line of an audio.
#[derive(Debug)]
pub struct Channel {
    pub audio: AudioId,
    pub direction: Direction,
    pub pad: usize,
    pub line: usize,
    /// Next line in the same direction.
    pub next: Option<ChannelId>,
    /// Same line on the next pad.
    pub next_pad: Option<ChannelId>,
    /// Downstream input channel this output feeds.
    pub link: Option<ChannelId>,
    pub recyclings: Vec<RecyclingId>,
}

/// Arena owning every audio, channel and recycling.
#[derive(Default)]
pub struct Topology {
    audios: SlotMap<AudioId, Audio>,
    channels: SlotMap<ChannelId, Channel>,
    recyclings: SlotMap<RecyclingId, Mutex<Recycling>>,
    order: Vec<AudioId>,
    master: Option<AudioId>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an audio with `pads` x `lines` channels per direction.
    ///
    /// Every channel gets one recycling configured with the audio's presets.
    pub fn add_audio(
        &mut self,
        name: &str,
        flags: AudioFlags,
        presets: Presets,
        input_layout: (usize, usize),
        output_layout: (usize, usize),
    ) -> AudioId {
        let audio = self.audios.insert(Audio {
            name: name.into(),
            flags,
            presets,
            inputs: Vec::new(),
            outputs: Vec::new(),
        });
        let inputs = self.add_lines(audio, Direction::Input, input_layout, presets);
        let outputs = self.add_lines(audio, Direction::Output, output_layout, presets);
        if let Some(a) = self.audios.get_mut(audio) {
            a.inputs = inputs;
            a.outputs = outputs;
        }
        self.order.push(audio);
        audio
    }

    fn add_lines(
        &mut self,
        audio: AudioId,
        direction: Direction,
        (pads, lines): (usize, usize),
        presets: Presets,
    ) -> Vec<ChannelId> {
        let mut ids = Vec::with_capacity(pads * lines);
        for pad in 0..pads {
            for line in 0..lines {
                let channel = self.channels.insert(Channel {
                    audio,
                    direction,
                    pad,
                    line,
                    next: None,
                    next_pad: None,
                    link: None,
                    recyclings: Vec::new(),
                });
                let recycling = self
                    .recyclings
                    .insert(Mutex::new(Recycling::new(channel, presets.mono())));
                if let Some(c) = self.channels.get_mut(channel) {
                    c.recyclings.push(recycling);
                }
                ids.push(channel);
            }
        }
        for (i, &id) in ids.iter().enumerate() {
            let next = (i % lines.max(1) + 1 < lines).then(|| ids[i + 1]);
            let next_pad = ids.get(i + lines).copied();
            if let Some(c) = self.channels.get_mut(id) {
                c.next = next;
                c.next_pad = next_pad;
            }
        }
        ids
    }

    /// Give `channel` an additional recycling, as grouped channels have.
    pub fn add_recycling(&mut self, channel: ChannelId) -> Option<RecyclingId> {
        let audio = self.channels.get(channel)?.audio;
        let presets = self.audios.get(audio)?.presets.mono();
        let recycling = self
            .recyclings
            .insert(Mutex::new(Recycling::new(channel, presets)));
        self.channels.get_mut(channel)?.recyclings.push(recycling);
        Some(recycling)
    }

    /// Connect an output channel to a downstream input channel.
    ///
    /// Returns false unless `output` is an output and `input` an input channel.
    pub fn link(&mut self, output: ChannelId, input: ChannelId) -> bool {
        let valid = matches!(
            (self.channels.get(output), self.channels.get(input)),
            (Some(o), Some(i)) if o.direction == Direction::Output && i.direction == Direction::Input
        );
        if valid {
            if let Some(o) = self.channels.get_mut(output) {
                o.link = Some(input);
            }
        }
        valid
    }

    /// Mark `audio` as the master: its input lines are the backend's pcm channels.
    pub fn set_master(&mut self, audio: AudioId) {
        self.master = Some(audio);
    }

    pub fn master(&self) -> Option<AudioId> {
        self.master
    }

    pub fn audio(&self, id: AudioId) -> Option<&Audio> {
        self.audios.get(id)
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(id)
    }

    /// Audios in the order they were added.
    pub fn audios(&self) -> impl Iterator<Item = (AudioId, &Audio)> {
        self.order
            .iter()
            .filter_map(|&id| self.audios.get(id).map(|a| (id, a)))
    }

    /// Lock a recycling. A poisoned lock is recovered; the signal data is
    /// still structurally valid.
    pub fn lock(&self, id: RecyclingId) -> Option<MutexGuard<'_, Recycling>> {
        self.recyclings
            .get(id)
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn recycling_ids(&self) -> impl Iterator<Item = RecyclingId> + '_ {
        self.recyclings.keys()
    }

    /// Every recycling of `channel`.
    pub fn recyclings_of(&self, channel: ChannelId) -> &[RecyclingId] {
        self.channels
            .get(channel)
            .map_or(&[], |c| c.recyclings.as_slice())
    }

    /// Channels that `channel` delivers into.
    ///
    /// An input line maps to the output line of the same index on the same
    /// audio (mirrored under `reverse_mapping`); an output maps to its link.
    pub fn destinations(&self, channel: ChannelId) -> Vec<ChannelId> {
        let Some(c) = self.channels.get(channel) else {
            return Vec::new();
        };
        match c.direction {
            Direction::Output => c.link.into_iter().collect(),
            Direction::Input => {
                let Some(audio) = self.audios.get(c.audio) else {
                    return Vec::new();
                };
                let lines = audio
                    .outputs
                    .iter()
                    .filter_map(|&o| self.channels.get(o))
                    .filter(|o| o.pad == 0)
                    .count();
                if lines == 0 {
                    return Vec::new();
                }
                let line = if audio.flags.reverse_mapping {
                    lines - 1 - (c.line % lines)
                } else {
                    c.line % lines
                };
                audio
                    .outputs
                    .iter()
                    .copied()
                    .filter(|&o| self.channels.get(o).is_some_and(|oc| oc.line == line))
                    .collect()
            }
        }
    }

    /// Recyclings of every channel `channel` delivers into.
    pub fn destination_recyclings(&self, channel: ChannelId) -> Vec<RecyclingId> {
        self.destinations(channel)
            .into_iter()
            .flat_map(|d| self.recyclings_of(d).iter().copied())
            .collect()
    }

    /// Master input channels paired with the pcm channel they feed.
    pub fn sinks(&self) -> Vec<(usize, ChannelId)> {
        let Some(master) = self.master.and_then(|m| self.audios.get(m)) else {
            return Vec::new();
        };
        master
            .inputs
            .iter()
            .filter_map(|&id| self.channels.get(id).map(|c| (c.line, id)))
            .collect()
    }

    /// Whether `channel` is an input some output links into.
    pub fn is_fed(&self, channel: ChannelId) -> bool {
        self.channels.values().any(|c| c.link == Some(channel))
    }

    /// Whether signals on `channel` run independently of any voice: outputs,
    /// linked inputs and the master's inputs.
    pub fn is_shared(&self, channel: ChannelId) -> bool {
        let Some(c) = self.channels.get(channel) else {
            return false;
        };
        c.direction == Direction::Output || Some(c.audio) == self.master || self.is_fed(channel)
    }

    /// Recyclings of every shared channel, in audio order.
    pub fn shared_recyclings(&self) -> Vec<RecyclingId> {
        let mut ids = Vec::new();
        for (_, audio) in self.audios() {
            for &channel in audio.inputs.iter().chain(&audio.outputs) {
                if self.is_shared(channel) {
                    ids.extend_from_slice(self.recyclings_of(channel));
                }
            }
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synth_into_master() -> (Topology, AudioId, AudioId) {
        let mut topo = Topology::new();
        let synth = topo.add_audio("synth", AudioFlags::all_abilities(), Presets::default(), (1, 2), (1, 2));
        let master = topo.add_audio("master", AudioFlags::all_abilities(), Presets::default(), (1, 2), (0, 0));
        let outs = topo.audio(synth).unwrap().outputs.clone();
        let ins = topo.audio(master).unwrap().inputs.clone();
        for (o, i) in outs.iter().zip(&ins) {
            assert!(topo.link(*o, *i));
        }
        topo.set_master(master);
        (topo, synth, master)
    }

    #[test]
    fn lines_are_chained() {
        let (topo, synth, _) = synth_into_master();
        let ins = &topo.audio(synth).unwrap().inputs;
        assert_eq!(topo.channel(ins[0]).unwrap().next, Some(ins[1]));
        assert_eq!(topo.channel(ins[1]).unwrap().next, None);
        assert_eq!(topo.recyclings_of(ins[0]).len(), 1);
    }

    #[test]
    fn input_maps_to_same_line_output() {
        let (topo, synth, _) = synth_into_master();
        let audio = topo.audio(synth).unwrap();
        assert_eq!(topo.destinations(audio.inputs[1]), vec![audio.outputs[1]]);
    }

    #[test]
    fn reverse_mapping_mirrors_lines() {
        let mut topo = Topology::new();
        let flags = AudioFlags {
            reverse_mapping: true,
            ..AudioFlags::all_abilities()
        };
        let id = topo.add_audio("rev", flags, Presets::default(), (1, 2), (1, 2));
        let audio = topo.audio(id).unwrap();
        assert_eq!(topo.destinations(audio.inputs[0]), vec![audio.outputs[1]]);
    }

    #[test]
    fn output_maps_to_link() {
        let (topo, synth, master) = synth_into_master();
        let out = topo.audio(synth).unwrap().outputs[0];
        let sink = topo.audio(master).unwrap().inputs[0];
        assert_eq!(topo.destinations(out), vec![sink]);
        assert!(topo.destinations(sink).is_empty());
    }

    #[test]
    fn link_rejects_wrong_direction() {
        let (mut topo, synth, _) = synth_into_master();
        let ins = topo.audio(synth).unwrap().inputs.clone();
        assert!(!topo.link(ins[0], ins[1]));
    }

    #[test]
    fn sinks_and_shared_recyclings() {
        let (topo, _, _) = synth_into_master();
        assert_eq!(topo.sinks().len(), 2);
        assert_eq!(topo.shared_recyclings().len(), 4);
    }

    #[test]
    fn linked_inputs_are_shared() {
        let (mut topo, synth, master) = synth_into_master();
        let fx = topo.add_audio("fx", AudioFlags::all_abilities(), Presets::default(), (1, 1), (1, 1));
        let synth_out = topo.audio(synth).unwrap().outputs[0];
        let fx_in = topo.audio(fx).unwrap().inputs[0];
        let fx_out = topo.audio(fx).unwrap().outputs[0];
        let sink = topo.audio(master).unwrap().inputs[0];
        let synth_in = topo.audio(synth).unwrap().inputs[0];
        assert!(!topo.is_fed(fx_in));
        assert!(topo.link(synth_out, fx_in));
        assert!(topo.link(fx_out, sink));

        assert!(topo.is_fed(fx_in));
        assert!(topo.is_shared(fx_in));
        assert!(!topo.is_shared(synth_in));
        let shared = topo.shared_recyclings();
        assert!(shared.contains(&topo.recyclings_of(fx_in)[0]));
        assert!(!shared.contains(&topo.recyclings_of(synth_in)[0]));
        assert_eq!(shared.len(), 6);
    }
}
