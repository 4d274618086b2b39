//! Recycling: the signal storage of one channel.

use slotmap::SlotMap;
use vx_ir::{Presets, SoundScope};

use crate::context::ContextId;
use crate::signal::AudioSignal;
use crate::topology::ChannelId;

slotmap::new_key_type! {
    /// Handle to a signal inside one recycling.
    pub struct SignalId;
}

/// Owns a template signal and every runtime signal derived from it or
/// delivered into it.
#[derive(Debug)]
pub struct Recycling {
    pub channel: ChannelId,
    pub presets: Presets,
    pub template: AudioSignal,
    signals: SlotMap<SignalId, AudioSignal>,
}

impl Recycling {
    pub fn new(channel: ChannelId, presets: Presets) -> Self {
        Self {
            channel,
            presets,
            template: AudioSignal::template(presets),
            signals: SlotMap::with_key(),
        }
    }

    pub fn add(&mut self, signal: AudioSignal) -> SignalId {
        self.signals.insert(signal)
    }

    pub fn remove(&mut self, id: SignalId) -> Option<AudioSignal> {
        self.signals.remove(id)
    }

    pub fn get(&self, id: SignalId) -> Option<&AudioSignal> {
        self.signals.get(id)
    }

    pub fn get_mut(&mut self, id: SignalId) -> Option<&mut AudioSignal> {
        self.signals.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SignalId, &AudioSignal)> {
        self.signals.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SignalId, &mut AudioSignal)> {
        self.signals.iter_mut()
    }

    /// The mix target for `scope`, if one was created.
    pub fn find_destination(&self, scope: SoundScope) -> Option<SignalId> {
        self.signals
            .iter()
            .find(|(_, s)| s.is_destination() && s.scope == scope)
            .map(|(id, _)| id)
    }

    /// Runtime signals of `scope` owned by `context`, in insertion order.
    pub fn find_by_context(&self, scope: SoundScope, context: ContextId) -> Vec<SignalId> {
        self.signals
            .iter()
            .filter(|(_, s)| s.scope == scope && s.context == Some(context))
            .map(|(id, _)| id)
            .collect()
    }

    /// Whether any signal of `scope` is owned by `context`.
    pub fn has_context(&self, scope: SoundScope, context: ContextId) -> bool {
        self.signals
            .values()
            .any(|s| s.scope == scope && s.context == Some(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use vx_ir::SampleFormat;

    fn keys() -> (ChannelId, ContextId, ContextId) {
        let mut channels: SlotMap<ChannelId, ()> = SlotMap::with_key();
        let mut contexts: SlotMap<ContextId, ()> = SlotMap::with_key();
        (channels.insert(()), contexts.insert(()), contexts.insert(()))
    }

    #[test]
    fn lookup_by_scope_and_context() {
        let (channel, a, b) = keys();
        let presets = Presets::new(1, 44100, 8, SampleFormat::S16);
        let mut rec = Recycling::new(channel, presets);
        let voice = rec.add(rec.template.instantiate(SoundScope::Playback, a, 0));
        let dest = rec.add(AudioSignal::destination(SoundScope::Sequencer, b, presets));

        assert_eq!(rec.find_destination(SoundScope::Sequencer), Some(dest));
        assert_eq!(rec.find_destination(SoundScope::Playback), None);
        assert_eq!(rec.find_by_context(SoundScope::Playback, a), vec![voice]);
        assert!(!rec.has_context(SoundScope::Notation, a));

        assert!(rec.remove(voice).is_some());
        assert_eq!(rec.len(), 1);
    }
}
