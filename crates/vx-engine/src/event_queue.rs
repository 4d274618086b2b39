//! Time-sorted queue of voice events.

use vx_ir::{SoundScope, Timestamp};

use crate::voice::VoiceSpec;

/// What happens at an event's time.
#[derive(Clone, Debug, PartialEq)]
pub enum VoiceEventKind {
    Start(VoiceSpec),
    /// Stop the voice started with this tag.
    Stop { tag: u64 },
}

/// A scheduled voice start or stop.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceEvent {
    pub time: Timestamp,
    pub scope: SoundScope,
    pub kind: VoiceEventKind,
}

impl VoiceEvent {
    pub fn start(time: Timestamp, scope: SoundScope, spec: VoiceSpec) -> Self {
        Self {
            time,
            scope,
            kind: VoiceEventKind::Start(spec),
        }
    }

    pub fn stop(time: Timestamp, scope: SoundScope, tag: u64) -> Self {
        Self {
            time,
            scope,
            kind: VoiceEventKind::Stop { tag },
        }
    }
}

/// Voice events sorted by time.
///
/// Events are consumed through a cursor that only moves forward, so draining
/// during playback never shifts the backing vector.
#[derive(Clone, Debug, Default)]
pub struct EventQueue {
    events: Vec<VoiceEvent>,
    /// Next event index to process.
    cursor: usize,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event, after any events with the same time.
    pub fn push(&mut self, event: VoiceEvent) {
        let pos = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(pos.max(self.cursor), event);
    }

    /// Next unconsumed event.
    pub fn peek(&self) -> Option<&VoiceEvent> {
        self.events.get(self.cursor)
    }

    /// Advance the cursor past every event whose frame lies before `end`,
    /// returning their index range.
    pub fn drain_until_frame(&mut self, end: u64, frames_per_tick: f64) -> core::ops::Range<usize> {
        let start = self.cursor;
        while let Some(event) = self.events.get(self.cursor) {
            if event.time.to_frames(frames_per_tick) < end {
                self.cursor += 1;
            } else {
                break;
            }
        }
        start..self.cursor
    }

    pub fn get(&self, index: usize) -> Option<&VoiceEvent> {
        self.events.get(index)
    }

    /// Drop consumed events.
    pub fn compact(&mut self) {
        self.events.drain(..self.cursor);
        self.cursor = 0;
    }

    /// Replay from the first event.
    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.cursor = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Events not yet consumed.
    pub fn remaining(&self) -> usize {
        self.events.len() - self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(tick: u64, tag: u64) -> VoiceEvent {
        VoiceEvent::stop(Timestamp::from_ticks(tick), SoundScope::Playback, tag)
    }

    #[test]
    fn events_are_sorted() {
        let mut queue = EventQueue::new();
        queue.push(stop(10, 1));
        queue.push(stop(5, 2));
        queue.push(stop(10, 3));
        let tags: Vec<u64> = (0..3)
            .map(|i| match queue.get(i).unwrap().kind {
                VoiceEventKind::Stop { tag } => tag,
                _ => 0,
            })
            .collect();
        assert_eq!(tags, vec![2, 1, 3]);
    }

    #[test]
    fn drain_until_frame_advances_cursor() {
        let mut queue = EventQueue::new();
        queue.push(stop(1, 1));
        queue.push(stop(2, 2));
        queue.push(stop(4, 3));

        assert_eq!(queue.drain_until_frame(250, 100.0), 0..2);
        assert_eq!(queue.drain_until_frame(400, 100.0), 2..2);
        assert_eq!(queue.drain_until_frame(401, 100.0), 2..3);
        assert_eq!(queue.remaining(), 0);
    }

    #[test]
    fn compact_drops_consumed() {
        let mut queue = EventQueue::new();
        queue.push(stop(1, 1));
        queue.push(stop(9, 2));
        queue.drain_until_frame(200, 100.0);
        queue.compact();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek().unwrap().time.tick, 9);
    }

    #[test]
    fn reset_cursor_allows_replay() {
        let mut queue = EventQueue::new();
        queue.push(stop(1, 1));
        assert_eq!(queue.drain_until_frame(1000, 100.0).len(), 1);
        queue.reset_cursor();
        assert_eq!(queue.drain_until_frame(1000, 100.0).len(), 1);
    }
}
