//! Timed playback of a canned SysEx/MIDI sequence into the microcontroller.
//!
//! Playback talks to the unit through [`DemoPort`] only. Each step waits its
//! delay, and SysEx steps additionally wait until the port reports that no
//! transfer is outstanding, so preset dumps reach the DSP one at a time.

use std::fmt;

use virusmc_types::{MidiEvent, MidiEventSource};

use crate::codec;
use crate::microcontroller::Microcontroller;

/// The narrow surface demo playback needs from the unit.
pub trait DemoPort {
    fn send_demo_sysex(&self, data: &[u8]) -> Vec<MidiEvent>;
    fn send_demo_midi(&self, event: MidiEvent) -> bool;
    fn demo_is_idle(&self) -> bool;
}

impl DemoPort for Microcontroller {
    fn send_demo_sysex(&self, data: &[u8]) -> Vec<MidiEvent> {
        self.send_sysex(data, MidiEventSource::Internal)
    }

    fn send_demo_midi(&self, event: MidiEvent) -> bool {
        self.send_midi(event.with_source(MidiEventSource::Internal))
    }

    fn demo_is_idle(&self) -> bool {
        self.is_idle()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemoStep {
    Sysex(Vec<u8>),
    Midi(MidiEvent),
}

#[derive(Debug, Clone)]
struct TimedStep {
    delay_ticks: u32,
    step: DemoStep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemoError {
    /// The stream held no complete SysEx frame.
    NoFrames,
}

impl fmt::Display for DemoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemoError::NoFrames => write!(f, "demo stream contains no sysex frames"),
        }
    }
}

impl std::error::Error for DemoError {}

#[derive(Debug, Clone, Default)]
pub struct DemoPlayback {
    steps: Vec<TimedStep>,
    next: usize,
    waited: u32,
    rejected: u64,
}

impl DemoPlayback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step that becomes due `delay_ticks` after the previous one.
    pub fn push(&mut self, delay_ticks: u32, step: DemoStep) {
        self.steps.push(TimedStep { delay_ticks, step });
    }

    /// One SysEx step per frame of a `.syx` stream, `frame_gap_ticks` apart.
    pub fn from_syx(stream: &[u8], frame_gap_ticks: u32) -> Result<Self, DemoError> {
        let mut demo = Self::new();
        for (i, frame) in codec::split_frames(stream).into_iter().enumerate() {
            let delay = if i == 0 { 0 } else { frame_gap_ticks };
            demo.push(delay, DemoStep::Sysex(frame.to_vec()));
        }
        if demo.steps.is_empty() {
            return Err(DemoError::NoFrames);
        }
        log::debug!(target: "demo", "loaded {} demo frames", demo.steps.len());
        Ok(demo)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.steps.len()
    }

    /// Steps already sent.
    pub fn position(&self) -> usize {
        self.next
    }

    /// MIDI steps the port refused because its queue was full.
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    pub fn rewind(&mut self) {
        self.next = 0;
        self.waited = 0;
    }

    /// Advance playback by `ticks`, sending every step that becomes due.
    pub fn process(&mut self, port: &dyn DemoPort, ticks: u32) {
        let mut budget = ticks;
        while let Some(timed) = self.steps.get(self.next) {
            let remaining = timed.delay_ticks.saturating_sub(self.waited);
            if remaining > budget {
                self.waited += budget;
                return;
            }
            budget -= remaining;
            self.waited = timed.delay_ticks;

            match &timed.step {
                DemoStep::Sysex(data) => {
                    if !port.demo_is_idle() {
                        return;
                    }
                    let responses = port.send_demo_sysex(data);
                    if !responses.is_empty() {
                        log::trace!(target: "demo", "discarding {} demo responses", responses.len());
                    }
                }
                DemoStep::Midi(event) => {
                    if !port.send_demo_midi(event.clone()) {
                        self.rejected += 1;
                        log::warn!(target: "demo", "demo midi event dropped, queue full");
                    }
                }
            }
            self.next += 1;
            self.waited = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPort {
        sysex: Mutex<Vec<Vec<u8>>>,
        midi: Mutex<Vec<MidiEvent>>,
        busy: Mutex<bool>,
    }

    impl DemoPort for RecordingPort {
        fn send_demo_sysex(&self, data: &[u8]) -> Vec<MidiEvent> {
            self.sysex.lock().unwrap().push(data.to_vec());
            Vec::new()
        }

        fn send_demo_midi(&self, event: MidiEvent) -> bool {
            self.midi.lock().unwrap().push(event);
            true
        }

        fn demo_is_idle(&self) -> bool {
            !*self.busy.lock().unwrap()
        }
    }

    #[test]
    fn steps_wait_for_their_delay() {
        let port = RecordingPort::default();
        let mut demo = DemoPlayback::new();
        demo.push(0, DemoStep::Midi(MidiEvent::new(0x90, 60, 100)));
        demo.push(100, DemoStep::Midi(MidiEvent::new(0x80, 60, 0)));

        demo.process(&port, 10);
        assert_eq!(port.midi.lock().unwrap().len(), 1);
        demo.process(&port, 80);
        assert_eq!(port.midi.lock().unwrap().len(), 1);
        demo.process(&port, 10);
        assert_eq!(port.midi.lock().unwrap().len(), 2);
        assert!(demo.is_finished());
    }

    #[test]
    fn sysex_waits_for_idle_port() {
        let port = RecordingPort::default();
        *port.busy.lock().unwrap() = true;
        let mut demo = DemoPlayback::new();
        demo.push(0, DemoStep::Sysex(vec![0xf0, 0xf7]));

        demo.process(&port, 1000);
        assert!(port.sysex.lock().unwrap().is_empty());
        *port.busy.lock().unwrap() = false;
        demo.process(&port, 0);
        assert_eq!(port.sysex.lock().unwrap().len(), 1);
        assert!(demo.is_finished());
    }

    #[test]
    fn from_syx_splits_frames() {
        let stream = [0xf0, 1, 0xf7, 0x00, 0xf0, 2, 0xf7];
        let mut demo = DemoPlayback::from_syx(&stream, 5).unwrap();
        assert_eq!(demo.len(), 2);

        let port = RecordingPort::default();
        demo.process(&port, 4);
        assert_eq!(demo.position(), 1);
        demo.process(&port, 1);
        assert_eq!(*port.sysex.lock().unwrap(), vec![vec![0xf0, 1, 0xf7], vec![0xf0, 2, 0xf7]]);

        demo.rewind();
        assert_eq!(demo.position(), 0);
    }

    #[test]
    fn empty_stream_is_an_error() {
        assert_eq!(DemoPlayback::from_syx(&[0x00, 0x01], 1).unwrap_err(), DemoError::NoFrames);
    }
}
