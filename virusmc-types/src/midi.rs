use serde::{Deserialize, Serialize};

pub const M_NOTEOFF: u8 = 0x80;
pub const M_NOTEON: u8 = 0x90;
pub const M_POLYPRESSURE: u8 = 0xa0;
pub const M_CONTROLCHANGE: u8 = 0xb0;
pub const M_PROGRAMCHANGE: u8 = 0xc0;
pub const M_AFTERTOUCH: u8 = 0xd0;
pub const M_PITCHBEND: u8 = 0xe0;
pub const M_STARTOFSYSEX: u8 = 0xf0;
pub const M_ENDOFSYSEX: u8 = 0xf7;

pub const MC_BANKSELECTMSB: u8 = 0;
pub const MC_BANKSELECTLSB: u8 = 32;

/// Where an event entered the system. Used to tag traffic and to avoid
/// echoing editor-originated changes back to the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MidiEventSource {
    #[default]
    Unknown,
    Host,
    Editor,
    Physical,
    Internal,
}

/// A host-side MIDI event: either a short channel message (`a`, `b`, `c`)
/// or a SysEx message when `sysex` is non-empty.
///
/// `offset` is the sample position inside the processing block at which the
/// event becomes due.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MidiEvent {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub sysex: Vec<u8>,
    pub offset: u32,
    pub source: MidiEventSource,
}

impl MidiEvent {
    pub fn new(a: u8, b: u8, c: u8) -> Self {
        Self {
            a,
            b,
            c,
            ..Self::default()
        }
    }

    pub fn sysex(data: Vec<u8>, source: MidiEventSource) -> Self {
        Self {
            sysex: data,
            source,
            ..Self::default()
        }
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_source(mut self, source: MidiEventSource) -> Self {
        self.source = source;
        self
    }

    pub fn is_sysex(&self) -> bool {
        !self.sysex.is_empty()
    }

    /// Status nibble of a channel message.
    pub fn status(&self) -> u8 {
        self.a & 0xf0
    }

    pub fn channel(&self) -> u8 {
        self.a & 0x0f
    }
}
