use serde::{Deserialize, Serialize};

use crate::multi;

/// Parameter page addressed by a parameter-change command.
///
/// Pages A and B address the single edit buffer, page C carries the
/// per-part multi parameters and (on A/B/C hardware) the global table.
/// The TI adds page D for globals and two meta pages that hold no
/// stored data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Page {
    A,
    B,
    C,
    D,
    P6E,
    P6F,
}

impl Page {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0x70 => Some(Page::A),
            0x71 => Some(Page::B),
            0x72 => Some(Page::C),
            0x73 => Some(Page::D),
            0x6e => Some(Page::P6E),
            0x6f => Some(Page::P6F),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Page::A => 0x70,
            Page::B => 0x71,
            Page::C => 0x72,
            Page::D => 0x73,
            Page::P6E => 0x6e,
            Page::P6F => 0x6f,
        }
    }

    /// Byte offset of this page inside a single preset, if it is a single page.
    pub fn single_offset(self) -> Option<usize> {
        match self {
            Page::A => Some(0),
            Page::B => Some(128),
            _ => None,
        }
    }

    pub fn is_meta(self) -> bool {
        matches!(self, Page::P6E | Page::P6F)
    }
}

/// Play mode stored in the global table under [`ControlCommand::PlayMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlayMode {
    #[default]
    Single,
    MultiSingle,
    Multi,
}

impl PlayMode {
    pub fn from_value(value: u8) -> Self {
        match value {
            0 => PlayMode::Single,
            1 => PlayMode::MultiSingle,
            _ => PlayMode::Multi,
        }
    }

    pub fn value(self) -> u8 {
        match self {
            PlayMode::Single => 0,
            PlayMode::MultiSingle => 1,
            PlayMode::Multi => 2,
        }
    }

    /// Whether parts are served from the per-part single edit buffers.
    pub fn is_multi(self) -> bool {
        self != PlayMode::Single
    }
}

/// Named page-C / global parameter indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlCommand {
    PartBankSelect = 31,
    PartBankChange = 32,
    PartProgramChange = 33,
    PartMidiChannel = 34,
    PartLowKey = 35,
    PartHighKey = 36,
    PartTranspose = 37,
    PartDetune = 38,
    PartVolume = 39,
    PartInitVolume = 40,
    PartOutputSelect = 41,
    MasterTune = 45,
    PartEnable = 72,
    DeviceId = 93,
    MidiClockRx = 106,
    PlayMode = 122,
    GlobalChannel = 124,
    MasterVolume = 127,
}

impl ControlCommand {
    const ALL: [ControlCommand; 18] = [
        ControlCommand::PartBankSelect,
        ControlCommand::PartBankChange,
        ControlCommand::PartProgramChange,
        ControlCommand::PartMidiChannel,
        ControlCommand::PartLowKey,
        ControlCommand::PartHighKey,
        ControlCommand::PartTranspose,
        ControlCommand::PartDetune,
        ControlCommand::PartVolume,
        ControlCommand::PartInitVolume,
        ControlCommand::PartOutputSelect,
        ControlCommand::MasterTune,
        ControlCommand::PartEnable,
        ControlCommand::DeviceId,
        ControlCommand::MidiClockRx,
        ControlCommand::PlayMode,
        ControlCommand::GlobalChannel,
        ControlCommand::MasterVolume,
    ];

    /// Global parameters, in the order they are reported by a global dump.
    pub const GLOBALS: [ControlCommand; 6] = [
        ControlCommand::MasterTune,
        ControlCommand::DeviceId,
        ControlCommand::MidiClockRx,
        ControlCommand::PlayMode,
        ControlCommand::GlobalChannel,
        ControlCommand::MasterVolume,
    ];

    pub fn from_param(param: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| *c as u8 == param)
    }

    pub fn param(self) -> u8 {
        self as u8
    }

    pub fn is_global(self) -> bool {
        Self::GLOBALS.contains(&self)
    }

    /// Start of the 16-byte per-part table inside a multi preset.
    pub fn multi_table(self) -> Option<usize> {
        match self {
            ControlCommand::PartBankSelect => Some(multi::PART_BANK),
            ControlCommand::PartProgramChange => Some(multi::PART_PROGRAM),
            ControlCommand::PartMidiChannel => Some(multi::PART_MIDI_CHANNEL),
            ControlCommand::PartLowKey => Some(multi::PART_LOW_KEY),
            ControlCommand::PartHighKey => Some(multi::PART_HIGH_KEY),
            ControlCommand::PartTranspose => Some(multi::PART_TRANSPOSE),
            ControlCommand::PartDetune => Some(multi::PART_DETUNE),
            ControlCommand::PartVolume => Some(multi::PART_VOLUME),
            ControlCommand::PartInitVolume => Some(multi::PART_INIT_VOLUME),
            ControlCommand::PartOutputSelect => Some(multi::PART_OUTPUT_SELECT),
            ControlCommand::PartEnable => Some(multi::PART_ENABLE),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_wire_roundtrip() {
        for page in [Page::A, Page::B, Page::C, Page::D, Page::P6E, Page::P6F] {
            assert_eq!(Page::from_wire(page.to_wire()), Some(page));
        }
        assert_eq!(Page::from_wire(0x10), None);
    }

    #[test]
    fn control_lookup() {
        assert_eq!(
            ControlCommand::from_param(122),
            Some(ControlCommand::PlayMode)
        );
        assert_eq!(ControlCommand::from_param(0), None);
        assert!(ControlCommand::GlobalChannel.is_global());
        assert!(!ControlCommand::PartVolume.is_global());
        assert_eq!(
            ControlCommand::PartProgramChange.multi_table(),
            Some(multi::PART_PROGRAM)
        );
        assert_eq!(ControlCommand::PartBankChange.multi_table(), None);
    }
}
