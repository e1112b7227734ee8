//! # virusmc-types
//!
//! Shared type definitions for the virusmc control-processor emulation.
//! Presets, bank addressing, parameter pages, MIDI events and feedback
//! messages live here so that the core crate and any embedding host can
//! agree on them without pulling in the emulation itself.

mod bank;
mod feedback;
mod midi;
mod model;
mod page;
mod preset;

pub use bank::{BankNumber, PART_COUNT, SINGLE_PART, SLOT_COUNT};
pub use feedback::McFeedback;
pub use midi::*;
pub use model::DeviceModel;
pub use page::{ControlCommand, Page, PlayMode};
pub use preset::{multi, single, Preset, PresetKind, PresetVersion, PRESET_SIZE};

/// A 24-bit DSP word, stored in the low bits of a `u32`.
pub type TWord = u32;

/// Mask for the 24 significant bits of a [`TWord`].
pub const WORD_MASK: TWord = 0x00ff_ffff;

/// Which part of the device state a snapshot covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StateType {
    /// Banks, edit buffers and global settings.
    Full,
    /// RAM banks and global settings only.
    Banks,
}

impl StateType {
    pub fn tag(self) -> u8 {
        match self {
            StateType::Full => 0,
            StateType::Banks => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(StateType::Full),
            1 => Some(StateType::Banks),
            _ => None,
        }
    }
}
