use std::fmt;

/// Size in bytes of a single or multi preset.
pub const PRESET_SIZE: usize = 256;

/// Byte layout of a single preset.
pub mod single {
    /// Version code, read-only through parameter changes.
    pub const VERSION: usize = 0;
    pub const NAME: usize = 240;
    pub const NAME_LEN: usize = 10;
}

/// Byte layout of a multi preset. The `PART_*` values are the start of a
/// 16-byte table indexed by part.
pub mod multi {
    pub const VERSION: usize = 0;
    pub const NAME: usize = 4;
    pub const NAME_LEN: usize = 10;
    pub const PART_BANK: usize = 32;
    pub const PART_PROGRAM: usize = 48;
    pub const PART_MIDI_CHANNEL: usize = 64;
    pub const PART_LOW_KEY: usize = 80;
    pub const PART_HIGH_KEY: usize = 96;
    pub const PART_TRANSPOSE: usize = 112;
    pub const PART_DETUNE: usize = 128;
    pub const PART_VOLUME: usize = 144;
    pub const PART_INIT_VOLUME: usize = 160;
    pub const PART_OUTPUT_SELECT: usize = 176;
    pub const PART_ENABLE: usize = 192;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresetKind {
    Single,
    Multi,
}

impl PresetKind {
    fn name_range(self) -> std::ops::Range<usize> {
        match self {
            PresetKind::Single => single::NAME..single::NAME + single::NAME_LEN,
            PresetKind::Multi => multi::NAME..multi::NAME + multi::NAME_LEN,
        }
    }
}

/// Firmware generation a preset was authored for, derived from its version byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PresetVersion {
    A,
    B,
    C,
    Ti,
    Ti2,
}

impl PresetVersion {
    pub fn from_code(code: u8) -> Self {
        match code {
            0x0d..=0xff => PresetVersion::Ti2,
            0x0c => PresetVersion::Ti,
            0x07..=0x0b => PresetVersion::C,
            0x06 => PresetVersion::B,
            _ => PresetVersion::A,
        }
    }
}

/// One fixed-size block of parameter bytes. All bytes are 7-bit MIDI data:
/// every constructor and mutator keeps bytes below 0x80.
#[derive(Clone, PartialEq, Eq)]
pub struct Preset([u8; PRESET_SIZE]);

impl Default for Preset {
    fn default() -> Self {
        Self([0; PRESET_SIZE])
    }
}

impl Preset {
    /// Build a preset from exactly [`PRESET_SIZE`] bytes of 7-bit data.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let data: [u8; PRESET_SIZE] = bytes.try_into().ok()?;
        if data.iter().any(|&b| b >= 0x80) {
            return None;
        }
        Some(Self(data))
    }

    /// A neutral single: every parameter centred except the version byte.
    pub fn init_single(version_code: u8) -> Self {
        let mut p = Self([64; PRESET_SIZE]);
        p.0[single::VERSION] = version_code;
        p.set_name(PresetKind::Single, "Init");
        p
    }

    /// A multi where part `n` plays bank A program `n` on channel `n`.
    pub fn init_multi(version_code: u8) -> Self {
        let mut p = Self::default();
        p.0[multi::VERSION] = version_code;
        p.set_name(PresetKind::Multi, "Init Multi");
        for part in 0..16u8 {
            let i = part as usize;
            p.0[multi::PART_BANK + i] = 0;
            p.0[multi::PART_PROGRAM + i] = part;
            p.0[multi::PART_MIDI_CHANNEL + i] = part;
            p.0[multi::PART_HIGH_KEY + i] = 127;
            p.0[multi::PART_TRANSPOSE + i] = 64;
            p.0[multi::PART_DETUNE + i] = 64;
            p.0[multi::PART_VOLUME + i] = 100;
            p.0[multi::PART_INIT_VOLUME + i] = 100;
            p.0[multi::PART_ENABLE + i] = 1;
        }
        p
    }

    pub fn as_bytes(&self) -> &[u8; PRESET_SIZE] {
        &self.0
    }

    pub fn get(&self, index: usize) -> u8 {
        self.0[index]
    }

    /// Store a value, masked to 7 bits.
    pub fn set(&mut self, index: usize, value: u8) {
        self.0[index] = value & 0x7f;
    }

    pub fn version_code(&self) -> u8 {
        self.0[0]
    }

    pub fn version(&self) -> PresetVersion {
        PresetVersion::from_code(self.version_code())
    }

    pub fn name(&self, kind: PresetKind) -> String {
        self.0[kind.name_range()]
            .iter()
            .map(|&b| if (32..127).contains(&b) { b as char } else { ' ' })
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    pub fn set_name(&mut self, kind: PresetKind, name: &str) {
        let range = kind.name_range();
        let len = range.len();
        let bytes = name.bytes().chain(std::iter::repeat(b' ')).take(len);
        for (slot, b) in self.0[range].iter_mut().zip(bytes) {
            *slot = if (32..127).contains(&b) { b } else { b'?' };
        }
    }

    /// Whether every byte is valid 7-bit MIDI data.
    pub fn is_seven_bit(&self) -> bool {
        self.0.iter().all(|&b| b < 0x80)
    }

    pub fn part_bank(&self, part: u8) -> u8 {
        self.0[multi::PART_BANK + part as usize]
    }

    pub fn part_program(&self, part: u8) -> u8 {
        self.0[multi::PART_PROGRAM + part as usize]
    }

    pub fn part_midi_channel(&self, part: u8) -> u8 {
        self.0[multi::PART_MIDI_CHANNEL + part as usize]
    }

    pub fn part_enabled(&self, part: u8) -> bool {
        self.0[multi::PART_ENABLE + part as usize] != 0
    }
}

impl fmt::Debug for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preset")
            .field("version", &self.version())
            .field("single_name", &self.name(PresetKind::Single))
            .field("multi_name", &self.name(PresetKind::Multi))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_requires_exact_size() {
        assert!(Preset::from_bytes(&[0; PRESET_SIZE]).is_some());
        assert!(Preset::from_bytes(&[0; PRESET_SIZE - 1]).is_none());
        assert!(Preset::from_bytes(&[0; PRESET_SIZE + 1]).is_none());
    }

    #[test]
    fn from_bytes_rejects_high_bytes() {
        assert!(Preset::from_bytes(&[0x90; PRESET_SIZE]).is_none());
        let mut bytes = [0x7f; PRESET_SIZE];
        assert!(Preset::from_bytes(&bytes).is_some_and(|p| p.is_seven_bit()));
        bytes[200] = 0x80;
        assert!(Preset::from_bytes(&bytes).is_none());
    }

    #[test]
    fn names_are_padded_and_trimmed() {
        let mut p = Preset::init_single(7);
        p.set_name(PresetKind::Single, "Lead");
        assert_eq!(p.name(PresetKind::Single), "Lead");
        p.set_name(PresetKind::Single, "A very long name");
        assert_eq!(p.name(PresetKind::Single), "A very lon");
    }

    #[test]
    fn version_codes() {
        assert_eq!(PresetVersion::from_code(0x00), PresetVersion::A);
        assert_eq!(PresetVersion::from_code(0x06), PresetVersion::B);
        assert_eq!(PresetVersion::from_code(0x07), PresetVersion::C);
        assert_eq!(PresetVersion::from_code(0x0c), PresetVersion::Ti);
        assert_eq!(PresetVersion::from_code(0x0e), PresetVersion::Ti2);
    }

    #[test]
    fn init_multi_maps_parts_to_programs() {
        let m = Preset::init_multi(7);
        for part in 0..16 {
            assert_eq!(m.part_bank(part), 0);
            assert_eq!(m.part_program(part), part);
            assert_eq!(m.part_midi_channel(part), part);
            assert!(m.part_enabled(part));
        }
        assert!(m.is_seven_bit());
    }

    #[test]
    fn set_masks_to_seven_bits() {
        let mut p = Preset::default();
        p.set(10, 0xff);
        assert_eq!(p.get(10), 0x7f);
    }
}
