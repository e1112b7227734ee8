//! Host-to-DSP word formats.
//!
//! Everything written to the DSP starts with a sync word. Presets are packed
//! three bytes per 24-bit word, big-endian, with the final word zero padded.

use virusmc_types::{Page, Preset, TWord, PRESET_SIZE, WORD_MASK};

use super::cmd;

/// Sync word in front of preset and parameter writes.
pub const SYNC_CONTROL: TWord = 0xf4f4f4;

/// Sync word in front of MIDI bytes forwarded to the DSP.
pub const SYNC_MIDI: TWord = 0xf5f5f5;

/// Number of data words a packed preset occupies.
pub const PRESET_WORDS: usize = PRESET_SIZE.div_ceil(3);

/// Pack a preset for a bulk transfer to `program` (a part index or the
/// single-mode sentinel for singles, the multi slot for multis).
pub fn preset_to_words(preset: &Preset, program: u8, is_multi: bool) -> Vec<TWord> {
    let kind = if is_multi { cmd::DUMP_MULTI } else { cmd::DUMP_SINGLE };
    let mut words = Vec::with_capacity(PRESET_WORDS + 2);
    words.push(SYNC_CONTROL);
    words.push(
        ((kind as TWord) << 16) | (((program & 0x7f) as TWord) << 8) | PRESET_WORDS as TWord,
    );
    for chunk in preset.as_bytes().chunks(3) {
        let mut word: TWord = 0;
        for i in 0..3 {
            word = (word << 8) | chunk.get(i).copied().unwrap_or(0) as TWord;
        }
        words.push(word & WORD_MASK);
    }
    words
}

/// Parsed header and payload of a packed preset block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedPreset {
    pub program: u8,
    pub is_multi: bool,
    pub preset: Preset,
}

/// Inverse of [`preset_to_words`]. Returns `None` for anything that is not
/// a well-formed preset block.
pub fn words_to_preset(words: &[TWord]) -> Option<PackedPreset> {
    if words.len() != PRESET_WORDS + 2 || words[0] != SYNC_CONTROL {
        return None;
    }
    let header = words[1];
    let is_multi = match (header >> 16) as u8 {
        cmd::DUMP_SINGLE => false,
        cmd::DUMP_MULTI => true,
        _ => return None,
    };
    if (header & 0xff) as usize != PRESET_WORDS {
        return None;
    }
    let program = ((header >> 8) & 0xff) as u8;
    let bytes: Vec<u8> = words[2..]
        .iter()
        .flat_map(|w| [(w >> 16) as u8, (w >> 8) as u8, *w as u8])
        .take(PRESET_SIZE)
        .collect();
    Some(PackedPreset {
        program,
        is_multi,
        preset: Preset::from_bytes(&bytes)?,
    })
}

/// Whether a block written to the DSP is a bulk preset transfer.
pub fn is_preset_block(words: &[TWord]) -> bool {
    words.len() >= 2
        && words[0] == SYNC_CONTROL
        && matches!((words[1] >> 16) as u8, cmd::DUMP_SINGLE | cmd::DUMP_MULTI)
}

pub fn parameter_words(page: Page, part: u8, param: u8, value: u8) -> Vec<TWord> {
    vec![
        SYNC_CONTROL,
        ((page.to_wire() as TWord) << 16) | ((part as TWord) << 8) | param as TWord,
        (value & 0x7f) as TWord,
    ]
}

pub fn midi_words(a: u8, b: u8, c: u8) -> Vec<TWord> {
    vec![
        SYNC_MIDI,
        ((a as TWord) << 16) | ((b as TWord) << 8) | c as TWord,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use virusmc_types::SINGLE_PART;

    #[test]
    fn packing_layout() {
        let mut p = Preset::default();
        p.set(0, 0x01);
        p.set(1, 0x02);
        p.set(2, 0x03);
        p.set(255, 0x7f);
        let words = preset_to_words(&p, 5, false);
        assert_eq!(words.len(), PRESET_WORDS + 2);
        assert_eq!(words[1], 0x10_05_00 | PRESET_WORDS as TWord);
        assert_eq!(words[2], 0x010203);
        assert_eq!(*words.last().unwrap(), 0x7f0000);
    }

    #[test]
    fn unpack_restores_header_and_data() {
        let p = Preset::init_multi(0x07);
        let words = preset_to_words(&p, 12, true);
        let packed = words_to_preset(&words).unwrap();
        assert_eq!(packed.program, 12);
        assert!(packed.is_multi);
        assert_eq!(packed.preset, p);
        assert!(is_preset_block(&words));
    }

    #[test]
    fn parameter_blocks_are_not_presets() {
        let words = parameter_words(Page::A, SINGLE_PART, 40, 99);
        assert_eq!(words, vec![SYNC_CONTROL, 0x70_40_28, 99]);
        assert!(!is_preset_block(&words));
        assert!(words_to_preset(&words).is_none());
    }

    #[test]
    fn midi_block() {
        assert_eq!(midi_words(0x90, 60, 100), vec![SYNC_MIDI, 0x90_3c_64]);
    }
}
