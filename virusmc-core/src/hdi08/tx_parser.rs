//! Chip-to-host word stream.
//!
//! Every message starts with a tag word:
//!
//! | tag        | message       | following words                         |
//! |------------|---------------|-----------------------------------------|
//! | `F3F3F3`   | preset ack    | none                                    |
//! | `F5F5F5`   | MIDI out      | `a << 16 \| b << 8 \| c`                |
//! | `F6F6F6`   | SysEx out     | byte count, then one byte per word      |
//! | `F4F4F4`   | parameter     | `page << 16 \| part << 8 \| param`, value |
//! | `F1F1F1`   | boot complete | none                                    |

use virusmc_types::{Page, TWord};

pub const TAG_ACK: TWord = 0xf3f3f3;
pub const TAG_MIDI: TWord = 0xf5f5f5;
pub const TAG_SYSEX: TWord = 0xf6f6f6;
pub const TAG_PARAMETER: TWord = 0xf4f4f4;
pub const TAG_BOOT: TWord = 0xf1f1f1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChipReply {
    PresetAck,
    Midi { a: u8, b: u8, c: u8 },
    Sysex(Vec<u8>),
    Parameter { page: Page, part: u8, param: u8, value: u8 },
    Booted,
}

/// Turns polled word blocks into [`ChipReply`] values.
#[derive(Debug, Default)]
pub struct TxParser {
    skipped_words: u64,
}

impl TxParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Words that were not part of any recognised message.
    pub fn skipped_words(&self) -> u64 {
        self.skipped_words
    }

    pub fn parse(&mut self, words: &[TWord], out: &mut Vec<ChipReply>) {
        let mut i = 0;
        while i < words.len() {
            let (reply, used) = match words[i] {
                TAG_ACK => (Some(ChipReply::PresetAck), 1),
                TAG_BOOT => (Some(ChipReply::Booted), 1),
                TAG_MIDI if i + 1 < words.len() => {
                    let w = words[i + 1];
                    (
                        Some(ChipReply::Midi {
                            a: (w >> 16) as u8,
                            b: (w >> 8) as u8,
                            c: w as u8,
                        }),
                        2,
                    )
                }
                TAG_PARAMETER if i + 2 < words.len() => {
                    let w = words[i + 1];
                    let reply = Page::from_wire((w >> 16) as u8).map(|page| ChipReply::Parameter {
                        page,
                        part: (w >> 8) as u8,
                        param: w as u8,
                        value: (words[i + 2] & 0x7f) as u8,
                    });
                    (reply, 3)
                }
                TAG_SYSEX if i + 1 < words.len() => {
                    let len = words[i + 1] as usize;
                    let start = i + 2;
                    if start + len <= words.len() {
                        let bytes = words[start..start + len].iter().map(|w| *w as u8).collect();
                        (Some(ChipReply::Sysex(bytes)), 2 + len)
                    } else {
                        log::warn!(target: "mc::hdi08", "truncated sysex from chip: {} of {} bytes", words.len() - start, len);
                        (None, words.len() - i)
                    }
                }
                _ => (None, 1),
            };
            match reply {
                Some(reply) => out.push(reply),
                None => self.skipped_words += used as u64,
            }
            i += used;
        }
    }
}

pub fn ack_words() -> Vec<TWord> {
    vec![TAG_ACK]
}

pub fn boot_words() -> Vec<TWord> {
    vec![TAG_BOOT]
}

pub fn midi_reply_words(a: u8, b: u8, c: u8) -> Vec<TWord> {
    vec![TAG_MIDI, ((a as TWord) << 16) | ((b as TWord) << 8) | c as TWord]
}

pub fn sysex_reply_words(bytes: &[u8]) -> Vec<TWord> {
    let mut words = Vec::with_capacity(bytes.len() + 2);
    words.push(TAG_SYSEX);
    words.push(bytes.len() as TWord);
    words.extend(bytes.iter().map(|&b| b as TWord));
    words
}

pub fn parameter_reply_words(page: Page, part: u8, param: u8, value: u8) -> Vec<TWord> {
    vec![
        TAG_PARAMETER,
        ((page.to_wire() as TWord) << 16) | ((part as TWord) << 8) | param as TWord,
        value as TWord,
    ]
}
