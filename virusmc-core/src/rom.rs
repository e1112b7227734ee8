//! Factory (read-only) preset banks.

use std::fmt;

use virusmc_types::{BankNumber, DeviceModel, Preset, SLOT_COUNT};

use crate::codec::{self, Command, DecodeError};

/// Error building a ROM image from a SysEx stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RomError {
    Decode { frame: usize, error: DecodeError },
    Empty,
}

impl fmt::Display for RomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RomError::Decode { frame, error } => write!(f, "frame {}: {}", frame, error),
            RomError::Empty => write!(f, "no preset dumps found"),
        }
    }
}

impl std::error::Error for RomError {}

/// ROM contents: single banks addressed by the lettered banks that follow the
/// model's RAM banks, and one bank of factory multis.
#[derive(Debug, Clone)]
pub struct RomBanks {
    model: DeviceModel,
    singles: Vec<Vec<Option<Preset>>>,
    multis: Vec<Option<Preset>>,
}

impl RomBanks {
    pub fn empty(model: DeviceModel) -> Self {
        Self {
            model,
            singles: Vec::new(),
            multis: vec![None; SLOT_COUNT],
        }
    }

    /// Build from preset lists. `singles[0]` becomes the first ROM bank.
    /// Anything beyond 128 presets per bank, or beyond the available
    /// lettered banks, is ignored.
    pub fn new(model: DeviceModel, singles: Vec<Vec<Preset>>, multis: Vec<Preset>) -> Self {
        let max_banks = BankNumber::LETTERED.len() - model.ram_bank_count();
        let singles = singles
            .into_iter()
            .take(max_banks)
            .map(|bank| fill_bank(bank.into_iter().take(SLOT_COUNT)))
            .collect();
        Self {
            model,
            singles,
            multis: fill_bank(multis.into_iter().take(SLOT_COUNT)),
        }
    }

    /// Parse a `.syx` stream of single and multi dumps. Single dumps must
    /// address ROM banks; multi dumps land in the factory multi bank.
    pub fn from_syx(model: DeviceModel, stream: &[u8]) -> Result<Self, RomError> {
        let mut rom = Self::empty(model);
        let mut found = 0usize;
        for (frame, bytes) in codec::split_frames(stream).into_iter().enumerate() {
            let msg = codec::decode(bytes, model).map_err(|error| RomError::Decode { frame, error })?;
            match msg.command {
                Command::DumpSingle { bank, program, preset } => {
                    if rom.insert_single(bank, program, preset) {
                        found += 1;
                    } else {
                        log::warn!(target: "mc::rom", "skipping single dump for non-ROM bank {} slot {}", bank, program);
                    }
                }
                Command::DumpMulti { program, preset, .. } => {
                    rom.multis[program as usize] = Some(preset);
                    found += 1;
                }
                other => {
                    log::debug!(target: "mc::rom", "ignoring non-dump frame {}: {:?}", frame, other);
                }
            }
        }
        if found == 0 {
            return Err(RomError::Empty);
        }
        Ok(rom)
    }

    fn insert_single(&mut self, bank: BankNumber, slot: u8, preset: Preset) -> bool {
        let Some(rom_index) = self.rom_index(bank) else {
            return false;
        };
        while self.singles.len() <= rom_index {
            self.singles.push(vec![None; SLOT_COUNT]);
        }
        self.singles[rom_index][slot as usize] = Some(preset);
        true
    }

    fn rom_index(&self, bank: BankNumber) -> Option<usize> {
        if !self.model.is_rom_bank(bank) {
            return None;
        }
        bank.index().map(|i| i - self.model.ram_bank_count())
    }

    pub fn model(&self) -> DeviceModel {
        self.model
    }

    /// Number of ROM single banks present.
    pub fn single_bank_count(&self) -> usize {
        self.singles.len()
    }

    pub fn single(&self, bank: BankNumber, slot: u8) -> Option<&Preset> {
        let index = self.rom_index(bank)?;
        self.singles.get(index)?.get(slot as usize)?.as_ref()
    }

    pub fn multi(&self, slot: u8) -> Option<&Preset> {
        self.multis.get(slot as usize)?.as_ref()
    }
}

fn fill_bank(presets: impl Iterator<Item = Preset>) -> Vec<Option<Preset>> {
    let mut bank: Vec<Option<Preset>> = presets.map(Some).collect();
    bank.resize(SLOT_COUNT, None);
    bank
}
