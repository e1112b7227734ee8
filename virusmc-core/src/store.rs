//! Preset store: RAM banks, edit buffers and the global settings table.
//!
//! The store is plain data. Callers hold the microcontroller lock around every
//! call, so multi-step updates such as [`PresetStore::load_multi`] are staged
//! first and committed in one go; a failed lookup leaves every buffer as it was.

use std::fmt;
use std::sync::Arc;

use virusmc_types::{
    BankNumber, ControlCommand, DeviceModel, Page, PlayMode, Preset, PART_COUNT, SINGLE_PART,
    SLOT_COUNT,
};

use crate::codec::OMNI_DEVICE_ID;
use crate::rom::RomBanks;

/// Size of the global settings table.
pub const GLOBAL_COUNT: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    InvalidSlot(u8),
    InvalidBank(BankNumber),
    InvalidPart(u8),
    NotFound { bank: BankNumber, slot: u8 },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InvalidSlot(slot) => write!(f, "slot {} out of range", slot),
            StoreError::InvalidBank(bank) => write!(f, "bank {} is not writable here", bank),
            StoreError::InvalidPart(part) => write!(f, "part {} out of range", part),
            StoreError::NotFound { bank, slot } => {
                write!(f, "no preset stored in bank {} slot {}", bank, slot)
            }
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T = ()> = Result<T, StoreError>;

/// What a parameter change touched, so the caller can forward it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    /// Meta page, unsupported part or read-only byte.
    Ignored,
    SingleEditBuffer,
    PartSingle(u8),
    Multi { part: u8, command: ControlCommand },
    Global(u8),
}

/// Result of a multi load: which parts got a fresh single.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiLoad {
    pub slot: u8,
    pub parts: Vec<u8>,
}

/// Everything the store owns, as a detached value for snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreContents {
    pub singles: Vec<Vec<Option<Preset>>>,
    pub multis: Vec<Option<Preset>>,
    pub multi_edit_buffer: Preset,
    pub single_edit_buffer: Preset,
    pub part_singles: Vec<Preset>,
    pub globals: Vec<u8>,
    pub current_bank: u8,
    pub current_single: u8,
}

pub struct PresetStore {
    model: DeviceModel,
    rom: Arc<RomBanks>,
    singles: Vec<Vec<Option<Preset>>>,
    multis: Vec<Option<Preset>>,
    multi_edit_buffer: Preset,
    single_edit_buffer: Preset,
    part_singles: Vec<Preset>,
    globals: Vec<u8>,
    current_bank: u8,
    current_single: u8,
}

impl PresetStore {
    pub fn new(rom: Arc<RomBanks>) -> Self {
        let model = rom.model();
        let version = model.default_version_code();
        Self {
            model,
            rom,
            singles: vec![vec![None; SLOT_COUNT]; model.ram_bank_count()],
            multis: vec![None; SLOT_COUNT],
            multi_edit_buffer: Preset::init_multi(version),
            single_edit_buffer: Preset::init_single(version),
            part_singles: vec![Preset::init_single(version); PART_COUNT],
            globals: default_globals(),
            current_bank: 0,
            current_single: 0,
        }
    }

    pub fn model(&self) -> DeviceModel {
        self.model
    }

    // ── Bank storage ──────────────────────────────────────────────

    pub fn write_single(&mut self, bank: BankNumber, slot: u8, preset: Preset) -> StoreResult {
        if bank.is_edit_buffer() {
            *self.single_buffer_mut(slot)? = preset;
            return Ok(());
        }
        check_slot(slot)?;
        let index = self.ram_index(bank)?;
        self.singles[index][slot as usize] = Some(preset);
        Ok(())
    }

    pub fn write_multi(&mut self, bank: BankNumber, slot: u8, preset: Preset) -> StoreResult {
        check_slot(slot)?;
        match bank {
            BankNumber::EditBuffer => self.multi_edit_buffer = preset,
            BankNumber::A => self.multis[slot as usize] = Some(preset),
            other => return Err(StoreError::InvalidBank(other)),
        }
        Ok(())
    }

    pub fn request_single(&self, bank: BankNumber, slot: u8) -> StoreResult<Preset> {
        if bank.is_edit_buffer() {
            return self.single_buffer(slot).cloned();
        }
        check_slot(slot)?;
        let found = if self.model.is_ram_bank(bank) {
            let index = self.ram_index(bank)?;
            self.singles[index][slot as usize].as_ref()
        } else {
            self.rom.single(bank, slot)
        };
        found.cloned().ok_or(StoreError::NotFound { bank, slot })
    }

    pub fn request_multi(&self, bank: BankNumber, slot: u8) -> StoreResult<Preset> {
        check_slot(slot)?;
        match bank {
            BankNumber::EditBuffer => Ok(self.multi_edit_buffer.clone()),
            BankNumber::A => self.multis[slot as usize]
                .clone()
                .ok_or(StoreError::NotFound { bank, slot }),
            other => Err(StoreError::InvalidBank(other)),
        }
    }

    fn ram_index(&self, bank: BankNumber) -> StoreResult<usize> {
        match bank.index() {
            Some(i) if self.model.is_ram_bank(bank) => Ok(i),
            _ => Err(StoreError::InvalidBank(bank)),
        }
    }

    // ── Edit buffers ──────────────────────────────────────────────

    fn single_buffer(&self, part: u8) -> StoreResult<&Preset> {
        match part {
            SINGLE_PART => Ok(&self.single_edit_buffer),
            p if (p as usize) < PART_COUNT => Ok(&self.part_singles[p as usize]),
            p => Err(StoreError::InvalidPart(p)),
        }
    }

    fn single_buffer_mut(&mut self, part: u8) -> StoreResult<&mut Preset> {
        match part {
            SINGLE_PART => Ok(&mut self.single_edit_buffer),
            p if (p as usize) < PART_COUNT => Ok(&mut self.part_singles[p as usize]),
            p => Err(StoreError::InvalidPart(p)),
        }
    }

    pub fn current_part_single(&self, part: u8) -> Option<&Preset> {
        self.single_buffer(part).ok()
    }

    pub fn current_multi(&self) -> &Preset {
        &self.multi_edit_buffer
    }

    pub fn single_edit_buffer(&self) -> &Preset {
        &self.single_edit_buffer
    }

    /// Apply a parameter change to whichever buffer `page` and `part` address
    /// in the current play mode.
    pub fn apply_param_to_edit_buffer(&mut self, page: Page, part: u8, param: u8, value: u8) -> EditTarget {
        if page.is_meta() || !self.model.supports_page(page) {
            return EditTarget::Ignored;
        }

        if let Some(base) = page.single_offset() {
            let index = base + param as usize;
            if index == virusmc_types::single::VERSION {
                return EditTarget::Ignored;
            }
            let target = if !self.play_mode().is_multi() || part == SINGLE_PART {
                EditTarget::SingleEditBuffer
            } else if (part as usize) < PART_COUNT {
                EditTarget::PartSingle(part)
            } else {
                return EditTarget::Ignored;
            };
            let buffer = match target {
                EditTarget::PartSingle(p) => &mut self.part_singles[p as usize],
                _ => &mut self.single_edit_buffer,
            };
            buffer.set(index, value);
            return target;
        }

        if let Some(command) = ControlCommand::from_param(param).filter(|_| page == Page::C) {
            if let Some(table) = command.multi_table() {
                if (part as usize) >= PART_COUNT {
                    return EditTarget::Ignored;
                }
                self.multi_edit_buffer.set(table + part as usize, value);
                return EditTarget::Multi { part, command };
            }
        }

        if page == self.model.global_page() {
            self.set_global(param, value);
            return EditTarget::Global(param);
        }
        EditTarget::Ignored
    }

    // ── Program selection ─────────────────────────────────────────

    /// Find the single a multi part refers to. `bank` is a zero-based
    /// lettered bank index as stored in the multi.
    fn resolve_part_single(&self, bank: u8, program: u8) -> StoreResult<Preset> {
        let bank = BankNumber::from_index(bank as usize)
            .ok_or(StoreError::InvalidBank(BankNumber::EditBuffer))?;
        self.request_single(bank, program)
    }

    /// Replace the multi edit buffer and load the single of every enabled
    /// part. Either everything is committed or nothing is.
    pub fn load_multi(&mut self, slot: u8, multi: &Preset) -> StoreResult<MultiLoad> {
        check_slot(slot)?;
        let mut staged = Vec::with_capacity(PART_COUNT);
        for part in 0..PART_COUNT as u8 {
            if !multi.part_enabled(part) {
                continue;
            }
            let single = self.resolve_part_single(multi.part_bank(part), multi.part_program(part))?;
            staged.push((part, single));
        }

        self.multi_edit_buffer = multi.clone();
        let parts = staged.iter().map(|(part, _)| *part).collect();
        for (part, single) in staged {
            self.part_singles[part as usize] = single;
        }
        Ok(MultiLoad { slot, parts })
    }

    /// Load a stored multi by slot.
    pub fn multi_program_change(&mut self, slot: u8) -> StoreResult<MultiLoad> {
        let multi = self.request_multi(BankNumber::A, slot)?;
        self.load_multi(slot, &multi)
    }

    /// Point a part at a new program in its current bank and load it.
    pub fn part_program_change(&mut self, part: u8, program: u8) -> StoreResult {
        check_part(part)?;
        check_slot(program)?;
        let bank = self.multi_edit_buffer.part_bank(part);
        let single = self.resolve_part_single(bank, program)?;
        self.multi_edit_buffer
            .set(virusmc_types::multi::PART_PROGRAM + part as usize, program);
        self.part_singles[part as usize] = single;
        Ok(())
    }

    /// Point a part at a new bank. With `immediately_select_single` the
    /// part's current program is reloaded from that bank.
    pub fn part_bank_select(&mut self, part: u8, bank: u8, immediately_select_single: bool) -> StoreResult {
        check_part(part)?;
        let target = BankNumber::from_index(bank as usize)
            .ok_or(StoreError::InvalidBank(BankNumber::EditBuffer))?;
        if immediately_select_single {
            let program = self.multi_edit_buffer.part_program(part);
            let single = self.request_single(target, program)?;
            self.part_singles[part as usize] = single;
        }
        self.multi_edit_buffer
            .set(virusmc_types::multi::PART_BANK + part as usize, bank);
        Ok(())
    }

    /// Single-mode bank select. Takes effect on the next program change.
    pub fn single_bank_select(&mut self, bank: u8) -> StoreResult {
        BankNumber::from_index(bank as usize)
            .ok_or(StoreError::InvalidBank(BankNumber::EditBuffer))?;
        self.current_bank = bank;
        Ok(())
    }

    /// Single-mode program change from the current bank.
    pub fn single_program_change(&mut self, program: u8) -> StoreResult {
        check_slot(program)?;
        let bank = BankNumber::from_index(self.current_bank as usize)
            .ok_or(StoreError::InvalidBank(BankNumber::EditBuffer))?;
        self.single_edit_buffer = self.request_single(bank, program)?;
        self.current_single = program;
        Ok(())
    }

    pub fn current_bank(&self) -> u8 {
        self.current_bank
    }

    pub fn current_single(&self) -> u8 {
        self.current_single
    }

    // ── Globals ───────────────────────────────────────────────────

    pub fn global(&self, index: u8) -> u8 {
        self.globals[index as usize]
    }

    pub fn set_global(&mut self, index: u8, value: u8) {
        self.globals[index as usize] = value & 0x7f;
    }

    pub fn play_mode(&self) -> PlayMode {
        PlayMode::from_value(self.global(ControlCommand::PlayMode.param()))
    }

    pub fn device_id(&self) -> u8 {
        self.global(ControlCommand::DeviceId.param())
    }

    pub fn global_channel(&self) -> u8 {
        self.global(ControlCommand::GlobalChannel.param())
    }

    /// Back to power-on contents: empty RAM, init edit buffers, default globals.
    pub fn reset_to_defaults(&mut self) {
        let rom = Arc::clone(&self.rom);
        *self = Self::new(rom);
    }

    // ── Snapshots ─────────────────────────────────────────────────

    pub fn contents(&self) -> StoreContents {
        StoreContents {
            singles: self.singles.clone(),
            multis: self.multis.clone(),
            multi_edit_buffer: self.multi_edit_buffer.clone(),
            single_edit_buffer: self.single_edit_buffer.clone(),
            part_singles: self.part_singles.clone(),
            globals: self.globals.clone(),
            current_bank: self.current_bank,
            current_single: self.current_single,
        }
    }

    /// Replace every field. Shapes must match this store's model; the
    /// persistence layer validates them before calling.
    pub fn restore(&mut self, contents: StoreContents) {
        self.singles = contents.singles;
        self.multis = contents.multis;
        self.multi_edit_buffer = contents.multi_edit_buffer;
        self.single_edit_buffer = contents.single_edit_buffer;
        self.part_singles = contents.part_singles;
        self.globals = contents.globals;
        self.current_bank = contents.current_bank;
        self.current_single = contents.current_single;
    }

    /// Replace RAM banks and globals, keeping the edit buffers.
    pub fn restore_banks(&mut self, contents: StoreContents) {
        self.singles = contents.singles;
        self.multis = contents.multis;
        self.globals = contents.globals;
    }
}

fn check_slot(slot: u8) -> StoreResult {
    if (slot as usize) < SLOT_COUNT {
        Ok(())
    } else {
        Err(StoreError::InvalidSlot(slot))
    }
}

fn check_part(part: u8) -> StoreResult {
    if (part as usize) < PART_COUNT {
        Ok(())
    } else {
        Err(StoreError::InvalidPart(part))
    }
}

fn default_globals() -> Vec<u8> {
    let mut globals = vec![0u8; GLOBAL_COUNT];
    globals[ControlCommand::MasterTune.param() as usize] = 64;
    globals[ControlCommand::DeviceId.param() as usize] = OMNI_DEVICE_ID;
    globals[ControlCommand::MidiClockRx.param() as usize] = 1;
    globals[ControlCommand::PlayMode.param() as usize] = PlayMode::Single.value();
    globals[ControlCommand::GlobalChannel.param() as usize] = 0;
    globals[ControlCommand::MasterVolume.param() as usize] = 127;
    globals
}
