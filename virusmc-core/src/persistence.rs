//! Binary device-state snapshots.
//!
//! ```text
//! "VMCS" | version u8 | type u8 | model u8 | ram_bank_count u8
//! singles   ram_bank_count * 128 * record
//! multis    128 * record
//! full only multi edit buffer | single edit buffer | 16 part singles
//!           | current bank u8 | current single u8
//! globals   256 bytes
//!
//! record = present u8 (0 or 1) | preset [256]
//! ```
//!
//! Every section has a fixed size for a given header, so a snapshot's length
//! is checked before anything is parsed.

use std::fmt;

use virusmc_types::{DeviceModel, Preset, StateType, PART_COUNT, PRESET_SIZE, SLOT_COUNT};

use crate::store::{StoreContents, GLOBAL_COUNT};

pub const MAGIC: [u8; 4] = *b"VMCS";
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 4;
const RECORD_LEN: usize = 1 + PRESET_SIZE;
const EDIT_LEN: usize = PRESET_SIZE * (2 + PART_COUNT) + 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    BadMagic,
    UnsupportedVersion(u8),
    UnknownType(u8),
    TypeMismatch { expected: StateType, found: StateType },
    ModelMismatch { expected: DeviceModel, found: Option<DeviceModel> },
    Length { expected: usize, actual: usize },
    BadRecord { offset: usize },
    /// A previous restore is still being delivered to the DSP.
    RestoreInProgress,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::BadMagic => write!(f, "not a device state snapshot"),
            StateError::UnsupportedVersion(v) => write!(f, "unsupported snapshot version {}", v),
            StateError::UnknownType(t) => write!(f, "unknown snapshot type {}", t),
            StateError::TypeMismatch { expected, found } => {
                write!(f, "expected a {:?} snapshot, found {:?}", expected, found)
            }
            StateError::ModelMismatch { expected, found } => match found {
                Some(found) => write!(f, "snapshot is for model {:?}, device is {:?}", found, expected),
                None => write!(f, "snapshot is for an unknown model, device is {:?}", expected),
            },
            StateError::Length { expected, actual } => {
                write!(f, "snapshot is {} bytes, expected {}", actual, expected)
            }
            StateError::BadRecord { offset } => write!(f, "invalid preset record at byte {}", offset),
            StateError::RestoreInProgress => write!(f, "a state restore is still in progress"),
        }
    }
}

impl std::error::Error for StateError {}

/// Total snapshot length for a model and type.
pub fn snapshot_len(model: DeviceModel, kind: StateType) -> usize {
    let banks = (model.ram_bank_count() + 1) * SLOT_COUNT * RECORD_LEN;
    let edit = if kind == StateType::Full { EDIT_LEN } else { 0 };
    HEADER_LEN + banks + edit + GLOBAL_COUNT
}

pub fn encode_state(model: DeviceModel, kind: StateType, contents: &StoreContents) -> Vec<u8> {
    let mut out = Vec::with_capacity(snapshot_len(model, kind));
    out.extend_from_slice(&MAGIC);
    out.push(FORMAT_VERSION);
    out.push(kind.tag());
    out.push(model.tag());
    out.push(model.ram_bank_count() as u8);

    for bank in &contents.singles {
        push_records(&mut out, bank);
    }
    push_records(&mut out, &contents.multis);

    if kind == StateType::Full {
        out.extend_from_slice(contents.multi_edit_buffer.as_bytes());
        out.extend_from_slice(contents.single_edit_buffer.as_bytes());
        for part in &contents.part_singles {
            out.extend_from_slice(part.as_bytes());
        }
        out.push(contents.current_bank);
        out.push(contents.current_single);
    }

    out.extend_from_slice(&contents.globals);
    out
}

fn push_records(out: &mut Vec<u8>, bank: &[Option<Preset>]) {
    for slot in bank {
        match slot {
            Some(preset) => {
                out.push(1);
                out.extend_from_slice(preset.as_bytes());
            }
            None => {
                out.push(0);
                out.extend_from_slice(&[0; PRESET_SIZE]);
            }
        }
    }
}

/// Parse a snapshot on top of `base`. Sections absent from a bank snapshot
/// keep `base`'s values.
pub fn decode_state(
    bytes: &[u8],
    model: DeviceModel,
    kind: StateType,
    base: StoreContents,
) -> Result<StoreContents, StateError> {
    if bytes.len() < HEADER_LEN || bytes[..MAGIC.len()] != MAGIC {
        return Err(StateError::BadMagic);
    }
    let mut r = Reader { bytes, pos: MAGIC.len() };
    let version = r.u8();
    if version != FORMAT_VERSION {
        return Err(StateError::UnsupportedVersion(version));
    }
    let tag = r.u8();
    let found = StateType::from_tag(tag).ok_or(StateError::UnknownType(tag))?;
    if found != kind {
        return Err(StateError::TypeMismatch { expected: kind, found });
    }
    let found_model = DeviceModel::from_tag(r.u8());
    let ram_banks = r.u8() as usize;
    if found_model != Some(model) || ram_banks != model.ram_bank_count() {
        return Err(StateError::ModelMismatch { expected: model, found: found_model });
    }
    let expected = snapshot_len(model, kind);
    if bytes.len() != expected {
        return Err(StateError::Length { expected, actual: bytes.len() });
    }

    let mut contents = base;
    contents.singles = (0..ram_banks)
        .map(|_| r.records())
        .collect::<Result<_, _>>()?;
    contents.multis = r.records()?;

    if kind == StateType::Full {
        contents.multi_edit_buffer = r.preset();
        contents.single_edit_buffer = r.preset();
        contents.part_singles = (0..PART_COUNT).map(|_| r.preset()).collect();
        contents.current_bank = r.u8();
        contents.current_single = r.u8();
    }

    contents.globals = r.take(GLOBAL_COUNT).iter().map(|b| b & 0x7f).collect();
    Ok(contents)
}

/// Cursor over a snapshot whose total length has already been validated.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> &'a [u8] {
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        slice
    }

    fn u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    fn preset(&mut self) -> Preset {
        let mut preset = Preset::default();
        for (i, b) in self.take(PRESET_SIZE).iter().enumerate() {
            preset.set(i, *b);
        }
        preset
    }

    fn records(&mut self) -> Result<Vec<Option<Preset>>, StateError> {
        (0..SLOT_COUNT)
            .map(|_| {
                let offset = self.pos;
                match self.u8() {
                    0 => {
                        self.take(PRESET_SIZE);
                        Ok(None)
                    }
                    1 => Ok(Some(self.preset())),
                    _ => Err(StateError::BadRecord { offset }),
                }
            })
            .collect()
    }
}
