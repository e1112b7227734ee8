//! SysEx command codec.
//!
//! Frame layout: `F0 00 20 33 01 <device-id> <command> <body...> F7`.
//! Preset dumps carry a checksum byte before `F7`: the 7-bit sum of every
//! byte from the device id up to the last data byte. Requests and
//! parameter changes carry none.
//!
//! Both directions are pure transforms. DSP-side word packing lives in
//! [`words`].

pub mod words;

use std::fmt;

use virusmc_types::{
    BankNumber, DeviceModel, Page, Preset, M_ENDOFSYSEX, M_STARTOFSYSEX, PRESET_SIZE,
};

pub const MANUFACTURER: [u8; 3] = [0x00, 0x20, 0x33];
pub const PRODUCT_ID: u8 = 0x01;

/// Device id that every unit answers to.
pub const OMNI_DEVICE_ID: u8 = 0x10;

/// Index of the first byte covered by the checksum (the device id).
pub const CHECKSUM_OFFSET: usize = 5;

/// Bytes before the body: start, manufacturer, product, device id, command.
const HEADER_LEN: usize = 7;

/// Command bytes.
pub mod cmd {
    pub const DUMP_SINGLE: u8 = 0x10;
    pub const DUMP_MULTI: u8 = 0x11;
    pub const REQUEST_SINGLE: u8 = 0x30;
    pub const REQUEST_MULTI: u8 = 0x31;
    pub const REQUEST_BANK_SINGLE: u8 = 0x32;
    pub const REQUEST_BANK_MULTI: u8 = 0x33;
    pub const REQUEST_ARRANGEMENT: u8 = 0x34;
    pub const REQUEST_GLOBAL: u8 = 0x35;
    pub const REQUEST_TOTAL: u8 = 0x36;
}

/// A decoded command body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    DumpSingle {
        bank: BankNumber,
        program: u8,
        preset: Preset,
    },
    DumpMulti {
        bank: BankNumber,
        program: u8,
        preset: Preset,
    },
    RequestSingle {
        bank: BankNumber,
        program: u8,
    },
    RequestMulti {
        bank: BankNumber,
        program: u8,
    },
    RequestBankSingle {
        bank: BankNumber,
    },
    RequestBankMulti {
        bank: BankNumber,
    },
    RequestArrangement,
    RequestGlobal,
    RequestTotal,
    /// `part` is a part index or [`SINGLE_PART`](virusmc_types::SINGLE_PART).
    ParameterChange {
        page: Page,
        part: u8,
        param: u8,
        value: u8,
    },
}

impl Command {
    fn command_byte(&self) -> u8 {
        match self {
            Command::DumpSingle { .. } => cmd::DUMP_SINGLE,
            Command::DumpMulti { .. } => cmd::DUMP_MULTI,
            Command::RequestSingle { .. } => cmd::REQUEST_SINGLE,
            Command::RequestMulti { .. } => cmd::REQUEST_MULTI,
            Command::RequestBankSingle { .. } => cmd::REQUEST_BANK_SINGLE,
            Command::RequestBankMulti { .. } => cmd::REQUEST_BANK_MULTI,
            Command::RequestArrangement => cmd::REQUEST_ARRANGEMENT,
            Command::RequestGlobal => cmd::REQUEST_GLOBAL,
            Command::RequestTotal => cmd::REQUEST_TOTAL,
            Command::ParameterChange { page, .. } => page.to_wire(),
        }
    }
}

/// A command together with the device id it was addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysexMessage {
    pub device_id: u8,
    pub command: Command,
}

impl SysexMessage {
    pub fn new(device_id: u8, command: Command) -> Self {
        Self { device_id, command }
    }

    /// Whether a unit configured with `device_id` should act on this message.
    pub fn addresses(&self, device_id: u8) -> bool {
        self.device_id == device_id || self.device_id == OMNI_DEVICE_ID
    }
}

/// Why an incoming frame was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Checksum { expected: u8, actual: u8 },
    Malformed(String),
    UnsupportedPage(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Checksum { expected, actual } => write!(
                f,
                "checksum mismatch: expected {:02x}, got {:02x}",
                expected, actual
            ),
            DecodeError::Malformed(reason) => write!(f, "malformed sysex: {}", reason),
            DecodeError::UnsupportedPage(page) => {
                write!(f, "page {:02x} not supported by this model", page)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

fn malformed(reason: impl Into<String>) -> DecodeError {
    DecodeError::Malformed(reason.into())
}

/// 7-bit sum of `data[offset .. len - 2]`, i.e. everything between `offset`
/// and the checksum slot of a complete frame.
pub fn calc_checksum(data: &[u8], offset: usize) -> u8 {
    let end = data.len().saturating_sub(2);
    if offset >= end {
        return 0;
    }
    data[offset..end]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        & 0x7f
}

/// Decode one complete SysEx frame for the given hardware model.
pub fn decode(bytes: &[u8], model: DeviceModel) -> Result<SysexMessage, DecodeError> {
    if bytes.len() < HEADER_LEN + 1 {
        return Err(malformed(format!("truncated frame ({} bytes)", bytes.len())));
    }
    if bytes[0] != M_STARTOFSYSEX || bytes[bytes.len() - 1] != M_ENDOFSYSEX {
        return Err(malformed("missing sysex start or end byte"));
    }
    if bytes[1..4] != MANUFACTURER || bytes[4] != PRODUCT_ID {
        return Err(malformed("foreign manufacturer or product"));
    }
    let inner = &bytes[1..bytes.len() - 1];
    if let Some(pos) = inner.iter().position(|&b| b >= 0x80) {
        return Err(malformed(format!("data byte {} has the high bit set", pos + 1)));
    }

    let device_id = bytes[5];
    let command = bytes[6];
    let body = &bytes[HEADER_LEN..bytes.len() - 1];

    let command = match command {
        cmd::DUMP_SINGLE | cmd::DUMP_MULTI => {
            expect_len(body, 2 + PRESET_SIZE + 1, "preset dump")?;
            let actual = body[body.len() - 1];
            let expected = calc_checksum(bytes, CHECKSUM_OFFSET);
            if actual != expected {
                return Err(DecodeError::Checksum { expected, actual });
            }
            let bank = bank_from_wire(body[0])?;
            let program = body[1];
            let preset = Preset::from_bytes(&body[2..2 + PRESET_SIZE])
                .ok_or_else(|| malformed("preset payload size"))?;
            if command == cmd::DUMP_SINGLE {
                Command::DumpSingle { bank, program, preset }
            } else {
                Command::DumpMulti { bank, program, preset }
            }
        }
        cmd::REQUEST_SINGLE | cmd::REQUEST_MULTI => {
            expect_len(body, 2, "preset request")?;
            let bank = bank_from_wire(body[0])?;
            let program = body[1];
            if command == cmd::REQUEST_SINGLE {
                Command::RequestSingle { bank, program }
            } else {
                Command::RequestMulti { bank, program }
            }
        }
        cmd::REQUEST_BANK_SINGLE | cmd::REQUEST_BANK_MULTI => {
            expect_len(body, 1, "bank request")?;
            let bank = bank_from_wire(body[0])?;
            if command == cmd::REQUEST_BANK_SINGLE {
                Command::RequestBankSingle { bank }
            } else {
                Command::RequestBankMulti { bank }
            }
        }
        cmd::REQUEST_ARRANGEMENT | cmd::REQUEST_GLOBAL | cmd::REQUEST_TOTAL => {
            expect_len(body, 0, "request")?;
            match command {
                cmd::REQUEST_ARRANGEMENT => Command::RequestArrangement,
                cmd::REQUEST_GLOBAL => Command::RequestGlobal,
                _ => Command::RequestTotal,
            }
        }
        0x6e..=0x7f => {
            let page = Page::from_wire(command)
                .filter(|p| model.supports_page(*p))
                .ok_or(DecodeError::UnsupportedPage(command))?;
            expect_len(body, 3, "parameter change")?;
            Command::ParameterChange {
                page,
                part: body[0],
                param: body[1],
                value: body[2],
            }
        }
        other => return Err(malformed(format!("unknown command {:02x}", other))),
    };

    Ok(SysexMessage { device_id, command })
}

fn expect_len(body: &[u8], len: usize, what: &str) -> Result<(), DecodeError> {
    if body.len() == len {
        Ok(())
    } else {
        Err(malformed(format!(
            "{} body is {} bytes, expected {}",
            what,
            body.len(),
            len
        )))
    }
}

fn bank_from_wire(value: u8) -> Result<BankNumber, DecodeError> {
    BankNumber::from_wire(value).ok_or_else(|| malformed(format!("bank {} out of range", value)))
}

/// Encode a message into a complete SysEx frame, stamping the checksum
/// for preset dumps.
pub fn encode(msg: &SysexMessage) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + PRESET_SIZE + 4);
    out.push(M_STARTOFSYSEX);
    out.extend_from_slice(&MANUFACTURER);
    out.push(PRODUCT_ID);
    out.push(msg.device_id & 0x7f);
    out.push(msg.command.command_byte());

    let checksummed = match &msg.command {
        Command::DumpSingle { bank, program, preset }
        | Command::DumpMulti { bank, program, preset } => {
            out.push(bank.to_wire());
            out.push(program & 0x7f);
            out.extend(preset.as_bytes().iter().map(|b| b & 0x7f));
            true
        }
        Command::RequestSingle { bank, program } | Command::RequestMulti { bank, program } => {
            out.push(bank.to_wire());
            out.push(program & 0x7f);
            false
        }
        Command::RequestBankSingle { bank } | Command::RequestBankMulti { bank } => {
            out.push(bank.to_wire());
            false
        }
        Command::RequestArrangement | Command::RequestGlobal | Command::RequestTotal => false,
        Command::ParameterChange { part, param, value, .. } => {
            out.extend_from_slice(&[part & 0x7f, param & 0x7f, value & 0x7f]);
            false
        }
    };

    if checksummed {
        out.push(0);
        out.push(M_ENDOFSYSEX);
        let checksum = calc_checksum(&out, CHECKSUM_OFFSET);
        let slot = out.len() - 2;
        out[slot] = checksum;
    } else {
        out.push(M_ENDOFSYSEX);
    }
    out
}

/// Split a stream of concatenated frames (a `.syx` file) into frames.
/// Bytes outside `F0 .. F7` are skipped.
pub fn split_frames(stream: &[u8]) -> Vec<&[u8]> {
    let mut frames = Vec::new();
    let mut start = None;
    for (i, &b) in stream.iter().enumerate() {
        match b {
            M_STARTOFSYSEX => start = Some(i),
            M_ENDOFSYSEX => {
                if let Some(s) = start.take() {
                    frames.push(&stream[s..=i]);
                }
            }
            _ => {}
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use virusmc_types::{PresetKind, SINGLE_PART};

    fn sample_single() -> Preset {
        let mut p = Preset::init_single(0x07);
        p.set_name(PresetKind::Single, "Bass 01");
        for i in 1..100 {
            p.set(i, (i * 3) as u8);
        }
        p
    }

    fn dump(preset: Preset) -> SysexMessage {
        SysexMessage::new(
            OMNI_DEVICE_ID,
            Command::DumpSingle {
                bank: BankNumber::A,
                program: 3,
                preset,
            },
        )
    }

    #[test]
    fn dump_roundtrip() {
        let msg = dump(sample_single());
        let bytes = encode(&msg);
        assert_eq!(bytes.len(), HEADER_LEN + 2 + PRESET_SIZE + 2);
        assert_eq!(decode(&bytes, DeviceModel::C), Ok(msg));
    }

    #[test]
    fn every_checksummed_byte_is_covered() {
        let bytes = encode(&dump(sample_single()));
        for i in CHECKSUM_OFFSET..bytes.len() - 2 {
            let mut corrupted = bytes.clone();
            corrupted[i] ^= 0x01;
            match decode(&corrupted, DeviceModel::C) {
                Err(DecodeError::Checksum { .. }) => {}
                other => panic!("byte {} flip gave {:?}", i, other),
            }
        }
    }

    #[test]
    fn corrupted_checksum_byte_is_detected() {
        let mut bytes = encode(&dump(sample_single()));
        let slot = bytes.len() - 2;
        bytes[slot] ^= 0x40;
        assert!(matches!(
            decode(&bytes, DeviceModel::C),
            Err(DecodeError::Checksum { .. })
        ));
    }

    #[test]
    fn single_byte_is_malformed() {
        assert!(matches!(
            decode(&[0xf0], DeviceModel::C),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn truncated_dump_is_malformed() {
        let bytes = encode(&dump(sample_single()));
        let mut short = bytes[..bytes.len() - 10].to_vec();
        short.push(M_ENDOFSYSEX);
        assert!(matches!(
            decode(&short, DeviceModel::C),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn foreign_manufacturer_is_malformed() {
        let mut bytes = encode(&SysexMessage::new(0, Command::RequestGlobal));
        bytes[2] = 0x21;
        assert!(matches!(
            decode(&bytes, DeviceModel::C),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn page_support_depends_on_model() {
        let msg = SysexMessage::new(
            0,
            Command::ParameterChange {
                page: Page::D,
                part: SINGLE_PART,
                param: 10,
                value: 20,
            },
        );
        let bytes = encode(&msg);
        assert_eq!(
            decode(&bytes, DeviceModel::C),
            Err(DecodeError::UnsupportedPage(0x73))
        );
        assert_eq!(decode(&bytes, DeviceModel::Ti), Ok(msg));
    }

    #[test]
    fn unknown_page_byte_is_unsupported() {
        let mut bytes = encode(&SysexMessage::new(0, Command::RequestGlobal));
        bytes[6] = 0x7a;
        assert_eq!(
            decode(&bytes, DeviceModel::Ti),
            Err(DecodeError::UnsupportedPage(0x7a))
        );
    }

    #[test]
    fn requests_roundtrip() {
        for command in [
            Command::RequestSingle { bank: BankNumber::EditBuffer, program: SINGLE_PART },
            Command::RequestMulti { bank: BankNumber::A, program: 9 },
            Command::RequestBankSingle { bank: BankNumber::C },
            Command::RequestBankMulti { bank: BankNumber::A },
            Command::RequestArrangement,
            Command::RequestGlobal,
            Command::RequestTotal,
        ] {
            let msg = SysexMessage::new(0x22, command);
            assert_eq!(decode(&encode(&msg), DeviceModel::B), Ok(msg));
        }
    }

    #[test]
    fn bad_bank_in_request_is_malformed() {
        let mut bytes = encode(&SysexMessage::new(
            0,
            Command::RequestBankSingle { bank: BankNumber::A },
        ));
        bytes[7] = 0x20;
        assert!(matches!(
            decode(&bytes, DeviceModel::C),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn split_concatenated_frames() {
        let a = encode(&SysexMessage::new(0, Command::RequestGlobal));
        let b = encode(&dump(sample_single()));
        let mut stream = vec![0x00, 0x01];
        stream.extend_from_slice(&a);
        stream.push(0x42);
        stream.extend_from_slice(&b);
        let frames = split_frames(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], &a[..]);
        assert_eq!(frames[1], &b[..]);
    }

    #[test]
    fn addressing_honours_omni() {
        let msg = SysexMessage::new(OMNI_DEVICE_ID, Command::RequestGlobal);
        assert!(msg.addresses(0x00));
        let msg = SysexMessage::new(0x01, Command::RequestGlobal);
        assert!(msg.addresses(0x01));
        assert!(!msg.addresses(0x02));
    }
}
