use serde::{Deserialize, Serialize};

/// Number of preset slots in every bank.
pub const SLOT_COUNT: usize = 128;

/// Number of parts in a multi.
pub const PART_COUNT: usize = 16;

/// Wire part number addressing the single-mode edit buffer
/// (the "current part" when the device is not in multi mode).
pub const SINGLE_PART: u8 = 0x40;

/// Bank addressing as used on the SysEx wire.
///
/// `EditBuffer` is the transient pseudo-bank (wire 0). Lettered banks are
/// either RAM or ROM depending on the [`DeviceModel`](crate::DeviceModel).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum BankNumber {
    EditBuffer,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl BankNumber {
    /// All lettered banks in order.
    pub const LETTERED: [BankNumber; 8] = [
        BankNumber::A,
        BankNumber::B,
        BankNumber::C,
        BankNumber::D,
        BankNumber::E,
        BankNumber::F,
        BankNumber::G,
        BankNumber::H,
    ];

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(BankNumber::EditBuffer),
            n => Self::from_index(n as usize - 1),
        }
    }

    pub fn to_wire(self) -> u8 {
        match self.index() {
            None => 0,
            Some(i) => i as u8 + 1,
        }
    }

    /// Zero-based index of a lettered bank (`A` is 0). `None` for the edit buffer.
    pub fn index(self) -> Option<usize> {
        Self::LETTERED.iter().position(|b| *b == self)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::LETTERED.get(index).copied()
    }

    pub fn is_edit_buffer(self) -> bool {
        self == BankNumber::EditBuffer
    }
}

impl std::fmt::Display for BankNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index() {
            None => write!(f, "EditBuffer"),
            Some(i) => write!(f, "{}", (b'A' + i as u8) as char),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_mapping() {
        assert_eq!(BankNumber::from_wire(0), Some(BankNumber::EditBuffer));
        assert_eq!(BankNumber::from_wire(1), Some(BankNumber::A));
        assert_eq!(BankNumber::from_wire(8), Some(BankNumber::H));
        assert_eq!(BankNumber::from_wire(9), None);
        assert_eq!(BankNumber::C.to_wire(), 3);
        assert_eq!(BankNumber::EditBuffer.to_wire(), 0);
    }

    #[test]
    fn display_letters() {
        assert_eq!(BankNumber::A.to_string(), "A");
        assert_eq!(BankNumber::H.to_string(), "H");
        assert_eq!(BankNumber::EditBuffer.to_string(), "EditBuffer");
    }
}
