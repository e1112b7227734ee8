use serde::{Deserialize, Serialize};

use crate::{BankNumber, Page};

/// Hardware variant being emulated. Variants differ in the parameter pages
/// they expose and in how many lettered banks are writable RAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceModel {
    A,
    B,
    #[default]
    C,
    Ti,
}

impl DeviceModel {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "a" => Some(DeviceModel::A),
            "b" => Some(DeviceModel::B),
            "c" => Some(DeviceModel::C),
            "ti" | "ti2" => Some(DeviceModel::Ti),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            DeviceModel::A => 0,
            DeviceModel::B => 1,
            DeviceModel::C => 2,
            DeviceModel::Ti => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(DeviceModel::A),
            1 => Some(DeviceModel::B),
            2 => Some(DeviceModel::C),
            3 => Some(DeviceModel::Ti),
            _ => None,
        }
    }

    pub fn is_ti(self) -> bool {
        self == DeviceModel::Ti
    }

    /// Number of lettered banks, starting at `A`, that are writable RAM.
    pub fn ram_bank_count(self) -> usize {
        if self.is_ti() {
            4
        } else {
            2
        }
    }

    pub fn is_ram_bank(self, bank: BankNumber) -> bool {
        bank.index().is_some_and(|i| i < self.ram_bank_count())
    }

    pub fn is_rom_bank(self, bank: BankNumber) -> bool {
        bank.index().is_some_and(|i| i >= self.ram_bank_count())
    }

    pub fn supports_page(self, page: Page) -> bool {
        match page {
            Page::A | Page::B | Page::C => true,
            Page::D | Page::P6E | Page::P6F => self.is_ti(),
        }
    }

    /// Page that carries the global settings table.
    pub fn global_page(self) -> Page {
        if self.is_ti() {
            Page::D
        } else {
            Page::C
        }
    }

    /// Version code stamped into freshly initialised presets.
    pub fn default_version_code(self) -> u8 {
        match self {
            DeviceModel::A => 0x00,
            DeviceModel::B => 0x06,
            DeviceModel::C => 0x07,
            DeviceModel::Ti => 0x0c,
        }
    }
}
