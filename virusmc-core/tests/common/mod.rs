#![allow(dead_code)]
//! Test harness utilities for virusmc-core integration tests.

use std::sync::Arc;

use virusmc_core::codec::{self, Command, SysexMessage};
use virusmc_core::{Config, Microcontroller, RomBanks, SimulatedChannel};
use virusmc_types::{DeviceModel, McFeedback, Preset, PresetKind};

/// A unit on a simulated DSP that acknowledges every transfer by itself.
pub fn unit() -> (Microcontroller, Arc<SimulatedChannel>) {
    unit_with(SimulatedChannel::with_auto_ack(), &Config::default())
}

/// A unit whose DSP only acknowledges when the test calls `acknowledge`.
pub fn manual_unit() -> (Microcontroller, Arc<SimulatedChannel>) {
    unit_with(SimulatedChannel::new(), &Config::default())
}

pub fn unit_with(channel: SimulatedChannel, config: &Config) -> (Microcontroller, Arc<SimulatedChannel>) {
    let channel = Arc::new(channel);
    let mc = Microcontroller::new(channel.clone(), test_rom(), config);
    (mc, channel)
}

/// One ROM bank with two named singles.
pub fn test_rom() -> RomBanks {
    RomBanks::new(
        DeviceModel::C,
        vec![vec![named_single("Rom0"), named_single("Rom1")]],
        vec![],
    )
}

pub fn named_single(name: &str) -> Preset {
    let mut p = Preset::init_single(7);
    p.set_name(PresetKind::Single, name);
    p
}

/// A multi whose enabled parts all play bank A `program`.
pub fn multi_on_program(name: &str, program: u8) -> Preset {
    let mut m = Preset::init_multi(7);
    m.set_name(PresetKind::Multi, name);
    for part in 0..16 {
        m.set(virusmc_types::multi::PART_PROGRAM + part, program);
    }
    m
}

pub fn frame(command: Command) -> Vec<u8> {
    codec::encode(&SysexMessage::new(0x10, command))
}

pub fn decode(bytes: &[u8]) -> Command {
    codec::decode(bytes, DeviceModel::C)
        .expect("response should decode")
        .command
}

/// Run processing blocks until the unit has nothing left for the DSP.
pub fn run_until_idle(mc: &Microcontroller, max_blocks: usize) {
    for _ in 0..max_blocks {
        mc.process(64);
        if mc.is_idle() {
            return;
        }
    }
    panic!(
        "still busy after {} blocks ({} transfers pending)",
        max_blocks,
        mc.diagnostics().pending_transfers
    );
}

pub fn drain_feedback(mc: &Microcontroller) -> Vec<McFeedback> {
    mc.feedback().try_iter().collect()
}
