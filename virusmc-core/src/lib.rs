//! # virusmc-core
//!
//! Emulation of the control processor that sits between the host and the
//! DSP of a Virus synthesizer. It decodes incoming SysEx and channel MIDI,
//! keeps the preset banks, edit buffers and global table, and paces preset
//! transfers to the DSP over an injected HDI08 channel.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use virusmc_core::{Config, Microcontroller, RomBanks, SimulatedChannel};
//!
//! let config = Config::load();
//! let rom = RomBanks::from_syx(config.model(), &std::fs::read("rom.syx")?)?;
//! let mc = Microcontroller::new(Arc::new(SimulatedChannel::new()), rom, &config);
//! mc.create_default_state();
//!
//! // host threads
//! let responses = mc.send_sysex(&frame, MidiEventSource::Editor);
//!
//! // processing thread, once per block
//! mc.process(block_size);
//! mc.process_hdi08_tx(&mut host_midi);
//! ```
//!
//! ## Module Overview
//!
//! - [`codec`]: SysEx framing, checksums and DSP word encoding
//! - [`store`]: RAM/ROM banks, edit buffers and the global table
//! - [`scheduler`]: one-at-a-time preset transfers with acknowledgement pacing
//! - [`event_queue`]: bounded SPSC ring (`rtrb`) for inbound host events
//! - [`hdi08`]: the host interface seam and a simulated chip
//! - [`microcontroller`]: the public facade tying the above together
//! - [`persistence`]: binary state snapshots

pub mod codec;
pub mod config;
pub mod demo;
pub mod event_queue;
pub mod hdi08;
pub mod microcontroller;
pub mod persistence;
pub mod rom;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod traffic_log;

pub use config::Config;
pub use demo::{DemoPlayback, DemoPort};
pub use hdi08::{Hdi08Channel, SimulatedChannel};
pub use microcontroller::{Diagnostics, Microcontroller};
pub use persistence::StateError;
pub use rom::RomBanks;
pub use store::StoreError;
