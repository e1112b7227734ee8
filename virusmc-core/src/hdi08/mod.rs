//! Host interface to the DSP.
//!
//! `Hdi08Channel` is the narrow submit/poll contract of a physical (or
//! simulated) host port. The microcontroller never owns a channel's lifetime;
//! it is handed `Arc`s at construction and talks to them only through
//! [`Hdi08Adapter`].

mod simulated;
pub mod tx_parser;

use std::collections::VecDeque;
use std::sync::Arc;

use virusmc_types::TWord;

pub use simulated::SimulatedChannel;
pub use tx_parser::{ChipReply, TxParser};

/// One DSP host port with hardware flow control.
pub trait Hdi08Channel: Send + Sync {
    /// Whether a block of `word_count` words would be accepted right now.
    fn can_accept(&self, word_count: usize) -> bool;

    /// Hand a block to the chip. Returns `false` if the port is busy.
    fn submit(&self, words: &[TWord]) -> bool;

    /// Next block of words written by the chip, if any.
    fn poll(&self) -> Option<Vec<TWord>>;
}

struct Port {
    channel: Arc<dyn Hdi08Channel>,
    parser: TxParser,
    pending_acks: u32,
    booted: bool,
}

/// Fans writes out to every attached DSP and collects their replies.
///
/// A block goes out only if every port can take it, so the DSPs never
/// diverge. Acknowledgements are counted per port and consumed together.
/// Only the first port's MIDI, SysEx and parameter output is surfaced.
pub struct Hdi08Adapter {
    ports: Vec<Port>,
    replies: VecDeque<ChipReply>,
    scratch: Vec<ChipReply>,
}

impl Hdi08Adapter {
    pub fn new(channel: Arc<dyn Hdi08Channel>) -> Self {
        let mut adapter = Self {
            ports: Vec::new(),
            replies: VecDeque::new(),
            scratch: Vec::new(),
        };
        adapter.add_channel(channel);
        adapter
    }

    pub fn add_channel(&mut self, channel: Arc<dyn Hdi08Channel>) {
        self.ports.push(Port {
            channel,
            parser: TxParser::new(),
            pending_acks: 0,
            booted: false,
        });
    }

    /// Submit to every port. Returns `false`, sending nothing, if any port is busy.
    pub fn submit(&mut self, words: &[TWord]) -> bool {
        if !self.ports.iter().all(|p| p.channel.can_accept(words.len())) {
            return false;
        }
        for (index, port) in self.ports.iter().enumerate() {
            if !port.channel.submit(words) {
                log::warn!(target: "mc::hdi08", "port {} refused a block it reported it could accept", index);
            }
        }
        true
    }

    /// Drain every port and parse what arrived. Returns the number of replies parsed.
    pub fn poll(&mut self) -> usize {
        let mut parsed = 0;
        for (index, port) in self.ports.iter_mut().enumerate() {
            while let Some(block) = port.channel.poll() {
                self.scratch.clear();
                port.parser.parse(&block, &mut self.scratch);
                parsed += self.scratch.len();
                for reply in self.scratch.drain(..) {
                    match reply {
                        ChipReply::PresetAck => port.pending_acks += 1,
                        ChipReply::Booted => port.booted = true,
                        other if index == 0 => self.replies.push_back(other),
                        other => {
                            log::trace!(target: "mc::hdi08", "ignoring output of port {}: {:?}", index, other)
                        }
                    }
                }
            }
        }
        parsed
    }

    /// Consume one acknowledgement if every port has sent one.
    pub fn take_ack(&mut self) -> bool {
        if self.ports.iter().any(|p| p.pending_acks == 0) {
            return false;
        }
        for port in &mut self.ports {
            port.pending_acks -= 1;
        }
        true
    }

    /// Forget acknowledgements not yet consumed.
    pub fn clear_acks(&mut self) {
        for port in &mut self.ports {
            port.pending_acks = 0;
        }
    }

    pub fn next_reply(&mut self) -> Option<ChipReply> {
        self.replies.pop_front()
    }

    pub fn has_booted(&self) -> bool {
        self.ports.iter().all(|p| p.booted)
    }

    /// Words across all ports that the parser could not attribute to a message.
    pub fn skipped_words(&self) -> u64 {
        self.ports.iter().map(|p| p.parser.skipped_words()).sum()
    }
}
