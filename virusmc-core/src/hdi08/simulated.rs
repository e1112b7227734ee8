use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use virusmc_types::TWord;

use super::tx_parser::ack_words;
use super::Hdi08Channel;
use crate::codec::words::{is_preset_block, words_to_preset, PackedPreset};

#[derive(Default)]
struct SimState {
    received: Vec<Vec<TWord>>,
    outbox: VecDeque<Vec<TWord>>,
    busy: bool,
    reject_next: usize,
    auto_ack: bool,
}

/// In-process stand-in for a DSP host port.
///
/// Records every accepted block and serves replies queued with
/// [`push_reply`](Self::push_reply). With auto-ack enabled, each preset
/// block is acknowledged on the next poll.
#[derive(Default)]
pub struct SimulatedChannel {
    state: Mutex<SimState>,
}

impl SimulatedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_ack() -> Self {
        let channel = Self::new();
        channel.set_auto_ack(true);
        channel
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_auto_ack(&self, enabled: bool) {
        self.lock().auto_ack = enabled;
    }

    /// Refuse everything until cleared.
    pub fn set_busy(&self, busy: bool) {
        self.lock().busy = busy;
    }

    /// Refuse the next `count` blocks, then accept again.
    pub fn reject_next(&self, count: usize) {
        self.lock().reject_next = count;
    }

    /// Queue a block for the host to poll.
    pub fn push_reply(&self, words: Vec<TWord>) {
        self.lock().outbox.push_back(words);
    }

    /// Acknowledge one preset transfer.
    pub fn acknowledge(&self) {
        self.push_reply(ack_words());
    }

    /// Every block accepted so far, in order.
    pub fn received(&self) -> Vec<Vec<TWord>> {
        self.lock().received.clone()
    }

    /// Accepted blocks that were preset transfers, decoded.
    pub fn preset_blocks(&self) -> Vec<PackedPreset> {
        self.lock()
            .received
            .iter()
            .filter_map(|block| words_to_preset(block))
            .collect()
    }

    pub fn preset_block_count(&self) -> usize {
        self.lock()
            .received
            .iter()
            .filter(|block| is_preset_block(block))
            .count()
    }

    pub fn clear(&self) {
        self.lock().received.clear();
    }
}

impl Hdi08Channel for SimulatedChannel {
    fn can_accept(&self, _word_count: usize) -> bool {
        let mut state = self.lock();
        if state.busy {
            return false;
        }
        if state.reject_next > 0 {
            state.reject_next -= 1;
            return false;
        }
        true
    }

    fn submit(&self, words: &[TWord]) -> bool {
        let mut state = self.lock();
        if state.busy {
            return false;
        }
        if state.auto_ack && is_preset_block(words) {
            state.outbox.push_back(ack_words());
        }
        state.received.push(words.to_vec());
        true
    }

    fn poll(&self) -> Option<Vec<TWord>> {
        self.lock().outbox.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::words::{parameter_words, preset_to_words};
    use virusmc_types::{Page, Preset};

    #[test]
    fn auto_ack_only_for_presets() {
        let ch = SimulatedChannel::with_auto_ack();
        ch.submit(&parameter_words(Page::A, 0, 1, 2));
        assert!(ch.poll().is_none());
        ch.submit(&preset_to_words(&Preset::init_single(7), 0, false));
        assert_eq!(ch.poll(), Some(ack_words()));
        assert_eq!(ch.preset_block_count(), 1);
    }

    #[test]
    fn reject_next_counts_down() {
        let ch = SimulatedChannel::new();
        ch.reject_next(2);
        assert!(!ch.can_accept(1));
        assert!(!ch.can_accept(1));
        assert!(ch.can_accept(1));
    }
}
