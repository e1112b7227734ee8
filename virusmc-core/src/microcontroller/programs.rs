//! Program change, bank select and parameter forwarding.

use virusmc_types::{
    ControlCommand, MidiEvent, Page, PlayMode, MC_BANKSELECTLSB, MC_BANKSELECTMSB,
    M_CONTROLCHANGE, M_PROGRAMCHANGE, PART_COUNT, SINGLE_PART,
};

use super::Inner;
use crate::codec::words::{midi_words, parameter_words};
use crate::store::EditTarget;

impl Inner {
    pub(super) fn handle_channel_message(&mut self, event: &MidiEvent) {
        match event.status() {
            M_PROGRAMCHANGE => {
                if !self.reject_while_loading() {
                    self.program_change(event.channel(), event.b);
                }
            }
            M_CONTROLCHANGE if event.b == MC_BANKSELECTLSB => {
                if !self.reject_while_loading() {
                    self.bank_select(event.channel(), event.c);
                }
            }
            M_CONTROLCHANGE if event.b == MC_BANKSELECTMSB => {}
            _ => self.scheduler.enqueue_write(midi_words(event.a, event.b, event.c)),
        }
    }

    fn reject_while_loading(&mut self) -> bool {
        if self.loading {
            self.counters.rejected_while_loading += 1;
            log::debug!(target: "mc::midi", "program selection rejected during state restore");
        }
        self.loading
    }

    /// Parts of the multi edit buffer listening on `channel`.
    fn parts_on_channel(&self, channel: u8) -> Vec<u8> {
        let multi = self.store.current_multi();
        (0..PART_COUNT as u8)
            .filter(|&part| multi.part_enabled(part) && multi.part_midi_channel(part) == channel)
            .collect()
    }

    fn program_change(&mut self, channel: u8, program: u8) {
        let global_channel = self.store.global_channel();
        match self.store.play_mode() {
            PlayMode::Single => {
                if channel != global_channel {
                    return;
                }
                match self.store.single_program_change(program) {
                    Ok(()) => self.queue_part_single(SINGLE_PART, false),
                    Err(e) => log::debug!(target: "mc::midi", "program change ignored: {}", e),
                }
            }
            PlayMode::Multi if channel == global_channel => {
                match self.store.multi_program_change(program) {
                    Ok(load) => {
                        let multi = self.store.current_multi().clone();
                        self.queue_multi(load.slot, &multi, false);
                        for part in load.parts {
                            self.queue_part_single(part, false);
                        }
                    }
                    Err(e) => log::debug!(target: "mc::midi", "multi program change ignored: {}", e),
                }
            }
            _ => {
                for part in self.parts_on_channel(channel) {
                    match self.store.part_program_change(part, program) {
                        Ok(()) => self.queue_part_single(part, false),
                        Err(e) => {
                            log::debug!(target: "mc::midi", "program change on part {} ignored: {}", part, e)
                        }
                    }
                }
            }
        }
    }

    fn bank_select(&mut self, channel: u8, bank: u8) {
        if self.store.play_mode() == PlayMode::Single {
            if channel == self.store.global_channel() {
                if let Err(e) = self.store.single_bank_select(bank) {
                    log::debug!(target: "mc::midi", "bank select ignored: {}", e);
                }
            }
            return;
        }
        for part in self.parts_on_channel(channel) {
            if let Err(e) = self.store.part_bank_select(part, bank, false) {
                log::debug!(target: "mc::midi", "bank select on part {} ignored: {}", part, e);
            }
        }
    }

    /// Apply a parameter change to the edit buffers and forward it to the DSP.
    pub(super) fn apply_parameter(&mut self, page: Page, part: u8, param: u8, value: u8) {
        if page == Page::C
            && (part as usize) < PART_COUNT
            && ControlCommand::from_param(param) == Some(ControlCommand::PartProgramChange)
        {
            match self.store.part_program_change(part, value) {
                Ok(()) => {
                    self.scheduler.enqueue_write(parameter_words(page, part, param, value));
                    self.queue_part_single(part, false);
                }
                Err(e) => log::debug!(target: "mc::sysex", "part program change ignored: {}", e),
            }
            return;
        }

        match self.store.apply_param_to_edit_buffer(page, part, param, value) {
            EditTarget::Ignored if !(page.is_meta() && self.store.model().supports_page(page)) => {
                log::trace!(target: "mc::sysex", "parameter {:?}/{}/{} not applicable", page, part, param);
            }
            EditTarget::Global(index) if index == ControlCommand::PlayMode.param() => {
                self.scheduler.enqueue_write(parameter_words(page, part, param, value));
                log::debug!(target: "mc", "play mode now {:?}", self.store.play_mode());
                self.send_edit_buffers(false);
            }
            _ => self.scheduler.enqueue_write(parameter_words(page, part, param, value)),
        }
    }
}
