use virusmc_types::{BankNumber, ControlCommand, MidiEvent, MidiEventSource, Preset, PART_COUNT, SLOT_COUNT};

use super::Inner;
use crate::codec::{self, Command, SysexMessage, OMNI_DEVICE_ID};
use crate::traffic_log::Direction;

impl Inner {
    /// Decode and apply one frame. Responses are appended to `responses`.
    /// Undecodable frames are logged and dropped.
    pub(super) fn handle_sysex(&mut self, data: &[u8], source: MidiEventSource, responses: &mut Vec<MidiEvent>) {
        let msg = match codec::decode(data, self.store.model()) {
            Ok(msg) => msg,
            Err(e) => {
                self.counters.decode_errors += 1;
                log::warn!(target: "mc::sysex", "discarding {} byte sysex from {:?}: {}", data.len(), source, e);
                self.log_traffic(Direction::In, source, data, Some(&e.to_string()));
                return;
            }
        };
        self.log_traffic(Direction::In, source, data, None);

        let device_id = self.store.device_id();
        if device_id != OMNI_DEVICE_ID && !msg.addresses(device_id) {
            log::debug!(target: "mc::sysex", "ignoring sysex for device {:02x}", msg.device_id);
            return;
        }

        let start = responses.len();
        self.apply_command(msg.command, responses);
        for response in &responses[start..] {
            self.log_traffic(Direction::Out, MidiEventSource::Internal, &response.sysex, None);
        }
    }

    fn apply_command(&mut self, command: Command, responses: &mut Vec<MidiEvent>) {
        match command {
            Command::DumpSingle { bank, program, preset } => {
                if let Err(e) = self.store_single(bank, program, preset) {
                    log::warn!(target: "mc::sysex", "single dump rejected: {}", e);
                }
            }
            Command::DumpMulti { bank, program, preset } => {
                if let Err(e) = self.store_multi(bank, program, preset) {
                    log::warn!(target: "mc::sysex", "multi dump rejected: {}", e);
                }
            }
            Command::RequestSingle { bank, program } => match self.store.request_single(bank, program) {
                Ok(preset) => responses.push(self.single_dump(bank, program, preset)),
                Err(e) => log::debug!(target: "mc::sysex", "single request unanswered: {}", e),
            },
            Command::RequestMulti { bank, program } => match self.store.request_multi(bank, program) {
                Ok(preset) => responses.push(self.multi_dump(bank, program, preset)),
                Err(e) => log::debug!(target: "mc::sysex", "multi request unanswered: {}", e),
            },
            Command::RequestBankSingle { bank } => self.dump_single_bank(bank, responses),
            Command::RequestBankMulti { bank } => self.dump_multi_bank(bank, responses),
            Command::RequestArrangement => self.dump_arrangement(responses),
            Command::RequestGlobal => self.dump_globals(responses),
            Command::RequestTotal => {
                for index in 0..self.store.model().ram_bank_count() {
                    if let Some(bank) = BankNumber::from_index(index) {
                        self.dump_single_bank(bank, responses);
                    }
                }
                self.dump_multi_bank(BankNumber::A, responses);
                self.dump_globals(responses);
            }
            Command::ParameterChange { page, part, param, value } => {
                if self.loading {
                    self.counters.rejected_while_loading += 1;
                    log::debug!(target: "mc::sysex", "parameter change rejected during state restore");
                    return;
                }
                self.apply_parameter(page, part, param, value);
            }
        }
    }

    fn encode_response(&self, command: Command) -> MidiEvent {
        let frame = codec::encode(&SysexMessage::new(self.store.device_id(), command));
        MidiEvent::sysex(frame, MidiEventSource::Internal)
    }

    fn single_dump(&self, bank: BankNumber, program: u8, preset: Preset) -> MidiEvent {
        self.encode_response(Command::DumpSingle { bank, program, preset })
    }

    fn multi_dump(&self, bank: BankNumber, program: u8, preset: Preset) -> MidiEvent {
        self.encode_response(Command::DumpMulti { bank, program, preset })
    }

    fn dump_single_bank(&self, bank: BankNumber, responses: &mut Vec<MidiEvent>) {
        if bank.is_edit_buffer() {
            log::debug!(target: "mc::sysex", "bank request for the edit buffer ignored");
            return;
        }
        for slot in 0..SLOT_COUNT as u8 {
            if let Ok(preset) = self.store.request_single(bank, slot) {
                responses.push(self.single_dump(bank, slot, preset));
            }
        }
    }

    fn dump_multi_bank(&self, bank: BankNumber, responses: &mut Vec<MidiEvent>) {
        if bank != BankNumber::A {
            log::debug!(target: "mc::sysex", "multi bank request for bank {} ignored", bank);
            return;
        }
        for slot in 0..SLOT_COUNT as u8 {
            if let Ok(preset) = self.store.request_multi(bank, slot) {
                responses.push(self.multi_dump(bank, slot, preset));
            }
        }
    }

    /// The multi edit buffer followed by all part singles.
    fn dump_arrangement(&self, responses: &mut Vec<MidiEvent>) {
        let multi = self.store.current_multi().clone();
        responses.push(self.multi_dump(BankNumber::EditBuffer, 0, multi));
        for part in 0..PART_COUNT as u8 {
            if let Some(single) = self.store.current_part_single(part) {
                responses.push(self.single_dump(BankNumber::EditBuffer, part, single.clone()));
            }
        }
    }

    /// Globals are reported as parameter changes on the global page.
    fn dump_globals(&self, responses: &mut Vec<MidiEvent>) {
        let page = self.store.model().global_page();
        for command in ControlCommand::GLOBALS {
            let param = command.param();
            responses.push(self.encode_response(Command::ParameterChange {
                page,
                part: 0,
                param,
                value: self.store.global(param),
            }));
        }
    }
}
