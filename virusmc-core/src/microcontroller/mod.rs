//! The control processor.
//!
//! [`Microcontroller`] owns the preset store, the write scheduler and the
//! host adapter behind one mutex, and the producer half of the inbound event
//! ring behind a second one. Host threads call `send_midi`, `send_sysex` and
//! the preset/state methods; the processing thread calls `process` once per
//! block and collects chip output with `process_hdi08_tx`.
//!
//! Every decode → store → enqueue sequence runs under a single lock
//! acquisition, so `process` never sees a half-applied command.

mod programs;
mod sysex;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use virusmc_types::{
    BankNumber, ControlCommand, McFeedback, MidiEvent, MidiEventSource, Preset,
    PresetVersion, StateType, PART_COUNT, SINGLE_PART,
};

use crate::codec;
use crate::codec::words::{midi_words, parameter_words, preset_to_words};
use crate::config::Config;
use crate::event_queue::{event_queue, Consumer, Producer};
use crate::hdi08::{ChipReply, Hdi08Adapter, Hdi08Channel};
use crate::persistence::{self, StateError};
use crate::rom::RomBanks;
use crate::scheduler::{PendingTransfer, SchedulerEvent, WriteScheduler};
use crate::store::{PresetStore, StoreResult};
use crate::telemetry::LatencySummary;
use crate::traffic_log::{Direction, TrafficLog};

const FEEDBACK_CAPACITY: usize = 256;

/// Counters for everything that is absorbed rather than reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Diagnostics {
    pub inbound_overflow: u64,
    pub decode_errors: u64,
    pub rejected_while_loading: u64,
    pub late_events: u64,
    pub transfers_delivered: u64,
    pub transfers_dropped: u64,
    pub pending_transfers: usize,
    pub skipped_chip_words: u64,
    pub feedback_dropped: u64,
    /// Traffic log entries lost because its writer fell behind.
    pub traffic_log_dropped: u64,
    pub ack_latency: LatencySummary,
}

#[derive(Default)]
struct Counters {
    decode_errors: u64,
    rejected_while_loading: u64,
    late_events: u64,
    feedback_dropped: u64,
}

struct Inner {
    store: PresetStore,
    scheduler: WriteScheduler,
    adapter: Hdi08Adapter,
    consumer: Consumer<MidiEvent>,
    loading: bool,
    host_out: Vec<MidiEvent>,
    traffic: Option<TrafficLog>,
    counters: Counters,
    scheduler_events: Vec<SchedulerEvent>,
    feedback: Sender<McFeedback>,
}

pub struct Microcontroller {
    inner: Mutex<Inner>,
    producer: Mutex<Producer<MidiEvent>>,
    feedback_rx: Receiver<McFeedback>,
    rom: Arc<RomBanks>,
    booted: AtomicBool,
}

impl Microcontroller {
    /// `channel` is the first DSP host port. The microcontroller keeps a
    /// reference but never decides its lifetime.
    pub fn new(channel: Arc<dyn Hdi08Channel>, rom: RomBanks, config: &Config) -> Self {
        if config.model() != rom.model() {
            log::warn!(target: "mc", "config model {:?} differs from ROM model {:?}, using ROM", config.model(), rom.model());
        }
        let rom = Arc::new(rom);
        let (producer, consumer) = event_queue(config.inbound_capacity());
        let (feedback, feedback_rx) = crossbeam_channel::bounded(FEEDBACK_CAPACITY);

        let mut store = PresetStore::new(Arc::clone(&rom));
        store.set_global(ControlCommand::DeviceId.param(), config.device_id());

        let traffic = if config.traffic_log_enabled() {
            let log = TrafficLog::open();
            if log.is_none() {
                log::warn!(target: "mc", "could not open traffic log");
            }
            log
        } else {
            None
        };

        Self {
            inner: Mutex::new(Inner {
                store,
                scheduler: WriteScheduler::new(config.pacing()),
                adapter: Hdi08Adapter::new(channel),
                consumer,
                loading: false,
                host_out: Vec::new(),
                traffic,
                counters: Counters::default(),
                scheduler_events: Vec::new(),
                feedback,
            }),
            producer: Mutex::new(producer),
            feedback_rx,
            rom,
            booted: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach another DSP that mirrors the first one.
    pub fn add_channel(&self, channel: Arc<dyn Hdi08Channel>) {
        self.lock().adapter.add_channel(channel);
    }

    pub fn rom(&self) -> &RomBanks {
        &self.rom
    }

    /// Queue a host event for the next processing block. Never blocks on the
    /// processing thread; returns `false` if the inbound ring is full.
    pub fn send_midi(&self, event: MidiEvent) -> bool {
        let mut producer = self.producer.lock().unwrap_or_else(PoisonError::into_inner);
        let accepted = producer.push(event);
        if !accepted {
            log::debug!(target: "mc::midi", "inbound queue full, event dropped");
        }
        accepted
    }

    /// Handle one SysEx frame immediately and return the device's responses.
    pub fn send_sysex(&self, data: &[u8], source: MidiEventSource) -> Vec<MidiEvent> {
        let mut responses = Vec::new();
        self.lock().handle_sysex(data, source, &mut responses);
        responses
    }

    pub fn write_single(&self, bank: BankNumber, slot: u8, preset: Preset) -> StoreResult {
        self.lock().store_single(bank, slot, preset)
    }

    /// Store a multi. Writing the edit buffer loads it, fanning out to its parts.
    pub fn write_multi(&self, bank: BankNumber, slot: u8, preset: Preset) -> StoreResult {
        self.lock().store_multi(bank, slot, preset)
    }

    pub fn request_single(&self, bank: BankNumber, slot: u8) -> StoreResult<Preset> {
        self.lock().store.request_single(bank, slot)
    }

    pub fn request_multi(&self, bank: BankNumber, slot: u8) -> StoreResult<Preset> {
        self.lock().store.request_multi(bank, slot)
    }

    pub fn get_state(&self, kind: StateType) -> Vec<u8> {
        let inner = self.lock();
        persistence::encode_state(inner.store.model(), kind, &inner.store.contents())
    }

    /// Replace banks and globals (and, for a full snapshot, the edit buffers),
    /// then resend the active presets to the DSP. Parameter changes are
    /// rejected until those transfers have been delivered.
    pub fn set_state(&self, data: &[u8], kind: StateType) -> Result<(), StateError> {
        self.lock().restore_state(data, kind)
    }

    /// Whether a state restore is still being delivered to the DSP.
    pub fn is_loading_state(&self) -> bool {
        self.lock().loading
    }

    /// Advance one processing block: collect chip output, dispatch due
    /// inbound events and pump the write scheduler.
    pub fn process(&self, block_size: u32) {
        let mut inner = self.lock();
        inner.adapter.poll();
        inner.handle_chip_replies();
        if inner.adapter.has_booted() && !self.booted.swap(true, Ordering::AcqRel) {
            log::info!(target: "mc", "DSP boot complete");
            inner.notify(McFeedback::DspBooted);
        }

        inner.dispatch_pending(block_size);
        let late = inner.dispatch_pending(u32::MAX);
        if late > 0 {
            inner.counters.late_events += late as u64;
            log::debug!(target: "mc::midi", "{} events beyond block end dispatched late", late);
        }

        inner.pump_scheduler();
    }

    /// Move chip-originated host-bound MIDI into `midi_events`.
    pub fn process_hdi08_tx(&self, midi_events: &mut Vec<MidiEvent>) {
        midi_events.append(&mut self.lock().host_out);
    }

    /// Dispatch queued events with an offset up to `max_offset`.
    pub fn send_pending_midi_events(&self, max_offset: u32) {
        self.lock().dispatch_pending(max_offset);
    }

    pub fn send_midi_to_dsp(&self, a: u8, b: u8, c: u8) {
        self.lock().scheduler.enqueue_write(midi_words(a, b, c));
    }

    /// Send the global settings to the DSP.
    pub fn send_init_control_commands(&self) {
        self.lock().send_globals();
    }

    /// Reset to power-on contents and push them to the DSP.
    pub fn create_default_state(&self) {
        let mut inner = self.lock();
        inner.store.reset_to_defaults();
        inner.clear_outbound();
        inner.loading = false;
        inner.send_globals();
        inner.send_edit_buffers(false);
    }

    pub fn dsp_has_booted(&self) -> bool {
        self.booted.load(Ordering::Acquire)
    }

    pub fn preset_version(preset: &Preset) -> PresetVersion {
        preset.version()
    }

    pub fn calc_checksum(data: &[u8], offset: usize) -> u8 {
        codec::calc_checksum(data, offset)
    }

    /// Receiver for UI notifications. Clones share one queue.
    pub fn feedback(&self) -> Receiver<McFeedback> {
        self.feedback_rx.clone()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        let inbound_overflow = self
            .producer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .overflow_count();
        let mut inner = self.lock();
        Diagnostics {
            inbound_overflow,
            decode_errors: inner.counters.decode_errors,
            rejected_while_loading: inner.counters.rejected_while_loading,
            late_events: inner.counters.late_events,
            transfers_delivered: inner.scheduler.delivered_count(),
            transfers_dropped: inner.scheduler.dropped_count(),
            pending_transfers: inner.scheduler.pending_transfers(),
            skipped_chip_words: inner.adapter.skipped_words(),
            feedback_dropped: inner.counters.feedback_dropped,
            traffic_log_dropped: inner.traffic.as_ref().map_or(0, TrafficLog::dropped_count),
            ack_latency: inner.scheduler.take_latency_summary(),
        }
    }

    /// Nothing queued for the DSP and no transfer awaiting acknowledgement.
    pub fn is_idle(&self) -> bool {
        self.lock().scheduler.is_idle()
    }

    pub fn current_multi(&self) -> Preset {
        self.lock().store.current_multi().clone()
    }

    pub fn current_part_single(&self, part: u8) -> Option<Preset> {
        self.lock().store.current_part_single(part).cloned()
    }

    pub fn global(&self, index: u8) -> u8 {
        self.lock().store.global(index)
    }
}

impl Inner {
    fn notify(&mut self, event: McFeedback) {
        if let Err(TrySendError::Full(_)) = self.feedback.try_send(event) {
            self.counters.feedback_dropped += 1;
        }
    }

    fn log_traffic(&mut self, dir: Direction, source: MidiEventSource, bytes: &[u8], error: Option<&str>) {
        if let Some(log) = self.traffic.as_mut() {
            log.log(dir, source, bytes, error);
        }
    }

    fn pump_scheduler(&mut self) {
        let mut events = std::mem::take(&mut self.scheduler_events);
        self.scheduler.pump(&mut self.adapter, &mut events);
        for event in events.drain(..) {
            match event {
                SchedulerEvent::Delivered { slot, is_multi, latency_ticks } => {
                    self.notify(McFeedback::TransferDelivered { slot, is_multi, latency_ticks })
                }
                SchedulerEvent::TimedOut(timeout) => self.notify(McFeedback::HandshakeTimeout {
                    slot: timeout.slot,
                    is_multi: timeout.is_multi,
                    retrying: timeout.retrying,
                }),
                SchedulerEvent::RestoreComplete => self.finish_restore(),
            }
        }
        self.scheduler_events = events;
    }

    fn finish_restore(&mut self) {
        if self.loading {
            self.loading = false;
            log::info!(target: "mc::state", "state restore delivered");
            self.notify(McFeedback::StateRestored);
        }
    }

    fn dispatch_pending(&mut self, max_offset: u32) -> usize {
        let mut count = 0;
        loop {
            let Some(event) = self.consumer.drain_up_to(max_offset).next() else {
                break;
            };
            count += 1;
            if event.is_sysex() {
                let mut responses = Vec::new();
                self.handle_sysex(&event.sysex, event.source, &mut responses);
                self.host_out.extend(responses);
            } else {
                self.handle_channel_message(&event);
            }
        }
        count
    }

    fn handle_chip_replies(&mut self) {
        while let Some(reply) = self.adapter.next_reply() {
            match reply {
                ChipReply::Midi { a, b, c } => {
                    self.host_out.push(MidiEvent::new(a, b, c).with_source(MidiEventSource::Internal))
                }
                ChipReply::Sysex(bytes) => {
                    self.log_traffic(Direction::Out, MidiEventSource::Internal, &bytes, None);
                    self.host_out.push(MidiEvent::sysex(bytes, MidiEventSource::Internal));
                }
                ChipReply::Parameter { page, part, param, value } => {
                    if self.loading {
                        self.counters.rejected_while_loading += 1;
                        log::debug!(target: "mc::hdi08", "parameter echo dropped during state restore");
                        continue;
                    }
                    self.store.apply_param_to_edit_buffer(page, part, param, value);
                    let frame = codec::encode(&codec::SysexMessage::new(
                        self.store.device_id(),
                        codec::Command::ParameterChange { page, part, param, value },
                    ));
                    self.host_out.push(MidiEvent::sysex(frame, MidiEventSource::Internal));
                }
                ChipReply::PresetAck | ChipReply::Booted => {}
            }
        }
    }

    fn clear_outbound(&mut self) {
        self.scheduler.clear(&mut self.adapter);
    }

    fn restore_state(&mut self, data: &[u8], kind: StateType) -> Result<(), StateError> {
        if self.loading {
            return Err(StateError::RestoreInProgress);
        }
        let contents =
            persistence::decode_state(data, self.store.model(), kind, self.store.contents())?;
        match kind {
            StateType::Full => self.store.restore(contents),
            StateType::Banks => self.store.restore_banks(contents),
        }

        let dropped = self.scheduler.pending_writes();
        if dropped > 0 {
            log::debug!(target: "mc::state", "discarding {} pending writes before restore", dropped);
        }
        self.scheduler.discard_queued();
        self.loading = true;
        self.send_globals();
        if kind == StateType::Full {
            self.send_edit_buffers(true);
        }
        if self.scheduler.restore_remaining() == 0 {
            self.finish_restore();
        }
        log::info!(target: "mc::state", "restored {:?} state ({} bytes)", kind, data.len());
        Ok(())
    }

    fn send_globals(&mut self) {
        let page = self.store.model().global_page();
        for command in ControlCommand::GLOBALS {
            let value = self.store.global(command.param());
            self.scheduler
                .enqueue_write(parameter_words(page, 0, command.param(), value));
        }
    }

    /// Queue the active edit buffers: the single edit buffer in single mode,
    /// otherwise the multi followed by every part's single.
    fn send_edit_buffers(&mut self, restore: bool) {
        if self.store.play_mode().is_multi() {
            let multi = self.store.current_multi().clone();
            self.queue_multi(0, &multi, restore);
            for part in 0..PART_COUNT as u8 {
                self.queue_part_single(part, restore);
            }
        } else {
            self.queue_part_single(SINGLE_PART, restore);
        }
    }

    fn queue_part_single(&mut self, part: u8, restore: bool) {
        let Some(preset) = self.store.current_part_single(part) else {
            return;
        };
        let mut transfer = PendingTransfer::new(part, false, preset_to_words(preset, part, false));
        if restore {
            transfer = transfer.for_restore();
        }
        self.scheduler.enqueue_transfer(transfer);
    }

    fn queue_multi(&mut self, slot: u8, multi: &Preset, restore: bool) {
        let mut transfer = PendingTransfer::new(slot, true, preset_to_words(multi, slot, true));
        if restore {
            transfer = transfer.for_restore();
        }
        self.scheduler.enqueue_transfer(transfer);
    }

    /// Store a single and, for the edit buffer, send it to the DSP.
    fn store_single(&mut self, bank: BankNumber, slot: u8, preset: Preset) -> StoreResult {
        self.store.write_single(bank, slot, preset)?;
        if bank.is_edit_buffer() {
            self.queue_part_single(slot, false);
        }
        Ok(())
    }

    /// Store a multi. For the edit buffer the multi is loaded as one
    /// transaction and then sent, followed by the singles of its enabled parts.
    fn store_multi(&mut self, bank: BankNumber, slot: u8, preset: Preset) -> StoreResult {
        if !bank.is_edit_buffer() {
            return self.store.write_multi(bank, slot, preset);
        }
        let load = self.store.load_multi(slot, &preset)?;
        self.queue_multi(slot, &preset, false);
        for part in load.parts {
            self.queue_part_single(part, false);
        }
        Ok(())
    }
}
