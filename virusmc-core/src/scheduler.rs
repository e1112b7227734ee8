//! Paced delivery of writes to the DSP.
//!
//! Small writes (parameter changes, MIDI) and bulk preset transfers share one
//! FIFO so nothing overtakes an earlier preset. Small writes go out as soon
//! as the port takes them. A bulk transfer must be acknowledged by the chip
//! before anything behind it is sent, and the next bulk transfer waits
//! `transfer_gap_ticks` pumps after that acknowledgement.
//!
//! ```text
//! Idle ──dispatch──▶ TransferPending ──submitted──▶ AwaitingAck ──ack / timeout──▶ Idle
//! ```

use std::collections::VecDeque;
use std::fmt;

use virusmc_types::TWord;

use crate::hdi08::Hdi08Adapter;
use crate::telemetry::{AckTelemetry, LatencySummary};

/// Timing policy for bulk transfers, in scheduler ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    pub ack_timeout_ticks: u32,
    pub transfer_gap_ticks: u32,
    /// Resend a timed-out transfer once before dropping it.
    pub retry_on_timeout: bool,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            ack_timeout_ticks: 64,
            transfer_gap_ticks: 1,
            retry_on_timeout: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    /// Popped from the queue, waiting for the port to take it.
    TransferPending,
    AwaitingAck { since: u64 },
}

/// A bulk preset write waiting for, or in, delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransfer {
    pub slot: u8,
    pub is_multi: bool,
    pub payload: Vec<TWord>,
    /// Queued by a state restore.
    pub restore: bool,
    attempts: u8,
}

impl PendingTransfer {
    pub fn new(slot: u8, is_multi: bool, payload: Vec<TWord>) -> Self {
        Self {
            slot,
            is_multi,
            payload,
            restore: false,
            attempts: 0,
        }
    }

    pub fn for_restore(mut self) -> Self {
        self.restore = true;
        self
    }
}

/// The chip did not acknowledge a transfer within the policy's timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeTimeout {
    pub slot: u8,
    pub is_multi: bool,
    pub waited_ticks: u64,
    pub retrying: bool,
}

impl fmt::Display for HandshakeTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_multi { "multi" } else { "single" };
        write!(
            f,
            "no acknowledgement for {} transfer to slot {} after {} ticks",
            kind, self.slot, self.waited_ticks
        )?;
        if self.retrying {
            write!(f, ", retrying")
        } else {
            write!(f, ", dropped")
        }
    }
}

impl std::error::Error for HandshakeTimeout {}

/// What a pump did, for the caller to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Delivered {
        slot: u8,
        is_multi: bool,
        latency_ticks: u32,
    },
    TimedOut(HandshakeTimeout),
    /// The last transfer queued by a state restore has left the queue.
    RestoreComplete,
}

#[derive(Debug)]
enum Outbound {
    Write(Vec<TWord>),
    Transfer(PendingTransfer),
}

pub struct WriteScheduler {
    policy: PacingPolicy,
    queue: VecDeque<Outbound>,
    in_flight: Option<PendingTransfer>,
    state: HandshakeState,
    tick: u64,
    next_transfer_tick: u64,
    restore_remaining: usize,
    delivered: u64,
    dropped: u64,
    telemetry: AckTelemetry,
}

impl WriteScheduler {
    pub fn new(policy: PacingPolicy) -> Self {
        Self {
            policy,
            queue: VecDeque::new(),
            in_flight: None,
            state: HandshakeState::Idle,
            tick: 0,
            next_transfer_tick: 0,
            restore_remaining: 0,
            delivered: 0,
            dropped: 0,
            telemetry: AckTelemetry::new(),
        }
    }

    pub fn enqueue_transfer(&mut self, transfer: PendingTransfer) {
        if transfer.restore {
            self.restore_remaining += 1;
        }
        self.queue.push_back(Outbound::Transfer(transfer));
    }

    pub fn enqueue_write(&mut self, words: Vec<TWord>) {
        self.queue.push_back(Outbound::Write(words));
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Transfers queued or in flight.
    pub fn pending_transfers(&self) -> usize {
        let queued = self
            .queue
            .iter()
            .filter(|o| matches!(o, Outbound::Transfer(_)))
            .count();
        queued + usize::from(self.in_flight.is_some())
    }

    pub fn pending_writes(&self) -> usize {
        self.queue.len() + usize::from(self.in_flight.is_some())
    }

    pub fn is_idle(&self) -> bool {
        self.state == HandshakeState::Idle && self.queue.is_empty()
    }

    /// Restore transfers not yet delivered or dropped.
    pub fn restore_remaining(&self) -> usize {
        self.restore_remaining
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    pub fn take_latency_summary(&mut self) -> LatencySummary {
        self.telemetry.take_summary()
    }

    /// Forget everything queued, including a transfer in flight.
    pub fn clear(&mut self, adapter: &mut Hdi08Adapter) {
        self.queue.clear();
        self.in_flight = None;
        self.state = HandshakeState::Idle;
        self.restore_remaining = 0;
        adapter.clear_acks();
    }

    /// Forget queued work but keep a transfer the chip already has. Its ack
    /// is still paired with it, so later transfers are not credited with it.
    pub fn discard_queued(&mut self) {
        self.queue.clear();
        self.restore_remaining = 0;
        if self.state == HandshakeState::TransferPending {
            self.in_flight = None;
            self.state = HandshakeState::Idle;
        }
    }

    /// Advance one tick. Expects `adapter` to have been polled already.
    pub fn pump(&mut self, adapter: &mut Hdi08Adapter, events: &mut Vec<SchedulerEvent>) {
        self.tick += 1;

        if let HandshakeState::AwaitingAck { since } = self.state {
            let waited = self.tick - since;
            if adapter.take_ack() {
                self.finish_delivery(waited, events);
            } else if waited >= self.policy.ack_timeout_ticks as u64 {
                self.handle_timeout(adapter, waited, events);
            } else {
                return;
            }
        }

        if self.state == HandshakeState::TransferPending {
            self.submit_in_flight(adapter);
            return;
        }

        while let Some(front) = self.queue.front() {
            match front {
                Outbound::Write(words) => {
                    if !adapter.submit(words) {
                        return;
                    }
                    self.queue.pop_front();
                }
                Outbound::Transfer(_) => {
                    if self.tick < self.next_transfer_tick {
                        return;
                    }
                    if let Some(Outbound::Transfer(transfer)) = self.queue.pop_front() {
                        self.in_flight = Some(transfer);
                        self.state = HandshakeState::TransferPending;
                        self.submit_in_flight(adapter);
                    }
                    return;
                }
            }
        }
    }

    fn submit_in_flight(&mut self, adapter: &mut Hdi08Adapter) -> bool {
        let Some(transfer) = self.in_flight.as_mut() else {
            self.state = HandshakeState::Idle;
            return false;
        };
        // acks counted while nothing was awaiting belong to an earlier transfer
        adapter.clear_acks();
        if !adapter.submit(&transfer.payload) {
            return false;
        }
        transfer.attempts += 1;
        self.state = HandshakeState::AwaitingAck { since: self.tick };
        log::trace!(target: "mc::scheduler", "transfer to slot {} submitted (attempt {})", transfer.slot, transfer.attempts);
        true
    }

    fn finish_delivery(&mut self, waited: u64, events: &mut Vec<SchedulerEvent>) {
        self.state = HandshakeState::Idle;
        self.next_transfer_tick = self.tick + self.policy.transfer_gap_ticks as u64;
        let Some(transfer) = self.in_flight.take() else {
            return;
        };
        let latency_ticks = waited.min(u32::MAX as u64) as u32;
        self.telemetry.record(latency_ticks);
        self.delivered += 1;
        events.push(SchedulerEvent::Delivered {
            slot: transfer.slot,
            is_multi: transfer.is_multi,
            latency_ticks,
        });
        self.settle_restore(&transfer, events);
    }

    fn handle_timeout(&mut self, adapter: &mut Hdi08Adapter, waited: u64, events: &mut Vec<SchedulerEvent>) {
        self.state = HandshakeState::Idle;
        self.next_transfer_tick = self.tick + self.policy.transfer_gap_ticks as u64;
        adapter.clear_acks();
        self.telemetry.record_timeout();
        let Some(transfer) = self.in_flight.take() else {
            return;
        };
        let retrying = self.policy.retry_on_timeout && transfer.attempts < 2;
        let timeout = HandshakeTimeout {
            slot: transfer.slot,
            is_multi: transfer.is_multi,
            waited_ticks: waited,
            retrying,
        };
        log::warn!(target: "mc::scheduler", "{}", timeout);
        events.push(SchedulerEvent::TimedOut(timeout));
        if retrying {
            self.queue.push_front(Outbound::Transfer(transfer));
        } else {
            self.dropped += 1;
            self.settle_restore(&transfer, events);
        }
    }

    fn settle_restore(&mut self, transfer: &PendingTransfer, events: &mut Vec<SchedulerEvent>) {
        if !transfer.restore || self.restore_remaining == 0 {
            return;
        }
        self.restore_remaining -= 1;
        if self.restore_remaining == 0 {
            events.push(SchedulerEvent::RestoreComplete);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::words::{parameter_words, preset_to_words};
    use crate::hdi08::SimulatedChannel;
    use std::sync::Arc;
    use virusmc_types::{Page, Preset};

    fn setup(policy: PacingPolicy) -> (WriteScheduler, Hdi08Adapter, Arc<SimulatedChannel>) {
        let channel = Arc::new(SimulatedChannel::new());
        let adapter = Hdi08Adapter::new(channel.clone());
        (WriteScheduler::new(policy), adapter, channel)
    }

    fn transfer(slot: u8) -> PendingTransfer {
        PendingTransfer::new(slot, true, preset_to_words(&Preset::init_multi(7), slot, true))
    }

    fn pump(s: &mut WriteScheduler, a: &mut Hdi08Adapter) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        a.poll();
        s.pump(a, &mut events);
        events
    }

    #[test]
    fn one_transfer_in_flight() {
        let (mut s, mut a, ch) = setup(PacingPolicy::default());
        s.enqueue_transfer(transfer(0));
        s.enqueue_transfer(transfer(1));
        pump(&mut s, &mut a);
        assert_eq!(ch.preset_block_count(), 1);
        for _ in 0..10 {
            pump(&mut s, &mut a);
        }
        assert_eq!(ch.preset_block_count(), 1);
        assert!(matches!(s.state(), HandshakeState::AwaitingAck { .. }));
    }

    #[test]
    fn ack_releases_next_after_gap() {
        let (mut s, mut a, ch) = setup(PacingPolicy { transfer_gap_ticks: 2, ..PacingPolicy::default() });
        s.enqueue_transfer(transfer(0));
        s.enqueue_transfer(transfer(1));
        pump(&mut s, &mut a);
        ch.acknowledge();
        let events = pump(&mut s, &mut a);
        assert!(matches!(events[0], SchedulerEvent::Delivered { slot: 0, .. }));
        assert_eq!(ch.preset_block_count(), 1);
        pump(&mut s, &mut a);
        assert_eq!(ch.preset_block_count(), 1);
        pump(&mut s, &mut a);
        assert_eq!(ch.preset_block_count(), 2);
    }

    #[test]
    fn small_writes_do_not_overtake_transfers() {
        let (mut s, mut a, ch) = setup(PacingPolicy::default());
        s.enqueue_write(parameter_words(Page::A, 0, 1, 1));
        s.enqueue_transfer(transfer(0));
        s.enqueue_write(parameter_words(Page::A, 0, 2, 2));
        pump(&mut s, &mut a);
        assert_eq!(ch.received().len(), 2);
        ch.acknowledge();
        pump(&mut s, &mut a);
        let received = ch.received();
        assert_eq!(received.len(), 3);
        assert_eq!(received[2], parameter_words(Page::A, 0, 2, 2));
    }

    #[test]
    fn busy_port_holds_transfer_pending() {
        let (mut s, mut a, ch) = setup(PacingPolicy::default());
        s.enqueue_transfer(transfer(0));
        ch.reject_next(1);
        pump(&mut s, &mut a);
        assert_eq!(s.state(), HandshakeState::TransferPending);
        pump(&mut s, &mut a);
        assert!(matches!(s.state(), HandshakeState::AwaitingAck { .. }));
    }

    #[test]
    fn timeout_retries_once_then_drops() {
        let policy = PacingPolicy {
            ack_timeout_ticks: 3,
            transfer_gap_ticks: 0,
            retry_on_timeout: true,
        };
        let (mut s, mut a, ch) = setup(policy);
        s.enqueue_transfer(transfer(4));
        let mut events = Vec::new();
        for _ in 0..12 {
            events.extend(pump(&mut s, &mut a));
        }
        let timeouts: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                SchedulerEvent::TimedOut(t) => Some(t.retrying),
                _ => None,
            })
            .collect();
        assert_eq!(timeouts, vec![true, false]);
        assert_eq!(ch.preset_block_count(), 2);
        assert_eq!(s.dropped_count(), 1);
        assert!(s.is_idle());
        assert_eq!(s.take_latency_summary().timeouts, 2);
    }

    #[test]
    fn late_ack_is_not_credited_to_the_next_transfer() {
        let policy = PacingPolicy {
            ack_timeout_ticks: 2,
            transfer_gap_ticks: 0,
            retry_on_timeout: false,
        };
        let (mut s, mut a, ch) = setup(policy);
        s.enqueue_transfer(transfer(0));
        for _ in 0..3 {
            pump(&mut s, &mut a);
        }
        assert_eq!(s.dropped_count(), 1);

        ch.acknowledge();
        s.enqueue_transfer(transfer(1));
        s.enqueue_transfer(transfer(2));
        pump(&mut s, &mut a);
        pump(&mut s, &mut a);
        assert_eq!(ch.preset_block_count(), 2);
        assert_eq!(s.delivered_count(), 0);
    }

    #[test]
    fn discard_queued_keeps_the_transfer_on_the_wire() {
        let (mut s, mut a, ch) = setup(PacingPolicy { transfer_gap_ticks: 0, ..PacingPolicy::default() });
        s.enqueue_transfer(transfer(0));
        s.enqueue_transfer(transfer(1));
        pump(&mut s, &mut a);
        s.discard_queued();
        s.enqueue_transfer(transfer(2).for_restore());

        ch.acknowledge();
        let events = pump(&mut s, &mut a);
        assert!(matches!(events[0], SchedulerEvent::Delivered { slot: 0, .. }));
        assert_eq!(s.restore_remaining(), 1);
        assert_eq!(ch.preset_block_count(), 2);
        let programs: Vec<u8> = ch.preset_blocks().iter().map(|b| b.program).collect();
        assert_eq!(programs, vec![0, 2]);
    }

    #[test]
    fn clear_forgets_counted_acks() {
        let (mut s, mut a, ch) = setup(PacingPolicy { transfer_gap_ticks: 0, ..PacingPolicy::default() });
        s.enqueue_transfer(transfer(0));
        pump(&mut s, &mut a);
        ch.acknowledge();
        a.poll();
        s.clear(&mut a);
        assert!(!a.take_ack());
        assert!(s.is_idle());
    }

    #[test]
    fn restore_completion_is_reported_once() {
        let (mut s, mut a, ch) = setup(PacingPolicy { transfer_gap_ticks: 0, ..PacingPolicy::default() });
        ch.set_auto_ack(true);
        s.enqueue_transfer(transfer(0).for_restore());
        s.enqueue_transfer(transfer(1).for_restore());
        s.enqueue_transfer(transfer(2));
        let mut events = Vec::new();
        for _ in 0..10 {
            events.extend(pump(&mut s, &mut a));
        }
        let completions = events.iter().filter(|e| **e == SchedulerEvent::RestoreComplete).count();
        assert_eq!(completions, 1);
        assert_eq!(s.delivered_count(), 3);
        assert_eq!(s.restore_remaining(), 0);
    }
}
