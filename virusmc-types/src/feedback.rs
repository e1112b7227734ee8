/// Notifications sent from the processing thread to whoever drives the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McFeedback {
    /// A bulk preset transfer was acknowledged by the DSP.
    TransferDelivered {
        slot: u8,
        is_multi: bool,
        latency_ticks: u32,
    },
    /// The DSP did not acknowledge a transfer in time.
    HandshakeTimeout {
        slot: u8,
        is_multi: bool,
        retrying: bool,
    },
    /// The DSP signalled that it finished booting.
    DspBooted,
    /// Every transfer queued by a state restore has been delivered.
    StateRestored,
}
