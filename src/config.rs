/// Tunable thresholds for the sender's loss-detection and RTT machinery.
#[derive(Debug, Clone, Copy)]
pub struct SenderConfig {
    pub ack_detect: bool,
    pub time_detect: bool,
    pub reorder_threshold: u64,
    // Stored for parity with the reliability engine this was modeled on, but
    // not consulted by the time-based loss heuristic (see Sender::is_lost).
    pub wait_threshold: u64,
    pub k_initial_rtt: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            ack_detect: true,
            time_detect: true,
            reorder_threshold: 15,
            wait_threshold: 40,
            k_initial_rtt: 100_000,
        }
    }
}

/// Tunable thresholds for the receiver's ACK coalescer.
#[derive(Debug, Clone, Copy)]
pub struct ReceiverConfig {
    pub ack_threshold: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self { ack_threshold: 10 }
    }
}
