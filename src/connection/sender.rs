use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::{
    config::SenderConfig,
    connection::chunker::{self, ChunkReader},
    link::DatagramLink,
    packet::{
        frame::{AckFrame, Frame, StreamFrame},
        packet::{InitialPacket, Packet, SUPPORTED_VERSION},
        types::ConnectionId,
    },
    result::FerryResult,
};

/// The reliability engine for one direction of a file transfer: allocates
/// packet numbers and stream ids, tracks in-flight packets, estimates RTT
/// from ACKs, and detects and retransmits losses.
///
/// `unacked` and `tx_time` are kept in lockstep — every packet number that
/// appears in one appears in the other — except transiently inside
/// `send_packet`/`resend_lost_packets` where they are updated together.
pub struct Sender<L: DatagramLink> {
    link: L,
    config: SenderConfig,
    version: u32,
    dst_cid: ConnectionId,
    src_cid: ConnectionId,

    unacked: HashMap<u64, InitialPacket>,
    tx_time: HashMap<u64, Instant>,
    largest_acked: i64,
    last_ack_time: Instant,

    smoothed_rtt: Duration,
    rttvar: Duration,
    min_rtt: Duration,
    latest_rtt: Duration,
    has_rtt_sample: bool,

    next_packet_number: u64,
    next_stream_id: u64,
}

impl<L: DatagramLink> Sender<L> {
    pub fn new(link: L, dst_cid: ConnectionId, config: SenderConfig) -> Self {
        let initial_rtt = Duration::from_micros(config.k_initial_rtt);

        Self {
            link,
            version: SUPPORTED_VERSION,
            dst_cid,
            src_cid: ConnectionId::random(8),

            unacked: HashMap::new(),
            tx_time: HashMap::new(),
            largest_acked: -1,
            last_ack_time: Instant::now(),

            smoothed_rtt: initial_rtt,
            rttvar: initial_rtt / 2,
            min_rtt: Duration::MAX,
            latest_rtt: initial_rtt,
            has_rtt_sample: false,

            next_packet_number: 0,
            next_stream_id: 0,

            config,
        }
    }

    pub fn get_packet_number(&mut self) -> u64 {
        let pn = self.next_packet_number;
        self.next_packet_number += 1;
        pn
    }

    pub fn get_stream_id(&mut self) -> u64 {
        let id = self.next_stream_id;
        self.next_stream_id += 1;
        id
    }

    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt
    }

    pub fn unacked_count(&self) -> usize {
        self.unacked.len()
    }

    /// Lazily splits `path` into STREAM frames. Allocates a fresh stream id
    /// unless one is supplied, matching the public contract's "uses a fresh
    /// stream_id unless one is supplied."
    pub fn chunkify_file(
        &mut self,
        path: impl AsRef<Path>,
        chunk_size: usize,
        stream_id: Option<u64>,
    ) -> FerryResult<ChunkReader> {
        let stream_id = stream_id.unwrap_or_else(|| self.get_stream_id());
        chunker::chunkify_file(path, chunk_size, stream_id)
    }

    /// Wraps `frames` in a freshly numbered INITIAL packet and sends it.
    pub fn send_frames(&mut self, frames: Vec<Frame>) -> FerryResult<u64> {
        let pn = self.get_packet_number();
        let pkt = InitialPacket::new(
            self.version,
            self.dst_cid.clone(),
            self.src_cid.clone(),
            pn,
            Vec::new(),
            frames,
        );
        self.send_packet(pkt)?;
        Ok(pn)
    }

    pub fn send_stream_frame(&mut self, frame: StreamFrame) -> FerryResult<u64> {
        self.send_frames(vec![Frame::Stream(frame)])
    }

    /// Serializes and transmits `pkt`, recording it as in-flight. On send
    /// failure neither `unacked` nor `tx_time` is mutated.
    pub fn send_packet(&mut self, pkt: InitialPacket) -> FerryResult<()> {
        let pn = pkt.packet_number;
        let bytes = pkt.encode();
        self.link.send(&bytes)?;

        tracing::debug!(packet_number = pn, bytes = bytes.len(), "sent packet");
        self.unacked.insert(pn, pkt);
        self.tx_time.insert(pn, Instant::now());
        Ok(())
    }

    /// Sends a frameless INITIAL packet purely to elicit a fresh ACK when
    /// there is nothing else queued — a tail-loss probe.
    pub fn send_probe(&mut self) -> FerryResult<u64> {
        let pn = self.get_packet_number();
        let pkt = InitialPacket::new(
            self.version,
            self.dst_cid.clone(),
            self.src_cid.clone(),
            pn,
            Vec::new(),
            Vec::new(),
        );
        tracing::trace!(packet_number = pn, "sending tail-loss probe");
        self.send_packet(pkt)?;
        Ok(pn)
    }

    /// Reads one datagram, parses it, processes any ACK frames it carries,
    /// and triggers retransmission of anything now judged lost. Returns the
    /// parsed packet plus a map of old packet number -> retransmitted
    /// packet (now bearing its new number) for observability.
    pub fn receive_packet(&mut self) -> FerryResult<(Packet, HashMap<u64, InitialPacket>)> {
        let mut buf = vec![0u8; 1500];
        let n = self.link.recv(&mut buf)?;
        buf.truncate(n);
        let packet = Packet::decode(&mut buf)?;

        for frame in packet.frames() {
            if let Frame::Ack(ack) = frame {
                self.process_ack(ack);
            }
        }

        let resent = self.resend_lost_packets()?;
        Ok((packet, resent))
    }

    fn process_ack(&mut self, frame: &AckFrame) {
        self.largest_acked = self.largest_acked.max(frame.largest_acknowledged as i64);
        self.last_ack_time = Instant::now();

        if frame.first_ack_range > frame.largest_acknowledged {
            tracing::warn!(
                largest = frame.largest_acknowledged,
                first_ack_range = frame.first_ack_range,
                "ack frame's range underflows largest_acknowledged, treating as empty"
            );
            return;
        }

        let smallest = frame.smallest_acknowledged();
        for n in smallest..=frame.largest_acknowledged {
            self.unacked.remove(&n);
            let Some(tx) = self.tx_time.remove(&n) else {
                continue;
            };

            let latest_rtt = Instant::now().duration_since(tx);

            if !self.has_rtt_sample {
                self.smoothed_rtt = latest_rtt;
                self.rttvar = latest_rtt / 2;
                self.has_rtt_sample = true;
            } else {
                self.min_rtt = self.min_rtt.min(latest_rtt);
                let ack_delay = Duration::ZERO;
                let adjusted_rtt = if latest_rtt >= self.min_rtt + ack_delay {
                    latest_rtt - ack_delay
                } else {
                    latest_rtt
                };

                self.smoothed_rtt =
                    self.smoothed_rtt.mul_f64(7.0 / 8.0) + adjusted_rtt.mul_f64(1.0 / 8.0);
                self.rttvar = self.rttvar.mul_f64(3.0 / 4.0)
                    + abs_diff(self.smoothed_rtt, adjusted_rtt).mul_f64(1.0 / 4.0);
            }

            self.latest_rtt = latest_rtt;
            tracing::debug!(
                packet_number = n,
                rtt_us = latest_rtt.as_micros() as u64,
                "acked packet"
            );
        }
    }

    /// True iff every enabled heuristic (reordering, RTT-based timeout)
    /// fires. With both disabled this always returns false — loss recovery
    /// then relies entirely on externally-driven `send_probe` calls.
    fn is_lost(&self, n: u64) -> bool {
        if !self.config.ack_detect && !self.config.time_detect {
            return false;
        }

        let mut lost = true;
        if self.config.ack_detect {
            lost &= (n as i64) <= self.largest_acked - self.config.reorder_threshold as i64;
        }

        if lost && self.config.time_detect {
            let max_rtt = self.smoothed_rtt.max(self.latest_rtt);
            let threshold = max_rtt.mul_f64(9.0 / 8.0).max(Duration::from_millis(1));
            lost = match (
                self.tx_time.get(&n),
                self.last_ack_time.checked_sub(threshold),
            ) {
                (Some(&tx), Some(cutoff)) => tx < cutoff,
                _ => false,
            };
        }

        lost
    }

    /// Retransmits every unacked packet `is_lost` flags, allocating each a
    /// fresh packet number in ascending order of its original number.
    pub fn resend_lost_packets(&mut self) -> FerryResult<HashMap<u64, InitialPacket>> {
        let mut lost: Vec<u64> = self
            .unacked
            .keys()
            .copied()
            .filter(|n| self.is_lost(*n))
            .collect();
        lost.sort_unstable();

        let mut resent = HashMap::new();
        for old_pn in lost {
            let Some(mut pkt) = self.unacked.remove(&old_pn) else {
                continue;
            };
            self.tx_time.remove(&old_pn);

            let new_pn = self.get_packet_number();
            tracing::debug!(old = old_pn, new = new_pn, "resending lost packet");
            pkt.packet_number = new_pn;

            self.send_packet(pkt.clone())?;
            resent.insert(old_pn, pkt);
        }

        Ok(resent)
    }
}

fn abs_diff(a: Duration, b: Duration) -> Duration {
    if a >= b {
        a - b
    } else {
        b - a
    }
}
