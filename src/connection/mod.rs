pub mod chunker;
pub mod receiver;
pub mod sender;

pub use chunker::chunkify_file;
pub use receiver::Receiver;
pub use sender::Sender;

#[cfg(test)]
mod integration_test {
    use std::io::Write;

    use crate::{
        config::{ReceiverConfig, SenderConfig},
        link::InMemoryLink,
        packet::{frame::Frame, packet::Packet, types::ConnectionId},
    };

    use super::{Receiver, Sender};

    /// Drives a whole file across a paired in-memory link: chunker feeds the
    /// sender, the receiver reassembles the stream data and coalesces ACKs,
    /// and those ACKs flow back to the sender to clear its unacked table.
    #[test]
    fn test_file_transfer_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let payload: Vec<u8> = (0..3500u32).map(|i| (i % 251) as u8).collect();
        file.write_all(&payload).unwrap();
        file.flush().unwrap();

        let (client_link, server_link) = InMemoryLink::pair();
        let mut sender = Sender::new(
            client_link,
            ConnectionId::new(0, vec![]),
            SenderConfig::default(),
        );
        let mut receiver = Receiver::new(
            server_link,
            ConnectionId::new(0, vec![]),
            ReceiverConfig { ack_threshold: 1 },
        );

        let chunks: Vec<_> = sender
            .chunkify_file(file.path(), 1000, Some(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(chunks.len(), 4);

        let mut sent_packet_numbers = Vec::new();
        for chunk in &chunks {
            sent_packet_numbers.push(sender.send_stream_frame(chunk.clone()).unwrap());
        }

        let mut reassembled = vec![0u8; payload.len()];
        for _ in &chunks {
            let (packet, _addr) = receiver.receive_packet().unwrap();
            if let Packet::Initial(pkt) = packet {
                for frame in pkt.frames {
                    if let Frame::Stream(stream) = frame {
                        let offset = stream.offset.unwrap() as usize;
                        reassembled[offset..offset + stream.data.len()].copy_from_slice(&stream.data);
                    }
                }
            }
        }
        assert_eq!(reassembled, payload);

        // ack_threshold=1 forces the receiver to close a packet's range out
        // as soon as the next packet arrives, so the last packet sent never
        // gets its own ACK closed out (nothing arrives after it) — only
        // len-1 ACK datagrams end up in flight back to the sender.
        for _ in 0..sent_packet_numbers.len() - 1 {
            sender.receive_packet().unwrap();
        }

        assert_eq!(sender.unacked_count(), 1);
    }
}
