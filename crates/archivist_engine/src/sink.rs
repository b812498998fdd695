use std::io::Write;
use std::sync::{mpsc, Mutex};

use archivist_core::{encode, OutboundPacket};
use engine_logging::engine_error;

/// Destination for outbound packets. Shared by the command loop and every job
/// thread, so implementations must deliver each packet whole.
pub trait PacketSink: Send + Sync {
    fn emit(&self, packet: OutboundPacket);
}

/// Forwards packets to a channel; used when another thread owns the output.
pub struct ChannelPacketSink {
    tx: mpsc::Sender<OutboundPacket>,
}

impl ChannelPacketSink {
    pub fn new(tx: mpsc::Sender<OutboundPacket>) -> Self {
        Self { tx }
    }
}

impl PacketSink for ChannelPacketSink {
    fn emit(&self, packet: OutboundPacket) {
        let _ = self.tx.send(packet);
    }
}

/// Encodes packets as lines on a writer (stdout for the server). The lock is
/// held for the whole line and the flush.
pub struct WriterPacketSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> WriterPacketSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> PacketSink for WriterPacketSink<W> {
    fn emit(&self, packet: OutboundPacket) {
        let mut line = match encode(&packet) {
            Ok(line) => line,
            Err(err) => {
                engine_error!("failed to encode {} packet: {err}", packet.action);
                return;
            }
        };
        line.push('\n');
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(err) = out.write_all(line.as_bytes()).and_then(|()| out.flush()) {
            engine_error!("failed to write {} packet: {err}", packet.action);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archivist_core::{JobId, OutboundAction};

    #[test]
    fn writer_sink_emits_one_line_per_packet() {
        let sink = WriterPacketSink::new(Vec::new());
        let id = JobId::new();
        sink.emit(OutboundPacket::chromedriver_started(id));
        sink.emit(OutboundPacket::progress_update(id, 0.5));

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            OutboundPacket::parse(lines[1]).unwrap().action,
            OutboundAction::ProgressUpdate
        );
    }

    #[test]
    fn channel_sink_forwards_in_order() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelPacketSink::new(tx);
        let id = JobId::new();
        sink.emit(OutboundPacket::uuid_available(id));
        sink.emit(OutboundPacket::chromedriver_started(id));

        let actions: Vec<_> = rx.try_iter().map(|p| p.action).collect();
        assert_eq!(
            actions,
            vec![OutboundAction::UuidAvailable, OutboundAction::ChromedriverStarted]
        );
    }
}
