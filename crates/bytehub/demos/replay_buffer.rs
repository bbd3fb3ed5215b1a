//! Demultiplex an in-memory capture delivered in awkward fragments.
//!
//! Run with:
//!   cargo run --example replay-buffer

use std::sync::mpsc;

use bytehub::hub::{Hub, HubConfig};
use bytehub::subsys::{Builtin, FramedSubsystem};
use bytehub::transport::{ReadPump, TransportInfo};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let hub = Hub::new(HubConfig::default());
    let (sink, events) = mpsc::channel();
    for builtin in Builtin::ALL {
        hub.register(builtin.instantiate(Some(sink.clone())))?;
    }

    let frame = |channel, payload: &[u8]| {
        FramedSubsystem::encode(channel, payload).ok_or("payload too long for a frame")
    };
    let mut capture = Vec::new();
    capture.extend_from_slice(&frame(1, b"telemetry")?);
    capture.extend_from_slice(b"$GPGGA,123519,4807.038,N*47\r\n");
    capture.extend_from_slice(&frame(2, b"status")?);
    // Trailing noise nobody claims.
    capture.extend_from_slice(&[0u8; 40]);

    let mut session = hub.open(TransportInfo::memory("capture"))?;
    for info in hub.registry().list() {
        session.enable(info.index)?;
    }

    // Seven-byte reads split headers and sentences across deliveries.
    let summary = ReadPump::with_chunk_size(7)?.run(&capture[..], |chunk| session.deliver(chunk))?;
    eprintln!("pumped {} bytes in {} chunks", summary.bytes, summary.chunks);

    for event in events.try_iter() {
        eprintln!(
            "{:>7}: {}",
            event.subsystem,
            String::from_utf8_lossy(&event.payload)
        );
    }

    let stats = session.stats();
    eprintln!(
        "dispatched={} discarded={} buffered={} mode={}",
        stats.dispatched_bytes,
        stats.discarded_bytes(),
        stats.buffered_bytes,
        session.mode()
    );
    session.close();
    Ok(())
}
