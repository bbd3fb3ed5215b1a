//! Feed a session from a tokio reader.
//!
//! Run with:
//!   cargo run --example async-demux --features async

use std::sync::mpsc;

use bytehub::hub::{Hub, HubConfig};
use bytehub::subsys::{Builtin, FramedSubsystem};
use bytehub::transport::{pump_async, TransportInfo, DEFAULT_CHUNK_SIZE};
use tokio::io::AsyncWriteExt;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let hub = Hub::new(HubConfig::default());
    let (sink, events) = mpsc::channel();
    let framed = hub.register(Builtin::Framed.instantiate(Some(sink.clone())))?;
    let line = hub.register(Builtin::Line.instantiate(Some(sink)))?;

    let (mut writer, reader) = tokio::io::duplex(64);
    let producer = tokio::spawn(async move {
        for n in 0u8..4 {
            if let Some(frame) = FramedSubsystem::encode(n, &[n; 3]) {
                writer.write_all(&frame).await?;
            }
            writer.write_all(b"$TICK*00\n").await?;
        }
        writer.shutdown().await
    });

    let mut session = hub.open(TransportInfo::memory("duplex"))?;
    session.enable(framed)?;
    session.enable(line)?;

    let summary =
        pump_async(reader, DEFAULT_CHUNK_SIZE, None, |chunk| session.deliver(chunk)).await?;
    producer.await??;

    eprintln!("{} bytes in {} chunks", summary.bytes, summary.chunks);
    for event in events.try_iter() {
        eprintln!("{:>7}: {} bytes", event.subsystem, event.payload.len());
    }
    eprintln!("stats: {:?}", session.stats());
    session.close();
    Ok(())
}
