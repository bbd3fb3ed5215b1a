use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};

/// Default number of bytes requested per read.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Totals reported when a pump reaches end of stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpSummary {
    /// Nonempty chunks handed to the sink.
    pub chunks: u64,
    /// Bytes handed to the sink.
    pub bytes: u64,
    /// Reads that timed out and produced an idle tick.
    pub idle_ticks: u64,
}

/// Reads a byte source chunk by chunk and hands each chunk to a sink.
///
/// The sink sees bytes in exactly the order and fragmentation the source
/// produced them. A read that times out (`WouldBlock`/`TimedOut`) calls the
/// sink with an empty slice so time-based state can advance without input.
#[derive(Debug, Clone)]
pub struct ReadPump {
    chunk_size: usize,
}

impl ReadPump {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override the per-read chunk size.
    pub fn with_chunk_size(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(TransportError::ZeroChunkSize);
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Pump until EOF or a hard I/O error.
    pub fn run<R, F>(&self, mut reader: R, mut sink: F) -> Result<PumpSummary>
    where
        R: Read,
        F: FnMut(&[u8]),
    {
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let mut summary = PumpSummary::default();

        loop {
            let read = match reader.read(&mut buf[..]) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err)
                    if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
                {
                    summary.idle_ticks += 1;
                    sink(&[]);
                    continue;
                }
                Err(err) => return Err(TransportError::Io(err)),
            };

            if read == 0 {
                debug!(
                    chunks = summary.chunks,
                    bytes = summary.bytes,
                    "byte source reached end of stream"
                );
                return Ok(summary);
            }

            trace!(read, "pumping chunk");
            summary.chunks += 1;
            summary.bytes += read as u64;
            sink(&buf[..read]);
        }
    }
}

impl Default for ReadPump {
    fn default() -> Self {
        Self::new()
    }
}

/// Async counterpart of [`ReadPump::run`] for tokio readers.
///
/// With `idle_tick` set, a read that waits longer than that produces an
/// empty delivery, like a timed-out read does for [`ReadPump::run`].
#[cfg(feature = "async")]
pub async fn pump_async<R, F>(
    mut reader: R,
    chunk_size: usize,
    idle_tick: Option<std::time::Duration>,
    mut sink: F,
) -> Result<PumpSummary>
where
    R: tokio::io::AsyncRead + Unpin,
    F: FnMut(&[u8]),
{
    use tokio::io::AsyncReadExt;

    if chunk_size == 0 {
        return Err(TransportError::ZeroChunkSize);
    }

    let mut buf = BytesMut::zeroed(chunk_size);
    let mut summary = PumpSummary::default();
    loop {
        let result = match idle_tick {
            Some(tick) => match tokio::time::timeout(tick, reader.read(&mut buf[..])).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    summary.idle_ticks += 1;
                    sink(&[]);
                    continue;
                }
            },
            None => reader.read(&mut buf[..]).await,
        };
        let read = match result {
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Io(err)),
        };
        if read == 0 {
            debug!(
                chunks = summary.chunks,
                bytes = summary.bytes,
                idle_ticks = summary.idle_ticks,
                "async byte source reached end of stream"
            );
            return Ok(summary);
        }
        trace!(read, "pumping chunk");
        summary.chunks += 1;
        summary.bytes += read as u64;
        sink(&buf[..read]);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn pump_preserves_order_and_fragmentation() {
        let pump = ReadPump::with_chunk_size(3).unwrap();
        let mut chunks = Vec::new();
        let summary = pump
            .run(Cursor::new(b"abcdefgh".to_vec()), |chunk| {
                chunks.push(chunk.to_vec())
            })
            .unwrap();

        assert_eq!(chunks, vec![b"abc".to_vec(), b"def".to_vec(), b"gh".to_vec()]);
        assert_eq!(summary.chunks, 3);
        assert_eq!(summary.bytes, 8);
        assert_eq!(summary.idle_ticks, 0);
    }

    #[test]
    fn zero_chunk_size_rejected() {
        assert!(matches!(
            ReadPump::with_chunk_size(0),
            Err(TransportError::ZeroChunkSize)
        ));
    }

    #[test]
    fn empty_source_produces_no_chunks() {
        let summary = ReadPump::new()
            .run(Cursor::new(Vec::new()), |_| panic!("sink must not run"))
            .unwrap();
        assert_eq!(summary, PumpSummary::default());
    }

    struct Scripted {
        steps: Vec<std::io::Result<Vec<u8>>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.steps.is_empty() {
                return Ok(0);
            }
            match self.steps.remove(0) {
                Ok(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Err(err) => Err(err),
            }
        }
    }

    #[test]
    fn interrupted_read_retries_and_timeout_ticks() {
        let reader = Scripted {
            steps: vec![
                Err(std::io::Error::from(ErrorKind::Interrupted)),
                Ok(b"ab".to_vec()),
                Err(std::io::Error::from(ErrorKind::WouldBlock)),
                Ok(b"cd".to_vec()),
            ],
        };

        let mut seen = Vec::new();
        let summary = ReadPump::new()
            .run(reader, |chunk| seen.push(chunk.to_vec()))
            .unwrap();

        assert_eq!(seen, vec![b"ab".to_vec(), Vec::new(), b"cd".to_vec()]);
        assert_eq!(summary.chunks, 2);
        assert_eq!(summary.idle_ticks, 1);
    }

    #[test]
    fn hard_error_propagates() {
        let reader = Scripted {
            steps: vec![Err(std::io::Error::from(ErrorKind::BrokenPipe))],
        };
        let err = ReadPump::new().run(reader, |_| {}).unwrap_err();
        assert!(matches!(err, TransportError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn async_pump_reads_everything() {
        let data: &[u8] = b"async-bytes";
        let mut total = Vec::new();
        let summary = pump_async(data, 4, None, |chunk| total.extend_from_slice(chunk))
            .await
            .unwrap();
        assert_eq!(total, b"async-bytes");
        assert_eq!(summary.bytes, 11);
        assert_eq!(summary.idle_ticks, 0);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn async_pump_ticks_while_source_is_quiet() {
        use std::time::Duration;
        use tokio::io::AsyncWriteExt;

        let (mut writer, reader) = tokio::io::duplex(16);
        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            writer.write_all(b"late").await.unwrap();
        });

        let mut seen = Vec::new();
        let summary = pump_async(reader, 8, Some(Duration::from_millis(10)), |chunk| {
            seen.push(chunk.to_vec())
        })
        .await
        .unwrap();
        producer.await.unwrap();

        assert!(summary.idle_ticks >= 1);
        assert_eq!(summary.chunks, 1);
        assert!(seen[0].is_empty());
        assert_eq!(seen.concat(), b"late");
    }
}
