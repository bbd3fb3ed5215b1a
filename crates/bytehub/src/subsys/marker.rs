use bytehub_core::{
    Attachment, Capabilities, Consumed, SessionContext, SizeProbe, Subsystem, SubsystemError,
};
use tracing::debug;

use super::{report, FrameSink};

pub(super) const NAME: &str = "marker";

/// Marker claimed by the default [`MarkerSubsystem`].
pub const DEFAULT_MARKER: [u8; 4] = *b"abcd";

/// Offset of the byte that encodes a frame length for the size probe.
const LENGTH_OFFSET: usize = 16;

/// Claims input starting with a fixed 4-byte marker.
///
/// A claimed frame ends with whatever was offered in the same call, so each
/// delivery yields one frame. As a size probe it reads the 17th byte: a
/// value `c` above `b'A'` announces a frame of `c - b'A'` bytes, any other
/// value spans the whole head.
pub struct MarkerSubsystem {
    marker: [u8; 4],
    sink: Option<FrameSink>,
}

impl MarkerSubsystem {
    pub fn new(marker: [u8; 4]) -> Self {
        Self { marker, sink: None }
    }

    pub fn with_sink(mut self, sink: Option<FrameSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl Default for MarkerSubsystem {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl Subsystem for MarkerSubsystem {
    fn name(&self) -> &str {
        NAME
    }

    fn min_probe_bytes(&self) -> usize {
        self.marker.len()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::WITH_SIZE_PROBE
    }

    fn attach(&self, ctx: &SessionContext<'_>) -> Result<Box<dyn Attachment>, SubsystemError> {
        debug!(session = ctx.session_id, transport = %ctx.transport, "marker attached");
        Ok(Box::new(MarkerAttachment {
            marker: self.marker,
            session_id: ctx.session_id,
            sink: self.sink.clone(),
        }))
    }
}

struct MarkerAttachment {
    marker: [u8; 4],
    session_id: u64,
    sink: Option<FrameSink>,
}

impl Attachment for MarkerAttachment {
    fn probe_content(&mut self, head: &[u8]) -> bool {
        head.starts_with(&self.marker)
    }

    fn probe_size(&mut self, head: &[u8]) -> SizeProbe {
        match head.get(LENGTH_OFFSET) {
            Some(&c) if c > b'A' => SizeProbe::from_len(usize::from(c - b'A')),
            Some(_) => SizeProbe::from_len(head.len()),
            None => SizeProbe::Unrecognized,
        }
    }

    fn consume(&mut self, bytes: &[u8]) -> Consumed {
        report(&self.sink, NAME, self.session_id, bytes);
        Consumed::Complete(bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use bytehub_transport::TransportInfo;

    use super::*;

    fn attach() -> Box<dyn Attachment> {
        let transport = TransportInfo::memory("t");
        MarkerSubsystem::default()
            .attach(&SessionContext {
                session_id: 1,
                transport: &transport,
            })
            .unwrap()
    }

    #[test]
    fn probes_marker() {
        let mut att = attach();
        assert!(att.probe_content(b"abcdef"));
        assert!(!att.probe_content(b"abce"));
    }

    #[test]
    fn size_needs_seventeen_bytes() {
        let mut att = attach();
        assert_eq!(att.probe_size(&[b'x'; 16]), SizeProbe::Unrecognized);

        let mut head = [b'x'; 20];
        head[16] = b'A' + 9;
        assert_eq!(
            att.probe_size(&head),
            SizeProbe::Recognized(NonZeroUsize::new(9).unwrap())
        );

        head[16] = b'0';
        assert_eq!(
            att.probe_size(&head),
            SizeProbe::Recognized(NonZeroUsize::new(20).unwrap())
        );
    }

    #[test]
    fn consume_takes_everything_and_reports() {
        let (tx, rx) = std::sync::mpsc::channel();
        let transport = TransportInfo::memory("t");
        let mut att = MarkerSubsystem::default()
            .with_sink(Some(tx))
            .attach(&SessionContext {
                session_id: 7,
                transport: &transport,
            })
            .unwrap();

        assert_eq!(att.consume(b"abcd1234"), Consumed::Complete(8));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.subsystem, "marker");
        assert_eq!(event.session_id, 7);
        assert_eq!(event.payload.as_ref(), b"abcd1234");
    }
}
