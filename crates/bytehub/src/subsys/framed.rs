use bytehub_core::{
    Attachment, Capabilities, Consumed, SessionContext, SizeProbe, Subsystem, SubsystemError,
};
use bytes::{BufMut, Bytes, BytesMut};

use super::{report, FrameSink};

pub(super) const NAME: &str = "framed";

/// First byte of every frame.
pub const FRAME_MAGIC: u8 = 0xB5;

/// Magic, channel, then a little-endian `u16` payload length.
pub const FRAME_HEADER_LEN: usize = 4;

/// Binary frames: `[FRAME_MAGIC, channel, len_lo, len_hi, payload...]`.
///
/// Claims frames on the channels it was built for. Frames on other
/// channels are still recognized by the size probe, so the session can
/// skip them exactly instead of falling back to a timed discard.
pub struct FramedSubsystem {
    channels: Option<Vec<u8>>,
    sink: Option<FrameSink>,
}

impl FramedSubsystem {
    pub fn all_channels() -> Self {
        Self {
            channels: None,
            sink: None,
        }
    }

    pub fn for_channels(channels: impl IntoIterator<Item = u8>) -> Self {
        Self {
            channels: Some(channels.into_iter().collect()),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Option<FrameSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Encode one frame. `None` if the payload does not fit a `u16` length.
    pub fn encode(channel: u8, payload: &[u8]) -> Option<Bytes> {
        let len = u16::try_from(payload.len()).ok()?;
        let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
        out.put_u8(FRAME_MAGIC);
        out.put_u8(channel);
        out.put_u16_le(len);
        out.put_slice(payload);
        Some(out.freeze())
    }
}

impl Subsystem for FramedSubsystem {
    fn name(&self) -> &str {
        NAME
    }

    fn min_probe_bytes(&self) -> usize {
        FRAME_HEADER_LEN
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::WITH_SIZE_PROBE
    }

    fn attach(&self, ctx: &SessionContext<'_>) -> Result<Box<dyn Attachment>, SubsystemError> {
        Ok(Box::new(FramedAttachment {
            channels: self.channels.clone(),
            session_id: ctx.session_id,
            sink: self.sink.clone(),
            header: [0; FRAME_HEADER_LEN],
            header_len: 0,
            remaining: 0,
            payload: Vec::new(),
        }))
    }
}

struct FramedAttachment {
    channels: Option<Vec<u8>>,
    session_id: u64,
    sink: Option<FrameSink>,
    header: [u8; FRAME_HEADER_LEN],
    header_len: usize,
    remaining: usize,
    payload: Vec<u8>,
}

impl FramedAttachment {
    fn accepts(&self, channel: u8) -> bool {
        self.channels
            .as_ref()
            .is_none_or(|channels| channels.contains(&channel))
    }
}

impl Attachment for FramedAttachment {
    fn probe_content(&mut self, head: &[u8]) -> bool {
        matches!(head, [FRAME_MAGIC, channel, ..] if self.accepts(*channel))
    }

    fn probe_size(&mut self, head: &[u8]) -> SizeProbe {
        match head {
            [FRAME_MAGIC, _, lo, hi, ..] => {
                SizeProbe::from_len(FRAME_HEADER_LEN + usize::from(u16::from_le_bytes([*lo, *hi])))
            }
            _ => SizeProbe::Unrecognized,
        }
    }

    fn consume(&mut self, bytes: &[u8]) -> Consumed {
        let mut used = 0;
        if self.header_len < FRAME_HEADER_LEN {
            let take = (FRAME_HEADER_LEN - self.header_len).min(bytes.len());
            self.header[self.header_len..self.header_len + take].copy_from_slice(&bytes[..take]);
            self.header_len += take;
            used = take;
            if self.header_len < FRAME_HEADER_LEN {
                return Consumed::NeedMore;
            }
            self.remaining = usize::from(u16::from_le_bytes([self.header[2], self.header[3]]));
        }

        let take = self.remaining.min(bytes.len() - used);
        self.payload.extend_from_slice(&bytes[used..used + take]);
        self.remaining -= take;
        used += take;
        if self.remaining > 0 {
            return Consumed::NeedMore;
        }

        report(&self.sink, NAME, self.session_id, &self.payload);
        self.payload.clear();
        self.header_len = 0;
        Consumed::Complete(used)
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use bytehub_transport::TransportInfo;

    use super::*;

    fn attach(subsystem: FramedSubsystem) -> Box<dyn Attachment> {
        let transport = TransportInfo::memory("t");
        subsystem
            .attach(&SessionContext {
                session_id: 3,
                transport: &transport,
            })
            .unwrap()
    }

    #[test]
    fn encode_writes_header() {
        let frame = FramedSubsystem::encode(2, b"hey").unwrap();
        assert_eq!(frame.as_ref(), &[FRAME_MAGIC, 2, 3, 0, b'h', b'e', b'y']);
        assert!(FramedSubsystem::encode(0, &vec![0u8; 70_000]).is_none());
    }

    #[test]
    fn claims_only_configured_channels() {
        let mut att = attach(FramedSubsystem::for_channels([1, 2]));
        assert!(att.probe_content(&[FRAME_MAGIC, 1, 0, 0]));
        assert!(!att.probe_content(&[FRAME_MAGIC, 9, 0, 0]));
        assert!(!att.probe_content(b"$GP"));

        assert_eq!(
            att.probe_size(&[FRAME_MAGIC, 9, 5, 0]),
            SizeProbe::Recognized(NonZeroUsize::new(9).unwrap())
        );
        assert_eq!(att.probe_size(b"abcd"), SizeProbe::Unrecognized);
    }

    #[test]
    fn consume_handles_split_header_and_payload() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut att = attach(FramedSubsystem::all_channels().with_sink(Some(tx)));
        let frame = FramedSubsystem::encode(1, b"payload").unwrap();

        assert_eq!(att.consume(&frame[..2]), Consumed::NeedMore);
        assert_eq!(att.consume(&frame[2..6]), Consumed::NeedMore);
        let mut rest = frame[6..].to_vec();
        rest.extend_from_slice(b"next");
        assert_eq!(att.consume(&rest), Consumed::Complete(frame.len() - 6));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.payload.as_ref(), b"payload");
    }

    #[test]
    fn empty_payload_completes_after_header() {
        let mut att = attach(FramedSubsystem::all_channels());
        let frame = FramedSubsystem::encode(4, b"").unwrap();
        assert_eq!(att.consume(&frame), Consumed::Complete(FRAME_HEADER_LEN));
    }
}
