use bytehub_core::{Attachment, Consumed, SessionContext, Subsystem, SubsystemError};
use tracing::warn;

use super::{report, FrameSink};

pub(super) const NAME: &str = "line";

/// Longest sentence accepted by default, terminator included.
pub const DEFAULT_MAX_LINE: usize = 82;

/// `$`-prefixed ASCII sentences terminated by `\n`.
///
/// A sentence that reaches `max_len` without a terminator is cut there.
pub struct LineSubsystem {
    max_len: usize,
    sink: Option<FrameSink>,
}

impl LineSubsystem {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(2),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Option<FrameSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl Subsystem for LineSubsystem {
    fn name(&self) -> &str {
        NAME
    }

    fn attach(&self, ctx: &SessionContext<'_>) -> Result<Box<dyn Attachment>, SubsystemError> {
        Ok(Box::new(LineAttachment {
            max_len: self.max_len,
            session_id: ctx.session_id,
            sink: self.sink.clone(),
            line: Vec::with_capacity(self.max_len),
        }))
    }
}

struct LineAttachment {
    max_len: usize,
    session_id: u64,
    sink: Option<FrameSink>,
    line: Vec<u8>,
}

impl LineAttachment {
    fn finish(&mut self) {
        let text = self.line.strip_suffix(b"\n").unwrap_or(&self.line[..]);
        let text = text.strip_suffix(b"\r").unwrap_or(text);
        report(&self.sink, NAME, self.session_id, text);
        self.line.clear();
    }
}

impl Attachment for LineAttachment {
    fn probe_content(&mut self, head: &[u8]) -> bool {
        head.first() == Some(&b'$')
    }

    fn consume(&mut self, bytes: &[u8]) -> Consumed {
        let allowance = self.max_len - self.line.len();
        let window = &bytes[..bytes.len().min(allowance)];

        match window.iter().position(|&b| b == b'\n') {
            Some(end) => {
                self.line.extend_from_slice(&window[..=end]);
                self.finish();
                Consumed::Complete(end + 1)
            }
            None if window.len() == allowance => {
                self.line.extend_from_slice(window);
                warn!(
                    session = self.session_id,
                    max_len = self.max_len,
                    "unterminated sentence cut at maximum length"
                );
                self.finish();
                Consumed::Complete(window.len())
            }
            None => {
                self.line.extend_from_slice(window);
                Consumed::NeedMore
            }
        }
    }
}
