#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytehub_core::{
    Attachment, Capabilities, Consumed, Hub, HubConfig, SessionContext, SizeProbe, Subsystem,
    SubsystemError,
};

/// Calls observed by a [`Scripted`] subsystem across all its attachments.
#[derive(Debug, Default)]
pub struct Log {
    pub attaches: usize,
    pub detaches: usize,
    pub content_probes: usize,
    pub size_probes: usize,
    pub frames: Vec<Vec<u8>>,
}

/// How a [`Scripted`] attachment answers `consume`.
#[derive(Debug, Clone, Copy)]
pub enum Framing {
    /// Frames are exactly this many bytes.
    Fixed(usize),
    /// Report this many bytes consumed regardless of what was offered.
    Report(usize),
}

/// Test subsystem driven by plain functions.
pub struct Scripted {
    name: &'static str,
    min_probe_bytes: usize,
    matcher: fn(&[u8]) -> bool,
    sizer: Option<fn(&[u8]) -> SizeProbe>,
    framing: Framing,
    fail_attach: bool,
    log: Arc<Mutex<Log>>,
}

impl Scripted {
    pub fn new(name: &'static str, min_probe_bytes: usize, matcher: fn(&[u8]) -> bool) -> Self {
        Self {
            name,
            min_probe_bytes,
            matcher,
            sizer: None,
            framing: Framing::Fixed(min_probe_bytes),
            fail_attach: false,
            log: Arc::default(),
        }
    }

    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    pub fn sizer(mut self, sizer: fn(&[u8]) -> SizeProbe) -> Self {
        self.sizer = Some(sizer);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_attach = true;
        self
    }

    /// Register with `hub` and return the index plus the shared log.
    pub fn register(self, hub: &Hub) -> (usize, Arc<Mutex<Log>>) {
        let log = Arc::clone(&self.log);
        let index = hub.register(Arc::new(self)).expect("registry should have room");
        (index, log)
    }
}

impl Subsystem for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn min_probe_bytes(&self) -> usize {
        self.min_probe_bytes
    }

    fn capabilities(&self) -> Capabilities {
        if self.sizer.is_some() {
            Capabilities::WITH_SIZE_PROBE
        } else {
            Capabilities::CONTENT_ONLY
        }
    }

    fn attach(&self, _ctx: &SessionContext<'_>) -> Result<Box<dyn Attachment>, SubsystemError> {
        if self.fail_attach {
            return Err("device not ready".into());
        }
        self.log.lock().unwrap().attaches += 1;
        Ok(Box::new(ScriptedAttachment {
            matcher: self.matcher,
            sizer: self.sizer,
            framing: self.framing,
            frame: Vec::new(),
            log: Arc::clone(&self.log),
        }))
    }

    fn detach(&self, attachment: Box<dyn Attachment>) {
        self.log.lock().unwrap().detaches += 1;
        drop(attachment);
    }
}

struct ScriptedAttachment {
    matcher: fn(&[u8]) -> bool,
    sizer: Option<fn(&[u8]) -> SizeProbe>,
    framing: Framing,
    frame: Vec<u8>,
    log: Arc<Mutex<Log>>,
}

impl Attachment for ScriptedAttachment {
    fn probe_content(&mut self, head: &[u8]) -> bool {
        self.log.lock().unwrap().content_probes += 1;
        (self.matcher)(head)
    }

    fn probe_size(&mut self, head: &[u8]) -> SizeProbe {
        self.log.lock().unwrap().size_probes += 1;
        self.sizer.map_or(SizeProbe::Unsupported, |sizer| sizer(head))
    }

    fn consume(&mut self, bytes: &[u8]) -> Consumed {
        match self.framing {
            Framing::Fixed(len) => {
                let take = (len - self.frame.len()).min(bytes.len());
                self.frame.extend_from_slice(&bytes[..take]);
                if self.frame.len() == len {
                    let frame = std::mem::take(&mut self.frame);
                    self.log.lock().unwrap().frames.push(frame);
                    Consumed::Complete(take)
                } else {
                    Consumed::NeedMore
                }
            }
            Framing::Report(n) => {
                self.log.lock().unwrap().frames.push(bytes.to_vec());
                Consumed::Complete(n)
            }
        }
    }
}

pub fn starts_with_aaaa(head: &[u8]) -> bool {
    head.starts_with(b"AAAA")
}

pub fn never(_head: &[u8]) -> bool {
    false
}

pub fn always(_head: &[u8]) -> bool {
    true
}

/// `L <len>` headers announce a frame of `len` bytes in total.
pub fn length_prefixed(head: &[u8]) -> SizeProbe {
    match head {
        [b'L', len, ..] => SizeProbe::from_len(usize::from(*len)),
        _ => SizeProbe::Unrecognized,
    }
}

pub fn hub(capacity: usize) -> Hub {
    Hub::new(HubConfig {
        max_subsystems: 4,
        probe_buffer_capacity: capacity,
        quiet_period_ms: 250,
    })
}

pub const QUIET: Duration = Duration::from_millis(250);
