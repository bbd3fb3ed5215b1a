use std::sync::mpsc::{self, Receiver};

use bytehub::hub::{Hub, HubConfig, Session};
use bytehub::subsys::{Builtin, FrameEvent};
use bytehub::transport::TransportInfo;
use tracing::info;

use crate::cmd::HubArgs;
use crate::exit::{hub_error, CliResult};
use crate::output::{print_frame, OutputFormat};

/// A hub with every built-in subsystem registered and a selection of them
/// enabled on each session it opens.
pub struct Demux {
    hub: Hub,
    selected: Vec<(usize, Builtin)>,
    events: Receiver<FrameEvent>,
    show_frames: bool,
    format: OutputFormat,
}

impl Demux {
    pub fn new(args: &HubArgs, format: OutputFormat) -> CliResult<Self> {
        let hub = Hub::new(hub_config(args)?);
        let (sink, events) = mpsc::channel();

        let mut selected = Vec::new();
        let wanted = args.enable.as_deref().unwrap_or(&Builtin::ALL);
        for builtin in Builtin::ALL {
            let index = hub
                .register(builtin.instantiate(Some(sink.clone())))
                .map_err(|err| hub_error("register failed", err))?;
            if wanted.contains(&builtin) {
                selected.push((index, builtin));
            }
        }

        Ok(Self {
            hub,
            selected,
            events,
            show_frames: !args.no_frames,
            format,
        })
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn enabled_names(&self) -> Vec<&'static str> {
        self.selected.iter().map(|(_, builtin)| builtin.name()).collect()
    }

    /// Open a session and enable the selected subsystems on it.
    pub fn open(&self, transport: TransportInfo) -> CliResult<Session> {
        let session = self
            .hub
            .open(transport)
            .map_err(|err| hub_error("session open failed", err))?;
        for (index, _) in &self.selected {
            session
                .enable(*index)
                .map_err(|err| hub_error("enable failed", err))?;
        }
        info!(
            session = session.id(),
            transport = %session.transport(),
            enabled = ?self.enabled_names(),
            "session ready"
        );
        Ok(session)
    }

    /// Print frames reported since the last call.
    pub fn drain(&self) {
        for event in self.events.try_iter() {
            if self.show_frames {
                print_frame(&event, self.format);
            }
        }
    }
}

/// File (or `BYTEHUB_CONFIG`) first, then individual flags on top.
pub fn hub_config(args: &HubArgs) -> CliResult<HubConfig> {
    let mut config = match &args.config {
        Some(path) => {
            HubConfig::from_json_file(path).map_err(|err| hub_error("config load failed", err))?
        }
        None => HubConfig::default(),
    };
    if let Some(max) = args.max_subsystems {
        config.max_subsystems = max;
    }
    if let Some(capacity) = args.probe_buffer {
        config.probe_buffer_capacity = capacity;
    }
    if let Some(quiet) = args.quiet_period_ms {
        config.quiet_period_ms = quiet;
    }
    Ok(config.normalized())
}
