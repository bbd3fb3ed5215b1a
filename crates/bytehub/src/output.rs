use std::io::{IsTerminal, Write};

use bytehub::hub::{SessionStats, SubsystemInfo};
use bytehub::subsys::FrameEvent;
use bytehub::transport::PumpSummary;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    kind: &'static str,
    subsystem: &'a str,
    session: u64,
    size: usize,
    payload: String,
}

pub fn print_frame(event: &FrameEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                kind: "frame",
                subsystem: event.subsystem,
                session: event.session_id,
                size: event.payload.len(),
                payload: payload_preview(&event.payload),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!(
                "frame session={} subsystem={} size={} payload={}",
                event.session_id,
                event.subsystem,
                event.payload.len(),
                payload_preview(&event.payload)
            );
        }
        OutputFormat::Raw => print_raw(&event.payload),
    }
}

/// End-of-connection summary.
#[derive(Debug, Serialize)]
pub struct SessionReport {
    pub kind: &'static str,
    pub session: u64,
    pub transport: String,
    pub enabled: Vec<&'static str>,
    pub chunks: u64,
    pub idle_ticks: u64,
    pub mode: String,
    pub stats: SessionStats,
}

impl SessionReport {
    pub fn new(
        session: &bytehub::hub::Session,
        enabled: Vec<&'static str>,
        pump: &PumpSummary,
    ) -> Self {
        Self {
            kind: "session",
            session: session.id(),
            transport: session.transport().to_string(),
            enabled,
            chunks: pump.chunks,
            idle_ticks: pump.idle_ticks,
            mode: session.mode().to_string(),
            stats: session.stats(),
        }
    }
}

pub fn print_session_report(report: &SessionReport, format: OutputFormat) {
    let stats = &report.stats;
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COUNTER", "VALUE"]);
            let rows: [(&str, u64); 10] = [
                ("delivered bytes", stats.delivered_bytes),
                ("dispatched bytes", stats.dispatched_bytes),
                ("discarded (sized) bytes", stats.discarded_fixed_bytes),
                ("discarded (timed) bytes", stats.discarded_timed_bytes),
                ("buffered bytes", stats.buffered_bytes),
                ("frames dispatched", stats.frames_dispatched),
                ("frames skipped", stats.frames_discarded),
                ("timed discards", stats.timed_discards),
                ("content probes", stats.content_probes),
                ("size probes", stats.size_probes),
            ];
            for (name, value) in rows {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!(
                "session {} ({}) enabled={} mode={}",
                report.session,
                report.transport,
                report.enabled.join(","),
                report.mode
            );
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "session {} ({}): delivered={} dispatched={} discarded={} buffered={} frames={} skipped={} timed_discards={}",
                report.session,
                report.transport,
                stats.delivered_bytes,
                stats.dispatched_bytes,
                stats.discarded_bytes(),
                stats.buffered_bytes,
                stats.frames_dispatched,
                stats.frames_discarded,
                stats.timed_discards
            );
        }
    }
}

pub fn print_subsystems(subsystems: &[SubsystemInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(subsystems).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["INDEX", "NAME", "MIN PROBE", "SIZE PROBE"]);
            for info in subsystems {
                table.add_row(vec![
                    info.index.to_string(),
                    info.name.clone(),
                    info.min_probe_bytes.to_string(),
                    if info.size_probe { "yes" } else { "no" }.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for info in subsystems {
                println!(
                    "{} {} min_probe={} size_probe={}",
                    info.index, info.name, info.min_probe_bytes, info.size_probe
                );
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(char::is_control) => text.to_string(),
        _ => format!("<binary {} bytes>", payload.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_hides_binary_and_control_bytes() {
        assert_eq!(payload_preview(b"$GPGGA"), "$GPGGA");
        assert_eq!(payload_preview(&[0xB5, 1]), "<binary 2 bytes>");
        assert_eq!(payload_preview(b"a\x07b"), "<binary 3 bytes>");
    }
}
