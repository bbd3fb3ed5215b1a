use std::path::PathBuf;
use std::sync::mpsc;

use bytehub::hub::{Hub, HubConfig};
use bytehub::probe::ProbeBuffer;
use bytehub::subsys::{Builtin, FramedSubsystem};
use bytehub::transport::TransportInfo;
use serde::Serialize;

use crate::cmd::DoctorArgs;
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::OutputFormat;

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Info,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: &'static str,
    status: CheckStatus,
    detail: String,
}

impl CheckResult {
    fn new(name: &'static str, status: CheckStatus, detail: impl Into<String>) -> Self {
        Self {
            name,
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    kind: &'static str,
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub fn run(_args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let checks = vec![
        platform_transport_check(),
        temp_dir_writable_check(),
        probe_buffer_check(),
        demux_self_test(),
        config_file_check(),
        compiled_features_check(),
    ];

    let has_fail = checks.iter().any(|c| matches!(c.status, CheckStatus::Fail));
    let output = DoctorOutput {
        kind: "doctor",
        checks,
        overall: if has_fail { "fail" } else { "pass" },
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("bytehub doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<20} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => println!("{}", output.overall),
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Info => "INFO",
        CheckStatus::Skip => "SKIP",
    }
}

fn platform_transport_check() -> CheckResult {
    if cfg!(unix) {
        CheckResult::new(
            "platform_transport",
            CheckStatus::Pass,
            "files, stdin and Unix domain sockets available",
        )
    } else {
        CheckResult::new(
            "platform_transport",
            CheckStatus::Info,
            "files and stdin only; `listen` needs Unix domain sockets",
        )
    }
}

#[cfg(unix)]
fn temp_dir_writable_check() -> CheckResult {
    use bytehub::transport::UnixDomainSocket;

    let dir = std::env::temp_dir().join(format!(
        "bytehub-doctor-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    ));
    let _ = std::fs::create_dir_all(&dir);
    let result = UnixDomainSocket::bind(dir.join("doctor.sock"));
    let _ = std::fs::remove_dir_all(&dir);

    match result {
        Ok(_) => CheckResult::new(
            "temp_dir_writable",
            CheckStatus::Pass,
            format!("socket bind in {} succeeded", std::env::temp_dir().display()),
        ),
        Err(err) => CheckResult::new(
            "temp_dir_writable",
            CheckStatus::Fail,
            format!("socket bind failed: {err}"),
        ),
    }
}

#[cfg(not(unix))]
fn temp_dir_writable_check() -> CheckResult {
    CheckResult::new(
        "temp_dir_writable",
        CheckStatus::Skip,
        "socket bind check not available on this platform",
    )
}

fn probe_buffer_check() -> CheckResult {
    let capacity = HubConfig::default().probe_buffer_capacity;
    match ProbeBuffer::try_with_capacity(capacity) {
        Ok(buffer) => CheckResult::new(
            "probe_buffer_alloc",
            CheckStatus::Pass,
            format!("{} byte probe buffer allocated", buffer.capacity()),
        ),
        Err(err) => CheckResult::new("probe_buffer_alloc", CheckStatus::Fail, err.to_string()),
    }
}

/// Run one framed frame, one sentence and one marker burst through a
/// fresh hub and check each reached its subsystem.
fn demux_self_test() -> CheckResult {
    const NAME: &str = "demux_self_test";

    let hub = Hub::new(HubConfig::default());
    let (sink, events) = mpsc::channel();
    let mut indices = Vec::new();
    for builtin in Builtin::ALL {
        match hub.register(builtin.instantiate(Some(sink.clone()))) {
            Ok(index) => indices.push(index),
            Err(err) => return CheckResult::new(NAME, CheckStatus::Fail, err.to_string()),
        }
    }
    drop(sink);

    let mut session = match hub.open(TransportInfo::memory("doctor")) {
        Ok(session) => session,
        Err(err) => return CheckResult::new(NAME, CheckStatus::Fail, err.to_string()),
    };
    for index in indices {
        if let Err(err) = session.enable(index) {
            return CheckResult::new(NAME, CheckStatus::Fail, err.to_string());
        }
    }

    let Some(frame) = FramedSubsystem::encode(7, b"ping") else {
        return CheckResult::new(NAME, CheckStatus::Fail, "frame encoding failed");
    };
    session.deliver(&frame);
    session.deliver(b"$BHDOC,1*00\r\n");
    session.deliver(b"abcd-doctor");
    let stats = session.stats();
    session.close();

    let seen: Vec<&str> = events.try_iter().map(|event| event.subsystem).collect();
    let expected = ["framed", "line", "marker"];
    if seen == expected && stats.is_conserved() {
        CheckResult::new(
            NAME,
            CheckStatus::Pass,
            format!("{} frames routed", stats.frames_dispatched),
        )
    } else {
        CheckResult::new(
            NAME,
            CheckStatus::Fail,
            format!("expected frames {expected:?}, got {seen:?}"),
        )
    }
}

fn config_file_check() -> CheckResult {
    let path = match std::env::var("BYTEHUB_CONFIG") {
        Ok(value) => PathBuf::from(value),
        Err(_) => {
            return CheckResult::new("config_file", CheckStatus::Skip, "BYTEHUB_CONFIG not set")
        }
    };

    match HubConfig::from_json_file(&path) {
        Ok(config) => CheckResult::new(
            "config_file",
            CheckStatus::Pass,
            format!(
                "{} loaded (max_subsystems={}, probe_buffer={}, quiet_period_ms={})",
                path.display(),
                config.max_subsystems,
                config.probe_buffer_capacity,
                config.quiet_period_ms
            ),
        ),
        Err(err) => CheckResult::new("config_file", CheckStatus::Fail, err.to_string()),
    }
}

fn compiled_features_check() -> CheckResult {
    let mut features = vec!["cli"];
    if cfg!(feature = "async") {
        features.push("async");
    }
    CheckResult::new(
        "compiled_features",
        CheckStatus::Info,
        features.join(", "),
    )
}
