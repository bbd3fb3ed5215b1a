use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytehub::transport::{ReadPump, UnixDomainSocket};
use tracing::{info, warn};

use crate::cmd::ListenArgs;
use crate::demux::Demux;
use crate::exit::{transport_error, CliError, CliResult, INTERNAL, INTERRUPTED, SUCCESS, USAGE};
use crate::output::{print_session_report, OutputFormat, SessionReport};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let idle_tick = parse_duration(&args.idle_tick)?;
    let demux = Demux::new(&args.hub, format)?;
    let pump = ReadPump::with_chunk_size(args.hub.chunk_size)
        .map_err(|err| transport_error("invalid chunk size", err))?;
    let listener =
        UnixDomainSocket::bind(&args.path).map_err(|err| transport_error("bind failed", err))?;
    info!(path = %listener.path().display(), "listening");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(Arc::clone(&running))?;

    let mut served = 0usize;
    while running.load(Ordering::SeqCst) {
        let mut stream = listener
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        stream
            .set_read_timeout(Some(idle_tick))
            .map_err(|err| transport_error("socket setup failed", err))?;

        let mut session = demux.open(stream.info().clone())?;
        let result = pump.run(&mut stream, |chunk| {
            session.deliver(chunk);
            demux.drain();
        });
        demux.drain();

        match result {
            Ok(summary) => {
                let report = SessionReport::new(&session, demux.enabled_names(), &summary);
                print_session_report(&report, format);
            }
            Err(err) => warn!(session = session.id(), error = %err, "connection ended with error"),
        }
        session.close();

        served = served.saturating_add(1);
        if args.connections.is_some_and(|limit| served >= limit) {
            break;
        }
    }

    Ok(SUCCESS)
}

/// First Ctrl-C stops after the current connection; a second exits at once.
fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        if !running.swap(false, Ordering::SeqCst) {
            std::process::exit(INTERRUPTED);
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    let (number, millis) = match input.strip_suffix("ms") {
        Some(number) => (number, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration: {input:?}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
