use std::path::Path;

use bytehub::transport::{ByteStream, ReadPump};

use crate::cmd::ReplayArgs;
use crate::demux::Demux;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_session_report, OutputFormat, SessionReport};

pub fn run(args: ReplayArgs, format: OutputFormat) -> CliResult<i32> {
    let demux = Demux::new(&args.hub, format)?;
    let pump = ReadPump::with_chunk_size(args.hub.chunk_size)
        .map_err(|err| transport_error("invalid chunk size", err))?;

    let mut stream = match args.path.as_deref() {
        Some(path) if path != Path::new("-") => {
            ByteStream::open(path).map_err(|err| transport_error("open failed", err))?
        }
        _ => ByteStream::stdin(),
    };

    let mut session = demux.open(stream.info().clone())?;
    let summary = pump
        .run(&mut stream, |chunk| {
            session.deliver(chunk);
            demux.drain();
        })
        .map_err(|err| transport_error("read failed", err))?;
    demux.drain();

    let report = SessionReport::new(&session, demux.enabled_names(), &summary);
    print_session_report(&report, format);
    session.close();
    Ok(SUCCESS)
}
