//! Serve one Unix socket connection and route what it sends.
//!
//! Run with:
//!   cargo run --example uds-demux
//!
//! The demo connects to itself from a second thread, so no other terminal
//! is needed.

use std::fs;
use std::io::Write;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use bytehub::hub::{execute, ControlCommand, Hub, HubConfig};
use bytehub::subsys::{Builtin, FramedSubsystem};
use bytehub::transport::{ReadPump, UnixDomainSocket};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("bytehub-uds-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("demux.sock");

    let hub = Hub::new(HubConfig::default());
    let (sink, events) = mpsc::channel();
    let mut indices = Vec::new();
    for builtin in Builtin::ALL {
        indices.push(hub.register(builtin.instantiate(Some(sink.clone())))?);
    }

    let listener = UnixDomainSocket::bind(&sock_path)?;
    eprintln!("Listening on {}", sock_path.display());

    let client_path = sock_path.clone();
    let client = thread::spawn(move || -> std::io::Result<()> {
        let mut stream = UnixDomainSocket::connect(&client_path)
            .map_err(|err| std::io::Error::other(err.to_string()))?;
        stream.write_all(b"$GPRMC,081836,A*1F\r\n")?;
        thread::sleep(Duration::from_millis(20));
        if let Some(frame) = FramedSubsystem::encode(3, b"over the socket") {
            stream.write_all(&frame)?;
        }
        Ok(())
    });

    let mut stream = listener.accept()?;
    stream.set_read_timeout(Some(Duration::from_millis(100)))?;
    let mut session = hub.open(stream.info().clone())?;

    // Enable through the control plane, as a remote operator would.
    let handle = session.handle();
    for index in &indices {
        let reply = execute(&handle, &ControlCommand::enable(i32::try_from(*index)?))?;
        eprintln!("control: {reply:?}");
    }

    let summary = ReadPump::new().run(&mut stream, |chunk| session.deliver(chunk))?;
    let _ = client.join();

    for event in events.try_iter() {
        eprintln!(
            "{:>7}: {}",
            event.subsystem,
            String::from_utf8_lossy(&event.payload)
        );
    }
    eprintln!(
        "{} chunks, {} idle ticks, status: {:?}",
        summary.chunks,
        summary.idle_ticks,
        session.status()
    );

    session.close();
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
