use clap::Parser;
use crossbeam_channel::{bounded, unbounded};
use nfstop::config::Args;
use nfstop::monitor::{self, Monitor};
use nfstop::nfs::{Decoder, DEFAULT_RECORD_LIMIT};
use nfstop::sniff::{self, Sniffer};
use nfstop::stream::ConnectionTracker;
use nfstop::users::{UserNames, PASSWD};
use nfstop::{ui, CaptureError, NfstopError, SharedSelection};
use std::fs::File;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Segments buffered between the capture thread and the event loop
const SEGMENT_QUEUE: usize = 8192;

fn main() -> ExitCode {
    let args = Args::parse();

    if args.list_interfaces {
        return match sniff::list_devices() {
            Ok(devices) => {
                for (i, name) in devices.iter().enumerate() {
                    println!("{}. {}", i + 1, name);
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to get list of interfaces: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    if let Err(e) = init_tracing(&args) {
        eprintln!("Failed to open log file: {}", e);
        return ExitCode::FAILURE;
    }

    let sniffer = match Sniffer::open(&args) {
        Ok(sniffer) => sniffer,
        Err(e) => {
            eprintln!("Failed to initialize sniffer: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&args, sniffer) {
        Ok(()) => ExitCode::SUCCESS,
        Err(NfstopError::Capture(e)) => {
            eprintln!("Packet capture error: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(args: &Args) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Some(path) = &args.log_file {
        let file = File::create(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .init();
    } else if args.batch {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    // otherwise the terminal belongs to the dashboard
    Ok(())
}

fn run(args: &Args, sniffer: Sniffer) -> Result<(), NfstopError> {
    let users = if args.names {
        match UserNames::load(PASSWD) {
            Ok(users) => Some(users),
            Err(e) => {
                warn!("cannot read {}: {}, showing numeric uids", PASSWD, e);
                None
            }
        }
    } else {
        None
    };

    let (segment_tx, segment_rx) = bounded(SEGMENT_QUEUE);
    let (tick_tx, tick_rx) = unbounded();
    let (shutdown_tx, shutdown_rx) = bounded(1);
    let running = Arc::new(AtomicBool::new(true));
    let selection = SharedSelection::default();

    let running_clone = running.clone();
    let capture_thread = thread::Builder::new()
        .name("capture".into())
        .spawn(move || sniffer.run(segment_tx, running_clone))?;

    let monitor = Monitor::new(
        ConnectionTracker::new(args.tracker_limits()),
        Decoder::new(DEFAULT_RECORD_LIMIT, users),
        selection.clone(),
    );
    let interval = args.refresh();
    let monitor_thread = thread::Builder::new()
        .name("monitor".into())
        .spawn(move || monitor::run(monitor, segment_rx, shutdown_rx, interval, tick_tx))?;

    let ctrlc_tx = shutdown_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = ctrlc_tx.try_send(());
    }) {
        warn!("failed to install Ctrl-C handler: {}", e);
    }

    let presented = if args.batch {
        ui::print_batch(tick_rx, std::io::stdout().lock()).map_err(NfstopError::from)
    } else {
        ui::run(tick_rx, selection).map_err(NfstopError::from)
    };

    running.store(false, Ordering::SeqCst);
    let _ = shutdown_tx.try_send(());
    if monitor_thread.join().is_err() {
        error!("event loop panicked");
    }
    let captured = capture_thread.join().unwrap_or_else(|_| {
        error!("capture thread panicked");
        Ok(0)
    });

    finish(presented, captured)
}

/// A failed presenter wins over a failed capture; either one fails the run.
fn finish(
    presented: Result<(), NfstopError>,
    captured: Result<u64, CaptureError>,
) -> Result<(), NfstopError> {
    presented?;
    let packets = captured?;
    info!(packets, "capture finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nfstop::UiError;

    fn read_failure() -> CaptureError {
        CaptureError::Read(pcap::Error::PcapError("device went down".into()))
    }

    #[test]
    fn capture_read_failure_fails_the_run() {
        let err = finish(Ok(()), Err(read_failure())).unwrap_err();
        assert!(matches!(err, NfstopError::Capture(CaptureError::Read(_))));
        assert!(err.to_string().contains("device went down"), "{}", err);
    }

    #[test]
    fn presenter_failure_is_reported_first() {
        let draw = UiError::Draw(std::io::Error::other("broken pipe"));
        let err = finish(Err(draw.into()), Err(read_failure())).unwrap_err();
        assert!(matches!(err, NfstopError::Ui(UiError::Draw(_))));
    }

    #[test]
    fn clean_capture_end_succeeds() {
        assert!(finish(Ok(()), Ok(120)).is_ok());
    }
}
