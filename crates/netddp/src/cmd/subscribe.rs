use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use netddp_client::{ConnectionState, IncomingEvent};
use tracing::info;

use crate::cmd::{connect, parse_params, SubscribeArgs};
use crate::exit::{client_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{print_event, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: SubscribeArgs, format: OutputFormat) -> CliResult<i32> {
    let params = parse_params(&args.params)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (tx, rx) = mpsc::channel();
    let client = connect(&args.connect, move |event: IncomingEvent| {
        let _ = tx.send(event);
    })?;
    let id = client
        .subscribe(&args.name, params)
        .map_err(|err| client_error("subscribe failed", err))?;
    info!(id, name = %args.name, "subscribed");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                print_event(&event, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if client.state() == ConnectionState::Closed {
                    return Err(CliError::new(FAILURE, "connection closed by server"));
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    client.dispose();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
