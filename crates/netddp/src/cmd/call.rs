use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use netddp_client::{IncomingEvent, RequestId};
use serde_json::json;

use crate::cmd::{connect, parse_duration, parse_params, CallArgs};
use crate::exit::{client_error, CliError, CliResult, DATA_INVALID, FAILURE, SUCCESS, TIMEOUT};
use crate::output::{print_event, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let params = parse_params(&args.params)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;

    let (tx, rx) = mpsc::channel();
    let client = connect(&args.connect, move |event: IncomingEvent| {
        let _ = tx.send(event);
    })?;
    let id = client
        .call(&args.method, params)
        .map_err(|err| client_error("call failed", err))?;

    if args.wait {
        let event = wait_for_result(&rx, id, wait_timeout)?;
        print_event(&event, format);
        client.dispose();
        return match event {
            IncomingEvent::ProtocolError { .. } => Ok(DATA_INVALID),
            _ => Ok(SUCCESS),
        };
    }

    match format {
        OutputFormat::Json => println!("{}", json!({ "method": args.method, "id": id })),
        _ => println!("sent method={} id={id}", args.method),
    }
    client.dispose();
    Ok(SUCCESS)
}

/// Wait for the result of request `id`, skipping unrelated events.
///
/// A protocol error ends the wait too, since it cannot be matched to a request.
fn wait_for_result(
    events: &Receiver<IncomingEvent>,
    id: RequestId,
    timeout: Duration,
) -> CliResult<IncomingEvent> {
    let expected = id.to_string();
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.recv_timeout(remaining) {
            Ok(IncomingEvent::MethodResult {
                requesting_id,
                result,
            }) if requesting_id == expected => {
                return Ok(IncomingEvent::MethodResult {
                    requesting_id,
                    result,
                })
            }
            Ok(event @ IncomingEvent::ProtocolError { .. }) => return Ok(event),
            Ok(_) => continue,
            Err(RecvTimeoutError::Timeout) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no result for request {id} within {timeout:?}"),
                ))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(CliError::new(FAILURE, "client stopped before the result arrived"))
            }
        }
    }
}
