use std::time::Duration;

use clap::{Args, Subcommand};
use netddp_client::{ClientConfig, DdpClient, Subscriber};
use netddp_transport::WsTransport;
use serde_json::Value;

use crate::exit::{client_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod subscribe;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Subscribe to a publication and print record events.
    Subscribe(SubscribeArgs),
    /// Invoke a server method.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Event output falls back to the terminal-dependent default; `version` only
/// switches to JSON when asked.
pub fn run(command: Command, format: Option<OutputFormat>) -> CliResult<i32> {
    let events = || format.unwrap_or_else(OutputFormat::default_for_stdout);
    match command {
        Command::Subscribe(args) => subscribe::run(args, events()),
        Command::Call(args) => call::run(args, events()),
        Command::Version(args) => version::run(args, format),
    }
}

/// Where and how to connect.
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Server address without scheme, e.g. localhost:3000.
    #[arg(env = "NETDDP_HOST")]
    pub host: String,
    /// Use ws:// instead of wss://.
    #[arg(long)]
    pub insecure: bool,
    /// Connect timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "10s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Publication name.
    pub name: String,
    /// Subscription parameter as JSON. Repeat for positional parameters.
    #[arg(long = "param", value_name = "JSON")]
    pub params: Vec<String>,
    /// Exit after printing N events.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Method name.
    pub method: String,
    /// Method parameter as JSON. Repeat for positional parameters.
    #[arg(long = "param", value_name = "JSON")]
    pub params: Vec<String>,
    /// Wait for the method result and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the result when --wait is set.
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Build a WebSocket client and connect it.
pub fn connect<S: Subscriber>(args: &ConnectArgs, subscriber: S) -> CliResult<DdpClient> {
    let config = ClientConfig {
        connect_timeout: parse_duration(&args.timeout)?,
        ..ClientConfig::default()
    };
    let client = DdpClient::with_config(WsTransport::new(), subscriber, config)
        .map_err(|err| client_error("client setup failed", err))?;
    client
        .connect(&args.host, !args.insecure)
        .map_err(|err| client_error("connect failed", err))?;
    Ok(client)
}

/// Parse each `--param` as one JSON value, keeping their order.
pub fn parse_params(raw: &[String]) -> CliResult<Vec<Value>> {
    raw.iter()
        .map(|param| {
            serde_json::from_str(param).map_err(|err| {
                CliError::new(USAGE, format!("--param is not valid JSON ({param}): {err}"))
            })
        })
        .collect()
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration(" ").is_err());
    }

    #[test]
    fn params_keep_order_and_types() {
        let raw = vec![
            r#"{"k":"v"}"#.to_string(),
            "\"text\"".to_string(),
            "42".to_string(),
        ];
        assert_eq!(
            parse_params(&raw).unwrap(),
            vec![json!({"k": "v"}), json!("text"), json!(42)]
        );
    }

    #[test]
    fn invalid_param_is_usage_error() {
        let err = parse_params(&["{oops".to_string()]).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
