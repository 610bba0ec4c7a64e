use netddp_frame::{DDP_SUPPORTED_VERSIONS, DDP_VERSION};
use serde::Serialize;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

/// Build and protocol facts reported by `netddp version --extended`.
#[derive(Debug, Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    build: Option<BuildInfo>,
}

#[derive(Debug, Serialize)]
struct BuildInfo {
    ddp_version: &'static str,
    ddp_supported: &'static [&'static str],
    target: &'static str,
    profile: &'static str,
    target_os: &'static str,
    target_arch: &'static str,
    websocket: bool,
}

impl VersionInfo {
    fn collect(extended: bool) -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            build: extended.then(|| BuildInfo {
                ddp_version: DDP_VERSION,
                ddp_supported: DDP_SUPPORTED_VERSIONS,
                target: option_env!("NETDDP_BUILD_TARGET").unwrap_or("unknown"),
                profile: option_env!("NETDDP_BUILD_PROFILE").unwrap_or("unknown"),
                target_os: std::env::consts::OS,
                target_arch: std::env::consts::ARCH,
                websocket: cfg!(feature = "websocket"),
            }),
        }
    }

    fn lines(&self) -> Vec<String> {
        let Some(build) = &self.build else {
            return vec![format!("{} {}", self.name, self.version)];
        };
        vec![
            format!("name: {}", self.name),
            format!("version: {}", self.version),
            format!("ddp_version: {}", build.ddp_version),
            format!("ddp_supported: {}", build.ddp_supported.join(",")),
            format!("target: {}", build.target),
            format!("profile: {}", build.profile),
            format!("target_os: {}", build.target_os),
            format!("target_arch: {}", build.target_arch),
            format!("features: websocket={}, cli=true", build.websocket),
        ]
    }
}

/// Plain lines unless JSON was asked for explicitly.
pub fn run(args: VersionArgs, format: Option<OutputFormat>) -> CliResult<i32> {
    let info = VersionInfo::collect(args.extended);
    match format {
        Some(OutputFormat::Json) => println!(
            "{}",
            serde_json::to_string(&info).unwrap_or_else(|_| "{}".to_string())
        ),
        _ => {
            for line in info.lines() {
                println!("{line}");
            }
        }
    }
    Ok(SUCCESS)
}
