use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use tracing::info;

use crate::config::SweepConfig;

/// Set in the host process so it does not spawn another one.
pub const HOST_MARKER_ENV: &str = "SKIPBENCH_SUBJECT_HOST";

/// The subject runs in a dedicated process whenever it declares an
/// environment, so the harness never mutates its own.
pub fn needs_host_process(config: &SweepConfig, marker: Option<&str>) -> bool {
    !config.subject.env.is_empty() && marker.is_none()
}

/// Harness variables the host process keeps; everything else is dropped.
pub const PASSTHROUGH_ENV: [&str; 4] = ["PATH", "RUST_LOG", "HOME", "LD_LIBRARY_PATH"];

/// The full environment of the host process: pass-through variables the
/// harness has, overridden by the subject's own.
pub fn host_environment<F>(
    subject_env: &BTreeMap<String, String>,
    lookup: F,
) -> BTreeMap<String, OsString>
where
    F: Fn(&str) -> Option<OsString>,
{
    let mut env: BTreeMap<String, OsString> = PASSTHROUGH_ENV
        .into_iter()
        .filter_map(|name| lookup(name).map(|value| (name.to_string(), value)))
        .collect();
    for (k, v) in subject_env {
        env.insert(k.clone(), OsString::from(v));
    }
    env.insert(HOST_MARKER_ENV.to_string(), OsString::from("1"));
    env
}

pub fn host_command(exe: &Path, args: &[OsString], env: &BTreeMap<String, OsString>) -> Command {
    let mut command = Command::new(exe);
    command
        .args(args)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    command
}

/// Re-executes `exe args` with the subject environment applied and waits.
pub fn run_in_host_process(
    config: &SweepConfig,
    exe: &Path,
    args: &[OsString],
) -> Result<ExitStatus> {
    info!(
        exe = %exe.display(),
        env = ?config.subject.env,
        "spawning subject host process"
    );
    let env = host_environment(&config.subject.env, |name| std::env::var_os(name));
    let status = host_command(exe, args, &env)
        .status()
        .map_err(|e| anyhow!("failed to spawn subject host process: {}", e))?;
    Ok(status)
}
