use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{Context, Result};
use sysinfo::{get_current_pid, Signal, System};
use tracing::info;

use super::daemon_path::to_daemon_path;

/// Terminates every other process running one of `executables`. Returns how many were stopped.
pub fn kill_previous_servers(executables: &[PathBuf]) -> Result<usize> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow::anyhow!("Unknown own pid {e}"))?;
    let mut stopped = 0;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        let Some(exe) = process.exe().filter(|v| v.exists()) else {
            continue;
        };
        if executables.iter().any(|v| v.as_path() == exe) {
            info!("Stopping {pid} {exe:?}");
            // This will forcefully terminate the process on Windows. Anything better will require a
            // lot more work.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            stopped += 1;
        }
    }
    Ok(stopped)
}

/// Every binary that may be running the daemon: the daemon binary itself and this cli in
/// `serve` mode.
pub fn daemon_executables() -> Result<Vec<PathBuf>> {
    let cli = env::current_exe().context("Can't operate without an executable")?;
    Ok(vec![to_daemon_path(cli.clone()), cli])
}

/// Stops previous daemons and starts a new one through the daemon binary, which detaches
/// itself.
pub fn restart_server(dir: Option<&Path>) -> Result<()> {
    kill_previous_servers(&daemon_executables()?)?;

    let daemon = to_daemon_path(env::current_exe()?);
    let mut command = std::process::Command::new(&daemon);
    if let Some(dir) = dir {
        command.arg("--dir").arg(dir);
    }
    command.stdin(Stdio::null());

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
        command.stdout(Stdio::null());
    }

    println!("Spawning {daemon:?}");
    let status = command
        .status()
        .with_context(|| format!("Failed to start {daemon:?}"))?;
    if !status.success() {
        anyhow::bail!("{daemon:?} exited with {status}");
    }
    println!("Success");
    Ok(())
}
