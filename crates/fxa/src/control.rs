//! Background process management (`start`, `stop`, `restart`, `status`, `logs`).

use std::io;

use fxa_core::{
    supervisor::{Supervisor, SupervisorConfig},
    Result,
};

fn supervisor() -> Result<Supervisor> {
    let program = std::env::current_exe()?;
    Ok(Supervisor::new(SupervisorConfig::from_env(
        program,
        vec!["serve".to_string()],
    )))
}

pub fn start() -> Result<()> {
    let mut sup = supervisor()?;
    let pid = sup.start()?;
    println!("fxa started (pid {pid})");
    println!("logs: {}", sup.config().log_file.display());
    Ok(())
}

pub fn stop() -> Result<()> {
    let pid = supervisor()?.stop()?;
    println!("fxa stopped (pid {pid})");
    Ok(())
}

pub fn restart() -> Result<()> {
    let pid = supervisor()?.restart()?;
    println!("fxa restarted (pid {pid})");
    Ok(())
}

pub fn status() -> Result<()> {
    let report = supervisor()?.status()?;
    println!("fxa is {} (pid {})", report.state.as_str(), report.pid);
    println!("pid file: {}", report.pid_file.display());
    println!("log file: {}", report.log_file.display());
    Ok(())
}

pub fn logs(lines: usize, follow: bool) -> Result<()> {
    let sup = supervisor()?;
    for line in sup.tail_logs(lines)? {
        println!("{line}");
    }
    if follow {
        // Runs until the user interrupts the process.
        sup.follow_logs(&mut io::stdout(), || false)?;
    }
    Ok(())
}
