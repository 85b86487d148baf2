use crate::domain::Launcher;
use crate::error::Result;
use std::path::Path;
use std::process::Command;
use tracing::info;

/// Starts the executable as a detached child; the caller exits right after.
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, exe: &Path, args: &[String]) -> Result<()> {
        info!("Launching {}", exe.display());
        let mut command = Command::new(exe);
        command.args(args);
        if let Some(dir) = exe.parent() {
            command.current_dir(dir);
        }
        command.spawn()?;
        Ok(())
    }
}
