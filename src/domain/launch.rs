use crate::error::Result;
use std::path::Path;

/// Hands control to another executable image. The caller exits afterwards.
pub trait Launcher: Send + Sync {
    fn launch(&self, exe: &Path, args: &[String]) -> Result<()>;
}
