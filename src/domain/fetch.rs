use crate::error::Result;

/// Remote fetch capability used by the updater and the fire-and-forget
/// reporters. Every call is independent, so a failed attempt can simply be
/// repeated from scratch.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}
