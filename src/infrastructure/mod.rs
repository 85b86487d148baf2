mod clients;
mod kv_store;
mod lockfile;
mod process;
mod storage;

pub use clients::http::HttpFetcher;
pub use kv_store::KeyedConfigStore;
pub use lockfile::{LockFile, LockOwner};
pub use process::ProcessLauncher;
pub use storage::fs_store::{parse_catalog, FileSystemStore};
