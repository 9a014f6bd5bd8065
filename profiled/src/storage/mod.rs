mod kv;
mod profile_store;

pub use kv::{FileKv, KvBackend, KvError, MemoryKv};
pub use profile_store::{LocalProfileStore, LocalStoreError};
