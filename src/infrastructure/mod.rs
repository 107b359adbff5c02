pub mod audit_log;
pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
