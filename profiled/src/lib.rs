pub mod config;
pub mod identity;
pub mod merge;
pub mod model;
pub mod notify;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod timestamp;
