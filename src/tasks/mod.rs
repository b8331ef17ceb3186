//! Background Tasks Module
//!
//! Tasks spawned on the tokio runtime on behalf of the cache.
//!
//! # Tasks
//! - Load: runs one loader invocation and settles its flight

mod load;

pub(crate) use load::spawn_load_task;
