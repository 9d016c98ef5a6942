mod buffer;
pub mod config;
pub mod error;
mod mmap_raw;
mod record;
mod shm;
mod signal;
mod updater;

pub use buffer::SharedVectorBuffer;
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use record::{VectorRecord, RECORD_SIZE};
pub use shm::{OpenOptions, SharedRegion};
pub use signal::{install_stop_handler, StopFlag};
pub use updater::{run, update_pass, LoopReport, UpdateLoop};
