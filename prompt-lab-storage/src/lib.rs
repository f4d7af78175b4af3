pub mod result_log;
pub mod memory;
pub mod artifacts;
pub mod export;

pub use result_log::*;
pub use memory::*;
pub use artifacts::*;
pub use export::*;
