pub mod task;
pub mod prompt;
pub mod run;
pub mod config;

pub use task::*;
pub use prompt::*;
pub use run::*;
pub use config::*;
