//! CLI command implementations.

mod add;
mod config;
mod doctor;
mod export;
mod list;
mod process;
mod serve;
mod show;

pub use add::run_add;
pub use config::run_config;
pub use doctor::run_doctor;
pub use export::run_export;
pub use list::run_list;
pub use process::{run_clone, run_process, run_reprocess};
pub use serve::{router, run_serve, AppState};
pub use show::run_show;
