pub mod icons;
pub mod progress;
pub mod status;

pub use progress::RunUI;
pub use status::{print_status_table, render_status_table};
