pub mod logs;
pub mod printer;
pub mod progress;

pub use logs::setup_logging;
pub use printer::{print_one, print_out, JsonOut};
pub use progress::ProgressPrinter;
