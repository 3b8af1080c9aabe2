mod board;
mod tasks;

pub use board::TaskBoard;
pub use tasks::{ClarifyOutcome, DeleteOutcome, TasksService};
