pub mod board;
pub mod board_filter;
pub mod differ;
pub mod error;
pub mod format;
pub mod notification;
pub mod push;
pub mod sanitize;
pub mod time_entry;
pub mod timer;

pub use board::{Board, BoardColumn, BoardScope, BoardState, BoardWorkItem, WorkItemCategory};
pub use differ::{Differ, DifferStatus, RepositoryKey};
pub use error::WorktrackError;
pub use time_entry::{AttestLevel, TimeEntry};
pub use timer::{Provider, TimerSnapshot};
