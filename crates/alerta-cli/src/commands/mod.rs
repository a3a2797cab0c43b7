pub mod common;
pub mod completions;
pub mod list;
pub mod report;
pub mod show;
pub mod sync;
