pub mod add;
pub mod attach;
pub mod common;
pub mod completions;
pub mod delete;
pub mod edit;
pub mod list;
pub mod pending;
pub mod show;
pub mod sync;
pub mod watch;
