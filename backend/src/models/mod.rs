//! Database models (SQLx).

pub mod actor;
pub mod custody;
pub mod edit_history;
pub mod evidence;
pub mod version;
