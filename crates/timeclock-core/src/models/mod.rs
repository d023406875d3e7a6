//! Data models for Timeclock

mod log_entry;
mod user_record;

pub use log_entry::{format_timestamp, LogEntry, LogKind};
pub(crate) use user_record::json_type_name;
pub use user_record::{UserRecord, ATTENDANCE_FIELD};
