use chrono::{Local, Utc};

/// Wall-clock time formatted for display next to a message.
pub fn display_timestamp() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Milliseconds since the Unix epoch, as sent in outbound payloads.
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}
