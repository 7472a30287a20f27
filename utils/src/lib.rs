use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait OptionInspectNone<T> {
    fn inspect_none(self, inspector_function: impl FnOnce()) -> Self;
}

impl<T> OptionInspectNone<T> for Option<T> {
    fn inspect_none(self, inspector_function: impl FnOnce()) -> Self {
        if self.is_none() {
            inspector_function();
        }
        self
    }
}

/// Milliseconds since the unix epoch. Clocks set before the epoch read as 0.
pub fn get_epoch_time_in_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
