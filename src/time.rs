//! Wall clock used to stamp chat messages.

use chrono::{Local, NaiveTime};

/// Clock trait so broadcast timestamps can be fixed in tests
pub trait Clock: Send + Sync {
    /// Current local time of day
    fn now(&self) -> NaiveTime;
}

/// System clock (local time zone)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveTime {
        Local::now().time()
    }
}

/// Clock that always returns the same time
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    time: NaiveTime,
}

impl FixedClock {
    pub fn new(time: NaiveTime) -> Self {
        Self { time }
    }

    /// Fixed clock at `hour:min:sec`; out-of-range values fall back to midnight
    pub fn at(hour: u32, min: u32, sec: u32) -> Self {
        Self::new(NaiveTime::from_hms_opt(hour, min, sec).unwrap_or(NaiveTime::MIN))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveTime {
        self.time
    }
}

/// Format a chat line: `[HH:MM:SS] <sender> - <text>`
pub fn format_message(time: NaiveTime, sender: &str, text: &str) -> String {
    format!("[{}] {} - {}", time.format("%H:%M:%S"), sender, text)
}
