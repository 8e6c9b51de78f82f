//! How the service decides when to run cycles.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Recurring cycles on the cron schedule until interrupted
    Scheduled,
    /// A single cycle, then exit
    Once,
}

impl RunMode {
    pub fn from_arg(value: &str) -> Option<Self> {
        match value.trim() {
            "scheduled" | "schedule" => Some(RunMode::Scheduled),
            "once" => Some(RunMode::Once),
            _ => None,
        }
    }
}
