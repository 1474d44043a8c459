use chrono::{DateTime, Utc};

/// Outcome of the most recent refresh of a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// No refresh has completed yet.
    Pending,
    /// A refresh is in flight; the previous snapshot is still served.
    Refreshing,
    Ready { count: usize, at: DateTime<Utc> },
    /// The last refresh failed; the previous snapshot is still served and
    /// the next scheduled tick retries.
    Failed { message: String, at: DateTime<Utc> },
}

impl SyncStatus {
    pub fn ready(count: usize) -> Self {
        SyncStatus::Ready { count, at: Utc::now() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        SyncStatus::Failed {
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SyncStatus::Failed { .. })
    }

    fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            SyncStatus::Ready { at, .. } | SyncStatus::Failed { at, .. } => Some(*at),
            SyncStatus::Pending | SyncStatus::Refreshing => None,
        }
    }

    pub fn age_minutes(&self) -> Option<i64> {
        self.at().map(|at| (Utc::now() - at).num_minutes())
    }

    /// Short human-readable age of the last completed refresh.
    pub fn age_display(&self) -> String {
        let Some(minutes) = self.age_minutes() else {
            return "never".to_string();
        };
        if minutes < 1 {
            // Also covers negative ages from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                // Round up: 1h 30m+ becomes 2h
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Pending => write!(f, "waiting for first refresh"),
            SyncStatus::Refreshing => write!(f, "refreshing"),
            SyncStatus::Ready { count, .. } => {
                write!(f, "{} records, updated {}", count, self.age_display())
            }
            SyncStatus::Failed { message, .. } => {
                write!(f, "refresh failed {}: {}", self.age_display(), message)
            }
        }
    }
}
