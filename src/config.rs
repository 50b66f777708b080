use std::env;

/// Longest accepted reminder lead, ten years.
pub const MAX_REMINDER_LEAD_HOURS: i64 = 24 * 365 * 10;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    /// Empty means notifications are only written to the log.
    pub notification_url: String,
    pub notification_timeout_secs: u64,
    pub reminder_lead_hours: i64,
    pub cancel_clears_reminder: bool,
    pub enforce_staff_conflicts: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: "bookings.db".to_string(),
            notification_url: String::new(),
            notification_timeout_secs: 10,
            reminder_lead_hours: 24,
            cancel_clears_reminder: false,
            enforce_staff_conflicts: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed("PORT").unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            notification_url: env::var("NOTIFICATION_URL").unwrap_or_default(),
            notification_timeout_secs: parsed("NOTIFICATION_TIMEOUT_SECS")
                .unwrap_or(defaults.notification_timeout_secs),
            reminder_lead_hours: parsed("REMINDER_LEAD_HOURS")
                .filter(lead_hours_in_range)
                .unwrap_or(defaults.reminder_lead_hours),
            cancel_clears_reminder: flag("CANCEL_CLEARS_REMINDER")
                .unwrap_or(defaults.cancel_clears_reminder),
            enforce_staff_conflicts: flag("ENFORCE_STAFF_CONFLICTS")
                .unwrap_or(defaults.enforce_staff_conflicts),
        }
    }
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn lead_hours_in_range(hours: &i64) -> bool {
    (0..=MAX_REMINDER_LEAD_HOURS).contains(hours)
}

fn flag(key: &str) -> Option<bool> {
    let value = env::var(key).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_hours_bounds() {
        assert!(lead_hours_in_range(&0));
        assert!(lead_hours_in_range(&24));
        assert!(lead_hours_in_range(&MAX_REMINDER_LEAD_HOURS));
        assert!(!lead_hours_in_range(&-1));
        assert!(!lead_hours_in_range(&(MAX_REMINDER_LEAD_HOURS + 1)));
        assert!(!lead_hours_in_range(&i64::MAX));
    }
}
