use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct CheckState {
    /// Users whose reply check is currently running.
    pub in_flight: HashSet<String>,
    /// Maps user_id -> when their last check finished
    pub last_checked: HashMap<String, Instant>,
}

impl CheckState {
    /// Claims the user for one check. Returns false if a check is already running.
    pub fn begin(&mut self, user_id: &str) -> bool {
        self.in_flight.insert(user_id.to_string())
    }

    pub fn finish(&mut self, user_id: &str) {
        self.in_flight.remove(user_id);
        self.last_checked.insert(user_id.to_string(), Instant::now());
    }

    /// Check if the user finished a check within the grace period
    pub fn is_recently_checked(&self, user_id: &str, grace: Duration) -> bool {
        if let Some(&timestamp) = self.last_checked.get(user_id) {
            Instant::now().duration_since(timestamp) < grace
        } else {
            false
        }
    }

    /// Clean up expired entries from the last_checked map
    pub fn cleanup_expired(&mut self, grace: Duration) {
        let now = Instant::now();

        self.last_checked
            .retain(|_, &mut timestamp| now.duration_since(timestamp) < grace);
    }
}
