use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

/// In-app counter of new entries the user has not looked at yet.
#[derive(Debug, Default)]
pub struct Notifications {
    pending: AtomicUsize,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, new_entries: usize) {
        if new_entries == 0 {
            return;
        }
        let total = self.pending.fetch_add(new_entries, Ordering::SeqCst) + new_entries;
        debug!("{} new entries pending notification", total);
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn cancel_all(&self) {
        if self.pending.swap(0, Ordering::SeqCst) > 0 {
            debug!("Cleared entry notifications");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_cancel() {
        let notifications = Notifications::new();
        notifications.add(3);
        notifications.add(0);
        notifications.add(2);
        assert_eq!(notifications.pending(), 5);

        notifications.cancel_all();
        assert_eq!(notifications.pending(), 0);
    }
}
