//! Harmonization statistics

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Effect of applying one change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HarmonizationStatus {
    LocalCreated,
    LocalUpdated,
    LocalDeleted,
    RemoteCreated,
    RemoteUpdated,
    RemoteDeleted,
}

/// Mutations applied during one or more passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarmonizationStatistics {
    pub local_created: u32,
    pub local_updated: u32,
    pub local_deleted: u32,
    pub remote_created: u32,
    pub remote_updated: u32,
    pub remote_deleted: u32,
}

impl HarmonizationStatistics {
    pub fn record(&mut self, status: HarmonizationStatus) {
        let counter = match status {
            HarmonizationStatus::LocalCreated => &mut self.local_created,
            HarmonizationStatus::LocalUpdated => &mut self.local_updated,
            HarmonizationStatus::LocalDeleted => &mut self.local_deleted,
            HarmonizationStatus::RemoteCreated => &mut self.remote_created,
            HarmonizationStatus::RemoteUpdated => &mut self.remote_updated,
            HarmonizationStatus::RemoteDeleted => &mut self.remote_deleted,
        };
        *counter = counter.saturating_add(1);
    }

    pub const fn total(&self) -> u32 {
        self.local_created
            + self.local_updated
            + self.local_deleted
            + self.remote_created
            + self.remote_updated
            + self.remote_deleted
    }

    /// A quiet pass applied nothing; the scheduler stops repeating.
    pub const fn is_quiet(&self) -> bool {
        self.total() == 0
    }
}

impl AddAssign for HarmonizationStatistics {
    fn add_assign(&mut self, other: Self) {
        self.local_created += other.local_created;
        self.local_updated += other.local_updated;
        self.local_deleted += other.local_deleted;
        self.remote_created += other.remote_created;
        self.remote_updated += other.remote_updated;
        self.remote_deleted += other.remote_deleted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_sums() {
        let mut stats = HarmonizationStatistics::default();
        assert!(stats.is_quiet());
        stats.record(HarmonizationStatus::LocalCreated);
        stats.record(HarmonizationStatus::RemoteDeleted);
        stats.record(HarmonizationStatus::RemoteDeleted);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.remote_deleted, 2);

        let mut totals = HarmonizationStatistics::default();
        totals += stats;
        totals += stats;
        assert_eq!(totals.total(), 6);
    }
}
