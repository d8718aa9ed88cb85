//! Queue types for the scheduler

use std::fmt;

use serde::Serialize;

use crate::interaction::Interaction;

/// Identifier of a state cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CellId(pub u64);

/// An update waiting for the next render pass
pub(crate) struct QueuedUpdate {
    pub cell: CellId,
    pub apply: Box<dyn FnOnce()>,
}

impl fmt::Debug for QueuedUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedUpdate").field("cell", &self.cell).finish_non_exhaustive()
    }
}

/// One render pass that applied queued updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    /// 1-based commit number
    pub commit: u64,
    /// Updates applied by this commit
    pub updates: usize,
    /// Names of the cells that changed, sorted
    pub cells: Vec<String>,
    /// Interactions current while the commit ran
    pub interactions: Vec<Interaction>,
}

impl CommitRecord {
    pub fn interaction_names(&self) -> Vec<&str> {
        self.interactions.iter().map(|i| i.name.as_str()).collect()
    }
}

/// One effect run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectRecord {
    pub effect: String,
    /// Commit that scheduled the run
    pub commit: u64,
    pub interactions: Vec<Interaction>,
}

impl EffectRecord {
    pub fn interaction_names(&self) -> Vec<&str> {
        self.interactions.iter().map(|i| i.name.as_str()).collect()
    }
}

/// Statistics for the scheduler
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub total_updates: u64,
    pub total_commits: u64,
    pub total_effect_runs: u64,
    pub total_effect_failures: u64,
    pub peak_batch: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_names() {
        let record = CommitRecord {
            commit: 1,
            updates: 2,
            cells: vec!["count".to_string()],
            interactions: vec![
                Interaction {
                    id: 0,
                    name: "click".to_string(),
                },
                Interaction {
                    id: 1,
                    name: "hover".to_string(),
                },
            ],
        };
        assert_eq!(record.interaction_names(), vec!["click", "hover"]);
    }

    #[test]
    fn test_commit_record_serializes() {
        let record = CommitRecord {
            commit: 3,
            updates: 1,
            cells: vec!["count".to_string()],
            interactions: vec![],
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["commit"], 3);
        assert_eq!(json["cells"][0], "count");
    }
}
