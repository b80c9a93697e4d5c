//! Process identity used to keep concurrent cache writers apart.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Identity of the running worker: process id plus concurrency-unit id.
///
/// The unit id is 0 when the caller is not running inside a task.
pub trait ProcessIdentity: Send + Sync {
    fn process_id(&self) -> u32;
    fn unit_id(&self) -> u64;
}

/// Identity backed by the OS process id and the current tokio task.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemIdentity;

impl ProcessIdentity for SystemIdentity {
    fn process_id(&self) -> u32 {
        std::process::id()
    }

    fn unit_id(&self) -> u64 {
        let Some(id) = tokio::task::try_id() else {
            return 0;
        };
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        // 0 is reserved for "no task"
        hasher.finish().max(1)
    }
}

/// Identity with fixed values, for tests and deterministic tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedIdentity {
    pub pid: u32,
    pub unit: u64,
}

impl FixedIdentity {
    pub fn new(pid: u32, unit: u64) -> Self {
        Self { pid, unit }
    }
}

impl ProcessIdentity for FixedIdentity {
    fn process_id(&self) -> u32 {
        self.pid
    }

    fn unit_id(&self) -> u64 {
        self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_identity_outside_task() {
        let identity = SystemIdentity;
        assert_eq!(identity.process_id(), std::process::id());
        assert_eq!(identity.unit_id(), 0);
    }

    #[tokio::test]
    async fn test_system_identity_distinct_tasks() {
        let a = tokio::spawn(async { SystemIdentity.unit_id() }).await.unwrap();
        let b = tokio::spawn(async { SystemIdentity.unit_id() }).await.unwrap();
        assert_ne!(a, 0);
        assert_ne!(b, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fixed_identity() {
        let identity = FixedIdentity::new(1234, 7);
        assert_eq!(identity.process_id(), 1234);
        assert_eq!(identity.unit_id(), 7);
    }
}
