use anyhow::Result;
use std::collections::HashSet;
use std::sync::Mutex;

/// Per-entity single-flight guard. A pass holds the lease for its entity type
/// for its whole duration; a concurrent trigger for the same entity type is
/// rejected rather than queued.
#[derive(Debug, Default)]
pub struct LeaseRegistry {
    active: Mutex<HashSet<String>>,
}

impl LeaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, entity: &str) -> Result<LeaseGuard<'_>> {
        let mut active = self.active.lock().unwrap();
        if !active.insert(entity.to_string()) {
            anyhow::bail!("A sync pass for {} is already running", entity);
        }
        Ok(LeaseGuard {
            registry: self,
            entity: entity.to_string(),
        })
    }

    pub fn is_held(&self, entity: &str) -> bool {
        self.active.lock().unwrap().contains(entity)
    }

    fn release(&self, entity: &str) {
        self.active.lock().unwrap().remove(entity);
    }
}

/// Releases the lease when dropped.
#[derive(Debug)]
pub struct LeaseGuard<'a> {
    registry: &'a LeaseRegistry,
    entity: String,
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.entity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let registry = LeaseRegistry::new();
        {
            let _guard = registry.acquire("Lead").unwrap();
            assert!(registry.is_held("Lead"));
        }
        assert!(!registry.is_held("Lead"));
        // Re-acquirable after release
        assert!(registry.acquire("Lead").is_ok());
    }

    #[test]
    fn test_concurrent_acquire_is_rejected() {
        let registry = LeaseRegistry::new();
        let _guard = registry.acquire("Lead").unwrap();
        let err = registry.acquire("Lead").unwrap_err();
        assert!(err.to_string().contains("already running"));
    }

    #[test]
    fn test_entities_lease_independently() {
        let registry = LeaseRegistry::new();
        let _lead = registry.acquire("Lead").unwrap();
        assert!(registry.acquire("Contact").is_ok());
    }
}
