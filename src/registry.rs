use crate::models::DiscoveredService;

/// The deduplicated, insertion-ordered set of discovered services.
///
/// Keyed by service name. The first resolution of a name wins; later ones are
/// ignored until the entry is removed.
#[derive(Debug, Default, Clone)]
pub struct DiscoveryRegistry {
    services: Vec<DiscoveredService>,
}

impl DiscoveryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the service was added.
    pub fn insert(&mut self, service: DiscoveredService) -> bool {
        if self.contains(&service.name) {
            return false;
        }
        self.services.push(service);
        true
    }

    /// Returns the removed entry, if any.
    pub fn remove(&mut self, name: &str) -> Option<DiscoveredService> {
        let idx = self.services.iter().position(|s| s.name == name)?;
        Some(self.services.remove(idx))
    }

    pub fn clear(&mut self) {
        self.services.clear();
    }

    pub fn get(&self, name: &str) -> Option<&DiscoveredService> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn services(&self) -> &[DiscoveredService] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
