//! Registry for all place-search plugins, ordered by priority.

use std::slice::Iter;
use std::sync::Arc;

use crate::ports::{PlacePort, ProviderMeta};

/// A place provider together with its position in the lookup order.
pub struct ProviderPlugin {
    /// Lower values are queried first.
    pub priority: u32,
    /// Implementation for searching places.
    pub place_port: Arc<dyn PlacePort>,
}

impl ProviderPlugin {
    /// Bundle a port with its priority.
    #[must_use]
    pub fn new(priority: u32, place_port: Arc<dyn PlacePort>) -> Self {
        Self {
            priority,
            place_port,
        }
    }

    /// Static metadata describing the provider.
    #[must_use]
    pub fn meta(&self) -> &ProviderMeta {
        self.place_port.meta()
    }
}

/// Registry that keeps plugins in the order the aggregator should try them.
pub struct ProviderRegistry {
    plugins: Vec<ProviderPlugin>,
}

impl ProviderRegistry {
    /// Build a registry from the provided plugin list.
    ///
    /// Plugins are sorted by priority; equal priorities keep their input order.
    #[must_use]
    pub fn new(mut plugins: Vec<ProviderPlugin>) -> Self {
        plugins.sort_by_key(|plugin| plugin.priority);
        Self { plugins }
    }

    /// Metadata for all registered providers, in lookup order.
    #[must_use]
    pub fn providers(&self) -> Vec<ProviderMeta> {
        self.plugins
            .iter()
            .map(|plugin| plugin.meta().clone())
            .collect()
    }

    /// Iterator over plugins in lookup order.
    pub fn iter(&self) -> Iter<'_, ProviderPlugin> {
        self.plugins.iter()
    }
}

impl<'registry> IntoIterator for &'registry ProviderRegistry {
    type Item = &'registry ProviderPlugin;
    type IntoIter = Iter<'registry, ProviderPlugin>;

    fn into_iter(self) -> Self::IntoIter {
        self.plugins.iter()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::model::PlaceCandidate;
    use crate::ports::PlaceQuery;

    struct Named(ProviderMeta);

    #[async_trait]
    impl PlacePort for Named {
        fn meta(&self) -> &ProviderMeta {
            &self.0
        }

        async fn search(&self, _query: &PlaceQuery) -> Vec<PlaceCandidate> {
            Vec::new()
        }
    }

    fn plugin(id: &str, priority: u32) -> ProviderPlugin {
        ProviderPlugin::new(
            priority,
            Arc::new(Named(ProviderMeta {
                id: id.to_owned(),
                name: id.to_uppercase(),
            })),
        )
    }

    #[test]
    fn sorts_by_priority_keeping_ties_stable() {
        let registry = ProviderRegistry::new(vec![
            plugin("google", 3),
            plugin("overpass", 1),
            plugin("nominatim", 2),
            plugin("other", 2),
        ]);

        let ids: Vec<String> = registry.providers().into_iter().map(|meta| meta.id).collect();
        assert_eq!(ids, ["overpass", "nominatim", "other", "google"]);
        assert_eq!(registry.iter().count(), 4);
    }
}
