use std::collections::HashSet;

use anyhow::{Result, bail};
use syr_db::Database;
use syr_types::models::{BROADCAST_TARGET, PresenceEntry, Service};
use tracing::info;

/// Registry of valid routing targets. Fixed after startup.
pub struct ServiceDirectory {
    /// Sorted by display name.
    services: Vec<Service>,
    ids: HashSet<String>,
}

impl ServiceDirectory {
    pub fn new(mut services: Vec<Service>) -> Result<Self> {
        let mut ids = HashSet::with_capacity(services.len());
        for service in &services {
            if service.id == BROADCAST_TARGET {
                bail!("service id '{}' is reserved for broadcast", BROADCAST_TARGET);
            }
            if !ids.insert(service.id.clone()) {
                bail!("duplicate service id '{}'", service.id);
            }
        }

        services.sort_by(|a, b| a.display_name.cmp(&b.display_name).then_with(|| a.id.cmp(&b.id)));

        Ok(Self { services, ids })
    }

    /// Load the seeded services from the database.
    pub fn load(db: &Database) -> Result<Self> {
        let services: Vec<Service> = db.list_services()?.into_iter().map(Service::from).collect();
        info!("Loaded {} services", services.len());
        Self::new(services)
    }

    /// True for any seeded service or the broadcast target.
    pub fn is_valid_target(&self, service_id: &str) -> bool {
        service_id == BROADCAST_TARGET || self.is_service(service_id)
    }

    /// True for seeded services only.
    pub fn is_service(&self, service_id: &str) -> bool {
        self.ids.contains(service_id)
    }

    pub fn list(&self) -> &[Service] {
        &self.services
    }

    /// Services with `is_online` filled from a presence snapshot.
    pub fn list_with_presence(&self, live: &[PresenceEntry]) -> Vec<Service> {
        let online: HashSet<&str> = live.iter().map(|e| e.service_id.as_str()).collect();
        self.services
            .iter()
            .map(|s| Service {
                is_online: online.contains(s.id.as_str()),
                ..s.clone()
            })
            .collect()
    }
}
