use crate::{
    config::Config, db::connection::DbPool, hub::Hub, services::liveness::LivenessTracker,
    services::notifier::NotificationSender,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Config,
    pub hub: Hub,
    pub liveness: LivenessTracker,
    pub notifications: NotificationSender,
}

impl AppState {
    pub fn new(
        pool: DbPool,
        config: Config,
        hub: Hub,
        liveness: LivenessTracker,
        notifications: NotificationSender,
    ) -> Self {
        Self {
            pool,
            config,
            hub,
            liveness,
            notifications,
        }
    }

    /// Pushes a fresh snapshot to the device from a background task.
    pub fn publish_patterns(&self, device_id: crate::types::DeviceId) {
        crate::services::pattern_sync::spawn_publish(self.pool.clone(), self.hub.clone(), device_id);
    }
}
