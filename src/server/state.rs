use std::sync::Arc;

use crate::bridge::EventBridge;
use crate::chat::MessageStore;
use crate::config::Settings;
use crate::hub::Hub;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub hub: Arc<Hub>,
    pub bridge: Arc<EventBridge>,
    pub message_store: Arc<dyn MessageStore>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        hub: Arc<Hub>,
        bridge: Arc<EventBridge>,
        message_store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            hub,
            bridge,
            message_store,
        }
    }
}
