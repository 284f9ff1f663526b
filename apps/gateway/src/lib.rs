pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod log;
pub mod persist;
pub mod presence;
pub mod router;
pub mod store;

use std::sync::Arc;

use buzzchat_common::SnowflakeGenerator;
use config::Config;
use gateway::registry::ConnectionRegistry;
use log::EventLog;
use presence::PresenceCoordinator;
use store::directory::GroupDirectory;
use store::messages::MessageStore;

/// Shared application state available to the gateway route and the consumer
/// tasks. The registry is this instance's alone; everything else is backed by
/// services shared across the fleet.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
    pub presence: Arc<PresenceCoordinator>,
    pub log: Arc<dyn EventLog>,
    pub groups: Arc<dyn GroupDirectory>,
    pub messages: Arc<dyn MessageStore>,
    pub snowflake: Arc<SnowflakeGenerator>,
}
