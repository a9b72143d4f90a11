pub mod attendees;
pub mod error;
pub mod events;
pub mod images;
pub mod service;

use std::sync::Arc;

use muster_db::Database;
use muster_gateway::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
}
