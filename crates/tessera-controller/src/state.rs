use std::sync::Arc;

use crate::registry::NodeRegistry;
use crate::router::RequestRouter;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<NodeRegistry>,
    pub router: Arc<RequestRouter>,
}
