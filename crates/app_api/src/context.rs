use std::time::Instant;

use telemetry_app::AppState;

#[derive(Clone)]
pub struct AppContext {
    pub app_state: AppState,
    pub started_at: Instant,
}

impl AppContext {
    pub fn new(app_state: AppState) -> Self {
        Self {
            app_state,
            started_at: Instant::now(),
        }
    }
}
