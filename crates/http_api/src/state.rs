use std::sync::Arc;

use app_api::AppContext;
use tokio_util::sync::CancellationToken;

use crate::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct HttpState {
    pub context: AppContext,
    pub auth_token: Arc<str>,
    pub limiter: Arc<RateLimiter>,
    pub shutdown: CancellationToken,
}

impl HttpState {
    pub fn new(context: AppContext, auth_token: String, shutdown: CancellationToken) -> Self {
        let limits = &context.app_state.config.rate_limit;
        let limiter = Arc::new(RateLimiter::new(limits.max_requests, limits.window));
        Self {
            context,
            auth_token: Arc::from(auth_token),
            limiter,
            shutdown,
        }
    }
}
