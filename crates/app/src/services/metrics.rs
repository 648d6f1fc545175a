use crate::error::Result;
use crate::services::{SharedConfig, open_db};
use telemetry_core::MetricEntry;
use telemetry_db::{Db, MetricQuery};

#[derive(Clone)]
pub struct MetricsService {
    config: SharedConfig,
}

impl MetricsService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    pub fn query(&self, query: &MetricQuery) -> Result<Vec<MetricEntry>> {
        Ok(self.db()?.query_metrics(query)?)
    }

    pub fn count(&self) -> Result<u64> {
        Ok(self.db()?.count_metrics()?)
    }
}
