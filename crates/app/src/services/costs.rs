use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::services::{SharedConfig, open_db};
use telemetry_core::ModelCost;
use telemetry_db::Db;

#[derive(Debug, Clone, Serialize)]
pub struct CostReport {
    pub models: Vec<ModelCost>,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub entry_count: u64,
}

impl CostReport {
    pub fn from_models(models: Vec<ModelCost>) -> Self {
        let total_cost_usd = models.iter().map(|model| model.total_cost_usd).sum();
        let total_tokens = models.iter().map(|model| model.total_tokens).sum();
        let entry_count = models.iter().map(|model| model.entry_count).sum();
        Self {
            models,
            total_cost_usd,
            total_tokens,
            entry_count,
        }
    }
}

#[derive(Clone)]
pub struct CostsService {
    config: SharedConfig,
}

impl CostsService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    fn db(&self) -> Result<Db> {
        open_db(&self.config)
    }

    pub fn report(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<CostReport> {
        let models = self.db()?.cost_by_model(start, end)?;
        Ok(CostReport::from_models(models))
    }
}
