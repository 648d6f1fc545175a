use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::bus::{BusEvent, EventBus, METRIC_INGESTED, PLAN_EVENT};
use crate::capture::plan_store_listener;
use crate::collector::Collector;
use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::services::{AppServices, SharedConfig};
use crate::startup::ensure_data_dirs;
use telemetry_core::{MetricEntry, validate_metric_entry};
use telemetry_db::Db;

#[derive(Clone)]
pub struct AppState {
    pub config: SharedConfig,
    pub services: AppServices,
    pub bus: EventBus,
    pub collector: Collector,
}

impl AppState {
    pub fn new(config: TelemetryConfig) -> Self {
        let config = Arc::new(config);
        let bus = EventBus::new();
        let collector = Collector::new(
            config.database_path.clone(),
            bus.clone(),
            &config.collector,
        );
        bus.subscribe(METRIC_INGESTED, collector.listener());
        bus.subscribe(
            PLAN_EVENT,
            plan_store_listener(config.database_path.clone()),
        );
        let services = AppServices::new(config.clone());
        Self {
            config,
            services,
            bus,
            collector,
        }
    }

    pub fn setup_db(&self) -> Result<()> {
        ensure_data_dirs(&self.config)?;
        setup_db(&self.config.database_path)
    }

    pub fn open_db(&self) -> Result<Db> {
        Ok(Db::open(&self.config.database_path)?)
    }

    pub async fn ingest_metric(&self, value: Value) -> Result<MetricEntry> {
        let entry = validate_metric_entry(value)?;
        self.bus
            .emit(METRIC_INGESTED, BusEvent::Metric(Arc::new(entry.clone())))
            .await;
        Ok(entry)
    }
}

pub fn setup_db(path: &Path) -> Result<()> {
    let mut db = Db::open(path)?;
    db.migrate()?;
    Ok(())
}
