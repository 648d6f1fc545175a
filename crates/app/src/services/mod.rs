mod aggregation;
mod archive;
mod costs;
mod export;
mod metrics;
mod plans;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;

use crate::config::TelemetryConfig;
use crate::error::Result;
use telemetry_core::MetricEntry;
use telemetry_db::Db;

pub use aggregation::{AggregationService, MAX_AGGREGATION_BUCKETS};
pub use archive::{ArchiveService, ArchiveSummary};
pub use costs::{CostReport, CostsService};
pub use export::{ExportFormat, ExportService, ExportSummary};
pub use metrics::MetricsService;
pub use plans::{PlanDetail, PlanState, PlanSummary, PlansService, TaskCounts};

pub type SharedConfig = Arc<TelemetryConfig>;

#[derive(Clone)]
pub struct AppServices {
    pub metrics: MetricsService,
    pub aggregation: AggregationService,
    pub costs: CostsService,
    pub export: ExportService,
    pub archive: ArchiveService,
    pub plans: PlansService,
}

impl AppServices {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            metrics: MetricsService::new(config.clone()),
            aggregation: AggregationService::new(config.clone()),
            costs: CostsService::new(config.clone()),
            export: ExportService::new(config.clone()),
            archive: ArchiveService::new(config.clone()),
            plans: PlansService::new(config),
        }
    }
}

fn open_db(config: &SharedConfig) -> Result<Db> {
    Ok(Db::open(&config.database_path)?)
}

fn write_jsonl(file: File, entries: &[MetricEntry]) -> Result<()> {
    let mut writer = BufWriter::new(file);
    for entry in entries {
        serde_json::to_writer(&mut writer, entry)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
