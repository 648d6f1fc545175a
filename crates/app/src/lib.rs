pub mod app;
pub mod bus;
pub mod capture;
pub mod collector;
pub mod config;
pub mod error;
pub mod runtime;
pub mod services;
pub mod startup;
pub mod util;

pub use app::{AppState, setup_db};
pub use bus::{
    BusEvent, EmitReport, EventBus, Listener, ListenerHandle, METRIC_COLLECTED, METRIC_INGESTED,
    PLAN_EVENT,
};
pub use collector::Collector;
pub use config::{DEFAULT_PORT, TelemetryConfig};
pub use error::{ApiError, AppError, INTERNAL_ERROR_MESSAGE, Result};
pub use runtime::BackgroundTasks;
pub use services::{
    AppServices, ArchiveSummary, CostReport, ExportFormat, ExportSummary, MAX_AGGREGATION_BUCKETS,
    PlanDetail, PlanState, PlanSummary, TaskCounts,
};
pub use startup::ensure_data_dirs;
pub use util::time::parse_time_param;
