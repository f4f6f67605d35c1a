use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::download::{MediaDownloader, YtDlpDownloader};
use crate::observability::Metrics;
use crate::progress::{CleanupScheduler, ConversionInvoker, ProgressReporter, TaskRegistry};
use crate::tools::ToolRunner;

/// Shared services behind every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<TaskRegistry>,
    pub reporter: ProgressReporter,
    pub invoker: ConversionInvoker,
    pub tools: ToolRunner,
    pub downloader: Arc<dyn MediaDownloader>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Build the services and start the cleanup worker on the current
    /// runtime. The worker stops once `shutdown` is cancelled.
    pub fn new(config: Config, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let registry = Arc::new(TaskRegistry::new());
        let metrics = Arc::new(Metrics::new());

        let (cleanup, worker) = CleanupScheduler::spawn(
            Arc::clone(&registry),
            config.progress.cleanup_delay.as_duration(),
            shutdown,
            Arc::clone(&metrics),
        );

        let reporter = ProgressReporter::new(
            Arc::clone(&registry),
            config.progress.poll_interval.as_duration(),
            config.progress.stream_timeout(),
        );
        let invoker = ConversionInvoker::new(Arc::clone(&registry), cleanup, Arc::clone(&metrics));
        let tools = ToolRunner::new(config.tools.clone());
        let downloader = Arc::new(YtDlpDownloader::new(tools.clone(), config.youtube.clone()));

        let state = Self {
            config: Arc::new(config),
            registry,
            reporter,
            invoker,
            tools,
            downloader,
            metrics,
        };

        (state, worker)
    }

    /// Replace the video downloader, keeping every other service
    pub fn with_downloader(mut self, downloader: Arc<dyn MediaDownloader>) -> Self {
        self.downloader = downloader;
        self
    }
}
