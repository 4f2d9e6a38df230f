///! Scheduled task manager - drives the polled sources and the push listener
///!
///! One poll loop visits every enabled source in turn, sleeping a fixed
///! interval between cycles. The WWBOTA stream listener, when enabled, runs
///! as its own task. Both stop on the shared cancellation token.

use super::source::{
    BotaSource, FetchError, HeadlessPageLoader, HttpFetcher, LlotaSource, LocalityFilter,
    PotaSource, SotaSource, SourceAdapter, WwbotaSource,
};
use super::source::wwbota::WWBOTA_SPOTS_URL;
use super::stream::StreamListener;
use super::tracker::{SpotTracker, TrackReport, Watchlist};
use crate::config::{SchedulerConfig, SpotbotConfig};
use chrono::Utc;
use futures::FutureExt;
use spotbot_common::SourceKind;
use spotbot_frontend::DeliverySender;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long `shutdown` waits for a task before aborting it
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Configuration for scheduled tasks
#[derive(Debug, Clone)]
pub struct ScheduledTaskConfig {
    /// Pause between the end of one cycle and the start of the next
    pub poll_interval: Duration,

    /// Run the first cycle immediately
    pub run_on_start: bool,
}

impl Default for ScheduledTaskConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            run_on_start: false,
        }
    }
}

impl From<&SchedulerConfig> for ScheduledTaskConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            poll_interval: config.interval(),
            run_on_start: config.run_on_start,
        }
    }
}

/// fetch → detect → deliver for one polled source
pub struct SourcePipeline {
    adapter: Box<dyn SourceAdapter>,
    filter: LocalityFilter,
    tracker: SpotTracker,
}

impl SourcePipeline {
    pub fn new(adapter: Box<dyn SourceAdapter>, filter: LocalityFilter, watchlist: Watchlist) -> Self {
        let tracker = SpotTracker::new(adapter.kind(), watchlist);
        Self {
            adapter,
            filter,
            tracker,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.adapter.kind()
    }

    /// A fetch failure is returned before any detection happens
    pub async fn run(&mut self, sender: &DeliverySender) -> Result<TrackReport, FetchError> {
        if !self.tracker.is_active() {
            tracing::debug!("{}: watchlist empty, skipping", self.kind().label());
            return Ok(TrackReport::default());
        }

        let spots = self.adapter.fetch(&self.filter).await?;
        Ok(self.tracker.process(&spots, sender).await)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub spots: TrackReport,
}

/// One pass over every pipeline. A failing or panicking source is logged
/// and does not stop the ones after it.
pub async fn run_cycle(pipelines: &mut [SourcePipeline], sender: &DeliverySender) -> CycleReport {
    let mut report = CycleReport::default();

    for pipeline in pipelines.iter_mut() {
        let label = pipeline.kind().label();
        match AssertUnwindSafe(pipeline.run(sender)).catch_unwind().await {
            Ok(Ok(spots)) => {
                report.sources_ok += 1;
                report.spots.merge(spots);
            }
            Ok(Err(e)) => {
                report.sources_failed += 1;
                tracing::error!("{}: fetch failed, skipping change detection this cycle: {}", label, e);
            }
            Err(_) => {
                report.sources_failed += 1;
                tracing::error!("{}: pipeline panicked, continuing with the next source", label);
            }
        }
    }

    report
}

/// Scheduled task manager
pub struct ScheduledTaskManager {
    config: ScheduledTaskConfig,
    sender: Arc<DeliverySender>,
    pipelines: Vec<SourcePipeline>,
    stream_listener: Option<StreamListener>,
    cancel: CancellationToken,
    task_handles: Vec<JoinHandle<()>>,
}

impl ScheduledTaskManager {
    pub fn new(config: ScheduledTaskConfig, sender: Arc<DeliverySender>, cancel: CancellationToken) -> Self {
        Self {
            config,
            sender,
            pipelines: Vec::new(),
            stream_listener: None,
            cancel,
            task_handles: Vec::new(),
        }
    }

    /// Wire up every source enabled in the configuration
    pub fn from_config(
        config: &SpotbotConfig,
        sender: Arc<DeliverySender>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
        let watchlist = Watchlist::new(&config.watchlist.callsigns);
        let sources = &config.sources;

        let mut manager = Self::new(ScheduledTaskConfig::from(&config.scheduler), sender.clone(), cancel);

        if watchlist.is_empty() {
            tracing::warn!("Watchlist is empty, no spots will be announced");
        }

        if sources.pota.enabled {
            manager.add_pipeline(SourcePipeline::new(
                Box::new(PotaSource::new(fetcher.clone(), sources.pota.url.clone())),
                LocalityFilter::new(&sources.pota.filter),
                watchlist.clone(),
            ));
        }

        if sources.sota.enabled {
            manager.add_pipeline(SourcePipeline::new(
                Box::new(SotaSource::new(fetcher.clone(), sources.sota.url.clone())),
                LocalityFilter::new(&sources.sota.filter),
                watchlist.clone(),
            ));
        }

        if sources.llota.enabled {
            manager.add_pipeline(SourcePipeline::new(
                Box::new(LlotaSource::new(fetcher.clone(), sources.llota.url.clone())),
                LocalityFilter::new(&sources.llota.filter),
                watchlist.clone(),
            ));
        }

        let wwbota = &sources.wwbota;
        if wwbota.enabled && wwbota.stream {
            manager.set_stream_listener(StreamListener::new(
                wwbota.url.clone().unwrap_or_else(|| WWBOTA_SPOTS_URL.to_string()),
                Duration::from_secs(wwbota.reconnect_secs),
                LocalityFilter::new(&wwbota.filter),
                watchlist.clone(),
                sender,
                &config.http,
            )?
            .with_idle_timeout(Duration::from_secs(wwbota.idle_timeout_secs)));
        } else if wwbota.enabled {
            manager.add_pipeline(SourcePipeline::new(
                Box::new(WwbotaSource::new(fetcher.clone(), wwbota.url.clone())),
                LocalityFilter::new(&wwbota.filter),
                watchlist.clone(),
            ));
        }

        if sources.bota.enabled {
            let loader = Arc::new(HeadlessPageLoader::new(Duration::from_secs(sources.bota.render_wait_secs)));
            manager.add_pipeline(SourcePipeline::new(
                Box::new(BotaSource::new(loader, sources.bota.url.clone())),
                LocalityFilter::default(),
                watchlist,
            ));
        }

        Ok(manager)
    }

    pub fn add_pipeline(&mut self, pipeline: SourcePipeline) {
        self.pipelines.push(pipeline);
    }

    pub fn set_stream_listener(&mut self, listener: StreamListener) {
        self.stream_listener = Some(listener);
    }

    /// Start all scheduled tasks
    pub fn start_all(&mut self) {
        tracing::info!("Starting scheduled task manager...");

        let pipelines = std::mem::take(&mut self.pipelines);
        if !pipelines.is_empty() {
            let sources: Vec<_> = pipelines.iter().map(|p| p.kind().label()).collect();
            tracing::info!(
                "Scheduling poll task for {} (interval: {}s, initial: {})",
                sources.join(", "),
                self.config.poll_interval.as_secs(),
                self.config.run_on_start
            );
            let handle = tokio::spawn(Self::poll_loop(
                pipelines,
                self.sender.clone(),
                self.config.clone(),
                self.cancel.clone(),
            ));
            self.task_handles.push(handle);
        }

        if let Some(listener) = self.stream_listener.take() {
            let handle = tokio::spawn(listener.run(self.cancel.clone()));
            self.task_handles.push(handle);
        }

        tracing::info!("Started {} scheduled tasks", self.task_handles.len());
    }

    /// Poll loop; cancellation is honoured between cycles
    async fn poll_loop(
        mut pipelines: Vec<SourcePipeline>,
        sender: Arc<DeliverySender>,
        config: ScheduledTaskConfig,
        cancel: CancellationToken,
    ) {
        let mut skip_wait = config.run_on_start;

        loop {
            if !skip_wait {
                let next = Utc::now()
                    + chrono::Duration::from_std(config.poll_interval).unwrap_or(chrono::Duration::zero());
                tracing::debug!("Next poll cycle at: {}", next.format("%Y-%m-%d %H:%M:%S UTC"));

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.poll_interval) => {}
                }
            }
            skip_wait = false;

            let report = run_cycle(&mut pipelines, &sender).await;
            tracing::info!(
                "Poll cycle done: {} sources ok, {} failed, {} watched spots, {} announced, {} undelivered",
                report.sources_ok,
                report.sources_failed,
                report.spots.watched,
                report.spots.delivered,
                report.spots.failed
            );

            if cancel.is_cancelled() {
                break;
            }
        }

        tracing::info!("Poll loop stopped.");
    }

    /// Cancel every task and wait for it to wind down
    pub async fn shutdown(self) {
        self.cancel.cancel();

        for mut handle in self.task_handles {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Scheduled task ended abnormally: {}", e),
                Err(_) => {
                    tracing::warn!("Scheduled task did not stop within {:?}, aborting", SHUTDOWN_GRACE);
                    handle.abort();
                }
            }
        }

        tracing::info!("Scheduled task manager stopped.");
    }
}
