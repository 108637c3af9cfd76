//! Job runner: one queued job through capture, audio fetch and encode.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{warn, Instrument};

use beatreel_capture::{CaptureConfig, CapturePlan, ChromeLauncher, ProgressSink, RenderDriver};
use beatreel_media::{
    AudioSource, EncodeSpec, EncoderConfig, FetchConfig, FfmpegEncoder, HttpAudioFetcher, VideoEncoder,
};
use beatreel_models::{Job, JobId, JobUpdate, FRAME_PATTERN, FRAME_RATE};
use beatreel_store::JobStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::workdir::WorkDir;

/// Executes jobs, each in its own task, at most
/// `max_concurrent_jobs` at a time.
pub struct JobRunner {
    config: WorkerConfig,
    store: Arc<dyn JobStore>,
    driver: RenderDriver,
    audio: Arc<dyn AudioSource>,
    encoder: Arc<dyn VideoEncoder>,
    slots: Arc<Semaphore>,
    running: AtomicUsize,
}

impl JobRunner {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn JobStore>,
        driver: RenderDriver,
        audio: Arc<dyn AudioSource>,
        encoder: Arc<dyn VideoEncoder>,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            config,
            store,
            driver,
            audio,
            encoder,
            slots,
            running: AtomicUsize::new(0),
        }
    }

    /// Runner wired to headless Chromium, HTTP audio and FFmpeg, configured
    /// from the environment.
    pub fn from_env(store: Arc<dyn JobStore>) -> WorkerResult<Self> {
        let capture_config = CaptureConfig::from_env();
        let driver = RenderDriver::new(
            Arc::new(ChromeLauncher::new(capture_config.clone())),
            &capture_config,
        );
        let audio = HttpAudioFetcher::new(FetchConfig::from_env())
            .map_err(|e| WorkerError::config_error(e.to_string()))?;
        let encoder = FfmpegEncoder::new(EncoderConfig::from_env());

        Ok(Self::new(
            WorkerConfig::from_env(),
            store,
            driver,
            Arc::new(audio),
            Arc::new(encoder),
        ))
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn work_dir(&self, job_id: &JobId) -> WorkDir {
        WorkDir::for_job(&self.config.work_dir, job_id)
    }

    /// Where a finished job's video lives.
    pub fn output_path(&self, job_id: &JobId) -> PathBuf {
        self.work_dir(job_id).output_path()
    }

    /// Run a job in the background. The job stays `queued` until a slot is
    /// free.
    pub fn spawn(self: &Arc<Self>, job_id: JobId) -> JoinHandle<()> {
        let runner = Arc::clone(self);
        tokio::spawn(async move { runner.run(&job_id).await })
    }

    /// Drive a job to a terminal state. Failures are recorded on the job,
    /// never returned.
    pub async fn run(&self, job_id: &JobId) {
        let logger = JobLogger::new(job_id);
        let span = logger.span();

        async {
            let _permit = match Arc::clone(&self.slots).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    logger.not_started("job slots closed, job left queued");
                    return;
                }
            };

            let job = match self.store.update(job_id, JobUpdate::StartRendering).await {
                Ok(job) => job,
                Err(e) => {
                    logger.not_started(&e.to_string());
                    return;
                }
            };

            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            metrics::set_running_jobs(running);
            logger.started(&job);

            let started = Instant::now();
            let workdir = self.work_dir(job_id);
            let result = match tokio::time::timeout(
                self.config.job_timeout,
                self.execute(&job, &workdir, &logger),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(WorkerError::Timeout(self.config.job_timeout.as_secs())),
            };

            match result {
                Ok(()) => self.finish(&job, &logger, started).await,
                Err(e) => self.fail(&job, &workdir, &logger, e).await,
            }

            let running = self.running.fetch_sub(1, Ordering::SeqCst) - 1;
            metrics::set_running_jobs(running);
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, job: &Job, workdir: &WorkDir, logger: &JobLogger) -> WorkerResult<()> {
        logger.stage("prepare");
        workdir.prepare().await?;

        let plan = CapturePlan::for_job(job, workdir.frames_dir());
        let sink = StoreProgressSink {
            store: Arc::clone(&self.store),
            job_id: job.id.clone(),
            logger: logger.clone(),
        };
        let audio_path = workdir.audio_path(job.request.audio_extension());

        let render = async {
            let frames = self.driver.capture(&plan, &sink).await?;
            Ok::<_, WorkerError>(frames)
        };
        let fetch = async {
            let started = Instant::now();
            let bytes = self
                .audio
                .fetch(&job.request.audio_url, &audio_path)
                .await
                .map_err(WorkerError::AudioFetch)?;
            metrics::record_audio_fetch_duration(started.elapsed());
            Ok::<_, WorkerError>(bytes)
        };

        logger.stage("capture");
        let (frames, audio_bytes) = tokio::try_join!(render, fetch)?;
        logger.inputs_ready(frames, audio_bytes);

        let spec = EncodeSpec {
            frames_dir: workdir.frames_dir(),
            frame_pattern: FRAME_PATTERN.to_string(),
            frame_rate: FRAME_RATE,
            audio_path,
            output_path: workdir.output_path(),
            expected_frames: job.total_frames,
        };
        logger.stage("encode");
        let started = Instant::now();
        self.encoder.encode(&spec).await.map_err(WorkerError::Encode)?;
        metrics::record_encode_duration(started.elapsed());

        Ok(())
    }

    async fn finish(&self, job: &Job, logger: &JobLogger, started: Instant) {
        match self.store.update(&job.id, JobUpdate::Complete).await {
            Ok(_) => {
                metrics::record_job_completed(job.request.plan.as_str(), started.elapsed());
                logger.completed(started.elapsed());
            }
            Err(e) => logger.housekeeping_failed("mark_done", &e.to_string()),
        }
    }

    async fn fail(&self, job: &Job, workdir: &WorkDir, logger: &JobLogger, error: WorkerError) {
        let message = workdir.redact(&error.to_string());
        logger.failed(&error, &message);
        metrics::record_job_failed(job.request.plan.as_str(), error.stage());

        if let Err(e) = self.store.update(&job.id, JobUpdate::Fail(message)).await {
            logger.housekeeping_failed("mark_failed", &e.to_string());
        }

        if self.config.purge_failed {
            if let Err(e) = workdir.remove().await {
                logger.housekeeping_failed("purge_workdir", &e.to_string());
            }
        }
    }
}

/// Writes capture progress into the job store.
struct StoreProgressSink {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    logger: JobLogger,
}

#[async_trait]
impl ProgressSink for StoreProgressSink {
    async fn frame_captured(&self, captured: u64, total: u64) {
        metrics::record_frame_captured();
        if total == 0 {
            return;
        }

        let fraction = captured as f64 / total as f64;
        if let Err(e) = self.store.update(&self.job_id, JobUpdate::Progress(fraction)).await {
            warn!(job_id = %self.job_id, "Progress update rejected: {}", e);
        }

        self.logger.frame_captured(captured, total);
    }
}
