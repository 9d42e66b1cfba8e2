//! Merge orchestration.
//!
//! A run is driven by one loop over an ordered stage plan:
//!
//! ```text
//! FetchInputs -> ConcatenateVideo -> MixAudio -> Mux
//! ```
//!
//! Requests without audio use the shorter plan `FetchInputs -> ConcatenateVideo`
//! and deliver the concatenated video as is. The first failing stage ends the
//! run and the scratch arena is released before the failure is returned.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{stream, StreamExt, TryStreamExt};
use tracing::{debug, Instrument};

use mixmux_media::{AssetFetcher, FfmpegEngine, MediaEngine, MediaError, ResourceFetcher, ScratchArena};
use mixmux_models::{AssetState, MediaAsset, MergeMode, MergeRequest, PipelineRun, RunId, StageName};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult, StageFailure};
use crate::logging::RunLogger;
use crate::metrics::{self, RunOutcome};

const FULL_PLAN: &[StageName] = &[
    StageName::FetchInputs,
    StageName::ConcatenateVideo,
    StageName::MixAudio,
    StageName::Mux,
];

const VIDEO_ONLY_PLAN: &[StageName] = &[StageName::FetchInputs, StageName::ConcatenateVideo];

/// Ordered stages a request of the given mode goes through.
pub fn stage_plan(mode: MergeMode) -> &'static [StageName] {
    match mode {
        MergeMode::Full => FULL_PLAN,
        MergeMode::VideoOnly => VIDEO_ONLY_PLAN,
    }
}

/// A run whose scratch arena exists but whose stages have not started.
///
/// The adapter stages uploads into [`OpenRun::arena`] before handing the run
/// to [`MergePipeline::execute`].
#[derive(Debug)]
pub struct OpenRun {
    run_id: RunId,
    arena: ScratchArena,
}

impl OpenRun {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn arena(&self) -> &ScratchArena {
        &self.arena
    }

    /// Give up on the run before it executes, removing anything staged.
    pub async fn discard(self) {
        if let Err(e) = self.arena.release().await {
            RunLogger::new(&self.run_id, "merge").log_warning(&format!("scratch cleanup incomplete: {e}"));
        }
    }
}

/// Successful run. Owns the arena, so the artifact lives as long as this value.
#[derive(Debug)]
pub struct CompletedMerge {
    pub(crate) run: PipelineRun,
    pub(crate) arena: ScratchArena,
    pub(crate) final_path: PathBuf,
    pub(crate) byte_len: u64,
    pub(crate) mode: MergeMode,
    pub(crate) duration_secs: Option<f64>,
}

impl CompletedMerge {
    pub fn run(&self) -> &PipelineRun {
        &self.run
    }

    pub fn run_id(&self) -> &RunId {
        &self.run.run_id
    }

    pub fn final_path(&self) -> &std::path::Path {
        &self.final_path
    }

    pub fn byte_len(&self) -> u64 {
        self.byte_len
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    /// Duration reported by the engine, when it could be probed.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }
}

/// Failed run. The arena has already been released.
#[derive(Debug)]
pub struct FailedMerge {
    pub run: PipelineRun,
    pub failure: StageFailure,
}

impl FailedMerge {
    pub fn run_id(&self) -> &RunId {
        &self.run.run_id
    }
}

impl std::fmt::Display for FailedMerge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run {} failed: {}", self.run.run_id, self.failure)
    }
}

/// Sequences fetch, concatenate, mix and mux for one request at a time.
///
/// Cheap to share: runs hold no state in the pipeline itself.
#[derive(Clone)]
pub struct MergePipeline {
    engine: Arc<dyn MediaEngine>,
    fetcher: Arc<dyn AssetFetcher>,
    config: PipelineConfig,
}

impl std::fmt::Debug for MergePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergePipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct FetchJob {
    index: usize,
    url: String,
    stem: String,
}

impl MergePipeline {
    /// Pipeline backed by the `ffmpeg` binary and an HTTP fetcher.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        let engine = FfmpegEngine::new(config.encoding.clone())
            .with_timeout(config.ffmpeg_timeout.as_secs());
        let fetcher = ResourceFetcher::new(config.fetch_timeout)?;
        Ok(Self::with_components(config, Arc::new(engine), Arc::new(fetcher)))
    }

    pub fn with_components(
        config: PipelineConfig,
        engine: Arc<dyn MediaEngine>,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Self {
        Self {
            engine,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Allocate a fresh run ID and its private scratch directory.
    pub async fn open_run(&self) -> Result<OpenRun, FailedMerge> {
        let run_id = RunId::new();
        match ScratchArena::open(&self.config.work_dir, run_id.as_str()).await {
            Ok(arena) => Ok(OpenRun { run_id, arena }),
            Err(e) => {
                let error = PipelineError::from(e);
                RunLogger::new(&run_id, "merge").log_error(&error.to_string());

                let failure = StageFailure::new(None, &error);
                let mut run = PipelineRun::new(run_id, &[]);
                run.fail(None, error.to_string());

                metrics::record_stage_failure(None, failure.kind);
                metrics::record_run(RunOutcome::Failed);
                Err(FailedMerge { run, failure })
            }
        }
    }

    /// Run every planned stage for `request` inside `run`'s arena.
    ///
    /// On success the returned value owns the arena; hand it to
    /// [`crate::ResultDelivery`] so it is released after the bytes are sent.
    /// On failure the arena is released before this returns.
    pub async fn execute(
        &self,
        run: OpenRun,
        request: MergeRequest,
    ) -> Result<CompletedMerge, FailedMerge> {
        let logger = RunLogger::new(&run.run_id, "merge");
        let span = logger.create_span();
        self.execute_stages(run, request, logger).instrument(span).await
    }

    async fn execute_stages(
        &self,
        run: OpenRun,
        mut request: MergeRequest,
        logger: RunLogger,
    ) -> Result<CompletedMerge, FailedMerge> {
        let OpenRun { run_id, arena } = run;
        let mode = request.mode();
        let plan = stage_plan(mode);
        let mut state = PipelineRun::new(run_id, plan);

        logger.log_start(&format!(
            "{} video(s), {} audio(s), {} remote",
            request.videos.len(),
            request.audios.len(),
            request.remote_count()
        ));

        if let Err(e) = request.validate() {
            return Err(abort(state, arena, None, e.into(), &logger).await);
        }

        for &stage in plan {
            if let Err(e) = state.start_stage(stage) {
                return Err(abort(state, arena, Some(stage), e.into(), &logger).await);
            }
            logger.log_stage_start(stage);

            let started = Instant::now();
            let outcome = self.run_stage(stage, &mut request, &state, &arena).await;
            let elapsed = started.elapsed();
            metrics::record_stage_duration(stage, elapsed.as_secs_f64());

            let artifact = match outcome {
                Ok(artifact) => artifact,
                Err(e) => return Err(abort(state, arena, Some(stage), e, &logger).await),
            };
            if let Err(e) = state.complete_stage(stage, artifact) {
                return Err(abort(state, arena, Some(stage), e.into(), &logger).await);
            }
            logger.log_stage_complete(stage, elapsed);
        }

        let Some(final_path) = state.latest_artifact().cloned() else {
            let error = PipelineError::resource("no stage produced an artifact");
            return Err(abort(state, arena, None, error, &logger).await);
        };

        let byte_len = match tokio::fs::metadata(&final_path).await {
            Ok(meta) => meta.len(),
            Err(e) => {
                let error = PipelineError::resource(format!("final artifact unreadable: {e}"));
                return Err(abort(state, arena, None, error, &logger).await);
            }
        };
        state.set_final_artifact(final_path.clone());

        let duration_secs = match self.engine.duration(&final_path).await {
            Ok(secs) => Some(secs),
            Err(e) => {
                debug!(error = %e, "Could not probe final artifact");
                None
            }
        };

        logger.log_completion(&format!(
            "artifact ready, {byte_len} bytes, {:.2}s",
            duration_secs.unwrap_or_default()
        ));

        Ok(CompletedMerge {
            run: state,
            arena,
            final_path,
            byte_len,
            mode,
            duration_secs,
        })
    }

    /// Execute one stage. Returns the artifact it produced, if any.
    async fn run_stage(
        &self,
        stage: StageName,
        request: &mut MergeRequest,
        state: &PipelineRun,
        arena: &ScratchArena,
    ) -> PipelineResult<Option<PathBuf>> {
        match stage {
            StageName::FetchInputs => {
                self.fetch_inputs(request, arena).await?;
                Ok(None)
            }
            StageName::ConcatenateVideo => {
                let inputs = request
                    .video_paths()
                    .ok_or_else(|| PipelineError::validation("video inputs are not ready"))?;
                let output = self.engine.concatenate(&inputs, arena).await?;
                request.videos.iter_mut().for_each(MediaAsset::mark_consumed);
                Ok(Some(output))
            }
            StageName::MixAudio => {
                let inputs = request
                    .audio_paths()
                    .ok_or_else(|| PipelineError::validation("audio inputs are not ready"))?;
                let output = self.engine.mix(&inputs, arena).await?;
                request.audios.iter_mut().for_each(MediaAsset::mark_consumed);
                Ok(Some(output))
            }
            StageName::Mux => {
                let video = stage_artifact(state, StageName::ConcatenateVideo)?;
                let audio = stage_artifact(state, StageName::MixAudio)?;
                let output = self.engine.mux(video, audio, arena).await?;
                Ok(Some(output))
            }
        }
    }

    /// Materialize every remote asset, at most `max_parallel_fetches` at once.
    ///
    /// Waits for all fetches; the first failure cancels the ones still in
    /// flight. Partial files stay tracked by the arena.
    async fn fetch_inputs(&self, request: &mut MergeRequest, arena: &ScratchArena) -> PipelineResult<()> {
        let mut jobs = Vec::new();
        for (index, asset) in request.assets_mut().enumerate() {
            if !asset.is_remote() || asset.is_ready() {
                continue;
            }
            asset.mark_fetching();
            jobs.push(FetchJob {
                index,
                url: asset.original_location.clone(),
                stem: format!("{}-{}", asset.media_class, index),
            });
        }

        if jobs.is_empty() {
            return Ok(());
        }

        // Futures are built up front; a borrowing closure inside the stream
        // would keep `execute` from being Send
        let fetcher = self.fetcher.as_ref();
        let pending: Vec<_> = jobs
            .iter()
            .map(|job| fetcher.fetch(&job.url, arena, &job.stem))
            .collect();
        let fetched: Result<Vec<PathBuf>, MediaError> = stream::iter(pending)
            .buffered(self.config.max_parallel_fetches.max(1))
            .try_collect()
            .await;

        let paths = match fetched {
            Ok(paths) => paths,
            Err(e) => {
                request
                    .assets_mut()
                    .filter(|a| a.state == AssetState::Fetching)
                    .for_each(MediaAsset::mark_failed);
                return Err(e.into());
            }
        };

        let mut total_bytes = 0u64;
        for (job, path) in jobs.iter().zip(paths) {
            if let Ok(meta) = tokio::fs::metadata(&path).await {
                total_bytes += meta.len();
            }
            if let Some(asset) = request.assets_mut().nth(job.index) {
                asset.mark_ready(path);
            }
        }

        metrics::record_fetch_bytes(total_bytes);
        debug!(count = jobs.len(), bytes = total_bytes, "Fetched remote inputs");
        Ok(())
    }
}

fn stage_artifact(state: &PipelineRun, stage: StageName) -> PipelineResult<&PathBuf> {
    state
        .intermediate_artifacts
        .get(&stage)
        .ok_or_else(|| PipelineError::resource(format!("missing {} artifact", stage.as_str())))
}

/// Enter `Failed`, release the arena, and build the caller-facing failure.
pub(crate) async fn abort(
    mut state: PipelineRun,
    arena: ScratchArena,
    stage: Option<StageName>,
    error: PipelineError,
    logger: &RunLogger,
) -> FailedMerge {
    let failure = StageFailure::new(stage, &error);
    logger.log_error(&format!(
        "{} failed: {error}",
        stage.map_or("request", |s| s.as_str())
    ));

    state.fail(stage, error.to_string());
    if let Err(e) = arena.release().await {
        logger.log_warning(&format!("scratch cleanup incomplete: {e}"));
    }

    metrics::record_stage_failure(stage, failure.kind);
    metrics::record_run(RunOutcome::Failed);
    FailedMerge { run: state, failure }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use mixmux_media::MediaResult;
    use mixmux_models::{MediaClass, RunState, StageStatus};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Engine that joins file contents instead of invoking ffmpeg.
    #[derive(Default)]
    struct FakeEngine {
        calls: Mutex<Vec<&'static str>>,
        fail_on: Option<&'static str>,
    }

    impl FakeEngine {
        fn failing_on(op: &'static str) -> Self {
            Self {
                fail_on: Some(op),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        async fn produce(
            &self,
            op: &'static str,
            name: &str,
            inputs: &[&Path],
            arena: &ScratchArena,
        ) -> MediaResult<PathBuf> {
            self.calls.lock().unwrap().push(op);
            let output = arena.allocate(name)?;

            if self.fail_on == Some(op) {
                tokio::fs::write(&output, b"partial").await?;
                return Err(MediaError::ffmpeg_failed(
                    "FFmpeg exited with status 1",
                    Some(format!("{}: Invalid data found when processing input", output.display())),
                    Some(1),
                ));
            }

            let mut joined = Vec::new();
            for input in inputs {
                joined.extend(tokio::fs::read(input).await?);
            }
            tokio::fs::write(&output, joined).await?;
            Ok(output)
        }
    }

    #[async_trait]
    impl MediaEngine for FakeEngine {
        async fn concatenate(&self, inputs: &[PathBuf], arena: &ScratchArena) -> MediaResult<PathBuf> {
            let refs: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();
            self.produce("concatenate", "concat.mp4", &refs, arena).await
        }

        async fn mix(&self, inputs: &[PathBuf], arena: &ScratchArena) -> MediaResult<PathBuf> {
            let refs: Vec<&Path> = inputs.iter().map(PathBuf::as_path).collect();
            self.produce("mix", "mix.wav", &refs, arena).await
        }

        async fn mux(&self, video: &Path, audio: &Path, arena: &ScratchArena) -> MediaResult<PathBuf> {
            self.produce("mux", "merged.mp4", &[video, audio], arena).await
        }

        async fn duration(&self, _path: &Path) -> MediaResult<f64> {
            Ok(8.0)
        }
    }

    /// Fetcher serving canned bodies; unknown URLs answer 404.
    #[derive(Default)]
    struct FakeFetcher {
        bodies: HashMap<String, Vec<u8>>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fetched: AtomicUsize,
    }

    impl FakeFetcher {
        fn serving(bodies: &[(&str, &[u8])]) -> Self {
            Self {
                bodies: bodies
                    .iter()
                    .map(|(url, body)| (url.to_string(), body.to_vec()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl AssetFetcher for FakeFetcher {
        async fn fetch(&self, url: &str, arena: &ScratchArena, stem: &str) -> MediaResult<PathBuf> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let path = arena.allocate(&format!("{stem}.bin"))?;
            match self.bodies.get(url) {
                Some(body) => {
                    tokio::fs::write(&path, body).await?;
                    self.fetched.fetch_add(1, Ordering::SeqCst);
                    Ok(path)
                }
                None => Err(MediaError::download_failed(url, "HTTP 404 Not Found", Some(404))),
            }
        }
    }

    fn pipeline(work_dir: &Path, engine: Arc<FakeEngine>, fetcher: Arc<FakeFetcher>) -> MergePipeline {
        let config = PipelineConfig::default().with_work_dir(work_dir);
        MergePipeline::with_components(config, engine, fetcher)
    }

    async fn upload(run: &OpenRun, class: MediaClass, name: &str, body: &[u8]) -> MediaAsset {
        let path = run.arena().allocate(name).unwrap();
        tokio::fs::write(&path, body).await.unwrap();
        MediaAsset::upload(class, path)
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_stage_plan() {
        assert_eq!(stage_plan(MergeMode::Full).len(), 4);
        assert_eq!(
            stage_plan(MergeMode::VideoOnly),
            &[StageName::FetchInputs, StageName::ConcatenateVideo]
        );
    }

    #[tokio::test]
    async fn test_full_merge_runs_stages_in_order() {
        let work = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let fetcher = Arc::new(FakeFetcher::serving(&[("https://cdn.test/music.mp3", b"MUSIC")]));
        let pipeline = pipeline(work.path(), engine.clone(), fetcher);

        let run = pipeline.open_run().await.unwrap();
        let request = MergeRequest::new()
            .with_video(upload(&run, MediaClass::Video, "first.mp4", b"AAA").await)
            .with_video(upload(&run, MediaClass::Video, "second.mp4", b"BB").await)
            .with_audio(MediaAsset::remote(MediaClass::Audio, "https://cdn.test/music.mp3"));

        let completed = pipeline.execute(run, request).await.unwrap();

        assert_eq!(engine.calls(), vec!["concatenate", "mix", "mux"]);
        assert_eq!(completed.mode(), MergeMode::Full);
        assert!(completed
            .run()
            .stages
            .iter()
            .all(|s| s.status == StageStatus::Succeeded));
        assert_eq!(completed.run().intermediate_artifacts.len(), 3);

        // Video order is preserved, then the mixed audio
        let body = tokio::fs::read(completed.final_path()).await.unwrap();
        assert_eq!(body, b"AAABBMUSIC");
        assert_eq!(completed.byte_len(), 10);
        assert_eq!(completed.duration_secs(), Some(8.0));
        assert!(completed.final_path().starts_with(work.path()));
    }

    #[tokio::test]
    async fn test_fetch_404_fails_before_any_transform() {
        let work = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let fetcher = Arc::new(FakeFetcher::default());
        let pipeline = pipeline(work.path(), engine.clone(), fetcher);

        let run = pipeline.open_run().await.unwrap();
        let arena_dir = run.arena().dir().to_path_buf();
        let request = MergeRequest::new()
            .with_video(upload(&run, MediaClass::Video, "clip.mp4", b"V").await)
            .with_audio(MediaAsset::remote(MediaClass::Audio, "https://cdn.test/missing.mp3"));

        let failed = pipeline.execute(run, request).await.unwrap_err();

        assert_eq!(failed.failure.kind, ErrorKind::Fetch);
        assert_eq!(failed.failure.stage, Some(StageName::FetchInputs));
        assert_eq!(failed.run.state, RunState::Failed);
        assert_eq!(failed.run.failed_stage, Some(StageName::FetchInputs));
        assert_eq!(failed.run.stage_status(StageName::ConcatenateVideo), Some(StageStatus::Pending));
        assert!(engine.calls().is_empty());
        assert!(!arena_dir.exists());
        assert_eq!(entries(work.path()), 0);
    }

    #[tokio::test]
    async fn test_video_only_skips_mix_and_mux() {
        let work = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let pipeline = pipeline(work.path(), engine.clone(), Arc::new(FakeFetcher::default()));

        let run = pipeline.open_run().await.unwrap();
        let request = MergeRequest::new().with_video(upload(&run, MediaClass::Video, "only.mp4", b"VIDEO").await);

        let completed = pipeline.execute(run, request).await.unwrap();

        assert_eq!(completed.mode(), MergeMode::VideoOnly);
        assert_eq!(engine.calls(), vec!["concatenate"]);
        assert_eq!(completed.run().plan(), VIDEO_ONLY_PLAN.to_vec());
        assert_eq!(tokio::fs::read(completed.final_path()).await.unwrap(), b"VIDEO");
    }

    #[tokio::test]
    async fn test_process_failure_leaves_no_residual_files() {
        let work = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::failing_on("mix"));
        let pipeline = pipeline(work.path(), engine.clone(), Arc::new(FakeFetcher::default()));

        let run = pipeline.open_run().await.unwrap();
        let request = MergeRequest::new()
            .with_video(upload(&run, MediaClass::Video, "clip.mp4", b"V").await)
            .with_audio(upload(&run, MediaClass::Audio, "a.mp3", b"A").await)
            .with_audio(upload(&run, MediaClass::Audio, "b.mp3", b"B").await);

        let failed = pipeline.execute(run, request).await.unwrap_err();

        assert_eq!(engine.calls(), vec!["concatenate", "mix"]);
        assert_eq!(failed.failure.stage, Some(StageName::MixAudio));
        assert_eq!(failed.failure.kind, ErrorKind::Process);
        assert_eq!(failed.failure.message, "Media processing failed");
        assert!(failed.run.error.as_deref().unwrap().contains("Invalid data"));
        assert_eq!(failed.run.stage_status(StageName::ConcatenateVideo), Some(StageStatus::Succeeded));
        assert_eq!(failed.run.stage_status(StageName::Mux), Some(StageStatus::Pending));
        assert_eq!(entries(work.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_video_is_rejected_before_stages() {
        let work = TempDir::new().unwrap();
        let engine = Arc::new(FakeEngine::default());
        let pipeline = pipeline(work.path(), engine.clone(), Arc::new(FakeFetcher::default()));

        let run = pipeline.open_run().await.unwrap();
        let request =
            MergeRequest::new().with_audio(MediaAsset::remote(MediaClass::Audio, "https://cdn.test/a.mp3"));

        let failed = pipeline.execute(run, request).await.unwrap_err();

        assert_eq!(failed.failure.kind, ErrorKind::Validation);
        assert_eq!(failed.failure.stage, None);
        assert!(engine.calls().is_empty());
        assert_eq!(entries(work.path()), 0);
    }

    #[tokio::test]
    async fn test_non_http_url_is_a_validation_error() {
        let work = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let pipeline = pipeline(work.path(), Arc::new(FakeEngine::default()), fetcher.clone());

        let run = pipeline.open_run().await.unwrap();
        let request = MergeRequest::new()
            .with_video(upload(&run, MediaClass::Video, "clip.mp4", b"V").await)
            .with_audio(MediaAsset::remote(MediaClass::Audio, "file:///etc/passwd"));

        let failed = pipeline.execute(run, request).await.unwrap_err();

        assert_eq!(failed.failure.kind, ErrorKind::Validation);
        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetches_are_bounded_and_joined() {
        let work = TempDir::new().unwrap();
        let urls: Vec<String> = (0..6).map(|i| format!("https://cdn.test/{i}.mp3")).collect();
        let bodies: Vec<(&str, &[u8])> = urls.iter().map(|u| (u.as_str(), b"x".as_slice())).collect();
        let fetcher = Arc::new(FakeFetcher {
            delay: Duration::from_millis(20),
            ..FakeFetcher::serving(&bodies)
        });

        let mut config = PipelineConfig::default().with_work_dir(work.path());
        config.max_parallel_fetches = 2;
        let engine = Arc::new(FakeEngine::default());
        let pipeline = MergePipeline::with_components(config, engine.clone(), fetcher.clone());

        let run = pipeline.open_run().await.unwrap();
        let mut request = MergeRequest::new().with_video(upload(&run, MediaClass::Video, "v.mp4", b"V").await);
        for url in &urls {
            request = request.with_audio(MediaAsset::remote(MediaClass::Audio, url.as_str()));
        }

        let completed = pipeline.execute(run, request).await.unwrap();

        assert_eq!(fetcher.fetched.load(Ordering::SeqCst), 6);
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert_eq!(engine.calls(), vec!["concatenate", "mix", "mux"]);
        assert_eq!(tokio::fs::read(completed.final_path()).await.unwrap(), b"Vxxxxxx");
    }

    #[tokio::test]
    async fn test_open_run_fails_with_resource_error() {
        let work = TempDir::new().unwrap();
        let blocker = work.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let pipeline = pipeline(&blocker, Arc::new(FakeEngine::default()), Arc::new(FakeFetcher::default()));

        let failed = pipeline.open_run().await.unwrap_err();

        assert_eq!(failed.failure.kind, ErrorKind::Resource);
        assert_eq!(failed.run.state, RunState::Failed);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let work = TempDir::new().unwrap();
        let pipeline = pipeline(work.path(), Arc::new(FakeEngine::default()), Arc::new(FakeFetcher::default()));

        let (a, b) = tokio::join!(pipeline.open_run(), pipeline.open_run());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.run_id(), b.run_id());
        assert_ne!(a.arena().dir(), b.arena().dir());

        a.discard().await;
        assert_eq!(entries(work.path()), 1);
        b.discard().await;
        assert_eq!(entries(work.path()), 0);
    }

    #[tokio::test]
    async fn test_execute_runs_on_a_spawned_task() {
        let work = TempDir::new().unwrap();
        let fetcher = Arc::new(FakeFetcher::serving(&[
            ("https://cdn.test/v.mp4", b"VID"),
            ("https://cdn.test/a.mp3", b"AUD"),
        ]));
        let pipeline = Arc::new(pipeline(work.path(), Arc::new(FakeEngine::default()), fetcher));

        let run = pipeline.open_run().await.unwrap();
        let request = MergeRequest::new()
            .with_video(MediaAsset::remote(MediaClass::Video, "https://cdn.test/v.mp4"))
            .with_audio(MediaAsset::remote(MediaClass::Audio, "https://cdn.test/a.mp3"));

        let task = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.execute(run, request).await })
        };
        let completed = task.await.unwrap().unwrap();

        assert_eq!(tokio::fs::read(completed.final_path()).await.unwrap(), b"VIDAUD");
    }
}
