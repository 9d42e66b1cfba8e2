//! Pipeline run bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a pipeline run. Also names the run's scratch directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named stages of a merge, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    FetchInputs,
    ConcatenateVideo,
    MixAudio,
    Mux,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::FetchInputs => "fetch_inputs",
            StageName::ConcatenateVideo => "concatenate_video",
            StageName::MixAudio => "mix_audio",
            StageName::Mux => "mux",
        }
    }

    /// Run state while this stage executes.
    pub fn running_state(&self) -> RunState {
        match self {
            StageName::FetchInputs => RunState::FetchingInputs,
            StageName::ConcatenateVideo => RunState::ConcatenatingVideo,
            StageName::MixAudio => RunState::MixingAudio,
            StageName::Mux => RunState::Muxing,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Orchestrator state machine.
///
/// `Idle -> FetchingInputs -> ConcatenatingVideo -> MixingAudio -> Muxing -> Delivered`,
/// with `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Idle,
    FetchingInputs,
    ConcatenatingVideo,
    MixingAudio,
    Muxing,
    Delivered,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::FetchingInputs => "fetching_inputs",
            RunState::ConcatenatingVideo => "concatenating_video",
            RunState::MixingAudio => "mixing_audio",
            RunState::Muxing => "muxing",
            RunState::Delivered => "delivered",
            RunState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Delivered | RunState::Failed)
    }
}

/// Illegal run transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Run is already {0:?}")]
    Terminal(RunState),

    #[error("Stage {stage} is not part of this run")]
    UnknownStage { stage: StageName },

    #[error("Stage {stage} is out of order (expected {expected:?})")]
    OutOfOrder {
        stage: StageName,
        expected: Option<StageName>,
    },
}

/// One planned stage and its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: StageName,
    pub status: StageStatus,
}

/// One execution of the orchestrator for a merge request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: RunId,
    pub state: RunState,
    pub stages: Vec<StageRecord>,
    /// Artifact produced by each completed stage
    pub intermediate_artifacts: BTreeMap<StageName, PathBuf>,
    pub final_artifact_path: Option<PathBuf>,
    pub failed_stage: Option<StageName>,
    /// Full diagnostic for the failure, kept for logs only
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create a run with the given stage plan, all stages pending.
    pub fn new(run_id: RunId, plan: &[StageName]) -> Self {
        Self {
            run_id,
            state: RunState::Idle,
            stages: plan
                .iter()
                .map(|&name| StageRecord {
                    name,
                    status: StageStatus::Pending,
                })
                .collect(),
            intermediate_artifacts: BTreeMap::new(),
            final_artifact_path: None,
            failed_stage: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn plan(&self) -> Vec<StageName> {
        self.stages.iter().map(|s| s.name).collect()
    }

    pub fn stage_status(&self, stage: StageName) -> Option<StageStatus> {
        self.stages.iter().find(|s| s.name == stage).map(|s| s.status)
    }

    /// Next stage still pending, if any.
    pub fn next_pending(&self) -> Option<StageName> {
        self.stages
            .iter()
            .find(|s| s.status == StageStatus::Pending)
            .map(|s| s.name)
    }

    /// Mark `stage` running. Stages must start strictly in plan order.
    pub fn start_stage(&mut self, stage: StageName) -> Result<(), TransitionError> {
        self.ensure_live()?;
        let expected = self.next_pending();
        if expected != Some(stage) {
            if self.stage_status(stage).is_none() {
                return Err(TransitionError::UnknownStage { stage });
            }
            return Err(TransitionError::OutOfOrder { stage, expected });
        }
        self.set_status(stage, StageStatus::Running);
        self.state = stage.running_state();
        Ok(())
    }

    /// Mark `stage` succeeded and record what it produced.
    pub fn complete_stage(
        &mut self,
        stage: StageName,
        artifact: Option<PathBuf>,
    ) -> Result<(), TransitionError> {
        self.ensure_live()?;
        if self.stage_status(stage) != Some(StageStatus::Running) {
            return Err(TransitionError::OutOfOrder {
                stage,
                expected: self.running_stage(),
            });
        }
        self.set_status(stage, StageStatus::Succeeded);
        if let Some(path) = artifact {
            self.intermediate_artifacts.insert(stage, path);
        }
        Ok(())
    }

    /// Enter `Failed`, recording the failing stage and diagnostic.
    pub fn fail(&mut self, stage: Option<StageName>, error: impl Into<String>) {
        if self.state.is_terminal() {
            return;
        }
        if let Some(stage) = stage {
            self.set_status(stage, StageStatus::Failed);
        }
        self.failed_stage = stage;
        self.error = Some(error.into());
        self.state = RunState::Failed;
        self.finished_at = Some(Utc::now());
    }

    /// Record the deliverable once every planned stage succeeded.
    pub fn set_final_artifact(&mut self, path: PathBuf) {
        self.final_artifact_path = Some(path);
    }

    /// Enter `Delivered` after the artifact has been handed off.
    pub fn mark_delivered(&mut self) -> Result<(), TransitionError> {
        self.ensure_live()?;
        if let Some(stage) = self.next_pending().or(self.running_stage()) {
            return Err(TransitionError::OutOfOrder {
                stage,
                expected: None,
            });
        }
        self.state = RunState::Delivered;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Last artifact produced by any stage.
    pub fn latest_artifact(&self) -> Option<&PathBuf> {
        self.stages
            .iter()
            .rev()
            .find_map(|s| self.intermediate_artifacts.get(&s.name))
    }

    fn running_stage(&self) -> Option<StageName> {
        self.stages
            .iter()
            .find(|s| s.status == StageStatus::Running)
            .map(|s| s.name)
    }

    fn ensure_live(&self) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            Err(TransitionError::Terminal(self.state))
        } else {
            Ok(())
        }
    }

    fn set_status(&mut self, stage: StageName, status: StageStatus) {
        if let Some(record) = self.stages.iter_mut().find(|s| s.name == stage) {
            record.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: [StageName; 4] = [
        StageName::FetchInputs,
        StageName::ConcatenateVideo,
        StageName::MixAudio,
        StageName::Mux,
    ];

    #[test]
    fn test_happy_path_transitions() {
        let mut run = PipelineRun::new(RunId::new(), &FULL);
        assert_eq!(run.state, RunState::Idle);

        for stage in FULL {
            run.start_stage(stage).unwrap();
            assert_eq!(run.state, stage.running_state());
            run.complete_stage(stage, Some(PathBuf::from(format!("/tmp/{}", stage))))
                .unwrap();
        }

        assert_eq!(run.latest_artifact(), Some(&PathBuf::from("/tmp/mux")));
        run.mark_delivered().unwrap();
        assert_eq!(run.state, RunState::Delivered);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut run = PipelineRun::new(RunId::new(), &FULL);
        let err = run.start_stage(StageName::Mux).unwrap_err();
        assert_eq!(
            err,
            TransitionError::OutOfOrder {
                stage: StageName::Mux,
                expected: Some(StageName::FetchInputs)
            }
        );
    }

    #[test]
    fn test_unknown_stage_rejected() {
        let plan = [StageName::FetchInputs, StageName::ConcatenateVideo];
        let mut run = PipelineRun::new(RunId::new(), &plan);
        assert_eq!(
            run.start_stage(StageName::MixAudio),
            Err(TransitionError::UnknownStage {
                stage: StageName::MixAudio
            })
        );
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut run = PipelineRun::new(RunId::new(), &FULL);
        run.start_stage(StageName::FetchInputs).unwrap();
        run.fail(Some(StageName::FetchInputs), "HTTP 404");

        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.failed_stage, Some(StageName::FetchInputs));
        assert_eq!(run.stage_status(StageName::FetchInputs), Some(StageStatus::Failed));
        assert_eq!(run.stage_status(StageName::ConcatenateVideo), Some(StageStatus::Pending));
        assert_eq!(
            run.start_stage(StageName::ConcatenateVideo),
            Err(TransitionError::Terminal(RunState::Failed))
        );
        assert!(run.mark_delivered().is_err());
    }

    #[test]
    fn test_cannot_deliver_with_pending_stages() {
        let mut run = PipelineRun::new(RunId::new(), &FULL);
        run.start_stage(StageName::FetchInputs).unwrap();
        run.complete_stage(StageName::FetchInputs, None).unwrap();
        assert!(run.mark_delivered().is_err());
    }
}
