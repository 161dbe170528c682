use std::sync::Arc;

use bytes::Bytes;
use sightline_artifact::{ArtifactStore, FinalArtifact, render_detections};
use sightline_config::{SightlineConfig, StatementChain, TransformPrompts};
use sightline_detection::{
  DetectedObject, DetectionClient, Delay, TokioDelay, cancellable, parse_labels,
};
use sightline_ports::{ClassifierPort, DescriberPort, ImageRef, Instruction, TextTransformPort};
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, instrument, warn};

use crate::context::PromptContext;
use crate::error::PipelineError;
use crate::events::{NoopNotifier, PipelineEvent, PipelineNotifier};
use crate::stage::{Branch, StageResult, StageTag};
use crate::state::RunState;

/// The text collaborators a run drives.
#[derive(Clone)]
pub struct Ports {
  pub classifier: Arc<dyn ClassifierPort>,
  pub describer: Arc<dyn DescriberPort>,
  pub transformer: Arc<dyn TextTransformPort>,
}

/// Per-orchestrator settings that do not change between runs.
#[derive(Debug, Clone)]
pub struct RunSettings {
  /// Chain used on the statement branch.
  pub chain: StatementChain,
  pub prompts: TransformPrompts,
  /// Detected objects scoring below this are dropped before rendering.
  pub box_threshold: f32,
  /// Artifact key the final image is written under.
  pub output_key: String,
}

impl RunSettings {
  pub fn from_config(config: &SightlineConfig, output_key: impl Into<String>) -> Self {
    Self {
      chain: config.pipeline.statement_chain,
      prompts: config.prompts.transform.clone(),
      box_threshold: config.segmentation.box_threshold,
      output_key: output_key.into(),
    }
  }
}

/// Drives one prompt + image through classification, the describer, the
/// branch-specific transform chain and remote detection.
///
/// Holds no per-run state, so one orchestrator can serve concurrent runs.
/// Generic over `N: PipelineNotifier` for event delivery and `D: Delay` for
/// the wait between detection polls.
pub struct PipelineOrchestrator<N: PipelineNotifier = NoopNotifier, D: Delay = TokioDelay> {
  ports: Ports,
  detection: DetectionClient<D>,
  store: Arc<dyn ArtifactStore>,
  settings: RunSettings,
  notifier: N,
}

impl<D: Delay> PipelineOrchestrator<NoopNotifier, D> {
  pub fn new(
    ports: Ports,
    detection: DetectionClient<D>,
    store: Arc<dyn ArtifactStore>,
    settings: RunSettings,
  ) -> Self {
    Self {
      ports,
      detection,
      store,
      settings,
      notifier: NoopNotifier,
    }
  }
}

impl<N: PipelineNotifier, D: Delay> PipelineOrchestrator<N, D> {
  /// Replace the notifier.
  pub fn with_notifier<M: PipelineNotifier>(self, notifier: M) -> PipelineOrchestrator<M, D> {
    PipelineOrchestrator {
      ports: self.ports,
      detection: self.detection,
      store: self.store,
      settings: self.settings,
      notifier,
    }
  }

  /// Run the pipeline once.
  ///
  /// Every failure aborts the run; nothing but the detection status poll is
  /// retried. Cancelling `cancel` stops the run at the next stage boundary or
  /// poll wait and drops any in-flight request.
  #[instrument(name = "pipeline_run", skip_all, fields(run_id = tracing::field::Empty))]
  pub async fn run(
    &self,
    context: &PromptContext,
    cancel: &CancellationToken,
  ) -> Result<FinalArtifact, PipelineError> {
    let run_id = uuid::Uuid::new_v4().to_string();
    Span::current().record("run_id", run_id.as_str());

    info!(prompt = %context.prompt(), image = %context.image().path().display(), "run_started");
    self.notifier.notify(PipelineEvent::RunStarted {
      run_id: run_id.clone(),
      prompt: context.prompt().to_string(),
    });

    let mut state = RunState::Start;
    let result = self.execute(&run_id, context, &mut state, cancel).await;

    match &result {
      Ok(artifact) => {
        info!(
          path = %artifact.path.display(),
          annotated = artifact.is_annotated(),
          "run_completed"
        );
        self.notifier.notify(PipelineEvent::RunCompleted {
          run_id,
          path: artifact.path.clone(),
          annotated: artifact.is_annotated(),
        });
      }
      Err(e) => {
        warn!(state = %state, error = %e, "run_failed");
        self.notifier.notify(PipelineEvent::RunFailed {
          run_id,
          failed_at: state,
          error: e.to_string(),
        });
      }
    }

    result
  }

  async fn execute(
    &self,
    run_id: &str,
    context: &PromptContext,
    state: &mut RunState,
    cancel: &CancellationToken,
  ) -> Result<FinalArtifact, PipelineError> {
    let prompt = context.prompt();
    let image = context.image();

    let is_question = cancellable(cancel, self.ports.classifier.is_question(prompt))
      .await?
      .map_err(|source| PipelineError::Classification { source })?;

    // Unhinted pass; reported through events but not fed to the branch.
    self
      .describe(run_id, image, prompt, None, StageTag::Description, cancel)
      .await?;
    state.advance(RunState::Described)?;

    let primary = self
      .describe(run_id, image, prompt, Some(is_question), StageTag::Answer, cancel)
      .await?;
    let branch = Branch::select(is_question, primary);
    state.advance(RunState::Branched(branch.kind()))?;

    info!(branch = ?branch.kind(), "branch_chosen");
    self.notifier.notify(PipelineEvent::BranchChosen {
      run_id: run_id.to_string(),
      branch: branch.kind(),
    });

    let label_text = match branch {
      Branch::Question { answer } => {
        let labels = answer.into_labels();
        self.report(run_id, &labels);
        labels
      }
      Branch::Statement { description } => {
        self.mine(run_id, description, prompt, cancel).await?
      }
    };
    state.advance(RunState::LabelsReady)?;

    state.advance(RunState::Detecting)?;
    let (labels, objects) = self.detect(run_id, context, label_text.text(), cancel).await?;

    let original = cancellable(cancel, image.read_bytes())
      .await?
      .map_err(|source| PipelineError::Input { source })?;
    let kind = render_detections(
      self.store.as_ref(),
      &self.settings.output_key,
      Bytes::from(original),
      &objects,
    )
    .await?;
    let path = self.store.locate(&self.settings.output_key)?;

    state.advance(RunState::Done)?;
    Ok(FinalArtifact { path, kind, labels })
  }

  async fn describe(
    &self,
    run_id: &str,
    image: &ImageRef,
    prompt: &str,
    hint: Option<bool>,
    tag: StageTag,
    cancel: &CancellationToken,
  ) -> Result<StageResult, PipelineError> {
    let text = cancellable(cancel, self.ports.describer.describe(image, prompt, hint))
      .await?
      .map_err(|e| PipelineError::generation(tag, e))?;
    self.complete_stage(run_id, tag, text)
  }

  /// Statement branch: turn the describer's prose into a label string.
  async fn mine(
    &self,
    run_id: &str,
    description: StageResult,
    prompt: &str,
    cancel: &CancellationToken,
  ) -> Result<StageResult, PipelineError> {
    let templates = &self.settings.prompts;

    match self.settings.chain {
      StatementChain::Direct => {
        let instruction =
          Instruction::new("extract_related", &templates.extract_related).with("prompt", prompt);
        let extraction = self
          .transform(run_id, &description, instruction, StageTag::Extraction, cancel)
          .await?;
        let labels = extraction.into_labels();
        self.report(run_id, &labels);
        Ok(labels)
      }
      StatementChain::Elaborate => {
        let instruction =
          Instruction::new("extract_objects", &templates.extract_objects).with("prompt", prompt);
        let objects = self
          .transform(run_id, &description, instruction, StageTag::Extraction, cancel)
          .await?;

        let instruction = Instruction::new("elaborate", &templates.elaborate)
          .with("prompt", prompt)
          .with("description", description.text());
        let elaborated = self
          .transform(run_id, &objects, instruction, StageTag::Elaboration, cancel)
          .await?;

        let instruction =
          Instruction::new("filter_relevant", &templates.filter_relevant).with("prompt", prompt);
        let filtered = self
          .transform(run_id, &elaborated, instruction, StageTag::Filtered, cancel)
          .await?;

        let instruction =
          Instruction::new("extract_list", &templates.extract_list).with("prompt", prompt);
        self
          .transform(run_id, &filtered, instruction, StageTag::FinalLabels, cancel)
          .await
      }
    }
  }

  async fn transform(
    &self,
    run_id: &str,
    input: &StageResult,
    instruction: Instruction,
    tag: StageTag,
    cancel: &CancellationToken,
  ) -> Result<StageResult, PipelineError> {
    let text = cancellable(
      cancel,
      self.ports.transformer.transform(input.text(), &instruction),
    )
    .await?
    .map_err(|e| PipelineError::generation(tag, e))?;
    self.complete_stage(run_id, tag, text)
  }

  fn complete_stage(
    &self,
    run_id: &str,
    tag: StageTag,
    text: String,
  ) -> Result<StageResult, PipelineError> {
    let result = StageResult::new(tag, text)?;
    self.report(run_id, &result);
    Ok(result)
  }

  fn report(&self, run_id: &str, result: &StageResult) {
    debug!(stage = %result.tag(), chars = result.text().len(), "stage_completed");
    self.notifier.notify(PipelineEvent::StageCompleted {
      run_id: run_id.to_string(),
      stage: result.tag(),
      text: result.text().to_string(),
    });
  }

  /// Submit and poll detection for `label_text`.
  ///
  /// No usable labels means nothing to detect, which is not an error.
  async fn detect(
    &self,
    run_id: &str,
    context: &PromptContext,
    label_text: &str,
    cancel: &CancellationToken,
  ) -> Result<(Vec<String>, Vec<DetectedObject>), PipelineError> {
    let labels = parse_labels(label_text);
    if labels.is_empty() {
      info!(label_text = %label_text, "no_labels");
      return Ok((labels, Vec::new()));
    }

    let reference = cancellable(cancel, context.image().remote_reference())
      .await?
      .map_err(|source| PipelineError::Input { source })?;
    let request = self.detection.build_request(&reference, label_text)?;

    let token = context.token();
    let task_uuid = self.detection.submit(&request, token, cancel).await?;
    self.notifier.notify(PipelineEvent::DetectionSubmitted {
      run_id: run_id.to_string(),
      task_uuid: task_uuid.clone(),
      labels: labels.clone(),
    });

    let task = self
      .detection
      .poll_until_terminal(&task_uuid, token, cancel)
      .await?;
    self.notifier.notify(PipelineEvent::DetectionFinished {
      run_id: run_id.to_string(),
      task_uuid: task_uuid.clone(),
      status: task.status,
      attempts: task.attempts,
    });

    let mut result = task.into_success()?.result.unwrap_or_default();
    let detected = result.objects.len();
    result.retain_above(self.settings.box_threshold);

    info!(
      task_uuid = %task_uuid,
      detected,
      kept = result.objects.len(),
      box_threshold = self.settings.box_threshold,
      "detection_completed"
    );
    Ok((labels, result.objects))
  }
}
