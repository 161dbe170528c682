use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use mockito::{Matcher, Server};
use serde_json::json;
use sightline_artifact::FsStore;
use sightline_config::{DetectionConfig, SightlineConfig, StatementChain};
use sightline_detection::{DetectionClient, DetectionError, TaskStatus};
use sightline_pipeline::{
  ArtifactKind, BranchKind, ChannelNotifier, PipelineError, PipelineEvent, PipelineOrchestrator,
  Ports, PromptContext, RunSettings, RunState, StageTag,
};
use sightline_ports::{
  ClassifierPort, DescriberPort, ImageRef, Instruction, PortError, TextTransformPort,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Scripted ports
// ---------------------------------------------------------------------------

struct FixedClassifier(Option<bool>);

#[async_trait]
impl ClassifierPort for FixedClassifier {
  async fn is_question(&self, _text: &str) -> Result<bool, PortError> {
    self
      .0
      .ok_or_else(|| PortError::invalid_input("classifier offline"))
  }
}

struct ScriptedDescriber {
  plain: String,
  hinted: String,
  calls: Mutex<Vec<Option<bool>>>,
}

impl ScriptedDescriber {
  fn new(plain: &str, hinted: &str) -> Arc<Self> {
    Arc::new(Self {
      plain: plain.to_string(),
      hinted: hinted.to_string(),
      calls: Mutex::new(Vec::new()),
    })
  }

  fn calls(&self) -> Vec<Option<bool>> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl DescriberPort for ScriptedDescriber {
  async fn describe(
    &self,
    _image: &ImageRef,
    _prompt: &str,
    hint: Option<bool>,
  ) -> Result<String, PortError> {
    self.calls.lock().unwrap().push(hint);
    Ok(match hint {
      None => self.plain.clone(),
      Some(_) => self.hinted.clone(),
    })
  }
}

/// Replies by instruction name and records `(name, input)` per call.
struct ScriptedTransformer {
  replies: HashMap<String, String>,
  calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransformer {
  fn new(replies: &[(&str, &str)]) -> Arc<Self> {
    Arc::new(Self {
      replies: replies
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
      calls: Mutex::new(Vec::new()),
    })
  }

  fn calls(&self) -> Vec<(String, String)> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl TextTransformPort for ScriptedTransformer {
  async fn transform(&self, input: &str, instruction: &Instruction) -> Result<String, PortError> {
    // the configured templates must render with what the orchestrator binds
    instruction.render(input)?;
    self
      .calls
      .lock()
      .unwrap()
      .push((instruction.name().to_string(), input.to_string()));
    self
      .replies
      .get(instruction.name())
      .cloned()
      .ok_or_else(|| PortError::invalid_response(format!("no reply for {}", instruction.name())))
  }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
  dir: tempfile::TempDir,
  image_path: PathBuf,
  image_bytes: Vec<u8>,
}

impl Harness {
  fn new() -> Self {
    let dir = tempfile::tempdir().unwrap();
    let mut canvas = RgbImage::from_pixel(40, 30, Rgb([120, 130, 140]));
    canvas.put_pixel(3, 3, Rgb([9, 9, 9]));
    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(canvas)
      .write_to(&mut png, ImageFormat::Png)
      .unwrap();
    let image_bytes = png.into_inner();
    let image_path = dir.path().join("input.png");
    std::fs::write(&image_path, &image_bytes).unwrap();

    Self {
      dir,
      image_path,
      image_bytes,
    }
  }

  fn output_path(&self) -> PathBuf {
    self.dir.path().join("out").join("result.png")
  }

  fn context(&self, prompt: &str) -> PromptContext {
    PromptContext::new(prompt, ImageRef::local(&self.image_path)).with_token("tok")
  }

  fn orchestrator(
    &self,
    server: &Server,
    classifier: Option<bool>,
    describer: Arc<ScriptedDescriber>,
    transformer: Arc<ScriptedTransformer>,
    chain: StatementChain,
  ) -> PipelineOrchestrator {
    self.orchestrator_with(server, classifier, describer, transformer, |config| {
      config.pipeline.statement_chain = chain;
    })
  }

  fn orchestrator_with(
    &self,
    server: &Server,
    classifier: Option<bool>,
    describer: Arc<ScriptedDescriber>,
    transformer: Arc<ScriptedTransformer>,
    adjust: impl FnOnce(&mut SightlineConfig),
  ) -> PipelineOrchestrator {
    let mut config = SightlineConfig {
      detection: DetectionConfig {
        base_url: server.url(),
        poll_interval_ms: 1,
        ..Default::default()
      },
      ..Default::default()
    };
    adjust(&mut config);

    let ports = Ports {
      classifier: Arc::new(FixedClassifier(classifier)),
      describer,
      transformer,
    };
    let detection = DetectionClient::new(&config.detection).unwrap();
    let store = Arc::new(FsStore::new(self.dir.path().join("out")));

    PipelineOrchestrator::new(
      ports,
      detection,
      store,
      RunSettings::from_config(&config, "result.png"),
    )
  }
}

async fn mock_submit(server: &mut Server, labels: &[&str], task_uuid: &str) -> mockito::Mock {
  let prompts: Vec<_> = labels
    .iter()
    .map(|l| json!({ "type": "text", "text": l }))
    .collect();
  server
    .mock("POST", "/tasks/detection")
    .match_header("token", "tok")
    .match_body(Matcher::PartialJson(json!({ "prompts": prompts })))
    .with_body(json!({ "code": 0, "data": { "task_uuid": task_uuid }, "msg": "ok" }).to_string())
    .expect(1)
    .create_async()
    .await
}

async fn mock_success(server: &mut Server, task_uuid: &str, objects: serde_json::Value) -> mockito::Mock {
  server
    .mock("GET", format!("/task_statuses/{}", task_uuid).as_str())
    .with_body(
      json!({ "code": 0, "data": { "status": "success", "result": { "objects": objects } } })
        .to_string(),
    )
    .expect(1)
    .create_async()
    .await
}

fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
  let mut events = Vec::new();
  while let Ok(event) = rx.try_recv() {
    events.push(event);
  }
  events
}

fn final_label_text(events: &[PipelineEvent]) -> Option<String> {
  events.iter().find_map(|e| match e {
    PipelineEvent::StageCompleted {
      stage: StageTag::FinalLabels,
      text,
      ..
    } => Some(text.clone()),
    _ => None,
  })
}

// ---------------------------------------------------------------------------
// Branching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_question_uses_answer_as_labels_without_transforms() {
  let harness = Harness::new();
  let mut server = Server::new_async().await;

  let submit = server
    .mock("POST", "/tasks/detection")
    .match_header("token", "tok")
    .match_body(Matcher::Json(json!({
      "image": "https://images.example.com/street.png",
      "prompts": [{ "type": "text", "text": "red car" }],
      "model": "GroundingDino-1.6-Pro",
      "targets": ["bbox"]
    })))
    .with_body(r#"{"code":0,"data":{"task_uuid":"abc-123"},"msg":"ok"}"#)
    .expect(1)
    .create_async()
    .await;
  let poll = mock_success(
    &mut server,
    "abc-123",
    json!([{ "bbox": [5.0, 5.0, 30.0, 20.0], "category": "red car", "score": 0.9 }]),
  )
  .await;

  let describer = ScriptedDescriber::new("A street with parked cars.", "red car");
  let transformer = ScriptedTransformer::new(&[]);
  let (tx, mut rx) = mpsc::unbounded_channel();
  let orchestrator = harness
    .orchestrator(
      &server,
      Some(true),
      describer.clone(),
      transformer.clone(),
      StatementChain::Direct,
    )
    .with_notifier(ChannelNotifier::new(tx));

  let context = PromptContext::new(
    "Which car is parked closest to the hydrant?",
    ImageRef::local(&harness.image_path).with_url("https://images.example.com/street.png"),
  )
  .with_token("tok");

  let artifact = orchestrator
    .run(&context, &CancellationToken::new())
    .await
    .unwrap();

  submit.assert_async().await;
  poll.assert_async().await;
  assert!(transformer.calls().is_empty());
  assert_eq!(describer.calls(), vec![None, Some(true)]);
  assert_eq!(artifact.labels, vec!["red car"]);
  assert_eq!(artifact.path, harness.output_path());
  assert!(matches!(artifact.kind, ArtifactKind::Annotated { ref objects } if objects.len() == 1));
  assert!(harness.output_path().exists());

  let events = drain(&mut rx);
  assert_eq!(final_label_text(&events).as_deref(), Some("red car"));
  assert!(events.contains(&PipelineEvent::BranchChosen {
    run_id: match &events[0] {
      PipelineEvent::RunStarted { run_id, .. } => run_id.clone(),
      other => panic!("first event should be RunStarted, got {:?}", other),
    },
    branch: BranchKind::Question,
  }));
  assert!(matches!(events.last(), Some(PipelineEvent::RunCompleted { annotated: true, .. })));
}

#[tokio::test]
async fn test_statement_direct_chain_mines_answer() {
  let harness = Harness::new();
  let mut server = Server::new_async().await;

  let submit = mock_submit(&mut server, &["dog", "ball"], "u-1").await;
  let poll = mock_success(&mut server, "u-1", json!([])).await;

  let answer = "A brown dog lies on green grass next to a red ball.";
  let describer = ScriptedDescriber::new("A dog in a park.", answer);
  let transformer = ScriptedTransformer::new(&[("extract_related", "dog, ball")]);
  let orchestrator = harness.orchestrator(
    &server,
    Some(false),
    describer.clone(),
    transformer.clone(),
    StatementChain::Direct,
  );

  let prompt = "highlight the pet and its toy";
  let artifact = orchestrator
    .run(&harness.context(prompt), &CancellationToken::new())
    .await
    .unwrap();

  submit.assert_async().await;
  poll.assert_async().await;
  assert_eq!(
    transformer.calls(),
    vec![("extract_related".to_string(), answer.to_string())]
  );
  assert_eq!(describer.calls(), vec![None, Some(false)]);
  assert_eq!(artifact.labels, vec!["dog", "ball"]);
  assert!(artifact.labels.iter().all(|l| !l.contains(prompt)));

  // zero detections: the original image, byte for byte
  assert_eq!(artifact.kind, ArtifactKind::Original);
  assert_eq!(std::fs::read(harness.output_path()).unwrap(), harness.image_bytes);
}

#[tokio::test]
async fn test_statement_elaborate_chain_threads_each_output() {
  let harness = Harness::new();
  let mut server = Server::new_async().await;

  let submit = mock_submit(&mut server, &["Dog"], "u-2").await;
  let poll = mock_success(
    &mut server,
    "u-2",
    json!([{ "bbox": [1.0, 1.0, 10.0, 10.0], "category": "Dog", "score": 0.75 }]),
  )
  .await;

  let answer = "A brown dog lies on green grass next to a red ball.";
  let extracted = "1. dog, 2. grass, 3. ball.";
  let elaborated = "1. Dog: brown, lying down. 2. Grass: green. 3. Ball: small and red.";
  let filtered = "Dog: brown, lying down.";
  let describer = ScriptedDescriber::new("A park.", answer);
  let transformer = ScriptedTransformer::new(&[
    ("extract_objects", extracted),
    ("elaborate", elaborated),
    ("filter_relevant", filtered),
    ("extract_list", "Dog."),
  ]);
  let (tx, mut rx) = mpsc::unbounded_channel();
  let orchestrator = harness
    .orchestrator(
      &server,
      Some(false),
      describer,
      transformer.clone(),
      StatementChain::Elaborate,
    )
    .with_notifier(ChannelNotifier::new(tx));

  let artifact = orchestrator
    .run(&harness.context("the animal"), &CancellationToken::new())
    .await
    .unwrap();

  submit.assert_async().await;
  poll.assert_async().await;
  assert_eq!(
    transformer.calls(),
    vec![
      ("extract_objects".to_string(), answer.to_string()),
      ("elaborate".to_string(), extracted.to_string()),
      ("filter_relevant".to_string(), elaborated.to_string()),
      ("extract_list".to_string(), filtered.to_string()),
    ]
  );
  assert_eq!(artifact.labels, vec!["Dog"]);
  assert!(artifact.is_annotated());

  let stages: Vec<StageTag> = drain(&mut rx)
    .into_iter()
    .filter_map(|e| match e {
      PipelineEvent::StageCompleted { stage, .. } => Some(stage),
      _ => None,
    })
    .collect();
  assert_eq!(
    stages,
    vec![
      StageTag::Description,
      StageTag::Answer,
      StageTag::Extraction,
      StageTag::Elaboration,
      StageTag::Filtered,
      StageTag::FinalLabels,
    ]
  );
}

#[tokio::test]
async fn test_no_relevant_objects_skips_detection() {
  let harness = Harness::new();
  let mut server = Server::new_async().await;
  let submit = server
    .mock("POST", "/tasks/detection")
    .expect(0)
    .create_async()
    .await;

  let describer = ScriptedDescriber::new("Fruit.", "Oranges and lemons in a bowl.");
  let transformer = ScriptedTransformer::new(&[
    ("extract_objects", "1. oranges, 2. lemons, 3. bowl."),
    ("elaborate", "1. Oranges: round. 2. Lemons: yellow. 3. Bowl: white."),
    ("filter_relevant", "none."),
    ("extract_list", "none."),
  ]);
  let orchestrator = harness.orchestrator(
    &server,
    Some(false),
    describer,
    transformer,
    StatementChain::Elaborate,
  );

  let artifact = orchestrator
    .run(&harness.context("strawberries"), &CancellationToken::new())
    .await
    .unwrap();

  submit.assert_async().await;
  assert_eq!(artifact.kind, ArtifactKind::Original);
  assert!(artifact.labels.is_empty());
  assert_eq!(std::fs::read(harness.output_path()).unwrap(), harness.image_bytes);
}

#[tokio::test]
async fn test_low_scoring_objects_are_dropped() {
  let harness = Harness::new();
  let mut server = Server::new_async().await;

  mock_submit(&mut server, &["cup"], "u-3").await;
  mock_success(
    &mut server,
    "u-3",
    json!([{ "bbox": [1.0, 1.0, 10.0, 10.0], "category": "cup", "score": 0.1 }]),
  )
  .await;

  let orchestrator = harness.orchestrator(
    &server,
    Some(true),
    ScriptedDescriber::new("A table.", "cup"),
    ScriptedTransformer::new(&[]),
    StatementChain::Direct,
  );

  let artifact = orchestrator
    .run(&harness.context("where is the cup?"), &CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(artifact.kind, ArtifactKind::Original);
  assert_eq!(std::fs::read(harness.output_path()).unwrap(), harness.image_bytes);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_classifier_failure_aborts_before_describing() {
  let harness = Harness::new();
  let server = Server::new_async().await;
  let describer = ScriptedDescriber::new("x", "y");

  let orchestrator = harness.orchestrator(
    &server,
    None,
    describer.clone(),
    ScriptedTransformer::new(&[]),
    StatementChain::Direct,
  );

  let err = orchestrator
    .run(&harness.context("anything"), &CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Classification { .. }));
  assert!(describer.calls().is_empty());
}

#[tokio::test]
async fn test_empty_describer_output_is_generation_error() {
  let harness = Harness::new();
  let mut server = Server::new_async().await;
  let submit = server
    .mock("POST", "/tasks/detection")
    .expect(0)
    .create_async()
    .await;

  let orchestrator = harness.orchestrator(
    &server,
    Some(true),
    ScriptedDescriber::new("A kitchen.", "   "),
    ScriptedTransformer::new(&[]),
    StatementChain::Direct,
  );

  let err = orchestrator
    .run(&harness.context("what is on the stove?"), &CancellationToken::new())
    .await
    .unwrap_err();

  submit.assert_async().await;
  assert!(matches!(
    err,
    PipelineError::Generation {
      stage: StageTag::Answer,
      ..
    }
  ));
  assert!(!harness.output_path().exists());
}

#[tokio::test]
async fn test_failing_transform_names_its_stage() {
  let harness = Harness::new();
  let server = Server::new_async().await;

  let orchestrator = harness.orchestrator(
    &server,
    Some(false),
    ScriptedDescriber::new("A park.", "A dog on grass."),
    ScriptedTransformer::new(&[("extract_objects", "dog, grass")]),
    StatementChain::Elaborate,
  );

  let err = orchestrator
    .run(&harness.context("the dog"), &CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    PipelineError::Generation {
      stage: StageTag::Elaboration,
      ..
    }
  ));
}

#[tokio::test]
async fn test_remote_failure_is_distinct_from_timeout() {
  let harness = Harness::new();
  let mut server = Server::new_async().await;

  mock_submit(&mut server, &["cup"], "f-1").await;
  server
    .mock("GET", "/task_statuses/f-1")
    .with_body(json!({ "data": { "status": "failed" } }).to_string())
    .expect(1)
    .create_async()
    .await;
  mock_submit(&mut server, &["plate"], "t-1").await;
  let pending = server
    .mock("GET", "/task_statuses/t-1")
    .with_body(json!({ "data": { "status": "waiting" } }).to_string())
    .expect(3)
    .create_async()
    .await;

  let (tx, mut rx) = mpsc::unbounded_channel();
  let orchestrator = harness
    .orchestrator_with(
      &server,
      Some(true),
      ScriptedDescriber::new("A table.", "cup"),
      ScriptedTransformer::new(&[]),
      |config| config.detection.max_attempts = 3,
    )
    .with_notifier(ChannelNotifier::new(tx));

  let failed = orchestrator
    .run(&harness.context("which cup?"), &CancellationToken::new())
    .await
    .unwrap_err();
  assert!(matches!(failed, PipelineError::TaskFailed { ref task_uuid, .. } if task_uuid == "f-1"));

  let orchestrator = harness.orchestrator_with(
    &server,
    Some(true),
    ScriptedDescriber::new("A table.", "plate"),
    ScriptedTransformer::new(&[]),
    |config| config.detection.max_attempts = 3,
  );
  let timed_out = orchestrator
    .run(&harness.context("which plate?"), &CancellationToken::new())
    .await
    .unwrap_err();

  pending.assert_async().await;
  assert!(matches!(
    timed_out,
    PipelineError::TaskTimeout { ref task_uuid, attempts: 3 } if task_uuid == "t-1"
  ));
  assert!(!harness.output_path().exists());

  let events = drain(&mut rx);
  assert!(events.iter().any(|e| matches!(
    e,
    PipelineEvent::DetectionFinished {
      status: TaskStatus::Failed,
      attempts: 1,
      ..
    }
  )));
  assert!(matches!(
    events.last(),
    Some(PipelineEvent::RunFailed {
      failed_at: RunState::Detecting,
      ..
    })
  ));
}

#[tokio::test]
async fn test_unreadable_detection_result_fails_the_run() {
  let harness = Harness::new();
  let mut server = Server::new_async().await;

  mock_submit(&mut server, &["cup"], "m-1").await;
  mock_success(
    &mut server,
    "m-1",
    json!([
      { "bbox": [1.0, 2.0, 3.0, 4.0], "category": "cup", "score": 0.9 },
      { "bbox": [1.0, 2.0, 3.0, 4.0, 5.0], "category": "dog", "score": "0.8" }
    ]),
  )
  .await;

  let orchestrator = harness.orchestrator(
    &server,
    Some(true),
    ScriptedDescriber::new("A table.", "cup"),
    ScriptedTransformer::new(&[]),
    StatementChain::Direct,
  );

  let err = orchestrator
    .run(&harness.context("which cup?"), &CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(
    err,
    PipelineError::Detection(DetectionError::InvalidResponse { .. })
  ));
  assert!(!harness.output_path().exists());
}

#[tokio::test]
async fn test_submission_rejection_is_fatal() {
  let harness = Harness::new();
  let mut server = Server::new_async().await;
  server
    .mock("POST", "/tasks/detection")
    .with_status(403)
    .with_body("forbidden")
    .expect(1)
    .create_async()
    .await;

  let orchestrator = harness.orchestrator(
    &server,
    Some(true),
    ScriptedDescriber::new("A table.", "cup"),
    ScriptedTransformer::new(&[]),
    StatementChain::Direct,
  );

  let err = orchestrator
    .run(&harness.context("which cup?"), &CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Submission { status: Some(403), .. }));
}

#[tokio::test]
async fn test_missing_input_image_fails_cleanly() {
  let harness = Harness::new();
  let server = Server::new_async().await;

  let orchestrator = harness.orchestrator(
    &server,
    Some(false),
    ScriptedDescriber::new("A park.", "A dog."),
    ScriptedTransformer::new(&[("extract_related", "none")]),
    StatementChain::Direct,
  );

  let context = PromptContext::new("the dog", ImageRef::local(Path::new("/nonexistent/in.png")));
  let err = orchestrator
    .run(&context, &CancellationToken::new())
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Input { .. }));
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cancelled_run_stops_at_first_boundary() {
  let harness = Harness::new();
  let server = Server::new_async().await;
  let describer = ScriptedDescriber::new("x", "y");

  let (tx, mut rx) = mpsc::unbounded_channel();
  let orchestrator = harness
    .orchestrator(
      &server,
      Some(true),
      describer.clone(),
      ScriptedTransformer::new(&[]),
      StatementChain::Direct,
    )
    .with_notifier(ChannelNotifier::new(tx));

  let cancel = CancellationToken::new();
  cancel.cancel();

  let err = orchestrator
    .run(&harness.context("anything?"), &cancel)
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Cancelled));
  assert!(describer.calls().is_empty());
  let events = drain(&mut rx);
  assert_eq!(events.len(), 2);
  assert!(matches!(
    events[1],
    PipelineEvent::RunFailed {
      failed_at: RunState::Start,
      ..
    }
  ));
}

#[tokio::test]
async fn test_cancel_during_polling() {
  let harness = Harness::new();
  let mut server = Server::new_async().await;

  mock_submit(&mut server, &["cup"], "slow").await;
  server
    .mock("GET", "/task_statuses/slow")
    .with_body(json!({ "data": { "status": "running" } }).to_string())
    .create_async()
    .await;

  let orchestrator = harness.orchestrator_with(
    &server,
    Some(true),
    ScriptedDescriber::new("A table.", "cup"),
    ScriptedTransformer::new(&[]),
    |config| config.detection.poll_interval_ms = 60_000,
  );

  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    trigger.cancel();
  });

  let started = std::time::Instant::now();
  let err = orchestrator
    .run(&harness.context("which cup?"), &cancel)
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Cancelled));
  assert!(started.elapsed() < std::time::Duration::from_secs(30));
}
