//! Integration tests for the worker loop with scripted jobs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use courier_core::parse;
use courier_models::{Event, EventPayload, JobId, Role, StreamEvent, TelegramMessage};
use courier_persistence::HistoryStore;
use courier_queue::{EventQueue, QueueError};
use courier_runtime::{
    ChannelRegistry, ControlPlane, Delivery, DeliveryError, DispatchOutcome, InboundMessage,
    JobHandle, JobRequest, JobRunner, Listener, RuntimeError, Worker, WorkerConfig, WorkerExit,
};
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Delivery for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn send(&self, _event: &Event, text: &str) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// How a scripted job behaves.
#[derive(Clone)]
enum Script {
    /// Emit these events, then close the stream.
    Emit(Vec<StreamEvent>),
    /// Emit these events with a pause before each one.
    Slow(Vec<StreamEvent>),
    /// Emit a fragment, then wait to be cancelled.
    Hang,
    /// Refuse to start.
    FailToStart,
}

struct ScriptedRunner {
    script: Script,
    requests: Mutex<Vec<JobRequest>>,
}

impl ScriptedRunner {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<JobRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl JobRunner for ScriptedRunner {
    fn start(&self, request: &JobRequest) -> courier_runtime::Result<JobHandle> {
        if let Script::FailToStart = self.script {
            return Err(RuntimeError::Spawn {
                program: "agent".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no agent"),
            });
        }
        self.requests.lock().unwrap().push(request.clone());

        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let script = self.script.clone();

        tokio::spawn(async move {
            match script {
                Script::Emit(events) => {
                    for event in events {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Script::Slow(events) => {
                    for event in events {
                        tokio::time::sleep(Duration::from_millis(40)).await;
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Script::Hang => {
                    let _ = tx.send(StreamEvent::text_delta("thinking")).await;
                    token.cancelled().await;
                }
                Script::FailToStart => {}
            }
        });

        Ok(JobHandle {
            job_id: request.job_id.clone(),
            events: rx,
            cancel,
        })
    }
}

fn success_script() -> Script {
    Script::Emit(vec![
        StreamEvent::System {
            subtype: Some("init".into()),
            session_id: Some("s-1".into()),
        },
        StreamEvent::assistant_text("Hi "),
        StreamEvent::text_delta("there"),
        StreamEvent::Result {
            subtype: "success".into(),
            result: Some("Hi there".into()),
            session_id: Some("s-1".into()),
        },
        StreamEvent::result("success"),
    ])
}

fn config() -> WorkerConfig {
    WorkerConfig::new()
        .with_poll_interval(Duration::from_millis(10))
        .with_control_interval(Duration::from_millis(10))
        .with_flush_interval(Duration::from_millis(10))
}

fn telegram(chat_id: i64, text: &str) -> InboundMessage {
    InboundMessage::new(EventPayload::Telegram(TelegramMessage {
        chat_id,
        message_id: None,
        from: Some("ana".into()),
        text: text.into(),
    }))
}

fn worker(dir: &std::path::Path, runner: Arc<dyn JobRunner>, recorder: &Arc<Recorder>) -> Worker {
    let registry = ChannelRegistry::new().with("telegram", recorder.clone() as Arc<dyn Delivery>);
    Worker::new(dir, config(), runner, registry).unwrap()
}

#[tokio::test]
async fn test_job_completes_and_replies_once() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let runner = ScriptedRunner::new(success_script());
    let mut worker = worker(dir.path(), runner.clone(), &recorder);

    Listener::new(dir.path(), "telegram").handle(telegram(1, "hello")).unwrap();

    let summary = worker.run_once(&CancellationToken::new()).await.unwrap().unwrap();
    assert_eq!(
        summary.outcome,
        DispatchOutcome::Completed {
            exit_code: 0,
            reply: Some("Hi there".into())
        }
    );
    assert_eq!(*recorder.sent.lock().unwrap(), vec!["Hi there"]);

    let queue = EventQueue::new(dir.path());
    assert_eq!(queue.pending_count().unwrap(), 0);
    assert_eq!(queue.list_processed().unwrap().len(), 1);

    let history = HistoryStore::new(dir.path()).load("telegram:1").unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].text, "Hi there");

    assert_eq!(worker.session().session_id.as_deref(), Some("s-1"));
    assert_eq!(worker.session().jobs_completed, 1);
    assert!(worker.session().active_job.is_none());

    assert!(worker.run_once(&CancellationToken::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_session_is_resumed_until_new() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let runner = ScriptedRunner::new(success_script());
    let mut worker = worker(dir.path(), runner.clone(), &recorder);
    let listener = Listener::new(dir.path(), "telegram");
    let token = CancellationToken::new();

    listener.handle(telegram(1, "one")).unwrap();
    worker.run_once(&token).await.unwrap();
    listener.handle(telegram(1, "two")).unwrap();
    worker.run_once(&token).await.unwrap();

    listener.handle(telegram(1, "/new")).unwrap();
    worker.apply_pending_requests().unwrap();
    assert!(worker.session().session_id.is_none());

    listener.handle(telegram(1, "three")).unwrap();
    worker.run_once(&token).await.unwrap();

    let resumes: Vec<_> = runner.requests().into_iter().map(|r| r.resume_session).collect();
    assert_eq!(resumes, vec![None, Some("s-1".to_string()), None]);
}

#[tokio::test]
async fn test_stop_cancels_running_job() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut worker = worker(dir.path(), ScriptedRunner::new(Script::Hang), &recorder);

    Listener::new(dir.path(), "telegram").handle(telegram(1, "long task")).unwrap();

    let plane = ControlPlane::new(dir.path());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        plane.apply(&parse("/stop").unwrap(), None).unwrap();
    });

    let summary = worker.run_once(&CancellationToken::new()).await.unwrap().unwrap();
    assert_eq!(summary.outcome, DispatchOutcome::Cancelled);
    assert!(recorder.sent.lock().unwrap().is_empty());
    assert_eq!(worker.session().jobs_completed, 0);

    // A cancelled job is not redelivered.
    assert_eq!(EventQueue::new(dir.path()).pending_count().unwrap(), 0);
}

#[tokio::test]
async fn test_stop_job_ignores_other_ids() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let runner = ScriptedRunner::new(Script::Hang);
    let mut worker = worker(dir.path(), runner.clone(), &recorder);

    Listener::new(dir.path(), "telegram").handle(telegram(1, "task")).unwrap();

    let plane = ControlPlane::new(dir.path());
    let watcher = runner.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        plane.apply(&parse("/stop job-other").unwrap(), None).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let job_id: JobId = watcher.requests()[0].job_id.clone();
        plane
            .apply(&parse(&format!("/stop {}", job_id)).unwrap(), None)
            .unwrap();
    });

    let summary = worker.run_once(&CancellationToken::new()).await.unwrap().unwrap();
    assert_eq!(summary.outcome, DispatchOutcome::Cancelled);
    assert_eq!(summary.job_id, runner.requests()[0].job_id);
}

#[tokio::test]
async fn test_interrupt_mode_cancels_for_new_message() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut worker = worker(dir.path(), ScriptedRunner::new(Script::Hang), &recorder);
    let listener = Listener::new(dir.path(), "telegram");

    listener.handle(telegram(1, "/queue off")).unwrap();
    worker.apply_pending_requests().unwrap();
    assert!(!worker.session().queue_enabled);

    listener.handle(telegram(1, "first")).unwrap();
    let base = dir.path().to_path_buf();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Listener::new(base, "telegram").handle(telegram(1, "second")).unwrap();
    });

    let summary = worker.run_once(&CancellationToken::new()).await.unwrap().unwrap();
    assert_eq!(summary.outcome, DispatchOutcome::Cancelled);

    let pending = EventQueue::new(dir.path()).list_pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].text().as_deref(), Some("second"));
}

#[tokio::test]
async fn test_interrupt_mode_ignores_corrupt_entries() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let runner = ScriptedRunner::new(Script::Slow(vec![
        StreamEvent::assistant_text("done"),
        StreamEvent::result("success"),
    ]));
    let mut worker = worker(dir.path(), runner, &recorder);
    let listener = Listener::new(dir.path(), "telegram");

    listener.handle(telegram(1, "/queue off")).unwrap();
    worker.apply_pending_requests().unwrap();

    listener.handle(telegram(1, "only message")).unwrap();
    std::fs::write(dir.path().join("queue/pending/evt-bad.json"), "{oops").unwrap();

    let summary = worker.run_once(&CancellationToken::new()).await.unwrap().unwrap();
    assert!(matches!(
        summary.outcome,
        DispatchOutcome::Completed { exit_code: 0, .. }
    ));
    assert_eq!(*recorder.sent.lock().unwrap(), vec!["done".to_string()]);
}

#[tokio::test]
async fn test_stream_without_result_is_interrupted() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let runner = ScriptedRunner::new(Script::Emit(vec![StreamEvent::text_delta("half an answer")]));
    let mut worker = worker(dir.path(), runner, &recorder);

    Listener::new(dir.path(), "telegram").handle(telegram(1, "hi")).unwrap();

    let summary = worker.run_once(&CancellationToken::new()).await.unwrap().unwrap();
    assert_eq!(summary.outcome, DispatchOutcome::Interrupted);
    assert!(recorder.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_start_leaves_event_pending() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut worker = worker(dir.path(), ScriptedRunner::new(Script::FailToStart), &recorder);

    Listener::new(dir.path(), "telegram").handle(telegram(1, "hi")).unwrap();

    let result = worker.run_once(&CancellationToken::new()).await;
    assert!(matches!(result, Err(RuntimeError::Spawn { .. })));
    assert_eq!(EventQueue::new(dir.path()).pending_count().unwrap(), 1);
}

#[tokio::test]
async fn test_restart_request_ends_run() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut worker = worker(dir.path(), ScriptedRunner::new(success_script()), &recorder);

    Listener::new(dir.path(), "telegram").handle(telegram(1, "/restart")).unwrap();

    let exit = worker.run(CancellationToken::new()).await.unwrap();
    assert_eq!(exit, WorkerExit::Restart);
    assert_eq!(exit.exit_code(), 75);
}

#[tokio::test]
async fn test_shutdown_ends_run() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let mut worker = worker(dir.path(), ScriptedRunner::new(success_script()), &recorder);

    let token = CancellationToken::new();
    let stopper = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        stopper.cancel();
    });

    assert_eq!(worker.run(token).await.unwrap(), WorkerExit::Shutdown);
}

#[tokio::test]
async fn test_second_worker_is_refused() {
    let dir = tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let _first = worker(dir.path(), ScriptedRunner::new(success_script()), &recorder);

    let second = Worker::new(
        dir.path(),
        config(),
        ScriptedRunner::new(success_script()),
        ChannelRegistry::new(),
    );
    assert!(matches!(
        second,
        Err(RuntimeError::Queue(QueueError::ConsumerActive { .. }))
    ));
}
