//! End-to-end tests across capture, processing and aggregation.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;
use synheart_activity_pipeline::collector::{ChannelSource, ForegroundChange, RawEvent};
use synheart_activity_pipeline::config::{Config, SourceConfig};
use synheart_activity_pipeline::core::{EmbeddingRecord, InputLog, LogCategory};
use synheart_activity_pipeline::embedding::{EmbeddingError, EmbeddingService, HashingEmbedder};
use synheart_activity_pipeline::launch::{capture_with, run_role, Role, RoleOptions, RoleReport};
use synheart_activity_pipeline::pipeline::{AggregationWindow, Aggregator, ClaimOutcome, Processor};
use synheart_activity_pipeline::store::LogStore;
use synheart_activity_pipeline::transparency::create_shared_log;
use tempfile::TempDir;

/// Records every text it is asked to embed.
#[derive(Default)]
struct RecordingEmbedder {
    calls: Mutex<Vec<String>>,
}

impl EmbeddingService for RecordingEmbedder {
    fn model_name(&self) -> &str {
        "recording"
    }

    fn dims(&self) -> usize {
        1
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.lock().unwrap().push(text.to_string());
        Ok(vec![text.len() as f32])
    }
}

struct FailingEmbedder;

impl EmbeddingService for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    fn dims(&self) -> usize {
        1
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Service("service unavailable".into()))
    }
}

fn config_in(dir: &TempDir, sources: &str) -> Config {
    Config {
        data_path: dir.path().to_path_buf(),
        sources: SourceConfig::from_csv(sources),
        ..Config::default()
    }
}

/// Run a capture session over pre-queued events and stop it.
fn capture(config: &Config, source: ChannelSource) {
    let running = AtomicBool::new(false);
    capture_with(source, config, create_shared_log(), &running).unwrap();
}

fn write_pending(store: &LogStore, name: &str, texts: &[&str]) {
    let mut content = String::new();
    for text in texts {
        let log = InputLog::from_plain(LogCategory::Keyboard, text, Utc::now());
        content.push_str(&serde_json::to_string(&log).unwrap());
        content.push('\n');
    }
    store.append(&format!("pending/{name}"), &content).unwrap();
}

fn read_embeddings(store: &LogStore) -> Vec<EmbeddingRecord> {
    store
        .list("embeddings/*.embeddings.jsonl")
        .unwrap()
        .iter()
        .flat_map(|file| {
            store
                .read_all(file)
                .lines()
                .map(|line| serde_json::from_str::<EmbeddingRecord>(line).unwrap())
                .collect::<Vec<_>>()
        })
        .collect()
}

#[test]
fn test_typed_sentence_embedded_once() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "keyboard");

    let source = ChannelSource::new();
    for c in ['h', 'i', '.', ' '] {
        source.push(RawEvent::Text(c));
    }
    capture(&config, source);

    let store = LogStore::open(config.store_path()).unwrap();
    let pending = store.list("pending/*.jsonl").unwrap();
    assert_eq!(pending.len(), 1);
    // At rest the sentence is obfuscated
    assert!(store.read_all(&pending[0]).contains("\"uv.\""));

    let embedder = RecordingEmbedder::default();
    let report = Processor::new(&store, &embedder, 8)
        .run(&LogCategory::ALL)
        .unwrap();

    assert_eq!(*embedder.calls.lock().unwrap(), vec!["hi.".to_string()]);
    assert_eq!(report.records_embedded, 1);
    assert_eq!(store.list("completed/*.jsonl").unwrap().len(), 1);

    let records = read_embeddings(&store);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].source_text, "uv.");
    assert_eq!(records[0].plain_source_text(), "hi.");
    assert_eq!(records[0].model, "recording");
}

#[test]
fn test_window_changes_embedded_with_title_and_process() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "window");

    let source = ChannelSource::new();
    source.push(RawEvent::Foreground(
        ForegroundChange::new(1)
            .with_title("Inbox")
            .with_process("mail.exe"),
    ));
    source.push(RawEvent::Foreground(ForegroundChange::new(1).with_title("Inbox")));
    source.push(RawEvent::Foreground(ForegroundChange::new(2)));
    capture(&config, source);

    let store = LogStore::open(config.store_path()).unwrap();
    let embedder = RecordingEmbedder::default();
    Processor::new(&store, &embedder, 8)
        .run(&[LogCategory::Window])
        .unwrap();

    // One record per notification; missing metadata falls back
    assert_eq!(
        *embedder.calls.lock().unwrap(),
        vec!["Inbox - mail.exe", "Inbox - unknown", "unknown"]
    );
}

#[test]
fn test_concurrent_claims_have_one_winner() {
    let dir = TempDir::new().unwrap();
    let store = LogStore::open(dir.path()).unwrap();
    write_pending(&store, "keyboard-20240101T000000000Z-1.jsonl", &["a."]);

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let embedder = HashingEmbedder::new(4);
                let processor = Processor::new(&store, &embedder, 8);
                barrier.wait();
                processor
                    .claim("pending/keyboard-20240101T000000000Z-1.jsonl")
                    .unwrap()
            })
        })
        .collect();

    let outcomes: Vec<ClaimOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = outcomes
        .iter()
        .filter(|o| matches!(o, ClaimOutcome::Claimed(_)))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(outcomes.len() - winners, workers - 1);
}

#[test]
fn test_parallel_processors_complete_each_segment_once() {
    let dir = TempDir::new().unwrap();
    let store = LogStore::open(dir.path()).unwrap();
    let segments = 12;
    for i in 0..segments {
        write_pending(
            &store,
            &format!("keyboard-20240101T0000{i:02}000Z-1.jsonl"),
            &["one.", "two."],
        );
    }

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                let embedder = HashingEmbedder::new(4);
                Processor::new(&store, &embedder, 8)
                    .run(&[LogCategory::Keyboard])
                    .unwrap()
            })
        })
        .collect();
    let reports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let completed: u64 = reports.iter().map(|r| r.completed).sum();
    let embedded: u64 = reports.iter().map(|r| r.records_embedded).sum();
    assert_eq!(completed, segments);
    assert_eq!(embedded, segments * 2);
    assert!(reports.iter().all(|r| r.failures.is_empty()));
    assert_eq!(store.list("completed/*.jsonl").unwrap().len(), segments as usize);
    assert_eq!(read_embeddings(&store).len(), (segments * 2) as usize);
}

#[test]
fn test_restart_recovers_unsealed_segment() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "keyboard");
    let store = LogStore::open(config.store_path()).unwrap();

    // A previous capture died after writing one record
    let log = InputLog::from_plain(LogCategory::Keyboard, "before crash.", Utc::now());
    store
        .append(
            "active/keyboard-20240101T000000000Z-999.jsonl",
            &format!("{}\n", serde_json::to_string(&log).unwrap()),
        )
        .unwrap();

    let source = ChannelSource::new();
    source.push_text("after restart.\n");
    capture(&config, source);

    assert!(store.list("active/*.jsonl").unwrap().is_empty());
    assert_eq!(store.list("pending/*.jsonl").unwrap().len(), 2);

    let embedder = RecordingEmbedder::default();
    Processor::new(&store, &embedder, 8)
        .run(&[LogCategory::Keyboard])
        .unwrap();
    let mut calls = embedder.calls.lock().unwrap().clone();
    calls.sort();
    assert_eq!(calls, vec!["after restart.", "before crash."]);
}

#[test]
fn test_embedding_failure_keeps_claim_until_reclaimed() {
    let dir = TempDir::new().unwrap();
    let store = LogStore::open(dir.path()).unwrap();
    write_pending(&store, "keyboard-a.jsonl", &["x.", "y."]);

    let report = Processor::new(&store, &FailingEmbedder, 8)
        .run(&[LogCategory::Keyboard])
        .unwrap();
    assert_eq!(report.failures.len(), 1);
    assert!(store.exists("inprogress/keyboard-a.jsonl"));
    assert!(store.list("embeddings/*").unwrap().is_empty());

    // Without reclaim, the claim is left alone
    let embedder = HashingEmbedder::new(4);
    let processor = Processor::new(&store, &embedder, 8);
    let report = processor.run(&[LogCategory::Keyboard]).unwrap();
    assert_eq!(report.claimed, 0);

    assert_eq!(processor.reclaim_stale(Duration::ZERO).unwrap(), 1);
    let report = processor.run(&[LogCategory::Keyboard]).unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(read_embeddings(&store).len(), 2);
}

#[test]
fn test_batched_vectors_follow_record_order() {
    let dir = TempDir::new().unwrap();
    let store = LogStore::open(dir.path()).unwrap();
    let texts = ["alpha.", "beta.", "gamma.", "delta.", "epsilon."];
    write_pending(&store, "keyboard-a.jsonl", &texts);

    let embedder = HashingEmbedder::new(32);
    Processor::new(&store, &embedder, 2)
        .run(&[LogCategory::Keyboard])
        .unwrap();

    let records = read_embeddings(&store);
    assert_eq!(records.len(), texts.len());
    for (record, text) in records.iter().zip(texts) {
        assert_eq!(record.plain_source_text(), text);
        assert_eq!(record.vector, embedder.embed(text).unwrap());
    }
}

#[test]
fn test_aggregation_is_byte_identical_on_rerun() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "all");
    let source = ChannelSource::new();
    source.push_text("first sentence. second one! ");
    source.push(RawEvent::Click);
    source.push(RawEvent::Foreground(ForegroundChange::new(7).with_title("Editor")));
    capture(&config, source);

    let store = LogStore::open(config.store_path()).unwrap();
    let embedder = HashingEmbedder::new(16);
    Processor::new(&store, &embedder, 4)
        .run(&LogCategory::ALL)
        .unwrap();

    let now = Utc::now();
    let window = AggregationWindow::new(now - ChronoDuration::hours(1), now + ChronoDuration::hours(1))
        .unwrap();
    let aggregator = Aggregator::new(&store, "test-host");

    let first = aggregator.aggregate(window).unwrap();
    let first_bytes = store.read_all(&first.path);
    let second = aggregator.aggregate(window).unwrap();
    let second_bytes = store.read_all(&second.path);

    assert_eq!(first.path, second.path);
    assert_eq!(first_bytes, second_bytes);
    assert_eq!(first.artifact.counts[&LogCategory::Keyboard], 2);
    assert_eq!(first.artifact.counts[&LogCategory::Window], 1);
    assert_eq!(first.artifact.counts[&LogCategory::Mouse], 1);
    assert_eq!(first.artifact.device, "test-host");
}

#[test]
fn test_aggregation_excludes_records_outside_window() {
    let dir = TempDir::new().unwrap();
    let store = LogStore::open(dir.path()).unwrap();
    write_pending(&store, "keyboard-a.jsonl", &["now."]);
    let embedder = HashingEmbedder::new(4);
    Processor::new(&store, &embedder, 4)
        .run(&[LogCategory::Keyboard])
        .unwrap();

    let window = AggregationWindow::new(
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2000, 1, 2, 0, 0, 0).unwrap(),
    )
    .unwrap();
    let outcome = Aggregator::new(&store, "h").aggregate(window).unwrap();
    assert_eq!(outcome.artifact.total_records, 0);
    assert!(outcome.path.ends_with("20000101T000000Z_20000102T000000Z.json"));
}

#[test]
fn test_process_and_aggregate_roles() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir, "keyboard");
    let store = LogStore::open(config.store_path()).unwrap();
    write_pending(&store, "keyboard-a.jsonl", &["role test."]);

    let report = run_role(Role::Process, &config, &RoleOptions::default()).unwrap();
    assert!(report.succeeded());
    match report {
        RoleReport::Process(report) => assert_eq!(report.records_embedded, 1),
        other => panic!("unexpected report {other:?}"),
    }

    let now = Utc::now();
    let options = RoleOptions {
        window: Some(
            AggregationWindow::new(now - ChronoDuration::hours(1), now + ChronoDuration::hours(1))
                .unwrap(),
        ),
        ..RoleOptions::default()
    };
    match run_role(Role::Aggregate, &config, &options).unwrap() {
        RoleReport::Aggregate(outcome) => {
            assert_eq!(outcome.artifact.total_records, 1);
            assert!(store.exists(&outcome.path));
        }
        other => panic!("unexpected report {other:?}"),
    }
}

#[test]
fn test_invalid_config_rejected_before_running() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, "keyboard");
    config.processing.batch_size = 0;
    assert!(run_role(Role::Process, &config, &RoleOptions::default()).is_err());
}
