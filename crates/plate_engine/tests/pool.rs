use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plate_core::{
    Candidate, CheckResult, EventPayload, LengthBounds, Notice, ProbeOutcome, RunOutcome,
    StreamEvent, Verdict, WorkerId,
};
use plate_engine::{
    CandidateSource, Clock, Connector, InitError, PoolConfig, PoolError, PoolHandle, Prober,
    ProbeSettings, ReqwestConnector, SourceError,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logging() {
    engine_logging::initialize_for_tests();
}

fn fixed_clock() -> Clock {
    Arc::new(|| "2026-01-01T00:00:00+00:00".to_string())
}

fn config(concurrency: usize) -> PoolConfig {
    PoolConfig {
        concurrency,
        clock: fixed_clock(),
    }
}

/// Source over a fixed list that records every candidate it hands out.
struct RecordingSource {
    pending: VecDeque<Candidate>,
    pulled: Arc<Mutex<Vec<String>>>,
}

impl RecordingSource {
    fn new(items: &[&str]) -> (Self, Arc<Mutex<Vec<String>>>) {
        let pulled = Arc::new(Mutex::new(Vec::new()));
        let pending = items
            .iter()
            .map(|raw| Candidate::parse(raw, LengthBounds::default()).unwrap())
            .collect();
        (
            Self {
                pending,
                pulled: pulled.clone(),
            },
            pulled,
        )
    }

    fn numbered(count: usize) -> (Self, Arc<Mutex<Vec<String>>>) {
        let names: Vec<String> = (0..count).map(|i| format!("P{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        Self::new(&refs)
    }
}

impl CandidateSource for RecordingSource {
    fn next_candidate(&mut self) -> Result<Option<Candidate>, SourceError> {
        let next = self.pending.pop_front();
        if let Some(candidate) = &next {
            self.pulled.lock().unwrap().push(candidate.to_string());
        }
        Ok(next)
    }
}

/// Yields its candidates, then fails once, then is exhausted.
struct FailingSource {
    pending: VecDeque<Candidate>,
    failed: bool,
}

impl CandidateSource for FailingSource {
    fn next_candidate(&mut self) -> Result<Option<Candidate>, SourceError> {
        if let Some(candidate) = self.pending.pop_front() {
            return Ok(Some(candidate));
        }
        if !self.failed {
            self.failed = true;
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "list truncated").into());
        }
        Ok(None)
    }
}

#[derive(Default, Clone)]
struct ScriptedConnector {
    failing_workers: HashSet<WorkerId>,
    available: HashSet<String>,
    panic_on: Option<String>,
    delay: Duration,
    slow: HashSet<String>,
}

struct ScriptedProber {
    script: ScriptedConnector,
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, worker: WorkerId) -> Result<Box<dyn Prober>, InitError> {
        if self.failing_workers.contains(&worker) {
            return Err(InitError::UnexpectedStatus(503));
        }
        Ok(Box::new(ScriptedProber {
            script: self.clone(),
        }))
    }
}

#[async_trait::async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, candidate: &Candidate) -> ProbeOutcome {
        if self.script.slow.contains(candidate.as_str()) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        } else if self.script.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.script.delay).await;
        }
        if self.script.panic_on.as_deref() == Some(candidate.as_str()) {
            panic!("scripted failure for {candidate}");
        }
        if self.script.available.contains(candidate.as_str()) {
            ProbeOutcome::available()
        } else {
            ProbeOutcome::unavailable()
        }
    }
}

async fn collect(handle: &PoolHandle) -> Vec<StreamEvent> {
    let mut subscription = handle.subscribe();
    let mut events = Vec::new();
    while let Some(event) = subscription.next().await {
        events.push(event);
    }
    events
}

fn results(events: &[StreamEvent]) -> Vec<&CheckResult> {
    events.iter().filter_map(StreamEvent::as_result).collect()
}

fn notices(events: &[StreamEvent]) -> Vec<&Notice> {
    events.iter().filter_map(StreamEvent::as_notice).collect()
}

#[tokio::test]
async fn every_candidate_is_checked_once_with_running_totals() {
    init_logging();
    let (source, pulled) = RecordingSource::numbered(200);
    let connector = ScriptedConnector {
        available: ["P7", "P42"].iter().map(|s| s.to_string()).collect(),
        ..ScriptedConnector::default()
    };

    let handle = PoolHandle::start(Box::new(source), Arc::new(connector), config(4)).unwrap();
    let events = collect(&handle).await;
    let summary = handle.finish().await.unwrap();

    let ids: Vec<_> = events.iter().map(|e| e.sequence_id).collect();
    let expected_ids: Vec<_> = (1..=events.len() as u64).collect();
    assert_eq!(ids, expected_ids);

    let results = results(&events);
    assert_eq!(results.len(), 200);
    for (index, result) in results.iter().enumerate() {
        assert_eq!(result.running_total_checked, index as u64 + 1);
    }

    let checked: HashSet<_> = results.iter().map(|r| r.candidate.to_string()).collect();
    let consumed = pulled.lock().unwrap().clone();
    let consumed_set: HashSet<_> = consumed.iter().cloned().collect();
    assert_eq!(consumed.len(), 200);
    assert_eq!(consumed_set.len(), 200);
    assert_eq!(checked, consumed_set);

    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert_eq!(summary.checked, 200);
    assert_eq!(summary.available, vec!["P42".to_string(), "P7".to_string()]);
    assert_eq!(summary.unavailable, 198);
    assert_eq!(summary.last_sequence_id, events.len() as u64);
}

#[tokio::test]
async fn each_result_is_preceded_by_its_checking_event() {
    let (source, _) = RecordingSource::numbered(30);
    let handle = PoolHandle::start(
        Box::new(source),
        Arc::new(ScriptedConnector::default()),
        config(3),
    )
    .unwrap();
    let events = collect(&handle).await;
    handle.finish().await.unwrap();

    let mut checking = HashMap::new();
    for event in &events {
        match &event.payload {
            EventPayload::Checking { worker, candidate } => {
                checking.insert(candidate.to_string(), (*worker, event.sequence_id));
            }
            EventPayload::Result(result) => {
                let (worker, seq) = checking[result.candidate.as_str()];
                assert_eq!(worker, result.worker);
                assert!(seq < event.sequence_id);
                assert_eq!(result.timestamp, "2026-01-01T00:00:00+00:00");
            }
            EventPayload::Notice(_) => {}
        }
    }
    assert_eq!(checking.len(), 30);
}

#[tokio::test]
async fn empty_source_emits_only_the_two_notices() {
    let (source, _) = RecordingSource::new(&[]);
    let handle = PoolHandle::start(
        Box::new(source),
        Arc::new(ScriptedConnector::default()),
        config(2),
    )
    .unwrap();
    let events = collect(&handle).await;
    let summary = handle.finish().await.unwrap();

    let payloads: Vec<_> = events.into_iter().map(|e| e.payload).collect();
    assert_eq!(
        payloads,
        vec![
            EventPayload::Notice(Notice::Initializing { sessions: 2 }),
            EventPayload::Notice(Notice::Ready { workers: 2 }),
        ]
    );
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert!(summary.available.is_empty());
    assert_eq!(summary.checked, 0);
}

#[tokio::test]
async fn all_sessions_failing_ends_with_one_terminal_notice() {
    init_logging();
    let (source, pulled) = RecordingSource::new(&["ABC", "XYZ"]);
    let connector = ScriptedConnector {
        failing_workers: [0, 1, 2].into_iter().collect(),
        ..ScriptedConnector::default()
    };
    let handle = PoolHandle::start(Box::new(source), Arc::new(connector), config(3)).unwrap();
    let events = collect(&handle).await;
    let err = handle.finish().await.unwrap_err();

    assert!(results(&events).is_empty());
    let terminal: Vec<_> = notices(&events)
        .into_iter()
        .filter(|notice| matches!(notice, Notice::PoolInitFailed { .. }))
        .collect();
    assert_eq!(terminal.len(), 1);
    assert!(events.last().unwrap().as_notice().unwrap().is_terminal());
    assert!(matches!(err, PoolError::AllSessionsFailed { attempted: 3, .. }));
    assert!(pulled.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_sessions_reduce_worker_count_only() {
    let (source, _) = RecordingSource::numbered(40);
    let connector = ScriptedConnector {
        failing_workers: [1].into_iter().collect(),
        ..ScriptedConnector::default()
    };
    let handle = PoolHandle::start(Box::new(source), Arc::new(connector), config(3)).unwrap();
    let events = collect(&handle).await;
    let summary = handle.finish().await.unwrap();

    assert!(notices(&events).contains(&&Notice::Ready { workers: 2 }));
    let results = results(&events);
    assert_eq!(results.len(), 40);
    assert!(results.iter().all(|r| r.worker != 1));
    assert_eq!(summary.outcome, RunOutcome::Completed);
}

#[tokio::test]
async fn cancellation_stops_pulling_and_closes_the_stream() {
    init_logging();
    let (source, pulled) = RecordingSource::numbered(500);
    let connector = ScriptedConnector {
        delay: Duration::from_millis(2),
        ..ScriptedConnector::default()
    };
    let concurrency = 3;
    let handle = PoolHandle::start(
        Box::new(source),
        Arc::new(connector),
        config(concurrency),
    )
    .unwrap();

    let mut subscription = handle.subscribe();
    let mut events = Vec::new();
    let mut checked_at_cancel = None;
    while let Some(event) = subscription.next().await {
        let is_result = event.as_result().is_some();
        events.push(event);
        if is_result && checked_at_cancel.is_none() && results(&events).len() == 10 {
            handle.cancel();
            checked_at_cancel = Some(handle.checked());
        }
    }
    let summary = handle.finish().await.unwrap();

    let checked_at_cancel = checked_at_cancel.expect("cancelled mid-run");
    let results = results(&events);
    assert!(results.len() as u64 <= checked_at_cancel + concurrency as u64);
    assert!(results.len() < 500);

    // Every pulled candidate was reported and nothing unpulled was.
    let consumed: HashSet<_> = pulled.lock().unwrap().iter().cloned().collect();
    let reported: HashSet<_> = results.iter().map(|r| r.candidate.to_string()).collect();
    assert_eq!(consumed, reported);

    assert_eq!(
        events.last().unwrap().payload,
        EventPayload::Notice(Notice::Cancelled)
    );
    assert_eq!(summary.outcome, RunOutcome::Cancelled);
    assert_eq!(summary.checked, results.len() as u64);
}

#[tokio::test]
async fn dropping_the_handle_cancels_the_run() {
    let (source, _) = RecordingSource::numbered(100);
    let connector = ScriptedConnector {
        delay: Duration::from_millis(5),
        ..ScriptedConnector::default()
    };
    let handle = PoolHandle::start(Box::new(source), Arc::new(connector), config(2)).unwrap();
    let token = handle.cancel_token();
    let mut subscription = handle.subscribe();
    drop(handle);

    assert!(token.is_cancelled());
    // The stream still closes on its own.
    let mut last = None;
    while let Some(event) = subscription.next().await {
        last = Some(event);
    }
    assert_eq!(last.unwrap().payload, EventPayload::Notice(Notice::Cancelled));
}

#[tokio::test]
async fn panicking_probe_becomes_an_error_result() {
    let (source, _) = RecordingSource::new(&["OK1", "BOOM", "OK2"]);
    let connector = ScriptedConnector {
        panic_on: Some("BOOM".to_string()),
        ..ScriptedConnector::default()
    };
    let handle = PoolHandle::start(Box::new(source), Arc::new(connector), config(1)).unwrap();
    let events = collect(&handle).await;
    let summary = handle.finish().await.unwrap();

    let results = results(&events);
    let verdicts: Vec<_> = results
        .iter()
        .map(|r| (r.candidate.to_string(), r.verdict))
        .collect();
    assert_eq!(
        verdicts,
        vec![
            ("OK1".to_string(), Verdict::Unavailable),
            ("BOOM".to_string(), Verdict::Error),
            ("OK2".to_string(), Verdict::Unavailable),
        ]
    );
    assert!(results[1]
        .error_detail
        .as_deref()
        .unwrap()
        .contains("scripted failure for BOOM"));
    assert_eq!(summary.errors, 1);
}

#[tokio::test]
async fn source_failure_is_reported_and_the_pool_still_closes() {
    let source = FailingSource {
        pending: ["AAA", "BBB"]
            .iter()
            .map(|raw| Candidate::parse(raw, LengthBounds::default()).unwrap())
            .collect(),
        failed: false,
    };
    // BBB is still in flight on the other worker when the source fails.
    let connector = ScriptedConnector {
        slow: ["BBB".to_string()].into_iter().collect(),
        ..ScriptedConnector::default()
    };
    let handle = PoolHandle::start(Box::new(source), Arc::new(connector), config(2)).unwrap();
    let events = collect(&handle).await;
    let summary = handle.finish().await.unwrap();

    assert_eq!(results(&events).len(), 2);
    let failures: Vec<_> = notices(&events)
        .into_iter()
        .filter(|notice| matches!(notice, Notice::SourceFailed { .. }))
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].to_string().contains("list truncated"));

    let failed_at = events
        .iter()
        .position(|e| matches!(e.as_notice(), Some(Notice::SourceFailed { .. })))
        .unwrap();
    assert!(events[failed_at..].iter().any(|e| e.as_result().is_some()));

    let last = events.last().unwrap().as_notice().expect("ends on a notice");
    assert!(last.is_terminal());
    assert!(matches!(last, Notice::SourceAborted { detail } if detail.contains("list truncated")));
    let terminal = notices(&events).iter().filter(|n| n.is_terminal()).count();
    assert_eq!(terminal, 1);
    assert_eq!(summary.outcome, RunOutcome::SourceFailed);
}

#[tokio::test]
async fn subscribers_can_resume_after_a_sequence_id() {
    let (source, _) = RecordingSource::numbered(12);
    let handle = PoolHandle::start(
        Box::new(source),
        Arc::new(ScriptedConnector::default()),
        config(2),
    )
    .unwrap();
    let all = collect(&handle).await;

    let mut resumed = handle.subscribe_after(5);
    let mut tail = Vec::new();
    while let Some(event) = resumed.next().await {
        tail.push(event);
    }
    assert_eq!(tail, all[5..].to_vec());
    assert_eq!(resumed.cursor(), all.last().unwrap().sequence_id);
    assert_eq!(handle.events_after(5), all[5..].to_vec());
    assert_eq!(handle.last_sequence_id(), all.len() as u64);

    handle.finish().await.unwrap();
}

#[tokio::test]
async fn zero_concurrency_is_rejected() {
    let (source, _) = RecordingSource::new(&["ABC"]);
    let result = PoolHandle::start(
        Box::new(source),
        Arc::new(ScriptedConnector::default()),
        config(0),
    );
    assert!(matches!(result, Err(PoolError::InvalidConcurrency)));
}

#[tokio::test]
async fn live_endpoint_scenario_reports_abc_available() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/plates/acknowledge"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("set-cookie", "JSESSIONID=live; Path=/"),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/plates/check"))
        .and(body_string_contains("plateChar0=A&plateChar1=B&plateChar2=C&plateChar3=&"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":"AVAILABLE"}"#))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/plates/check"))
        .and(body_string_contains("plateChar0=X&plateChar1=Y&plateChar2=Z&plateChar3=&"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":"TAKEN"}"#))
        .mount(&server)
        .await;

    let settings = ProbeSettings {
        base_url: server.uri(),
        ..ProbeSettings::default()
    };
    let connector = ReqwestConnector::new(settings, 2).unwrap();
    let (source, _) = RecordingSource::new(&["ABC", "XYZ"]);
    let handle = PoolHandle::start(Box::new(source), Arc::new(connector), config(2)).unwrap();
    let events = collect(&handle).await;
    let summary = handle.finish().await.unwrap();

    let mut verdicts: Vec<_> = results(&events)
        .iter()
        .map(|r| (r.candidate.to_string(), r.verdict))
        .collect();
    verdicts.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        verdicts,
        vec![
            ("ABC".to_string(), Verdict::Available),
            ("XYZ".to_string(), Verdict::Unavailable),
        ]
    );
    assert_eq!(summary.available, vec!["ABC".to_string()]);
}

#[tokio::test]
async fn subscription_works_as_a_stream_and_snapshots_track_it() {
    use futures_util::StreamExt;

    let (source, _) = RecordingSource::new(&["AA1", "BB2", "CC3"]);
    let connector = ScriptedConnector {
        available: ["BB2".to_string()].into_iter().collect(),
        ..ScriptedConnector::default()
    };
    let handle = PoolHandle::start(Box::new(source), Arc::new(connector), config(2)).unwrap();

    let events: Vec<StreamEvent> = handle.subscribe().into_stream().collect().await;
    assert_eq!(results(&events).len(), 3);
    assert_eq!(handle.available(), vec!["BB2".to_string()]);
    assert_eq!(handle.checked(), 3);

    let summary = handle.finish().await.unwrap();
    assert_eq!(summary.available, vec!["BB2".to_string()]);
}
