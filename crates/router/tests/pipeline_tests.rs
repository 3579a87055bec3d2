//! End-to-end handler tests: document -> registry -> handler -> senders.

mod common;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use critical_core::error::ConfigError;
use critical_core::{HandlerSpec, Record};
use critical_router::suppression::{MatchMode, PatternFilter};
use critical_router::{
    DispatchReport, HandleOutcome, Handler, Registry, RouterError, SuppressionStore, WorkerPool,
};

use common::{QueueSource, Recorder, SharedStore, gelf};

const DOCUMENT: &str = r#"
name: Localhost Only
consumer_specification: syslog
static_filters:
  - kind: source_ip
    ips: ["127.0.0.1"]
formatter:
  kind: copy_field
  field: short_message
senders:
  - kind: recorder
"#;

fn registry_with(recorder: &Recorder) -> Registry {
    let mut registry = Registry::with_defaults();
    let recorder = recorder.clone();
    registry.register_sender("recorder", move |_| Ok(Box::new(recorder.clone())));
    registry
}

fn handler(recorder: &Recorder) -> Handler {
    let spec = HandlerSpec::parse(DOCUMENT).expect("document should parse");
    Handler::from_spec(&spec, &registry_with(recorder)).expect("handler should build")
}

/// Accepted record is delivered exactly once per receiver, rejected one never.
#[tokio::test]
async fn test_source_ip_gate_and_single_delivery() {
    // 1. Handler with one recorder receiver
    let recorder = Recorder::new(&["ops"]);
    let handler = handler(&recorder);

    // 2. Record from an allowed address
    let accepted = Record::from_slice(&gelf("127.0.0.1", "disk full")).unwrap();
    let outcome = handler.handle(&accepted).await;
    assert!(!outcome.is_filtered());
    assert_eq!(recorder.calls(), vec![("ops".to_owned(), "disk full".to_owned())]);

    // 3. Record from any other address produces no calls
    let rejected = Record::from_slice(&gelf("10.0.0.1", "disk full")).unwrap();
    let outcome = handler.handle(&rejected).await;
    assert_eq!(outcome, HandleOutcome::Filtered { filter: "source_ip" });
    assert_eq!(recorder.calls().len(), 1);
}

/// Group id derives from topic and sanitized name.
#[test]
fn test_group_id_from_document() {
    let handler = handler(&Recorder::new(&["ops"]));
    assert_eq!(handler.group_id(), "syslog:localhostonly");
    assert_eq!(handler.consumer_specification(), "syslog");
}

/// Unknown kinds fail construction and name the kind.
#[test]
fn test_unknown_sender_kind_is_fatal() {
    let spec = HandlerSpec::parse(&DOCUMENT.replace("kind: recorder", "kind: carrier_pigeon"))
        .expect("document should parse");

    let err = Handler::from_spec(&spec, &Registry::with_defaults()).unwrap_err();

    assert!(matches!(
        err,
        RouterError::Config(ConfigError::UnknownKind { component: "sender", ref kind })
            if kind == "carrier_pigeon"
    ));
}

/// Suppression rules added at runtime take effect on the next record.
#[tokio::test]
async fn test_dynamic_suppression_applies_per_receiver() {
    let store = SharedStore::default();
    let recorder = Recorder::new(&["ops", "noc"]);
    let handler = critical_router::HandlerBuilder::new("dyn", "syslog")
        .formatter(Box::new(critical_router::formatter::CopyFieldFormatter::new(
            "short_message",
        )))
        .dynamic_filter(Box::new(PatternFilter::new(
            "shared",
            store.clone(),
            MatchMode::Regex,
        )))
        .sender(Box::new(recorder.clone()), Vec::new())
        .build()
        .unwrap();
    let record = Record::from_slice(&gelf("127.0.0.1", "eth3: link down")).unwrap();

    // 1. No rules: both receivers get the message
    let HandleOutcome::Dispatched(first) = handler.handle(&record).await else {
        panic!("record should be dispatched");
    };
    assert_eq!(first[0].report.delivered, 2);

    // 2. Operator silences link flaps for noc only
    assert!(store.add("rec_noc", r"eth\d+: link down").await.unwrap());
    let HandleOutcome::Dispatched(second) = handler.handle(&record).await else {
        panic!("record should be dispatched");
    };
    assert_eq!(
        second[0].report,
        DispatchReport { delivered: 1, suppressed: 1, failed: 0 }
    );

    // 3. Rule removed: delivered again
    assert!(store.remove("rec_noc", r"eth\d+: link down").await.unwrap());
    let HandleOutcome::Dispatched(third) = handler.handle(&record).await else {
        panic!("record should be dispatched");
    };
    assert_eq!(third[0].report.delivered, 2);
}

/// Stop after a failed start releases the senders and reports success.
#[tokio::test]
async fn test_stop_after_failed_start() {
    let recorder = Recorder::new(&["ops"]);
    let mut handler = critical_router::HandlerBuilder::new("broken", "syslog")
        .formatter(Box::new(critical_router::formatter::CopyFieldFormatter::new(
            "short_message",
        )))
        .dynamic_filter(Box::new(PatternFilter::new(
            "down",
            SharedStore::refusing(),
            MatchMode::Substring,
        )))
        .sender(Box::new(recorder.clone()), Vec::new())
        .build()
        .unwrap();

    assert!(matches!(handler.start().await, Err(RouterError::Store { .. })));
    handler.stop().await.unwrap();
    assert_eq!(recorder.stops(), 1);
}

/// Full path: queue source -> pool -> handler -> recorder.
#[tokio::test]
async fn test_pool_delivers_from_every_partition() {
    let recorder = Recorder::new(&["ops"]);
    let handler = handler(&recorder);

    let source = QueueSource::new(3);
    for i in 0..6 {
        source.push(gelf("127.0.0.1", &format!("alert {i}")));
    }
    source.push(gelf("10.1.1.1", "filtered"));
    source.push(bytes::Bytes::from_static(b"{\"truncated\": "));
    let state = std::sync::Arc::clone(&source.state);

    let pool = WorkerPool::spawn(source).await.unwrap();
    assert_eq!(pool.worker_count(), 3);

    let shutdown = CancellationToken::new();
    let (stats, ()) = tokio::join!(pool.run(&handler, shutdown.clone()), async {
        for _ in 0..200 {
            if recorder.calls().len() == 6 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
    });

    let mut delivered: Vec<String> = recorder.calls().into_iter().map(|(_, text)| text).collect();
    delivered.sort();
    assert_eq!(
        delivered,
        (0..6).map(|i| format!("alert {i}")).collect::<Vec<_>>()
    );

    assert_eq!(stats.len(), 3);
    assert_eq!(stats.iter().map(|s| s.received).sum::<u64>(), 8);
    assert_eq!(stats.iter().map(|s| s.dispatched).sum::<u64>(), 6);
    assert_eq!(stats.iter().map(|s| s.filtered).sum::<u64>(), 1);
    assert_eq!(stats.iter().map(|s| s.decode_errors).sum::<u64>(), 1);
    assert_eq!(state.running.load(std::sync::atomic::Ordering::SeqCst), 0);
}

/// A fork failure stops the parent and every unit forked before it.
#[tokio::test]
async fn test_fork_failure_releases_units() {
    let source = QueueSource::new(5).fail_fork_after(2);
    let state = std::sync::Arc::clone(&source.state);

    let err = WorkerPool::spawn(source).await.unwrap_err();

    assert!(matches!(err, RouterError::Stream { .. }));
    assert_eq!(state.forks.load(std::sync::atomic::Ordering::SeqCst), 3);
    assert_eq!(state.running.load(std::sync::atomic::Ordering::SeqCst), 0);
}
