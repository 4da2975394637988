//! End-to-end tests of sessions and restarts against a scripted source.

use std::sync::Arc;
use std::time::Duration;

use chainstream_core::memory::{Script, ScriptedSource};
use chainstream_core::pb::bstream::BlockResponseV2;
use chainstream_core::{
    Block, BlockRange, FilterExpression, Interrupt, Phase, RemoteCode, RestartPolicy, Resumer, ResumerConfig,
    StreamError, StreamRequest, StreamSession, TerminationCause,
};

const GRACE: Duration = Duration::from_millis(100);

fn config() -> ResumerConfig {
    ResumerConfig::default()
        .exit_grace(GRACE)
        .restart(RestartPolicy::fixed(Duration::from_secs(3)))
}

fn transient(details: &str) -> StreamError {
    StreamError::remote(RemoteCode::Unavailable, details)
}

fn range(start: u64, stop: u64) -> BlockRange {
    BlockRange::new(start, stop).unwrap()
}

#[tokio::test(start_paused = true)]
async fn clean_range_delivers_contiguous_blocks() {
    let source = Arc::new(ScriptedSource::new([Script::new().blocks(100, 105)]));
    let resumer = Resumer::new(source.clone(), config(), Interrupt::new());

    let mut seen = Vec::new();
    let mut handler = |b: Block| seen.push(u64::from(b.number));
    let report = resumer
        .run_report(range(100, 105), FilterExpression::default(), &mut handler)
        .await;

    assert_eq!(report.cause, TerminationCause::CleanEnd);
    assert_eq!(report.sessions, 1);
    assert_eq!(report.delivered, 6);
    assert_eq!(seen, (100..=105).collect::<Vec<_>>());
    assert_eq!(source.counts().close(), 1);
    assert_eq!(source.counts().release(), 1);
    assert_eq!(source.counts().cancel(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_error_resumes_after_last_delivered() {
    let source = Arc::new(ScriptedSource::new([
        Script::new().blocks(100, 102).error(transient("connection reset")),
        Script::new().blocks(103, 105),
    ]));
    let resumer = Resumer::new(source.clone(), config(), Interrupt::new());
    let filter = FilterExpression::default().exclude("action == \"*\"");

    let mut seen = Vec::new();
    let mut handler = |b: Block| seen.push(u64::from(b.number));
    let report = resumer.run_report(range(100, 105), filter.clone(), &mut handler).await;

    assert_eq!(report.cause, TerminationCause::CleanEnd);
    assert_eq!(report.restarts, 1);
    assert_eq!(seen, vec![100, 101, 102, 103, 104, 105]);

    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], StreamRequest::new(range(100, 105), filter.clone()));
    assert_eq!(requests[1], StreamRequest::new(range(103, 105), filter));
    // every session released its own resources
    assert_eq!(source.counts().close(), 2);
    assert_eq!(source.counts().release(), 2);
}

#[tokio::test(start_paused = true)]
async fn fatal_filter_error_never_restarts() {
    let source = Arc::new(ScriptedSource::new([
        Script::new().error(StreamError::remote(
            RemoteCode::InvalidArgument,
            "unable to create preproc function: syntax error",
        )),
        Script::new().blocks(100, 105),
    ]));
    let resumer = Resumer::new(source.clone(), config(), Interrupt::new());

    let mut handler = |_: Block| {};
    let signal = resumer
        .run(range(100, 105), FilterExpression::new("bad((", ""), &mut handler)
        .await;

    assert!(matches!(signal.get(), Some(TerminationCause::FatalError { .. })));
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn schema_mismatch_ends_the_run() {
    let foreign = BlockResponseV2 {
        block: Some(prost_types::Any {
            type_url: "type.googleapis.com/sf.ethereum.type.v2.Block".into(),
            value: vec![],
        }),
        ..Default::default()
    };
    let source = Arc::new(ScriptedSource::new([
        Script::new().blocks(100, 100).response(foreign).blocks(101, 105),
        Script::new().blocks(101, 105),
    ]));
    let resumer = Resumer::new(source.clone(), config(), Interrupt::new());

    let mut seen = Vec::new();
    let mut handler = |b: Block| seen.push(u64::from(b.number));
    let report = resumer
        .run_report(range(100, 105), FilterExpression::default(), &mut handler)
        .await;

    assert!(matches!(report.cause, TerminationCause::SchemaMismatch { .. }));
    assert_eq!(seen, vec![100]);
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn interrupt_racing_a_stream_error_exits_once() {
    let source = Arc::new(ScriptedSource::new([
        Script::new().blocks(100, 101).error(transient("goaway")),
        Script::new().blocks(102, 105),
    ]));
    let interrupt = Interrupt::new();
    let resumer = Resumer::new(source.clone(), config(), interrupt.clone());

    // The interrupt fires while block 101 is being handled, so it and the
    // stream error are both ready when the session polls next.
    let mut seen = Vec::new();
    let mut handler = |b: Block| {
        seen.push(u64::from(b.number));
        if b.number == 101 {
            interrupt.trigger("SIGINT");
        }
    };
    let report = resumer
        .run_report(range(100, 105), FilterExpression::default(), &mut handler)
        .await;

    assert_eq!(report.cause, TerminationCause::Interrupted { source: "SIGINT".into() });
    assert_eq!(report.sessions, 1);
    assert_eq!(seen, vec![100, 101]);
    assert_eq!(source.requests().len(), 1);
    assert_eq!(source.counts().close(), 1);
    assert_eq!(source.counts().release(), 1);
    assert_eq!(source.counts().cancel(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_echo_does_not_restart() {
    let source = Arc::new(ScriptedSource::new([
        Script::new()
            .blocks(100, 101)
            .error(StreamError::remote(RemoteCode::Unknown, "Cancelled"))
            .blocks(102, 103),
        Script::new().blocks(100, 103),
    ]));
    let resumer = Resumer::new(source.clone(), config(), Interrupt::new());

    let mut seen = Vec::new();
    let mut handler = |b: Block| seen.push(u64::from(b.number));
    let report = resumer
        .run_report(range(100, 103), FilterExpression::default(), &mut handler)
        .await;

    assert_eq!(report.cause, TerminationCause::CleanEnd);
    assert_eq!(report.restarts, 0);
    assert_eq!(seen, vec![100, 101, 102, 103]);
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stream_closing_after_cancellation_resumes_the_rest() {
    let source = Arc::new(ScriptedSource::new([
        Script::new()
            .blocks(100, 101)
            .error(StreamError::remote(RemoteCode::Cancelled, "Cancelled")),
        Script::new().blocks(102, 105),
    ]));
    let resumer = Resumer::new(source.clone(), config(), Interrupt::new());

    let mut seen = Vec::new();
    let mut handler = |b: Block| seen.push(u64::from(b.number));
    let report = resumer
        .run_report(range(100, 105), FilterExpression::default(), &mut handler)
        .await;

    assert_eq!(report.cause, TerminationCause::CleanEnd);
    assert_eq!(report.restarts, 1);
    assert_eq!(seen, (100..=105).collect::<Vec<_>>());
    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].range, range(102, 105));
}

#[tokio::test(start_paused = true)]
async fn stream_closing_after_cancellation_is_never_a_clean_partial_run() {
    let source = Arc::new(ScriptedSource::new([Script::new()
        .blocks(100, 101)
        .error(StreamError::remote(RemoteCode::Cancelled, "Cancelled"))]));
    let config = config().restart(RestartPolicy::fixed(Duration::from_secs(1)).max_restarts(0));
    let resumer = Resumer::new(source.clone(), config, Interrupt::new());

    let mut handler = |_: Block| {};
    let report = resumer
        .run_report(range(100, 105), FilterExpression::default(), &mut handler)
        .await;

    assert!(matches!(report.cause, TerminationCause::TransientError { .. }));
    assert_eq!(report.last_delivered, Some(101));
}

#[tokio::test(start_paused = true)]
async fn interrupt_stops_an_idle_stream() {
    let source = Arc::new(ScriptedSource::new([Script::new().blocks(100, 100).pending()]));
    let interrupt = Interrupt::new();
    let resumer = Resumer::new(source.clone(), config(), interrupt.clone());

    let trigger = interrupt.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.trigger("SIGINT");
    });

    let mut handler = |_: Block| {};
    let signal = resumer
        .run(range(100, 200), FilterExpression::default(), &mut handler)
        .await;

    assert_eq!(signal.get(), Some(TerminationCause::Interrupted { source: "SIGINT".into() }));
    assert_eq!(source.counts().cancel(), 1);
}

#[tokio::test(start_paused = true)]
async fn interrupt_during_backoff_skips_restart() {
    let source = Arc::new(ScriptedSource::new([
        Script::new().blocks(100, 100).error(transient("reset")),
        Script::new().blocks(101, 105),
    ]));
    let interrupt = Interrupt::new();
    let config = config().restart(RestartPolicy::fixed(Duration::from_secs(10)));
    let resumer = Resumer::new(source.clone(), config, interrupt.clone());

    let trigger = interrupt.clone();
    tokio::spawn(async move {
        // after the session's grace interval, inside the 10 s back-off
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.trigger("shutdown");
    });

    let mut handler = |_: Block| {};
    let report = resumer
        .run_report(range(100, 105), FilterExpression::default(), &mut handler)
        .await;

    assert_eq!(report.cause, TerminationCause::Interrupted { source: "shutdown".into() });
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn error_after_stop_block_completes_the_run() {
    let source = Arc::new(ScriptedSource::new([
        Script::new().blocks(100, 105).error(transient("late reset")),
        Script::new().blocks(105, 105),
    ]));
    let resumer = Resumer::new(source.clone(), config(), Interrupt::new());

    let mut handler = |_: Block| {};
    let report = resumer
        .run_report(range(100, 105), FilterExpression::default(), &mut handler)
        .await;

    assert_eq!(report.cause, TerminationCause::CleanEnd);
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_failure_retries_from_same_start() {
    let source = Arc::new(ScriptedSource::new([
        Script::connect_error(StreamError::Connect("connection refused".into())),
        Script::new().blocks(100, 102),
    ]));
    let resumer = Resumer::new(source.clone(), config(), Interrupt::new());

    let mut handler = |_: Block| {};
    let report = resumer
        .run_report(range(100, 102), FilterExpression::default(), &mut handler)
        .await;

    assert_eq!(report.cause, TerminationCause::CleanEnd);
    let requests = source.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].range, range(100, 102));
    // the failed connect had no handle to release
    assert_eq!(source.counts().close(), 1);
}

#[tokio::test(start_paused = true)]
async fn restart_budget_caps_transient_retries() {
    let source = Arc::new(ScriptedSource::new([
        Script::new().error(transient("a")),
        Script::new().error(transient("b")),
        Script::new().error(transient("c")),
        Script::new().blocks(100, 101),
    ]));
    let config = config().restart(RestartPolicy::fixed(Duration::from_millis(10)).max_restarts(2));
    let resumer = Resumer::new(source.clone(), config, Interrupt::new());

    let mut handler = |_: Block| {};
    let report = resumer
        .run_report(range(100, 101), FilterExpression::default(), &mut handler)
        .await;

    assert_eq!(report.cause, TerminationCause::TransientError { detail: "c".into() });
    assert_eq!(report.sessions, 3);
    assert_eq!(report.restarts, 2);
}

#[tokio::test(start_paused = true)]
async fn failing_release_step_does_not_block_the_others() {
    let source = Arc::new(ScriptedSource::new([Script::new().blocks(1, 2)]).failing_close());
    let resumer = Resumer::new(source.clone(), config(), Interrupt::new());

    let mut handler = |_: Block| {};
    let report = resumer
        .run_report(range(1, 2), FilterExpression::default(), &mut handler)
        .await;

    assert_eq!(report.cause, TerminationCause::CleanEnd);
    assert_eq!(source.counts().close(), 1);
    assert_eq!(source.counts().release(), 1);
    assert_eq!(source.counts().cancel(), 1);
}

#[tokio::test(start_paused = true)]
async fn session_waits_grace_then_resolves_its_signal() {
    let source = ScriptedSource::new([Script::new().blocks(7, 8)]);
    let mut session = StreamSession::new(StreamRequest::new(range(7, 8), FilterExpression::default()), GRACE);
    let completion = session.completion();

    let started = tokio::time::Instant::now();
    let mut handler = |_: Block| {};
    let report = session.run(&source, &mut handler, &Interrupt::new()).await;

    assert!(started.elapsed() >= GRACE);
    assert_eq!(session.phase(), Phase::Closed);
    assert_eq!(report.last_delivered, Some(8));
    assert_eq!(report.releases, 3);
    assert_eq!(completion.get(), Some(TerminationCause::CleanEnd));
    assert!(!completion.resolve(TerminationCause::FatalError { detail: "late".into() }));
}

#[tokio::test(start_paused = true)]
async fn failed_connect_runs_no_release_steps() {
    let source = ScriptedSource::new([Script::connect_error(StreamError::Connect("refused".into()))]);
    let mut session = StreamSession::new(StreamRequest::new(range(1, 2), FilterExpression::default()), GRACE);

    let mut handler = |_: Block| {};
    let report = session.run(&source, &mut handler, &Interrupt::new()).await;

    assert!(matches!(report.cause, TerminationCause::TransientError { .. }));
    assert_eq!(report.releases, 0);
    assert_eq!(report.delivered, 0);
}
