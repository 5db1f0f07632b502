//! Nickname race tests against the in-process mock server.
//!
//! These check the harness end to end:
//! - A second client started well after the server latency loses the race
//! - Simultaneous starts still produce exactly one welcomed client
//!
//! The mock holds every inbound line for `PROCESSING`, so the server
//! latency L is never zero.
//! - The verdict and exit code follow from the captured replies

use std::time::Duration;

use ircprobe_harness::{
    ExitCodes, MockConfig, MockServer, NickCollision, Report, Timing, VerdictKind,
};

/// Server-side latency L applied to each line before it takes effect.
const PROCESSING: Duration = Duration::from_millis(3);

fn slow_server() -> MockConfig {
    MockConfig { processing_delay: PROCESSING, ..MockConfig::default() }
}

fn fast_timing() -> Timing {
    Timing {
        connect_timeout: Duration::from_secs(1),
        read_timeout: Duration::from_millis(50),
        listen_window: Duration::from_millis(100),
        ceiling: Duration::from_secs(5),
        grace: Duration::from_millis(500),
    }
}

async fn race(server: &MockServer, nick: &str, offset: Duration) -> Report {
    let scenario = NickCollision {
        nick: nick.to_string(),
        offset,
        register_timeout: Duration::from_secs(1),
        ..NickCollision::new(server.endpoint())
    }
    .build(fast_timing())
    .expect("valid scenario");

    scenario.run(ExitCodes::default()).await
}

fn welcomed(report: &Report, client: &str) -> bool {
    report
        .classification
        .observations
        .iter()
        .find(|o| o.client == client)
        .is_some_and(|o| o.holds("welcomed"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_first_client_wins_when_offset_exceeds_latency() {
    let server = MockServer::start(MockConfig {
        reply_delay: Duration::from_millis(2),
        ..slow_server()
    })
    .await
    .expect("mock server");

    // PROPERTY: with offset Δ = 10 L the earlier client wins every time
    let offset = PROCESSING * 10;
    for run in 0..100 {
        let report = race(&server, &format!("first{run}"), offset).await;

        assert_eq!(report.verdict().kind, VerdictKind::Success, "run {run}:\n{report}");
        assert_eq!(report.exit_code(), 0);
        assert!(welcomed(&report, NickCollision::FIRST), "run {run}:\n{report}");
        assert!(!welcomed(&report, NickCollision::SECOND), "run {run}:\n{report}");

        let loser = report.transcript(NickCollision::SECOND).expect("second transcript");
        assert!(loser.received().any(|l| l.contains(" 433 ") && l.contains("already in use")));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_simultaneous_starts_welcome_exactly_one() {
    let server = MockServer::start(slow_server()).await.expect("mock server");

    for run in 0..100 {
        let nick = format!("racer{run}");
        let report = race(&server, &nick, Duration::ZERO).await;

        // PROPERTY: mutual exclusion holds regardless of which client wins
        let winners = [NickCollision::FIRST, NickCollision::SECOND]
            .iter()
            .filter(|c| welcomed(&report, c))
            .count();
        assert_eq!(winners, 1, "run {run} must welcome exactly one client:\n{report}");
        assert_eq!(report.verdict().kind, VerdictKind::Success);
    }
}

#[tokio::test]
async fn test_nick_is_free_again_after_the_run() {
    let server = MockServer::start(MockConfig::default()).await.expect("mock server");

    let first = race(&server, "reused", Duration::from_millis(20)).await;
    assert_eq!(first.verdict().kind, VerdictKind::Success);

    assert!(server.wait_closed(2, Duration::from_secs(2)).await);
    assert_eq!(server.nick_holder("reused").await, None);

    let second = race(&server, "reused", Duration::from_millis(20)).await;
    assert_eq!(second.verdict().kind, VerdictKind::Success, "{second}");
}

#[tokio::test]
async fn test_separate_servers_both_welcome() {
    // Two unlinked servers cannot see each other's claims, which is exactly
    // the over-permissive outcome the scenario must flag.
    let a = MockServer::start(MockConfig::default()).await.expect("mock server");
    let b = MockServer::start(MockConfig::default()).await.expect("mock server");

    let scenario = NickCollision {
        second: b.endpoint(),
        register_timeout: Duration::from_secs(1),
        ..NickCollision::new(a.endpoint())
    }
    .build(fast_timing())
    .expect("valid scenario");

    let report = scenario.run(ExitCodes::distinct()).await;
    assert_eq!(report.verdict().kind, VerdictKind::Failure, "{report}");
    assert_eq!(report.exit_code(), 1);
    assert!(report.verdict().cause.contains("over-permissive"));
}
