//! Orchestrator integration tests
//!
//! These tests verify the properties the verdict depends on:
//! - Each transcript holds only its own client's traffic
//! - No client outlives its ceiling, and its connection is released
//! - Bytes after the last line terminator are kept when the peer hangs up
//! - Start offsets are measured after every client has connected

use std::time::{Duration, Instant};

use ircprobe_client::{ClientOutcome, ClientScript, Direction, Endpoint};
use ircprobe_harness::{
    Behavior, ClientSpec, MockConfig, MockServer, Orchestrator, ScenarioPlan, Timing,
};
use ircprobe_proto::Pattern;
use tokio::{io::AsyncReadExt, net::TcpListener};

fn timing(ceiling: Duration) -> Timing {
    Timing {
        connect_timeout: Duration::from_secs(1),
        read_timeout: Duration::from_millis(100),
        listen_window: Duration::from_millis(200),
        ceiling,
        grace: Duration::from_millis(200),
    }
}

fn register(nick: &str, timeout: Duration) -> ClientScript {
    ClientScript::new()
        .nick(nick)
        .user(nick, "Test User")
        .expect(vec![Pattern::Numeric(1)], timeout)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transcripts_are_isolated() {
    let server = MockServer::start(MockConfig::default()).await.expect("mock server");

    let mut plan = ScenarioPlan::new("isolation", timing(Duration::from_secs(5)));
    for i in 0..8 {
        let nick = format!("user{i}");
        let script =
            register(&nick, Duration::from_secs(1)).privmsg(&nick, format!("note to {nick}"));
        plan = plan.client(ClientSpec::new(format!("c{i}"), server.endpoint(), script));
    }

    let run = Orchestrator::new(plan).expect("valid plan").run().await;
    assert_eq!(run.transcripts.len(), 8);

    for (i, transcript) in run.transcripts.iter().enumerate() {
        let nick = format!("user{i}");
        assert_eq!(transcript.client(), format!("c{i}"));
        assert_eq!(transcript.outcome(), &ClientOutcome::Completed);

        // Each line carries the owning client's nick, and only that nick.
        for entry in transcript.entries() {
            let others = (0..8).filter(|j| *j != i).map(|j| format!("user{j}"));
            for other in others {
                assert!(
                    !entry.line.split([' ', '!', ':']).any(|w| w == other),
                    "{} saw foreign line {:?}",
                    transcript.client(),
                    entry.line
                );
            }
        }
        assert!(transcript.received().any(|l| l.contains(&format!("note to {nick}"))));

        // Sequence numbers are dense and in order.
        for (seq, entry) in transcript.entries().iter().enumerate() {
            assert_eq!(entry.seq, seq);
        }
    }
}

#[tokio::test]
async fn test_silent_server_hits_ceiling() {
    let silent = MockConfig { behavior: Behavior::Silent, ..MockConfig::default() };
    let server = MockServer::start(silent).await.expect("mock server");

    let ceiling = Duration::from_millis(300);
    let script = register("quiet", Duration::from_secs(10));
    let plan = ScenarioPlan::new("silent", timing(ceiling))
        .client(ClientSpec::new("c1", server.endpoint(), script));

    let started = Instant::now();
    let run = Orchestrator::new(plan).expect("valid plan").run().await;
    let elapsed = started.elapsed();

    let transcript = &run.transcripts[0];
    assert_eq!(transcript.outcome(), &ClientOutcome::TimedOut);
    assert!(elapsed < ceiling + Duration::from_millis(400), "run took {elapsed:?}");

    // Lines written before the deadline survive cancellation.
    let sent: Vec<&str> = transcript
        .entries()
        .iter()
        .filter(|e| e.direction == Direction::Sent)
        .map(|e| e.line.as_str())
        .collect();
    assert_eq!(sent, vec!["NICK quiet", "USER quiet 0 * :Test User"]);

    // The connection is released, not leaked.
    assert!(server.wait_closed(1, Duration::from_secs(1)).await);
}

#[tokio::test]
async fn test_hang_up_keeps_unterminated_tail() {
    let server = MockServer::start(MockConfig {
        behavior: Behavior::HangUp(
            b":mock.irc 001 tail :Welcome\r\n:mock.irc NOTICE * :cut off".to_vec(),
        ),
        ..MockConfig::default()
    })
    .await
    .expect("mock server");

    let script = ClientScript::new().nick("tail").listen(Duration::from_secs(1));
    let plan = ScenarioPlan::new("hang-up", timing(Duration::from_secs(5)))
        .client(ClientSpec::new("c1", server.endpoint(), script));

    let run = Orchestrator::new(plan).expect("valid plan").run().await;
    let transcript = &run.transcripts[0];

    assert_eq!(transcript.outcome(), &ClientOutcome::PeerClosed);
    let received: Vec<&str> = transcript.received().collect();
    assert_eq!(received, vec![":mock.irc 001 tail :Welcome", ":mock.irc NOTICE * :cut off"]);
}

#[tokio::test]
async fn test_gated_client_waits_for_signal() {
    let server = MockServer::start(MockConfig::default()).await.expect("mock server");

    let first = register("early", Duration::from_secs(1)).signal("early-registered");
    let second = register("late", Duration::from_secs(1));
    let plan = ScenarioPlan::new("gate", timing(Duration::from_secs(5)))
        .client(ClientSpec::new("early", server.endpoint(), first))
        .client(
            ClientSpec::new("late", server.endpoint(), second)
                .after_signal("early-registered", Duration::from_secs(2)),
        );

    let run = Orchestrator::new(plan).expect("valid plan").run().await;
    assert!(run.transcripts.iter().all(|t| t.outcome() == &ClientOutcome::Completed));

    // The gated client connected after the first one was welcomed, so the
    // server had already accepted the first registration.
    let early = &run.transcripts[0];
    assert!(early.received().any(|l| l.contains(" 001 early ")));
    assert!(run.transcripts[1].received().any(|l| l.contains(" 001 late ")));
}

#[tokio::test]
async fn test_gate_that_never_opens_aborts_without_connecting() {
    let server = MockServer::start(MockConfig::default()).await.expect("mock server");

    // The signal is raised only after a reply that never comes in time.
    let first = ClientScript::new()
        .expect(vec![Pattern::Numeric(1)], Duration::from_millis(200))
        .signal("never-in-time");
    let plan = ScenarioPlan::new("closed-gate", timing(Duration::from_secs(5)))
        .client(ClientSpec::new("a", server.endpoint(), first))
        .client(
            ClientSpec::new("b", server.endpoint(), ClientScript::new().nick("b"))
                .after_signal("never-in-time", Duration::from_millis(100)),
        );

    let run = Orchestrator::new(plan).expect("valid plan").run().await;
    assert!(matches!(run.transcripts[1].outcome(), ClientOutcome::Aborted(_)));
    assert!(run.transcripts[1].entries().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clients_connect_before_first_action() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let endpoint = Endpoint::from(listener.local_addr().expect("local addr"));

    // Record when each connection is accepted and when its first bytes land.
    let observer = tokio::spawn(async move {
        let mut accepted = Vec::new();
        let mut readers = Vec::new();
        for _ in 0..2 {
            let (mut stream, _) = listener.accept().await.expect("accept");
            accepted.push(Instant::now());
            readers.push(tokio::spawn(async move {
                let mut buf = [0u8; 128];
                let n = stream.read(&mut buf).await.expect("read");
                (Instant::now(), String::from_utf8_lossy(&buf[..n]).into_owned())
            }));
        }
        let mut first_bytes = Vec::new();
        for reader in readers {
            first_bytes.push(reader.await.expect("reader task"));
        }
        (accepted, first_bytes)
    });

    let offset = Duration::from_millis(300);
    let plan = ScenarioPlan::new("connect-first", timing(Duration::from_secs(3)))
        .client(ClientSpec::new("early", endpoint.clone(), ClientScript::new().nick("early")))
        .client(
            ClientSpec::new("late", endpoint, ClientScript::new().nick("late")).with_offset(offset),
        );
    let run = Orchestrator::new(plan).expect("valid plan").run().await;
    assert_eq!(run.transcripts.len(), 2);

    let (accepted, first_bytes) = observer.await.expect("observer task");
    let sent_at = |nick: &str| {
        first_bytes
            .iter()
            .find(|(_, text)| text.starts_with(&format!("NICK {nick}")))
            .map(|(at, _)| *at)
            .expect("first line from client")
    };
    let early = sent_at("early");
    let late = sent_at("late");

    // The late client's handshake is not deferred by its offset.
    let last_accept = accepted.iter().max().copied().expect("two accepts");
    assert!(last_accept < early, "a client connected after the first action");
    assert!(late.duration_since(early) >= offset - Duration::from_millis(50));
}
