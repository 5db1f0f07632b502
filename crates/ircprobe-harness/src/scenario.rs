//! Built-in scenarios.
//!
//! A [`Scenario`] pairs a validated plan with the truth table that judges
//! it. Each builder below only produces data; the orchestrator and
//! classifier are the same for every scenario.

use std::time::Duration;

use ircprobe_client::{ClientScript, Endpoint};
use ircprobe_proto::{
    Pattern,
    numeric::{ERR_NICKCOLLISION, ERR_NICKNAMEINUSE, RPL_ENDOFNAMES, RPL_WELCOME},
};

use crate::{
    classifier::{Condition, ExitCodes, Predicate, Rule, TruthTable, VerdictKind, classify},
    error::PlanError,
    orchestrator::{ClientSpec, Orchestrator, ScenarioPlan, Timing},
    report::Report,
};

/// A runnable plan and the table that judges its transcripts.
#[derive(Debug, Clone)]
pub struct Scenario {
    orchestrator: Orchestrator,
    table: TruthTable,
}

impl Scenario {
    /// Validate the plan and check the table only refers to its clients.
    pub fn new(plan: ScenarioPlan, table: TruthTable) -> Result<Self, PlanError> {
        let orchestrator = Orchestrator::new(plan)?;
        table.validate(orchestrator.plan().client_ids())?;
        Ok(Self { orchestrator, table })
    }

    /// The plan.
    pub fn plan(&self) -> &ScenarioPlan {
        self.orchestrator.plan()
    }

    /// The truth table.
    pub fn table(&self) -> &TruthTable {
        &self.table
    }

    /// Run every client to a terminal state and classify the transcripts.
    pub async fn run(&self, exit_codes: ExitCodes) -> Report {
        let run = self.orchestrator.run().await;
        let classification = classify(&self.table, &run.transcripts, exit_codes);
        tracing::info!(scenario = %run.name, verdict = %classification.verdict, "verdict");
        Report { run, classification }
    }
}

fn check_nick(field: &'static str, nick: &str) -> Result<(), PlanError> {
    if nick.is_empty() {
        return Err(PlanError::InvalidParameter { field, reason: "must not be empty".into() });
    }
    if nick.starts_with([':', '#', '&']) || nick.contains([' ', ',', '\r', '\n', '\0']) {
        return Err(PlanError::InvalidParameter {
            field,
            reason: format!("{nick:?} is not a valid nickname"),
        });
    }
    Ok(())
}

fn check_channel(channel: &str) -> Result<(), PlanError> {
    if !channel.starts_with(['#', '&']) || channel.len() < 2 || channel.contains([' ', ',']) {
        return Err(PlanError::InvalidParameter {
            field: "channel",
            reason: format!("{channel:?} is not a valid channel name"),
        });
    }
    Ok(())
}

/// Two clients claim the same nickname at nearly the same time.
///
/// The server must welcome exactly one and reject the other. Both welcomed
/// is a failure (over-permissive); both rejected is reported separately as
/// inconclusive (over-restrictive), since it does not show the collision
/// bug but is not correct behaviour either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NickCollision {
    /// Server the first client registers on.
    pub first: Endpoint,
    /// Server the second client registers on. Use a different linked server
    /// to test collisions across a federation.
    pub second: Endpoint,
    /// Contested nickname.
    pub nick: String,
    /// How long after the first client the second one starts.
    pub offset: Duration,
    /// How long each client waits for 001 or 433 before listening.
    pub register_timeout: Duration,
}

impl NickCollision {
    /// Id of the client that starts first.
    pub const FIRST: &'static str = "client1";
    /// Id of the client that starts `offset` later.
    pub const SECOND: &'static str = "client2";

    /// Both clients on one server with the default nick and offset.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            first: endpoint.clone(),
            second: endpoint,
            nick: "testuser".to_string(),
            offset: Duration::from_millis(20),
            register_timeout: Duration::from_secs(2),
        }
    }

    fn script(&self, username: &str) -> ClientScript {
        ClientScript::new().nick(&self.nick).user(username, "Test User").expect(
            vec![
                Pattern::Numeric(RPL_WELCOME),
                Pattern::Numeric(ERR_NICKNAMEINUSE),
                Pattern::Numeric(ERR_NICKCOLLISION),
            ],
            self.register_timeout,
        )
    }

    /// Predicates and rules for the mutual exclusion check.
    pub fn table() -> TruthTable {
        let (a, b) = (Self::FIRST, Self::SECOND);
        let exactly_one = |winner: &str, loser: &str| {
            Condition::All(vec![
                Condition::holds(winner, "welcomed"),
                Condition::fails(winner, "rejected"),
                Condition::holds(loser, "rejected"),
                Condition::fails(loser, "welcomed"),
            ])
        };

        TruthTable::new()
            .predicate(Predicate::new("welcomed", vec![Pattern::Numeric(RPL_WELCOME)]))
            .predicate(Predicate::new("rejected", vec![
                Pattern::Numeric(ERR_NICKNAMEINUSE),
                Pattern::Numeric(ERR_NICKCOLLISION),
            ]))
            .rule(Rule::new(
                Condition::Any(vec![exactly_one(a, b), exactly_one(b, a)]),
                VerdictKind::Success,
                "one client registered, the other was rejected; nickname collision prevented",
            ))
            .rule(Rule::new(
                Condition::All(vec![
                    Condition::holds(a, "welcomed"),
                    Condition::holds(b, "welcomed"),
                ]),
                VerdictKind::Failure,
                "both clients registered the same nickname (server is over-permissive)",
            ))
            .rule(Rule::new(
                Condition::All(vec![
                    Condition::holds(a, "rejected"),
                    Condition::holds(b, "rejected"),
                ]),
                VerdictKind::Inconclusive,
                "both clients were rejected (server is over-restrictive)",
            ))
    }

    /// Build the runnable scenario.
    pub fn build(&self, timing: Timing) -> Result<Scenario, PlanError> {
        check_nick("nick", &self.nick)?;

        let plan = ScenarioPlan::new("nick-collision", timing)
            .client(ClientSpec::new(Self::FIRST, self.first.clone(), self.script(Self::FIRST)))
            .client(
                ClientSpec::new(Self::SECOND, self.second.clone(), self.script(Self::SECOND))
                    .with_offset(self.offset),
            );

        Scenario::new(plan, Self::table())
    }
}

/// A message sent on one server reaches a client on another.
///
/// The hub client registers and joins first. The leaf client connects only
/// once the hub has seen its own join complete. Neither sends until the
/// other is visible in the channel from its own server: the hub waits for
/// the leaf's JOIN to be relayed, the leaf for the hub in its names reply or
/// a relayed JOIN. Then both send a PRIVMSG to the channel and each must
/// see the other's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routing {
    /// Server the hub client connects to.
    pub hub: Endpoint,
    /// Server the leaf client connects to.
    pub leaf: Endpoint,
    /// Hub client's nickname.
    pub hub_nick: String,
    /// Leaf client's nickname.
    pub leaf_nick: String,
    /// Shared channel.
    pub channel: String,
    /// Text the hub client sends.
    pub hub_message: String,
    /// Text the leaf client sends.
    pub leaf_message: String,
    /// Bound on each readiness wait (welcome, end of names, signals).
    pub step_timeout: Duration,
}

impl Routing {
    /// Id of the client on the hub.
    pub const HUB: &'static str = "hub";
    /// Id of the client on the leaf.
    pub const LEAF: &'static str = "leaf";

    const HUB_JOINED: &'static str = "hub-joined";

    /// Defaults matching a local two-server test network.
    pub fn new(hub: Endpoint, leaf: Endpoint) -> Self {
        Self {
            hub,
            leaf,
            hub_nick: "hubuser".to_string(),
            leaf_nick: "leafuser".to_string(),
            channel: "#test".to_string(),
            hub_message: "Hello from HUB!".to_string(),
            leaf_message: "Hello from LEAF!".to_string(),
            step_timeout: Duration::from_secs(3),
        }
    }

    fn register_and_join(&self, nick: &str, realname: &str) -> ClientScript {
        ClientScript::new()
            .nick(nick)
            .user(nick, realname)
            .expect(vec![Pattern::Numeric(RPL_WELCOME)], self.step_timeout)
            .join(&self.channel)
            .expect(vec![Pattern::Numeric(RPL_ENDOFNAMES)], self.step_timeout)
    }

    fn command_from(command: &str, nick: &str) -> Pattern {
        Pattern::CommandFrom { command: command.to_string(), nick: nick.to_string() }
    }

    /// Predicates and rules for the two-way delivery check.
    pub fn table(&self) -> TruthTable {
        let heard = |nick: &str| vec![Self::command_from("PRIVMSG", nick)];

        TruthTable::new()
            .predicate(Predicate::new("heard-leaf", heard(&self.leaf_nick)))
            .predicate(Predicate::new("heard-hub", heard(&self.hub_nick)))
            .rule(Rule::new(
                Condition::All(vec![
                    Condition::holds(Self::HUB, "heard-leaf"),
                    Condition::holds(Self::LEAF, "heard-hub"),
                ]),
                VerdictKind::Success,
                "messages were routed in both directions",
            ))
            .rule(Rule::new(
                Condition::Any(vec![
                    Condition::Not(Box::new(Condition::Completed(Self::HUB.to_string()))),
                    Condition::Not(Box::new(Condition::Completed(Self::LEAF.to_string()))),
                ]),
                VerdictKind::Inconclusive,
                "a client did not complete its script",
            ))
            .rule(Rule::new(
                Condition::fails(Self::HUB, "heard-leaf"),
                VerdictKind::Failure,
                "the hub client never received the leaf client's message",
            ))
            .rule(Rule::new(
                Condition::fails(Self::LEAF, "heard-hub"),
                VerdictKind::Failure,
                "the leaf client never received the hub client's message",
            ))
    }

    /// Build the runnable scenario.
    pub fn build(&self, timing: Timing) -> Result<Scenario, PlanError> {
        check_nick("hub nick", &self.hub_nick)?;
        check_nick("leaf nick", &self.leaf_nick)?;
        check_channel(&self.channel)?;
        if self.hub_nick.eq_ignore_ascii_case(&self.leaf_nick) {
            return Err(PlanError::InvalidParameter {
                field: "leaf nick",
                reason: "must differ from the hub nick".into(),
            });
        }

        // Waits that span the other client's whole registration.
        let peer_wait = self.step_timeout * 4;

        // The hub has joined before the leaf connects, so the leaf's JOIN
        // always reaches the hub as a relayed line once the link has it.
        let hub = self
            .register_and_join(&self.hub_nick, "HUB User")
            .signal(Self::HUB_JOINED)
            .expect(vec![Self::command_from("JOIN", &self.leaf_nick)], peer_wait)
            .privmsg(&self.channel, &self.hub_message)
            .expect(vec![Self::command_from("PRIVMSG", &self.leaf_nick)], peer_wait);

        // The hub shows up either in the leaf's names reply or, if the link
        // is slower than the leaf's join, as a relayed JOIN afterwards.
        let hub_visible = vec![
            Pattern::names(&self.channel, &self.hub_nick),
            Self::command_from("JOIN", &self.hub_nick),
        ];
        let leaf = ClientScript::new()
            .nick(&self.leaf_nick)
            .user(&self.leaf_nick, "LEAF User")
            .expect(vec![Pattern::Numeric(RPL_WELCOME)], self.step_timeout)
            .join(&self.channel)
            .expect(hub_visible, peer_wait)
            .privmsg(&self.channel, &self.leaf_message)
            .expect(vec![Self::command_from("PRIVMSG", &self.hub_nick)], peer_wait);

        let plan = ScenarioPlan::new("routing", timing)
            .client(ClientSpec::new(Self::HUB, self.hub.clone(), hub))
            .client(
                ClientSpec::new(Self::LEAF, self.leaf.clone(), leaf)
                    .after_signal(Self::HUB_JOINED, peer_wait),
            );

        Scenario::new(plan, self.table())
    }
}

#[cfg(test)]
mod tests {
    use ircprobe_client::{Action, ClientOutcome, Transcript};
    use ircprobe_proto::Command;

    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("localhost", 6667)
    }

    fn verdict(table: &TruthTable, a: (&str, &[&str]), b: (&str, &[&str])) -> (VerdictKind, u8) {
        let transcripts = [
            Transcript::from_received(a.0, a.1.iter().copied(), ClientOutcome::Completed),
            Transcript::from_received(b.0, b.1.iter().copied(), ClientOutcome::Completed),
        ];
        let result = classify(table, &transcripts, ExitCodes::default());
        (result.verdict.kind, result.verdict.exit_code)
    }

    #[test]
    fn nick_collision_plan_offsets_second_client() {
        let scenario = NickCollision::new(endpoint()).build(Timing::default()).unwrap();
        let clients = &scenario.plan().clients;
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].start_offset, Duration::ZERO);
        assert_eq!(clients[1].start_offset, Duration::from_millis(20));
        assert_eq!(clients[0].script.commands().count(), 2);
    }

    #[test]
    fn nick_collision_truth_table() {
        let table = NickCollision::table();
        let (a, b) = (NickCollision::FIRST, NickCollision::SECOND);

        assert_eq!(
            verdict(&table, (a, &[":s 001 testuser :Welcome"]), (b, &[
                ":s 433 * testuser :Nickname is already in use"
            ])),
            (VerdictKind::Success, 0)
        );
        assert_eq!(
            verdict(&table, (a, &[":s 433 * testuser :Nickname is already in use"]), (b, &[
                ":s 001 testuser :Welcome"
            ])),
            (VerdictKind::Success, 0)
        );
        assert_eq!(
            verdict(&table, (a, &[":s 001 testuser :Welcome"]), (b, &[":s 001 testuser :Welcome"])),
            (VerdictKind::Failure, 1)
        );
        assert_eq!(
            verdict(
                &table,
                (a, &[":s 433 * testuser :in use"]),
                (b, &[":s 433 * testuser :in use"]),
            ),
            (VerdictKind::Inconclusive, 1)
        );
        assert_eq!(
            verdict(&table, (a, &[":s NOTICE * :hi"]), (b, &[])),
            (VerdictKind::Inconclusive, 1)
        );
    }

    #[test]
    fn unrelated_traffic_does_not_trigger() {
        let table = NickCollision::table();
        let (a, b) = (NickCollision::FIRST, NickCollision::SECOND);
        assert_eq!(
            verdict(&table, (a, &[":s 001 testuser :Welcome"]), (b, &[
                ":x!x@h PRIVMSG #c :I got 001 and 433 today",
                ":s 433 * testuser :Nickname is already in use",
            ])),
            (VerdictKind::Success, 0)
        );
    }

    #[test]
    fn nick_collision_rejects_bad_nick() {
        let mut scenario = NickCollision::new(endpoint());
        scenario.nick = "two words".into();
        assert!(matches!(
            scenario.build(Timing::default()),
            Err(PlanError::InvalidParameter { field: "nick", .. })
        ));
    }

    #[test]
    fn routing_gates_leaf_on_hub_join() {
        let scenario = Routing::new(endpoint(), Endpoint::new("localhost", 6668))
            .build(Timing::default())
            .unwrap();
        let leaf = &scenario.plan().clients[1];
        assert_eq!(leaf.start_after.as_ref().map(|g| g.signal.as_str()), Some("hub-joined"));
        assert_eq!(leaf.endpoint.port(), 6668);
    }

    #[test]
    fn routing_sends_only_after_peer_is_visible() {
        let scenario = Routing::new(endpoint(), endpoint()).build(Timing::default()).unwrap();
        let actions = |i: usize| scenario.plan().clients[i].script.actions().to_vec();

        let waits_before_send = |actions: &[Action], wanted: &Pattern| {
            let send = actions
                .iter()
                .position(|a| matches!(a, Action::Send(Command::Privmsg { .. })))
                .unwrap();
            actions[..send].iter().any(
                |a| matches!(a, Action::Expect { any_of, .. } if any_of.contains(wanted)),
            )
        };

        let hub = actions(0);
        assert!(waits_before_send(&hub, &Pattern::CommandFrom {
            command: "JOIN".into(),
            nick: "leafuser".into(),
        }));
        assert!(!hub.iter().any(|a| matches!(a, Action::AwaitSignal { .. })));

        let leaf = actions(1);
        assert!(waits_before_send(&leaf, &Pattern::names("#test", "hubuser")));
        assert!(!leaf.iter().any(|a| matches!(a, Action::Signal(_))));
    }

    #[test]
    fn routing_truth_table() {
        let routing = Routing::new(endpoint(), endpoint());
        let table = routing.table();
        let hub_line = ":hubuser!h@hub PRIVMSG #test :Hello from HUB!";
        let leaf_line = ":leafuser!l@leaf PRIVMSG #test :Hello from LEAF!";

        assert_eq!(
            verdict(&table, (Routing::HUB, &[leaf_line]), (Routing::LEAF, &[hub_line])),
            (VerdictKind::Success, 0)
        );
        assert_eq!(
            verdict(&table, (Routing::HUB, &[]), (Routing::LEAF, &[hub_line])),
            (VerdictKind::Failure, 1)
        );
        assert_eq!(
            verdict(&table, (Routing::HUB, &[hub_line]), (Routing::LEAF, &[leaf_line])),
            (VerdictKind::Failure, 1)
        );
    }

    #[test]
    fn routing_requires_distinct_nicks_and_channel() {
        let mut routing = Routing::new(endpoint(), endpoint());
        routing.leaf_nick = "HubUser".into();
        assert!(routing.build(Timing::default()).is_err());

        let mut routing = Routing::new(endpoint(), endpoint());
        routing.channel = "test".into();
        assert!(matches!(
            routing.build(Timing::default()),
            Err(PlanError::InvalidParameter { field: "channel", .. })
        ));
    }
}
