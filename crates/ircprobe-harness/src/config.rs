//! Command line and environment configuration.
//!
//! Every option can also be set through an `IRCPROBE_*` environment
//! variable; flags win over the environment.

use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use ircprobe_client::Endpoint;

use crate::{
    classifier::ExitCodes,
    error::PlanError,
    orchestrator::Timing,
    scenario::{NickCollision, Routing, Scenario},
};

/// Exit code for a configuration that cannot be turned into a plan. Matches
/// the code clap uses for usage errors.
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// Race-provoking conformance checks for IRC servers.
#[derive(Parser, Debug, Clone)]
#[command(name = "ircprobe")]
#[command(about = "Race-provoking conformance checks for IRC servers")]
#[command(version)]
pub struct Args {
    /// Scenario to run
    #[command(subcommand)]
    pub scenario: ScenarioArgs,

    /// TCP connect timeout per client, in milliseconds
    #[arg(long, global = true, env = "IRCPROBE_CONNECT_TIMEOUT_MS", default_value_t = 3000)]
    pub connect_timeout_ms: u64,

    /// Read timeout per client, in milliseconds
    #[arg(long, global = true, env = "IRCPROBE_READ_TIMEOUT_MS", default_value_t = 3000)]
    pub read_timeout_ms: u64,

    /// Listen window after each script, in milliseconds
    #[arg(long, global = true, env = "IRCPROBE_LISTEN_MS", default_value_t = 2000)]
    pub listen_ms: u64,

    /// Hard ceiling on each client's run, in milliseconds
    #[arg(long, global = true, env = "IRCPROBE_CEILING_MS", default_value_t = 30_000)]
    pub ceiling_ms: u64,

    /// Extra time past the ceiling before a stuck client is aborted, in
    /// milliseconds
    #[arg(long, global = true, env = "IRCPROBE_GRACE_MS", default_value_t = 500)]
    pub grace_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "IRCPROBE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Exit with 3 instead of 1 when the verdict is inconclusive
    #[arg(long, global = true, env = "IRCPROBE_DISTINCT_EXIT_CODES")]
    pub distinct_exit_codes: bool,
}

/// Built-in scenarios.
#[derive(Subcommand, Debug, Clone)]
pub enum ScenarioArgs {
    /// Two clients claim the same nickname at nearly the same time
    NickCollision(NickCollisionArgs),
    /// A channel message crosses from one server to another and back
    Routing(RoutingArgs),
}

/// Options for `nick-collision`.
#[derive(ClapArgs, Debug, Clone)]
pub struct NickCollisionArgs {
    /// Server both clients connect to
    #[arg(long, env = "IRCPROBE_SERVER", default_value = "localhost:6667")]
    pub server: Endpoint,

    /// Different server for the second client, to race across a link
    #[arg(long, env = "IRCPROBE_SECOND_SERVER")]
    pub second_server: Option<Endpoint>,

    /// Contested nickname
    #[arg(long, env = "IRCPROBE_NICK", default_value = "testuser")]
    pub nick: String,

    /// Delay before the second client starts, in milliseconds
    #[arg(long, env = "IRCPROBE_OFFSET_MS", default_value_t = 20)]
    pub offset_ms: u64,

    /// How long each client waits for 001 or 433, in milliseconds
    #[arg(long, env = "IRCPROBE_REGISTER_TIMEOUT_MS", default_value_t = 2000)]
    pub register_timeout_ms: u64,
}

/// Options for `routing`.
#[derive(ClapArgs, Debug, Clone)]
pub struct RoutingArgs {
    /// Hub server
    #[arg(long, env = "IRCPROBE_HUB", default_value = "localhost:6667")]
    pub hub: Endpoint,

    /// Leaf server
    #[arg(long, env = "IRCPROBE_LEAF", default_value = "localhost:6668")]
    pub leaf: Endpoint,

    /// Nickname on the hub
    #[arg(long, env = "IRCPROBE_HUB_NICK", default_value = "hubuser")]
    pub hub_nick: String,

    /// Nickname on the leaf
    #[arg(long, env = "IRCPROBE_LEAF_NICK", default_value = "leafuser")]
    pub leaf_nick: String,

    /// Shared channel
    #[arg(long, env = "IRCPROBE_CHANNEL", default_value = "#test")]
    pub channel: String,

    /// Message sent from the hub
    #[arg(long, env = "IRCPROBE_HUB_MESSAGE", default_value = "Hello from HUB!")]
    pub hub_message: String,

    /// Message sent from the leaf
    #[arg(long, env = "IRCPROBE_LEAF_MESSAGE", default_value = "Hello from LEAF!")]
    pub leaf_message: String,

    /// Bound on each readiness wait, in milliseconds
    #[arg(long, env = "IRCPROBE_STEP_TIMEOUT_MS", default_value_t = 3000)]
    pub step_timeout_ms: u64,
}

fn non_zero(field: &'static str, millis: u64) -> Result<Duration, PlanError> {
    if millis == 0 {
        let reason = "must be greater than zero".into();
        return Err(PlanError::InvalidParameter { field, reason });
    }
    Ok(Duration::from_millis(millis))
}

impl Args {
    /// Shared timing from the global options.
    pub fn timing(&self) -> Result<Timing, PlanError> {
        Ok(Timing {
            connect_timeout: non_zero("connect timeout", self.connect_timeout_ms)?,
            read_timeout: non_zero("read timeout", self.read_timeout_ms)?,
            listen_window: Duration::from_millis(self.listen_ms),
            ceiling: non_zero("ceiling", self.ceiling_ms)?,
            grace: Duration::from_millis(self.grace_ms),
        })
    }

    /// Exit code mapping.
    pub fn exit_codes(&self) -> ExitCodes {
        if self.distinct_exit_codes { ExitCodes::distinct() } else { ExitCodes::default() }
    }

    /// Build the selected scenario.
    pub fn scenario(&self) -> Result<Scenario, PlanError> {
        let timing = self.timing()?;
        match &self.scenario {
            ScenarioArgs::NickCollision(args) => NickCollision {
                first: args.server.clone(),
                second: args.second_server.clone().unwrap_or_else(|| args.server.clone()),
                nick: args.nick.clone(),
                offset: Duration::from_millis(args.offset_ms),
                register_timeout: non_zero("register timeout", args.register_timeout_ms)?,
            }
            .build(timing),
            ScenarioArgs::Routing(args) => Routing {
                hub: args.hub.clone(),
                leaf: args.leaf.clone(),
                hub_nick: args.hub_nick.clone(),
                leaf_nick: args.leaf_nick.clone(),
                channel: args.channel.clone(),
                hub_message: args.hub_message.clone(),
                leaf_message: args.leaf_message.clone(),
                step_timeout: non_zero("step timeout", args.step_timeout_ms)?,
            }
            .build(timing),
        }
    }
}
