//! Verdict classifier.
//!
//! Two stages, kept apart so new scenarios only add data:
//!
//! 1. Matching: each named [`Predicate`] is evaluated against each
//!    transcript's received lines. A predicate holds if any line matches any
//!    of its patterns. Line order does not matter and evaluation stops at the
//!    first match.
//! 2. Combination: a scenario's [`TruthTable`] is an ordered list of
//!    [`Rule`]s over the per-client results. The first rule whose
//!    [`Condition`] holds decides the verdict. If none does, the verdict is
//!    inconclusive.

use std::{collections::BTreeMap, fmt};

use ircprobe_client::{ClientId, ClientOutcome, Transcript};
use ircprobe_proto::Pattern;

use crate::error::PlanError;

/// Named line predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Name referenced by rules.
    pub name: String,
    /// Holds if any received line matches any of these.
    pub any_of: Vec<Pattern>,
}

impl Predicate {
    /// Create a predicate.
    pub fn new(name: impl Into<String>, any_of: Vec<Pattern>) -> Self {
        Self { name: name.into(), any_of }
    }

    /// Evaluate against one transcript.
    pub fn holds_for(&self, transcript: &Transcript) -> bool {
        transcript.received().any(|line| Pattern::any_matches(&self.any_of, line))
    }
}

/// Comparison used by [`Condition::Count`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    /// `== n`
    Exactly(usize),
    /// `>= n`
    AtLeast(usize),
    /// `<= n`
    AtMost(usize),
}

impl Cmp {
    fn test(self, value: usize) -> bool {
        match self {
            Self::Exactly(n) => value == n,
            Self::AtLeast(n) => value >= n,
            Self::AtMost(n) => value <= n,
        }
    }
}

/// Boolean expression over per-client observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `predicate` holds for `client`.
    Holds {
        /// Client id.
        client: ClientId,
        /// Predicate name.
        predicate: String,
    },
    /// Number of clients for which `predicate` holds.
    Count {
        /// Predicate name.
        predicate: String,
        /// Required count.
        cmp: Cmp,
    },
    /// `client` ran its script to the end.
    Completed(ClientId),
    /// All sub-conditions hold.
    All(Vec<Self>),
    /// At least one sub-condition holds.
    Any(Vec<Self>),
    /// Negation.
    Not(Box<Self>),
    /// Always true, for catch-all rules.
    Always,
}

impl Condition {
    /// `predicate` holds for `client`.
    pub fn holds(client: impl Into<ClientId>, predicate: impl Into<String>) -> Self {
        Self::Holds { client: client.into(), predicate: predicate.into() }
    }

    /// `predicate` does not hold for `client`.
    pub fn fails(client: impl Into<ClientId>, predicate: impl Into<String>) -> Self {
        Self::Not(Box::new(Self::holds(client, predicate)))
    }

    /// Count of clients satisfying `predicate` compares true.
    pub fn count(predicate: impl Into<String>, cmp: Cmp) -> Self {
        Self::Count { predicate: predicate.into(), cmp }
    }

    fn eval(&self, observations: &[ClientObservation]) -> bool {
        match self {
            Self::Holds { client, predicate } => observations
                .iter()
                .find(|o| o.client == *client)
                .is_some_and(|o| o.holds(predicate)),
            Self::Count { predicate, cmp } => {
                cmp.test(observations.iter().filter(|o| o.holds(predicate)).count())
            },
            Self::Completed(client) => observations
                .iter()
                .find(|o| o.client == *client)
                .is_some_and(|o| o.outcome.is_completed()),
            Self::All(conditions) => conditions.iter().all(|c| c.eval(observations)),
            Self::Any(conditions) => conditions.iter().any(|c| c.eval(observations)),
            Self::Not(condition) => !condition.eval(observations),
            Self::Always => true,
        }
    }

    fn visit<'a>(&'a self, f: &mut dyn FnMut(Option<&'a str>, Option<&'a str>)) {
        match self {
            Self::Holds { client, predicate } => f(Some(client.as_str()), Some(predicate.as_str())),
            Self::Count { predicate, .. } => f(None, Some(predicate.as_str())),
            Self::Completed(client) => f(Some(client.as_str()), None),
            Self::All(conditions) | Self::Any(conditions) => {
                for condition in conditions {
                    condition.visit(f);
                }
            },
            Self::Not(condition) => condition.visit(f),
            Self::Always => {},
        }
    }
}

/// Verdict category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerdictKind {
    /// Invariant confirmed.
    Success,
    /// Invariant violated.
    Failure,
    /// Result ambiguous or not determinable.
    Inconclusive,
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Inconclusive => "INCONCLUSIVE",
        })
    }
}

/// One row of a truth table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// When this rule applies.
    pub when: Condition,
    /// Verdict if it does.
    pub kind: VerdictKind,
    /// Human readable cause.
    pub cause: String,
}

impl Rule {
    /// Create a rule.
    pub fn new(when: Condition, kind: VerdictKind, cause: impl Into<String>) -> Self {
        Self { when, kind, cause: cause.into() }
    }
}

/// Scenario-specific mapping from observations to a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruthTable {
    /// Predicates evaluated on every transcript.
    pub predicates: Vec<Predicate>,
    /// Rules, first match wins.
    pub rules: Vec<Rule>,
}

impl TruthTable {
    /// Empty table.
    pub fn new() -> Self {
        Self { predicates: Vec::new(), rules: Vec::new() }
    }

    /// Add a predicate.
    #[must_use]
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Add a rule after the existing ones.
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Check every rule refers to known predicates and clients.
    pub fn validate<'a>(
        &self,
        clients: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), PlanError> {
        let clients: Vec<&str> = clients.into_iter().collect();
        let mut error = None;
        for rule in &self.rules {
            rule.when.visit(&mut |client, predicate| {
                if error.is_some() {
                    return;
                }
                if let Some(client) = client.filter(|c| !clients.contains(c)) {
                    error = Some(PlanError::UnknownClient(client.to_string()));
                } else if let Some(predicate) =
                    predicate.filter(|p| !self.predicates.iter().any(|d| d.name == *p))
                {
                    error = Some(PlanError::UnknownPredicate(predicate.to_string()));
                }
            });
        }
        error.map_or(Ok(()), Err)
    }
}

impl Default for TruthTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Process exit code per verdict kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes {
    /// Exit code for [`VerdictKind::Success`].
    pub success: u8,
    /// Exit code for [`VerdictKind::Failure`].
    pub failure: u8,
    /// Exit code for [`VerdictKind::Inconclusive`].
    pub inconclusive: u8,
}

impl Default for ExitCodes {
    fn default() -> Self {
        Self { success: 0, failure: 1, inconclusive: 1 }
    }
}

impl ExitCodes {
    /// Separate code for inconclusive results, for CI that needs to tell a
    /// broken server from an ambiguous run.
    pub fn distinct() -> Self {
        Self { inconclusive: 3, ..Self::default() }
    }

    /// Code for `kind`.
    pub fn code(&self, kind: VerdictKind) -> u8 {
        match kind {
            VerdictKind::Success => self.success,
            VerdictKind::Failure => self.failure,
            VerdictKind::Inconclusive => self.inconclusive,
        }
    }
}

/// Final result of a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Category.
    pub kind: VerdictKind,
    /// Human readable cause.
    pub cause: String,
    /// Process exit code.
    pub exit_code: u8,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.cause)
    }
}

/// Predicate results for one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientObservation {
    /// Client id.
    pub client: ClientId,
    /// Terminal state.
    pub outcome: ClientOutcome,
    /// Predicate name to result.
    pub results: BTreeMap<String, bool>,
}

impl ClientObservation {
    /// Result of `predicate`, false if unknown.
    pub fn holds(&self, predicate: &str) -> bool {
        self.results.get(predicate).copied().unwrap_or(false)
    }
}

/// Verdict plus the observations it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Final verdict.
    pub verdict: Verdict,
    /// Per-client predicate results, in transcript order.
    pub observations: Vec<ClientObservation>,
}

/// Evaluate `table` over `transcripts`.
pub fn classify(
    table: &TruthTable,
    transcripts: &[Transcript],
    exit_codes: ExitCodes,
) -> Classification {
    let observations: Vec<ClientObservation> = transcripts
        .iter()
        .map(|transcript| ClientObservation {
            client: transcript.client().to_string(),
            outcome: transcript.outcome().clone(),
            results: table
                .predicates
                .iter()
                .map(|p| (p.name.clone(), p.holds_for(transcript)))
                .collect(),
        })
        .collect();

    let (kind, cause) = match table.rules.iter().find(|rule| rule.when.eval(&observations)) {
        Some(rule) => (rule.kind, rule.cause.clone()),
        None => (VerdictKind::Inconclusive, fallback_cause(&observations)),
    };

    tracing::debug!(%kind, %cause, "classified");

    let verdict = Verdict { kind, cause, exit_code: exit_codes.code(kind) };
    Classification { verdict, observations }
}

fn fallback_cause(observations: &[ClientObservation]) -> String {
    let unfinished: Vec<String> = observations
        .iter()
        .filter(|o| !o.outcome.is_completed())
        .map(|o| format!("{} {}", o.client, o.outcome))
        .collect();

    if unfinished.is_empty() {
        "no rule matched the observed replies".to_string()
    } else {
        format!("no rule matched; unfinished clients: {}", unfinished.join(", "))
    }
}
