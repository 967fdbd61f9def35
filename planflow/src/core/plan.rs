//! The plan artifact and the fold that builds it from planning events.

use serde::{Deserialize, Serialize};

use super::event::{Event, TokenCounts};

/// Result of the planning phase.
///
/// Built once by [`PlanAccumulator`] and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Task description the plan was produced for.
    pub task: String,
    /// Concatenation of every `text` fragment, in arrival order.
    pub narrative_text: String,
    /// Every decoded event in arrival order, including kinds not interpreted here.
    pub events: Vec<Event>,
    /// Token counters summed across `step_finish` events.
    pub token_usage: TokenCounts,
    /// Lines skipped because they could not be decoded.
    pub decode_faults: usize,
}

impl Plan {
    /// Persisted form of the plan.
    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            task: self.task.clone(),
            plan_text: self.narrative_text.clone(),
            events: self.events.clone(),
        }
    }

    /// Rebuild a plan from a stored snapshot.
    ///
    /// `plan_text` is taken as stored; token usage is recomputed from events.
    pub fn from_snapshot(snapshot: PlanSnapshot) -> Self {
        let token_usage = sum_token_usage(&snapshot.events);
        Self {
            task: snapshot.task,
            narrative_text: snapshot.plan_text,
            events: snapshot.events,
            token_usage,
            decode_faults: 0,
        }
    }
}

/// On-disk shape of a plan: `{"task", "plan_text", "events"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub task: String,
    pub plan_text: String,
    pub events: Vec<Event>,
}

/// Single-pass fold of planning events into a [`Plan`].
#[derive(Debug)]
pub struct PlanAccumulator {
    task: String,
    narrative_text: String,
    events: Vec<Event>,
    token_usage: TokenCounts,
}

impl PlanAccumulator {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            narrative_text: String::new(),
            events: Vec::new(),
            token_usage: TokenCounts::new(),
        }
    }

    pub fn push(&mut self, event: Event) {
        match &event {
            Event::Text { text, .. } => self.narrative_text.push_str(text),
            Event::StepFinish { tokens, .. } => add_counts(&mut self.token_usage, tokens),
            _ => {}
        }
        self.events.push(event);
    }

    pub fn finish(self, decode_faults: usize) -> Plan {
        Plan {
            task: self.task,
            narrative_text: self.narrative_text,
            events: self.events,
            token_usage: self.token_usage,
            decode_faults,
        }
    }
}

/// Fold a complete event sequence into a plan (no decode faults).
pub fn accumulate_plan<I>(task: impl Into<String>, events: I) -> Plan
where
    I: IntoIterator<Item = Event>,
{
    let mut acc = PlanAccumulator::new(task);
    for event in events {
        acc.push(event);
    }
    acc.finish(0)
}

fn sum_token_usage(events: &[Event]) -> TokenCounts {
    let mut total = TokenCounts::new();
    for event in events {
        if let Event::StepFinish { tokens, .. } = event {
            add_counts(&mut total, tokens);
        }
    }
    total
}

fn add_counts(total: &mut TokenCounts, counts: &TokenCounts) {
    for (name, value) in counts {
        let entry = total.entry(name.clone()).or_insert(0);
        *entry = entry.saturating_add(*value);
    }
}
