//! Approval checkpoint between planning and execution.
//!
//! The gate either approves unconditionally (`auto_approve`) or asks an
//! injected [`ApprovalPrompt`] for exactly one line of input. Only the literal
//! token `approve` (case-insensitive, surrounding whitespace ignored) passes;
//! there is no retry.

use anyhow::Result;

use super::event::excerpt;
use super::plan::Plan;

/// Input that approves a plan.
pub const APPROVE_TOKEN: &str = "approve";

/// Characters of the raw plan dump shown when the plan has no narrative text.
pub const REVIEW_DUMP_CHARS: usize = 500;

/// Source of the single line of operator input at the checkpoint.
pub trait ApprovalPrompt {
    /// Present `review` and return the operator's response line.
    ///
    /// End of input should be reported as an empty string, not an error.
    fn ask(&self, review: &str) -> Result<String>;
}

/// Outcome of the checkpoint for one plan.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalDecision<'a> {
    pub plan: &'a Plan,
    pub approved: bool,
    /// Raw operator input; `None` when auto-approved.
    pub input: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalGate {
    auto_approve: bool,
}

impl ApprovalGate {
    pub fn new(auto_approve: bool) -> Self {
        Self { auto_approve }
    }

    pub fn auto_approve(&self) -> bool {
        self.auto_approve
    }

    /// Decide on `plan`. Errors only when the prompt itself fails.
    pub fn decide<'a, P: ApprovalPrompt + ?Sized>(
        &self,
        plan: &'a Plan,
        prompt: &P,
    ) -> Result<ApprovalDecision<'a>> {
        if self.auto_approve {
            return Ok(ApprovalDecision {
                plan,
                approved: true,
                input: None,
            });
        }
        let input = prompt.ask(&review_text(plan))?;
        Ok(ApprovalDecision {
            plan,
            approved: is_approval(&input),
            input: Some(input),
        })
    }
}

pub fn is_approval(input: &str) -> bool {
    input.trim().to_lowercase() == APPROVE_TOKEN
}

/// Text shown to the operator: the narrative, or a truncated JSON dump of the
/// plan snapshot when the agent produced no narrative.
pub fn review_text(plan: &Plan) -> String {
    if !plan.narrative_text.is_empty() {
        return plan.narrative_text.clone();
    }
    let dump = serde_json::to_string_pretty(&plan.snapshot())
        .unwrap_or_else(|_| format!("{{\"task\": {:?}}}", plan.task));
    let mut shown = excerpt(&dump, REVIEW_DUMP_CHARS);
    if !shown.ends_with("...") {
        shown.push_str("...");
    }
    shown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::accumulate_plan;
    use anyhow::anyhow;
    use serde_json::json;
    use std::cell::RefCell;

    struct FixedPrompt {
        input: String,
        seen: RefCell<Vec<String>>,
    }

    impl FixedPrompt {
        fn new(input: &str) -> Self {
            Self {
                input: input.to_string(),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl ApprovalPrompt for FixedPrompt {
        fn ask(&self, review: &str) -> Result<String> {
            self.seen.borrow_mut().push(review.to_string());
            Ok(self.input.clone())
        }
    }

    struct BrokenPrompt;

    impl ApprovalPrompt for BrokenPrompt {
        fn ask(&self, _review: &str) -> Result<String> {
            Err(anyhow!("stdin closed unexpectedly"))
        }
    }

    fn plan_with_text(text: &str) -> Plan {
        accumulate_plan(
            "task",
            vec![crate::core::event::Event::try_from(json!({"type": "text", "part": {"text": text}}))
                .expect("event")],
        )
    }

    #[test]
    fn auto_approve_never_prompts() {
        let prompt = FixedPrompt::new("no");
        let empty = accumulate_plan("task", Vec::new());
        let decision = ApprovalGate::new(true)
            .decide(&empty, &prompt)
            .expect("decide");
        assert!(decision.approved);
        assert_eq!(decision.input, None);
        assert!(prompt.seen.borrow().is_empty());
    }

    #[test]
    fn manual_approval_requires_exact_token() {
        let plan = plan_with_text("Step 1");
        let cases = [
            ("approve", true),
            ("Approve ", true),
            ("  APPROVE\n", true),
            ("yes", false),
            ("", false),
            ("approve it", false),
        ];
        for (input, expected) in cases {
            let prompt = FixedPrompt::new(input);
            let decision = ApprovalGate::new(false)
                .decide(&plan, &prompt)
                .expect("decide");
            assert_eq!(decision.approved, expected, "input {input:?}");
            assert_eq!(decision.input.as_deref(), Some(input));
        }
    }

    #[test]
    fn manual_approval_shows_narrative() {
        let plan = plan_with_text("Step 1: define function\n");
        let prompt = FixedPrompt::new("approve");
        ApprovalGate::new(false)
            .decide(&plan, &prompt)
            .expect("decide");
        assert_eq!(
            prompt.seen.borrow().as_slice(),
            ["Step 1: define function\n".to_string()]
        );
    }

    #[test]
    fn review_falls_back_to_truncated_dump() {
        let events = (0..50)
            .map(|i| {
                crate::core::event::Event::try_from(json!({"type": "tool_call", "part": {"tool": {"name": format!("tool-{i}")}}}))
                    .expect("event")
            })
            .collect::<Vec<_>>();
        let plan = accumulate_plan("big task", events);
        let review = review_text(&plan);
        assert!(review.starts_with('{'));
        assert!(review.contains("\"task\": \"big task\""));
        assert!(review.ends_with("..."));
        assert_eq!(review.chars().count(), REVIEW_DUMP_CHARS + 3);
    }

    #[test]
    fn prompt_failure_is_an_error() {
        let plan = plan_with_text("x");
        let err = ApprovalGate::new(false)
            .decide(&plan, &BrokenPrompt)
            .unwrap_err();
        assert!(err.to_string().contains("stdin closed"));
    }
}
