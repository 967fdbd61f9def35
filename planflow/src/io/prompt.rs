//! Prompt rendering for the execution phase.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::plan::Plan;

const EXECUTE_TEMPLATE: &str = include_str!("prompts/execute.md");

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("execute", EXECUTE_TEMPLATE)
            .expect("execute template should be valid");
        Self { env }
    }

    fn render_execute(&self, plan: &Plan) -> Result<String> {
        let template = self.env.get_template("execute")?;
        let rendered = template.render(context! {
            plan_text => plan.narrative_text.as_str(),
            task => plan.task.as_str(),
        })?;
        Ok(rendered)
    }
}

/// Prompt handed to the build agent: the approved narrative plus the original task.
pub fn render_execute_prompt(plan: &Plan) -> Result<String> {
    PromptEngine::new().render_execute(plan)
}
