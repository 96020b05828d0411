//! Prompt pack builder for the generation backend.
//!
//! Templates mark their sections with `<!-- section:KEY required|droppable -->`.
//! When a rendered prompt exceeds the byte budget, droppable sections go first
//! (in each prompt's drop order), then the last section is truncated.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::task::{PreviousResult, TaskStep};
use crate::core::types::FileMap;

const DECOMPOSITION_TEMPLATE: &str = include_str!("prompts/decomposition.md");
const STEP_TEMPLATE: &str = include_str!("prompts/step.md");
const HEAL_TEMPLATE: &str = include_str!("prompts/heal.md");

const TRUNCATED_MARKER: &str = "\n[truncated]";

const DECOMPOSITION_DROP_ORDER: &[&str] = &["preview"];
const STEP_DROP_ORDER: &[&str] = &["previous"];
const HEAL_DROP_ORDER: &[&str] = &[];

#[derive(Debug, Clone, Serialize)]
struct FileView {
    name: String,
    body: String,
}

#[derive(Debug, Clone, Serialize)]
struct StepView {
    title: String,
    description: String,
    files_affected: Vec<String>,
}

impl StepView {
    fn from_step(step: &TaskStep) -> Self {
        Self {
            title: step.title.clone(),
            description: step.description.clone(),
            files_affected: step.files_affected.clone(),
        }
    }
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("decomposition", DECOMPOSITION_TEMPLATE)
            .context("load decomposition template")?;
        env.add_template("step", STEP_TEMPLATE)
            .context("load step template")?;
        env.add_template("heal", HEAL_TEMPLATE)
            .context("load heal template")?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} prompt"))
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    /// Required sections are never dropped.
    required: bool,
    content: String,
}

fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    use std::sync::LazyLock;
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
            .expect("section marker regex is valid")
    });

    let markers: Vec<(usize, usize, String, bool)> = SECTION_RE
        .captures_iter(rendered)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let key = caps.get(1)?.as_str().to_string();
            let required = caps.get(2)?.as_str() == "required";
            Some((whole.start(), whole.end(), key, required))
        })
        .collect();

    let mut sections = Vec::new();
    for (i, (_, start, key, required)) in markers.iter().enumerate() {
        let end = markers
            .get(i + 1)
            .map(|next| next.0)
            .unwrap_or(rendered.len());
        let content = rendered[*start..end].trim().to_string();
        if !content.is_empty() || *required {
            sections.push(ParsedSection {
                key: key.clone(),
                required: *required,
                content,
            });
        }
    }
    sections
}

fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize, drop_order: &[&str]) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    if total_len(sections) <= budget {
        return;
    }

    for key in drop_order {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    let Some((last, rest)) = sections.split_last_mut() else {
        return;
    };
    let other_len: usize = rest.iter().map(|s| s.content.len()).sum();
    let allowed = budget.saturating_sub(other_len);
    if last.content.len() > allowed {
        let before_len = last.content.len();
        if allowed > TRUNCATED_MARKER.len() {
            truncate_at_char_boundary(&mut last.content, allowed - TRUNCATED_MARKER.len());
            last.content.push_str(TRUNCATED_MARKER);
        } else {
            truncate_at_char_boundary(&mut last.content, allowed);
        }
        debug!(
            section = last.key,
            before_len,
            after_len = last.content.len(),
            "truncated section for budget"
        );
    }
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Cut `text` to at most `max` bytes without splitting a character.
fn truncate_at_char_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn file_views(files: &FileMap, limit: Option<usize>) -> Vec<FileView> {
    files
        .iter()
        .map(|(name, body)| {
            let mut body = body.clone();
            if let Some(limit) = limit
                && body.len() > limit
            {
                truncate_at_char_boundary(&mut body, limit);
                body.push_str(TRUNCATED_MARKER);
            }
            FileView {
                name: name.clone(),
                body,
            }
        })
        .collect()
}

/// Builds prompt packs within a byte budget.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
    file_preview_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize, file_preview_bytes: usize) -> Self {
        Self {
            budget_bytes,
            file_preview_bytes,
        }
    }

    /// Ask for an ordered JSON plan of 3 to 8 steps.
    ///
    /// Lists every current file name (or `(empty project)`) and embeds a
    /// per-file preview capped at `file_preview_bytes`.
    pub fn build_decomposition(&self, user_prompt: &str, files: &FileMap) -> Result<PromptPack> {
        let file_names: Vec<&str> = files.keys().map(String::as_str).collect();
        let ctx = context! {
            user_prompt => user_prompt.trim(),
            file_names => file_names,
            previews => file_views(files, Some(self.file_preview_bytes)),
        };
        self.build("decomposition", ctx, DECOMPOSITION_DROP_ORDER)
    }

    /// Prompt for one step.
    ///
    /// `previous` should hold completed steps only; see
    /// [`AutonomousTask::previous_results`](crate::core::task::AutonomousTask::previous_results).
    pub fn build_step(
        &self,
        step: &TaskStep,
        total_steps: usize,
        previous: &[PreviousResult],
        files: &FileMap,
    ) -> Result<PromptPack> {
        let ctx = context! {
            position => step.index + 1,
            total => total_steps,
            step => StepView::from_step(step),
            previous => previous,
            files => file_views(files, None),
        };
        self.build("step", ctx, STEP_DROP_ORDER)
    }

    /// Ask for a repair of every listed validation error.
    pub fn build_self_heal(&self, errors: &[String], files: &FileMap) -> Result<PromptPack> {
        let ctx = context! {
            errors => errors,
            files => file_views(files, None),
        };
        self.build("heal", ctx, HEAL_DROP_ORDER)
    }

    fn build(&self, name: &str, ctx: minijinja::Value, drop_order: &[&str]) -> Result<PromptPack> {
        let rendered = PromptEngine::new()?.render(name, ctx)?;
        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes, drop_order);
        let content = render_sections(&sections);
        debug!(prompt = name, bytes = content.len(), "built prompt");
        Ok(PromptPack { content })
    }
}

/// A rendered prompt ready to send to the generator.
#[derive(Debug, Clone)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    pub fn render(&self) -> String {
        self.content.clone()
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }
}
