use super::{advance_stage, now_timestamp, StageEnv, StageOutput};
use crate::backend::CompletionRequest;
use crate::error::{PackopsError, Result};
use crate::paths;
use crate::record::WorkItem;
use crate::run_context::RunContext;
use crate::types::Stage;
use serde_json::{json, Value};
use tracing::info;

const REPORT_MAX_TOKENS: u32 = 8000;
const SUMMARY_MAX_LINES: usize = 5;
const DEFAULT_SUMMARY: &str = "Deep dive research completed. See full report for details.";

const RESEARCH_SYSTEM_PROMPT: &str = "You are an expert research assistant specializing in \
compliance, regulations, and engineering toolkits. Provide comprehensive, accurate, and \
actionable content.";

const BUILTIN_TEMPLATE: &str = "\
1. Regulation overview and scope
2. Who must comply and when
3. Key obligations and deadlines
4. Common failure modes and penalties
5. Evidence and documentation required
6. Implementation checklist for engineering teams
7. Templates and code examples
8. Open questions and sources";

pub fn build_prompt(record: &WorkItem, template: &str) -> String {
    let name = record.name().unwrap_or("Unknown Pack");
    let number = record.number_label();
    let regulation = record.regulation_name();
    let audience = record.target_audience();
    let audience_lines = if audience.is_empty() {
        "- Not specified".to_string()
    } else {
        audience
            .iter()
            .map(|a| format!("- {a}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let price = record.price_cents() as f64 / 100.0;
    let metadata = json!({
        "packSlug": record.slug().unwrap_or_default(),
        "packName": name,
        "packNumber": number,
        "regulationName": regulation,
        "targetAudience": audience,
        "currentStage": record.current_stage(),
        "price": format!("${price:.2}"),
    });
    let metadata = serde_json::to_string_pretty(&metadata).unwrap_or_default();

    format!(
        "You are an AI research assistant creating compliance and readiness documentation.\n\n\
         # Pack Metadata\n```json\n{metadata}\n```\n\n\
         # Research Context\n\
         You are conducting deep-dive research for the **{name}** (Pack #{number}).\n\n\
         **Regulation/Standard:** {regulation}\n\n\
         **Target Audience:**\n{audience_lines}\n\n\
         **ICP Summary:**\n{icp}\n\n\
         # Instructions\n\
         Use the following research template and replace every placeholder with specifics \
         about **{regulation}**.\n\n---\n\n{template}\n\n---\n\n\
         After the full report, provide a 1-2 paragraph executive summary under a heading \
         named \"Executive Summary\".",
        icp = record.icp_summary().unwrap_or("No ICP summary provided"),
    )
}

/// Pull up to five non-blank lines following an "executive summary" heading.
pub fn extract_summary(report: &str) -> String {
    let mut lines = report.lines();
    let found = lines.by_ref().any(|line| {
        let lower = line.to_lowercase();
        lower.contains("summary") && (lower.contains("executive") || lower.contains("deep_dive"))
    });
    if !found {
        return DEFAULT_SUMMARY.to_string();
    }
    let summary: Vec<&str> = lines
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(SUMMARY_MAX_LINES)
        .collect();
    if summary.is_empty() {
        DEFAULT_SUMMARY.to_string()
    } else {
        summary.join(" ")
    }
}

fn load_template(env: &StageEnv) -> Result<String> {
    match &env.research_template {
        None => Ok(BUILTIN_TEMPLATE.to_string()),
        Some(path) => {
            let path = env.root.join(path);
            std::fs::read_to_string(&path).map_err(|e| PackopsError::StagePrecondition {
                stage: "deep_research".to_string(),
                reason: format!("research template {}: {e}", path.display()),
            })
        }
    }
}

fn push_unique(list: &mut Value, item: &str) {
    if !list.is_array() {
        *list = Value::Array(Vec::new());
    }
    if let Value::Array(items) = list {
        if !items.iter().any(|v| v.as_str() == Some(item)) {
            items.push(Value::String(item.to_string()));
        }
    }
}

/// Research run ahead of scoring leaves the stage alone so the idea still
/// goes through validation and the scoring gate.
fn scoring_passed(record: &WorkItem, ctx: &RunContext) -> bool {
    ctx.gate.scoring.is_some_and(|g| g.passed())
        || record.str_at(&["stages", "scoring", "gate"]) == Some("pass")
}

/// Generate the deep-dive report, save it, and mark research complete.
pub fn run(env: &StageEnv, record: &WorkItem, ctx: &mut RunContext) -> Result<StageOutput> {
    let template = load_template(env)?;
    let completion = env.backend.generate(&CompletionRequest {
        system: RESEARCH_SYSTEM_PROMPT.to_string(),
        prompt: build_prompt(record, &template),
        max_tokens: Some(REPORT_MAX_TOKENS),
        json_output: false,
    })?;

    let summary = extract_summary(&completion.text);
    let report_path = paths::research_report_path(&env.root, &ctx.work_item_id, &ctx.run_id);
    crate::io::atomic_write(&report_path, completion.text.as_bytes())?;
    let artifact = report_path
        .strip_prefix(&env.root)
        .unwrap_or(&report_path)
        .display()
        .to_string();

    ctx.artifacts.deep_dive_report_path = Some(artifact.clone());
    ctx.notes.deep_dive_summary = Some(summary.clone());

    let now = now_timestamp();
    let mut updated = record.clone();
    {
        let research = updated.object_at_mut(&["research"]);
        research.insert("researchCompleted".to_string(), Value::Bool(true));
        push_unique(
            research
                .entry("researchArtifacts".to_string())
                .or_insert(Value::Null),
            &artifact,
        );
    }
    {
        let stage = updated.complete_stage(Stage::DeepDive.as_str(), &now);
        push_unique(
            stage
                .entry("researchArtifacts".to_string())
                .or_insert(Value::Null),
            &artifact,
        );
    }
    if scoring_passed(record, ctx) {
        advance_stage(&mut updated, Stage::DeepDive);
    }
    updated.set_gate_note(Stage::DeepDive.as_str(), summary);
    updated.touch(&now);

    info!(slug = %ctx.work_item_id, report = %artifact, tokens = completion.tokens_used, "deep research report saved");
    Ok(StageOutput {
        record: updated,
        cost: completion.tokens_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCatalog;
    use crate::testing::{sample_record, ScriptedBackend};
    use crate::types::ScoringGate;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn env(dir: &TempDir, backend: ScriptedBackend) -> StageEnv {
        StageEnv {
            store: Arc::new(MemoryCatalog::default()),
            backend: Arc::new(backend),
            root: dir.path().to_path_buf(),
            research_template: None,
        }
    }

    #[test]
    fn summary_from_executive_heading() {
        let report = "# Report\nbody\n## Executive Summary\n\nFirst line.\nSecond line.\n";
        assert_eq!(extract_summary(report), "First line. Second line.");
    }

    #[test]
    fn summary_caps_at_five_lines() {
        let report = "Executive summary\n1\n2\n3\n4\n5\n6\n";
        assert_eq!(extract_summary(report), "1 2 3 4 5");
    }

    #[test]
    fn summary_defaults_without_heading() {
        assert_eq!(extract_summary("# Findings\nNo summary section here."), DEFAULT_SUMMARY);
        assert_eq!(extract_summary("## Executive Summary\n   \n"), DEFAULT_SUMMARY);
    }

    #[test]
    fn prompt_formats_price_and_audience() {
        let prompt = build_prompt(&sample_record("tax-assist"), "TEMPLATE BODY");
        assert!(prompt.contains("$49.00"));
        assert!(prompt.contains("- Accountants\n- Payroll teams"));
        assert!(prompt.contains("Pack #7"));
        assert!(prompt.contains("TEMPLATE BODY"));
    }

    #[test]
    fn writes_report_and_updates_record() {
        let dir = TempDir::new().unwrap();
        let backend = ScriptedBackend::new().reply("# Report\n## Executive Summary\nShip it.", 5000);
        let env = env(&dir, backend);
        let mut ctx = RunContext::with_run_id("run-1", "tax-assist");

        let out = run(&env, &sample_record("tax-assist"), &mut ctx).unwrap();

        let expected = ".packops/research/tax-assist-run-1-deep-dive.md";
        assert_eq!(ctx.artifacts.deep_dive_report_path.as_deref(), Some(expected));
        assert_eq!(ctx.notes.deep_dive_summary.as_deref(), Some("Ship it."));
        assert!(dir.path().join(expected).exists());
        assert_eq!(out.cost, 5000);

        let r = &out.record;
        assert!(r.research_completed());
        assert_eq!(r.research_artifacts(), vec![expected.to_string()]);
        assert_eq!(r.stage_status("deep_dive"), Some("completed"));
        assert_eq!(r.current_stage(), "idea");
        assert_eq!(r.str_at(&["crm", "gateDecisionNotes", "deep_dive"]), Some("Ship it."));
    }

    #[test]
    fn advances_to_deep_dive_only_after_scoring_pass() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir, ScriptedBackend::new().reply("report", 10).reply("report", 10));

        let mut ctx = RunContext::with_run_id("run-1", "tax-assist");
        ctx.gate.scoring = Some(ScoringGate::Pass);
        let out = run(&env, &sample_record("tax-assist"), &mut ctx).unwrap();
        assert_eq!(out.record.current_stage(), "deep_dive");

        let mut scored = sample_record("tax-assist");
        scored.set_path(&["stages", "scoring", "gate"], serde_json::json!("pass"));
        let mut ctx = RunContext::with_run_id("run-2", "tax-assist");
        let out = run(&env, &scored, &mut ctx).unwrap();
        assert_eq!(out.record.current_stage(), "deep_dive");
    }

    #[test]
    fn missing_configured_template_fails() {
        let dir = TempDir::new().unwrap();
        let mut env = env(&dir, ScriptedBackend::new().reply("unused", 1));
        env.research_template = Some("pack-process/TEMPLATE.md".into());
        let mut ctx = RunContext::with_run_id("run-1", "tax-assist");
        let err = run(&env, &sample_record("tax-assist"), &mut ctx).unwrap_err();
        assert!(matches!(err, PackopsError::StagePrecondition { .. }));
    }
}
