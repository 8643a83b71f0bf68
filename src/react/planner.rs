//! Planner：一次性调用 Reasoner，把目标拆成编号步骤列表
//!
//! 计划文本协议：每行 `序号 + 分隔符(. ) :) + 指令`，允许 `Step 1:`、列表符号与粗体标记；
//! 第一项之前的说明文字忽略，紧随某项的无编号行视为该项的续行。序号必须从 1 开始且连续，否则整份计划作废。

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;

use crate::core::PlanError;
use crate::llm::Reasoner;

const PLANNER_TEMPLATE: &str = "You are a planner. Write a numbered, step-by-step plan for the task below. \
Each step must be one clear instruction that another agent can carry out with tools such as web search, \
video search, transcript download and file reading or writing. Split large jobs into smaller batches \
(for example 10 items per step).

Steps must not overlap: two steps must never collect the same items. A generic query in a later step \
that re-finds what an earlier, more specific step already collected is an overlap.

Wrong:
1. Search for 20 action movies and append 'Title,Action' to movies.csv.
2. Search for 20 movies and append 'Title,Action' to movies.csv.

Right:
1. Search for 20 action movies and store their URLs in urls.txt.
2. Take the URLs from urls.txt, fetch each transcript and save it.
3. Append the title, URL and transcript path of each movie to movies.csv.
4. Search for 20 comedy movies and store their URLs in comedy_urls.txt.

Output ONLY the numbered steps.

Task: {goal}
Plan:";

/// 计划中的一步：序号从 1 开始，产生后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub ordinal: usize,
    pub instruction: String,
}

fn explicit_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bsteps?\s+#?(\d+(?:\s*(?:,|and|&|-|to|through)\s*#?\d+)*)").expect("step ref regex")
    })
}

fn previous_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:previous|prior|preceding|last|above)\s+step\b|\bstep\s+above\b").expect("previous step regex")
    })
}

fn artifact_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b[\w-]+\.(?:txt|csv|tsv|json|jsonl|md)\b").expect("artifact regex"))
}

fn consumed_artifact_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:from|read|reads|reading|using|use|uses|open|opens|load|loads|listed in|found in|saved in|contained in|based on)\s+(?:the\s+)?(?:file\s+)?(?:`|')?([\w-]+\.(?:txt|csv|tsv|json|jsonl|md))\b",
        )
        .expect("consumed artifact regex")
    })
}

/// 指令中出现的 "step N" / "steps N and M" / "steps N-M" 引用；只保留小于 below 的序号，范围按 below 截断
fn referenced_ordinals(text: &str, below: usize) -> BTreeSet<usize> {
    static NUM: OnceLock<Regex> = OnceLock::new();
    let num = NUM.get_or_init(|| Regex::new(r"\d+").expect("number regex"));
    let mut out = BTreeSet::new();
    for caps in explicit_ref_re().captures_iter(text) {
        let group = &caps[1];
        let nums: Vec<usize> = num.find_iter(group).filter_map(|m| m.as_str().parse().ok()).collect();
        let is_range = group.contains('-') || group.to_lowercase().contains("to") || group.to_lowercase().contains("through");
        match nums.as_slice() {
            [from, to] if is_range && from <= to => out.extend(*from..(*to).saturating_add(1).min(below)),
            _ => out.extend(nums.into_iter().filter(|n| *n < below)),
        }
    }
    out
}

/// 指令中提到的所有文件名（小写）
pub fn mentioned_artifacts(text: &str) -> BTreeSet<String> {
    artifact_re()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// 指令中以"读取/使用"语境出现的文件名（小写）
fn consumed_artifacts(text: &str) -> BTreeSet<String> {
    consumed_artifact_re()
        .captures_iter(text)
        .map(|c| c[1].to_lowercase())
        .collect()
}

impl Step {
    /// 本步是否依赖更早的 earlier 步骤的产出：
    /// 显式引用其序号、提到"上一步"且 earlier 正是上一步、或读取 earlier 提到的文件
    pub fn depends_on(&self, earlier: &Step) -> bool {
        if earlier.ordinal >= self.ordinal {
            return false;
        }
        if referenced_ordinals(&self.instruction, self.ordinal).contains(&earlier.ordinal) {
            return true;
        }
        if earlier.ordinal + 1 == self.ordinal && previous_ref_re().is_match(&self.instruction) {
            return true;
        }
        let produced = mentioned_artifacts(&earlier.instruction);
        consumed_artifacts(&self.instruction)
            .iter()
            .any(|name| produced.contains(name))
    }
}

/// 有序计划
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    goal: String,
    steps: Vec<Step>,
}

impl Plan {
    /// 由指令列表直接构造（序号按顺序从 1 编号）
    pub fn from_instructions<I, S>(goal: impl Into<String>, instructions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let steps = instructions
            .into_iter()
            .enumerate()
            .map(|(i, s)| Step {
                ordinal: i + 1,
                instruction: s.into(),
            })
            .collect();
        Self {
            goal: goal.into(),
            steps,
        }
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 打印用：每行 "N. instruction"
    pub fn render(&self) -> String {
        self.steps
            .iter()
            .map(|s| format!("{}. {}", s.ordinal, s.instruction))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:[-*#>]+\s*)?(?:\*\*)?(?:step\s+)?(\d+)\s*[.):](?:\*\*)?\s+(.+?)\s*$").expect("plan item regex")
    })
}

fn clean_instruction(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c == '*' || c == '`')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_error(reason: impl Into<String>, raw: &str) -> PlanError {
    PlanError::Parse {
        reason: reason.into(),
        raw: raw.to_string(),
    }
}

const BULLETS: &[char] = &['-', '*', '•'];

/// 解析计划文本；任何不合规都返回 PlanError::Parse，不产出部分计划
pub fn parse_plan(goal: &str, raw: &str) -> Result<Plan, PlanError> {
    let mut items: Vec<(usize, String)> = Vec::new();
    let mut blank_since_item = false;

    for line in raw.lines() {
        if line.trim().is_empty() {
            blank_since_item = true;
            continue;
        }
        if let Some(caps) = item_re().captures(line) {
            let ordinal: usize = caps[1]
                .parse()
                .map_err(|_| parse_error(format!("step number '{}' is out of range", &caps[1]), raw))?;
            items.push((ordinal, caps[2].to_string()));
            blank_since_item = false;
            continue;
        }
        let Some((_, text)) = items.last_mut() else {
            continue; // 第一项之前的说明
        };
        let trimmed = line.trim_start();
        let indented = trimmed.len() != line.len();
        let bullet = trimmed.starts_with(BULLETS);
        if !blank_since_item || indented || bullet {
            text.push(' ');
            text.push_str(trimmed.trim_start_matches(BULLETS).trim());
        }
    }

    if items.is_empty() {
        return Err(parse_error("no numbered steps found", raw));
    }

    let mut steps = Vec::with_capacity(items.len());
    for (i, (ordinal, text)) in items.into_iter().enumerate() {
        if ordinal != i + 1 {
            return Err(parse_error(
                format!("expected step {} but found step {}", i + 1, ordinal),
                raw,
            ));
        }
        let instruction = clean_instruction(&text);
        if instruction.is_empty() {
            return Err(parse_error(format!("step {} has no instruction", ordinal), raw));
        }
        steps.push(Step { ordinal, instruction });
    }

    Ok(Plan {
        goal: goal.to_string(),
        steps,
    })
}

/// Planner：持有 Reasoner，一次调用产出计划
pub struct Planner {
    reasoner: Arc<dyn Reasoner>,
}

impl Planner {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self { reasoner }
    }

    pub fn prompt(goal: &str) -> String {
        PLANNER_TEMPLATE.replace("{goal}", goal.trim())
    }

    pub async fn plan(&self, goal: &str) -> Result<Plan, PlanError> {
        let raw = self
            .reasoner
            .complete(&Self::prompt(goal))
            .await
            .map_err(PlanError::Reasoner)?;
        let plan = match parse_plan(goal, &raw) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(error = %e, "plan rejected");
                return Err(e);
            }
        };
        tracing::info!(steps = plan.len(), "plan ready");
        for step in plan.steps() {
            tracing::debug!(step = step.ordinal, instruction = %step.instruction, "plan step");
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedReasoner;

    fn step(ordinal: usize, instruction: &str) -> Step {
        Step {
            ordinal,
            instruction: instruction.to_string(),
        }
    }

    #[test]
    fn test_parse_simple_plan() {
        let plan = parse_plan("g", "1. Search videos\n2) Fetch transcripts\n3: Write csv").unwrap();
        let ordinals: Vec<usize> = plan.steps().iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert_eq!(plan.steps()[1].instruction, "Fetch transcripts");
        assert_eq!(plan.goal(), "g");
    }

    #[test]
    fn test_parse_ignores_preamble_and_joins_continuations() {
        let raw = "Here is the plan:\n\n**Step 1:** Search for 5 AI tutorials\n   and store URLs in urls.txt\n- 2. Fetch each transcript\n\nThis plan avoids overlap.";
        let plan = parse_plan("g", raw).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps()[0].instruction, "Search for 5 AI tutorials and store URLs in urls.txt");
        assert_eq!(plan.steps()[1].instruction, "Fetch each transcript");
    }

    #[test]
    fn test_parse_rejects_gaps_and_wrong_start() {
        assert!(matches!(parse_plan("g", "1. a\n3. b"), Err(PlanError::Parse { .. })));
        assert!(matches!(parse_plan("g", "2. a\n3. b"), Err(PlanError::Parse { .. })));
        assert!(matches!(parse_plan("g", "1. a\n1. b"), Err(PlanError::Parse { .. })));
    }

    #[test]
    fn test_parse_rejects_unnumbered_text() {
        match parse_plan("g", "I cannot make a plan.") {
            Err(PlanError::Parse { reason, raw }) => {
                assert!(reason.contains("no numbered steps"));
                assert_eq!(raw, "I cannot make a plan.");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(parse_plan("g", "").is_err());
        assert!(parse_plan("g", "1. **").is_err());
    }

    #[test]
    fn test_explicit_step_reference() {
        let s3 = step(3, "Use the URLs collected in step 1 to fetch transcripts");
        assert!(s3.depends_on(&step(1, "Search")));
        assert!(!s3.depends_on(&step(2, "Search")));

        let s5 = step(5, "Merge the results of steps 2 and 4");
        assert!(s5.depends_on(&step(2, "x")));
        assert!(s5.depends_on(&step(4, "x")));
        assert!(!s5.depends_on(&step(3, "x")));

        let s6 = step(6, "Summarise steps 2-4");
        assert!(s6.depends_on(&step(3, "x")));
    }

    #[test]
    fn test_huge_step_range_is_bounded_by_own_ordinal() {
        let refs = referenced_ordinals("Merge the results of steps 1 to 4000000000", 3);
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec![1, 2]);
        let refs = referenced_ordinals("Use step 18446744073709551615 and step 1", 3);
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec![1]);

        let plan = Plan::from_instructions("g", ["a", "b", "Merge the results of steps 1 to 4000000000"]);
        assert!(plan.steps()[2].depends_on(&plan.steps()[1]));
    }

    #[test]
    fn test_previous_step_reference() {
        let s2 = step(2, "Fetch transcripts for the videos found in the previous step");
        assert!(s2.depends_on(&step(1, "Search")));
        let s3 = step(3, "Fetch transcripts for the videos found in the previous step");
        assert!(!s3.depends_on(&step(1, "Search")));
    }

    #[test]
    fn test_artifact_dependency_requires_reading() {
        let producer = step(1, "Search for 5 AI tutorials and store the URLs in urls.txt");
        let consumer = step(3, "Take each URL from urls.txt and fetch its transcript");
        let appender = step(4, "Search for 5 more tutorials and store the URLs in urls.txt");
        assert!(consumer.depends_on(&producer));
        assert!(!appender.depends_on(&producer));
    }

    #[test]
    fn test_never_depends_on_later_step() {
        assert!(!step(1, "see step 2").depends_on(&step(2, "x")));
    }

    #[tokio::test]
    async fn test_planner_prompt_and_parse() {
        let reasoner = Arc::new(ScriptedReasoner::new(["1. Search\n2. Save"]));
        let planner = Planner::new(reasoner.clone());
        let plan = planner.plan("collect tutorials").await.unwrap();
        assert_eq!(plan.len(), 2);
        let ctx = &reasoner.contexts()[0];
        assert!(ctx.contains("Task: collect tutorials"));
        assert!(ctx.trim_end().ends_with("Plan:"));
    }

    #[tokio::test]
    async fn test_planner_reasoner_error_is_distinct() {
        let planner = Planner::new(Arc::new(ScriptedReasoner::new(Vec::<String>::new())));
        assert!(matches!(planner.plan("g").await, Err(PlanError::Reasoner(_))));
    }
}
