//! 能力画像选择器
//!
//! 纯函数的关键词分类：把任务文本与需求转小写后做子串匹配，按固定优先级检查各画像的关键词表，
//! 编排类描述优先于专项匹配；都不命中时返回 General。

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 任务的能力类别，用于把工作路由到合适的工具集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityProfile {
    Orchestrator,
    Browser,
    Coder,
    Analyst,
    Researcher,
    Writer,
    General,
}

impl CapabilityProfile {
    /// 检查顺序（General 是兜底，不在其中）
    pub const PRIORITY: [CapabilityProfile; 6] = [
        CapabilityProfile::Orchestrator,
        CapabilityProfile::Browser,
        CapabilityProfile::Coder,
        CapabilityProfile::Analyst,
        CapabilityProfile::Researcher,
        CapabilityProfile::Writer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityProfile::Orchestrator => "orchestrator",
            CapabilityProfile::Browser => "browser",
            CapabilityProfile::Coder => "coder",
            CapabilityProfile::Analyst => "analyst",
            CapabilityProfile::Researcher => "researcher",
            CapabilityProfile::Writer => "writer",
            CapabilityProfile::General => "general",
        }
    }

    /// 预估耗时（秒），常量而非实测
    pub fn estimated_secs(&self) -> u64 {
        match self {
            CapabilityProfile::Orchestrator => 60,
            CapabilityProfile::Browser => 45,
            CapabilityProfile::Researcher => 40,
            CapabilityProfile::Analyst => 35,
            CapabilityProfile::Coder => 30,
            CapabilityProfile::Writer => 25,
            CapabilityProfile::General => 15,
        }
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            CapabilityProfile::Orchestrator => &[
                "orchestrat",
                "coordinate",
                "multi-step",
                "multiple agents",
                "end-to-end",
                "workflow",
                "pipeline",
                "delegate",
                "break down",
            ],
            CapabilityProfile::Browser => &[
                "browser",
                "navigate",
                "click",
                "screenshot",
                "web page",
                "webpage",
                "website",
                "fill form",
                "fill out",
                "log in to",
                "scrape",
                "http://",
                "https://",
            ],
            CapabilityProfile::Coder => &[
                "code",
                "program",
                "function",
                "implement",
                "debug",
                "refactor",
                "compile",
                "script",
                "rust",
                "python",
                "unit test",
            ],
            CapabilityProfile::Analyst => &[
                "analy",
                "data",
                "statistic",
                "metric",
                "chart",
                "trend",
                "compare",
                "csv",
                "spreadsheet",
                "calculate",
            ],
            CapabilityProfile::Researcher => &[
                "research",
                "search",
                "find",
                "investigate",
                "look up",
                "lookup",
                "sources",
                "literature",
                "survey",
            ],
            CapabilityProfile::Writer => &[
                "write",
                "draft",
                "summar",
                "essay",
                "article",
                "blog",
                "email",
                "report",
                "translate",
            ],
            CapabilityProfile::General => &[],
        }
    }

    /// 工具名片段：合并目录中名称包含其中之一的工具会被建议给该画像
    pub fn tool_hints(&self) -> &'static [&'static str] {
        match self {
            CapabilityProfile::Orchestrator => &[""],
            CapabilityProfile::Browser => &["browser"],
            CapabilityProfile::Coder => &["code", "shell", "git", "test"],
            CapabilityProfile::Analyst => &["data", "query", "calc", "analy"],
            CapabilityProfile::Researcher => &["search", "browser_navigate", "browser_content", "fetch"],
            CapabilityProfile::Writer => &["write", "report", "doc"],
            CapabilityProfile::General => &["echo"],
        }
    }
}

impl fmt::Display for CapabilityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        CapabilityProfile::PRIORITY
            .iter()
            .chain(std::iter::once(&CapabilityProfile::General))
            .find(|p| p.as_str() == lower)
            .copied()
            .ok_or_else(|| format!("Unknown capability profile: {}", s))
    }
}

/// 选择结果及命中的关键词（General 时为 None）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub profile: CapabilityProfile,
    pub matched: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgentSelector;

impl AgentSelector {
    pub fn new() -> Self {
        Self
    }

    pub fn select(&self, task: &str, requirements: &[String]) -> CapabilityProfile {
        self.explain(task, requirements).profile
    }

    pub fn explain(&self, task: &str, requirements: &[String]) -> Selection {
        let mut text = task.to_lowercase();
        for r in requirements {
            text.push(' ');
            text.push_str(&r.to_lowercase());
        }

        for profile in CapabilityProfile::PRIORITY {
            if let Some(kw) = profile.keywords().iter().find(|kw| text.contains(**kw)) {
                return Selection {
                    profile,
                    matched: Some(*kw),
                };
            }
        }
        Selection {
            profile: CapabilityProfile::General,
            matched: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(task: &str) -> CapabilityProfile {
        AgentSelector::new().select(task, &[])
    }

    #[test]
    fn test_specialist_profiles() {
        assert_eq!(select("Open https://example.com and click login"), CapabilityProfile::Browser);
        assert_eq!(select("Implement a retry function"), CapabilityProfile::Coder);
        assert_eq!(select("Compare quarterly sales figures"), CapabilityProfile::Analyst);
        assert_eq!(select("Research recent papers on battery chemistry"), CapabilityProfile::Researcher);
        assert_eq!(select("Write a blog post about spring"), CapabilityProfile::Writer);
        assert_eq!(select("hello there"), CapabilityProfile::General);
    }

    #[test]
    fn test_priority_orchestrator_outranks_specialists() {
        assert_eq!(
            select("Coordinate a workflow that writes code and browses the website"),
            CapabilityProfile::Orchestrator
        );
        // writer 与 coder 都命中时 coder 优先
        assert_eq!(select("Write a python script"), CapabilityProfile::Coder);
    }

    #[test]
    fn test_requirements_and_case_are_considered() {
        let selection = AgentSelector::new().explain("Do the thing", &["Needs DATA cleanup".to_string()]);
        assert_eq!(selection.profile, CapabilityProfile::Analyst);
        assert_eq!(selection.matched, Some("data"));
    }

    #[test]
    fn test_profile_parse_and_estimates() {
        assert_eq!("Browser".parse::<CapabilityProfile>(), Ok(CapabilityProfile::Browser));
        assert_eq!("general".parse::<CapabilityProfile>(), Ok(CapabilityProfile::General));
        assert!("pilot".parse::<CapabilityProfile>().is_err());
        assert_eq!(CapabilityProfile::Orchestrator.estimated_secs(), 60);
        assert_eq!(CapabilityProfile::General.estimated_secs(), 15);
    }
}
