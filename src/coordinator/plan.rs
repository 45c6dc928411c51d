//! 协调请求与计划类型

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::ToolhubError;

use super::selector::CapabilityProfile;

/// 执行顺序的计算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// 按输入顺序逐个执行
    #[default]
    Sequential,
    /// 全部放在同一组，组内无先后
    Parallel,
    /// 按依赖拓扑排序
    Dependency,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Parallel => "parallel",
            ExecutionMode::Dependency => "dependency",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "parallel" => Ok(ExecutionMode::Parallel),
            "dependency" => Ok(ExecutionMode::Dependency),
            other => Err(format!("Unknown execution mode: {}", other)),
        }
    }
}

/// 调用方提交的子任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SubtaskSpec {
    /// 子任务 ID；缺省为输入位置 + 1
    #[serde(default)]
    pub id: Option<usize>,
    pub description: String,
    /// 必须先完成的子任务 ID；不存在的 ID 视为已满足
    #[serde(default)]
    pub depends_on: Vec<usize>,
    /// 显式指定画像，优先于自动选择
    #[serde(default)]
    pub profile: Option<CapabilityProfile>,
    /// 额外需求描述，参与画像选择
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl SubtaskSpec {
    pub fn new(id: usize, description: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            description: description.into(),
            depends_on: Vec::new(),
            profile: None,
            requirements: Vec::new(),
        }
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = usize>) -> Self {
        self.depends_on = deps.into_iter().collect();
        self
    }

    pub fn with_profile(mut self, profile: CapabilityProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_requirements(mut self, requirements: Vec<String>) -> Self {
        self.requirements = requirements;
        self
    }
}

/// 推理循环以 JSON 提交的协调请求
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CoordinateRequest {
    pub task: String,
    pub subtasks: Vec<SubtaskSpec>,
    #[serde(default)]
    pub mode: ExecutionMode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubtaskAssignment {
    pub id: usize,
    pub description: String,
    pub profile: CapabilityProfile,
    pub profile_overridden: bool,
    pub depends_on: Vec<usize>,
    pub estimated_secs: u64,
    pub suggested_tools: Vec<String>,
}

/// 协调结果：只描述怎么做，不执行任何东西；字段只读
#[derive(Debug, Clone, Serialize)]
pub struct CoordinationPlan {
    id: String,
    task: String,
    mode: ExecutionMode,
    assignments: Vec<SubtaskAssignment>,
    order: Vec<Vec<usize>>,
    estimated_duration_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    degraded: Option<Vec<usize>>,
    created_at: DateTime<Utc>,
}

impl CoordinationPlan {
    pub(crate) fn new(
        task: &str,
        mode: ExecutionMode,
        assignments: Vec<SubtaskAssignment>,
        order: Vec<Vec<usize>>,
        degraded: Option<Vec<usize>>,
    ) -> Self {
        let estimated_duration_secs = assignments.iter().map(|a| a.estimated_secs).sum();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            task: task.to_string(),
            mode,
            assignments,
            order,
            estimated_duration_secs,
            degraded,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn assignments(&self) -> &[SubtaskAssignment] {
        &self.assignments
    }

    pub fn assignment(&self, id: usize) -> Option<&SubtaskAssignment> {
        self.assignments.iter().find(|a| a.id == id)
    }

    /// 分组的执行顺序（子任务 ID）；组内可并行，组间按顺序
    pub fn order(&self) -> &[Vec<usize>] {
        &self.order
    }

    pub fn flat_order(&self) -> Vec<usize> {
        self.order.iter().flatten().copied().collect()
    }

    pub fn estimated_duration_secs(&self) -> u64 {
        self.estimated_duration_secs
    }

    /// 因依赖环被整体冲刷的子任务 ID
    pub fn degraded(&self) -> Option<&[usize]> {
        self.degraded.as_deref()
    }

    /// 计划降级时对应的 DependencyCycle 错误，供需要严格拒绝环的调用方使用
    pub fn cycle_error(&self) -> Option<ToolhubError> {
        self.degraded
            .as_ref()
            .map(|ids| ToolhubError::DependencyCycle(ids.clone()))
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn assignments_mut(&mut self) -> &mut [SubtaskAssignment] {
        &mut self.assignments
    }
}
