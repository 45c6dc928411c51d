//! 任务协调器
//!
//! 为每个子任务确定能力画像（显式指定优先，否则交给 AgentSelector），按模式计算执行顺序，
//! 汇总预估耗时。协调器从不执行任何子任务，调用方按计划逐项通过 ToolRegistry 执行。

use std::sync::Arc;

use schemars::schema_for;

use crate::tools::ToolRegistry;

use super::graph::DependencyGraph;
use super::plan::{
    CoordinateRequest, CoordinationPlan, ExecutionMode, SubtaskAssignment, SubtaskSpec,
};
use super::selector::AgentSelector;

#[derive(Default)]
pub struct TaskCoordinator {
    selector: AgentSelector,
    registry: Option<Arc<ToolRegistry>>,
}

impl TaskCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 提供工具目录后，coordinate 会为每个子任务填充建议工具
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 纯计算的计划（不含建议工具）
    pub fn plan(&self, task: &str, subtasks: &[SubtaskSpec], mode: ExecutionMode) -> CoordinationPlan {
        let assignments: Vec<SubtaskAssignment> = subtasks
            .iter()
            .enumerate()
            .map(|(pos, spec)| self.assign(pos, spec))
            .collect();
        let ids: Vec<usize> = assignments.iter().map(|a| a.id).collect();

        let (order, degraded) = match mode {
            ExecutionMode::Sequential => (ids.iter().map(|id| vec![*id]).collect(), None),
            ExecutionMode::Parallel => {
                if ids.is_empty() {
                    (Vec::new(), None)
                } else {
                    (vec![ids.clone()], None)
                }
            }
            ExecutionMode::Dependency => {
                let deps: Vec<Vec<usize>> =
                    assignments.iter().map(|a| a.depends_on.clone()).collect();
                let layering = DependencyGraph::new(&ids, &deps).layers();
                let to_ids = |layer: &Vec<usize>| layer.iter().map(|&p| ids[p]).collect::<Vec<_>>();
                let order = layering.layers.iter().map(to_ids).collect();
                let degraded = layering.stuck.as_ref().map(to_ids);
                if let Some(stuck) = &degraded {
                    tracing::warn!(task = %task, subtasks = ?stuck, "dependency cycle, flushing remaining subtasks as one group");
                }
                (order, degraded)
            }
        };

        let plan = CoordinationPlan::new(task, mode, assignments, order, degraded);
        tracing::debug!(
            plan = %plan.id(),
            mode = %mode,
            subtasks = plan.assignments().len(),
            estimated_secs = plan.estimated_duration_secs(),
            "coordination plan built"
        );
        plan
    }

    /// 与 plan 相同，并按画像的工具提示从合并目录中填充 suggested_tools
    pub async fn coordinate(
        &self,
        task: &str,
        subtasks: &[SubtaskSpec],
        mode: ExecutionMode,
    ) -> CoordinationPlan {
        let mut plan = self.plan(task, subtasks, mode);
        let Some(registry) = &self.registry else {
            return plan;
        };

        let names = registry.tool_names().await;
        for assignment in plan.assignments_mut() {
            let hints = assignment.profile.tool_hints();
            assignment.suggested_tools = names
                .iter()
                .filter(|name| hints.iter().any(|h| name.contains(h)))
                .cloned()
                .collect();
        }
        tracing::info!(plan = %plan.id(), mode = %mode, order = ?plan.order(), "task coordinated");
        plan
    }

    pub async fn coordinate_request(&self, request: &CoordinateRequest) -> CoordinationPlan {
        self.coordinate(&request.task, &request.subtasks, request.mode)
            .await
    }

    fn assign(&self, pos: usize, spec: &SubtaskSpec) -> SubtaskAssignment {
        let (profile, overridden) = match spec.profile {
            Some(p) => (p, true),
            None => (
                self.selector.select(&spec.description, &spec.requirements),
                false,
            ),
        };
        SubtaskAssignment {
            id: spec.id.unwrap_or(pos + 1),
            description: spec.description.clone(),
            profile,
            profile_overridden: overridden,
            depends_on: spec.depends_on.clone(),
            estimated_secs: profile.estimated_secs(),
            suggested_tools: Vec::new(),
        }
    }
}

/// CoordinateRequest 的 JSON Schema，可拼入 system prompt
pub fn coordinate_schema_json() -> String {
    let schema = schema_for!(CoordinateRequest);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CapabilityProfile;
    use crate::tools::EchoTool;

    fn chain() -> Vec<SubtaskSpec> {
        vec![
            SubtaskSpec::new(1, "Research the topic"),
            SubtaskSpec::new(2, "Write the summary").depends_on([1]),
            SubtaskSpec::new(3, "Open https://example.com to publish").depends_on([2]),
        ]
    }

    #[test]
    fn test_dependency_chain_orders_by_deps() {
        let plan = TaskCoordinator::new().plan("pipeline", &chain(), ExecutionMode::Dependency);
        assert_eq!(plan.flat_order(), vec![1, 2, 3]);
        assert_eq!(plan.order(), &[vec![1], vec![2], vec![3]]);
        assert!(plan.degraded().is_none());
    }

    #[test]
    fn test_dependency_cycle_flushes_each_id_once() {
        let subtasks = vec![
            SubtaskSpec::new(1, "a").depends_on([2]),
            SubtaskSpec::new(2, "b").depends_on([1]),
        ];
        let plan = TaskCoordinator::new().plan("loop", &subtasks, ExecutionMode::Dependency);
        assert_eq!(plan.flat_order(), vec![1, 2]);
        assert_eq!(plan.degraded(), Some(&[1, 2][..]));
        assert!(matches!(
            plan.cycle_error(),
            Some(crate::core::ToolhubError::DependencyCycle(ids)) if ids == vec![1, 2]
        ));
    }

    #[test]
    fn test_sequential_and_parallel_modes() {
        let coordinator = TaskCoordinator::new();
        let reversed: Vec<SubtaskSpec> = chain().into_iter().rev().collect();

        let seq = coordinator.plan("t", &reversed, ExecutionMode::Sequential);
        assert_eq!(seq.order(), &[vec![3], vec![2], vec![1]]);

        let par = coordinator.plan("t", &reversed, ExecutionMode::Parallel);
        assert_eq!(par.order(), &[vec![3, 2, 1]]);

        let empty = coordinator.plan("t", &[], ExecutionMode::Parallel);
        assert!(empty.order().is_empty());
        assert_eq!(empty.estimated_duration_secs(), 0);
    }

    #[test]
    fn test_profiles_override_and_duration_sum() {
        let subtasks = vec![
            SubtaskSpec::new(1, "Research the topic"),
            SubtaskSpec::new(2, "Research again").with_profile(CapabilityProfile::Writer),
        ];
        let plan = TaskCoordinator::new().plan("t", &subtasks, ExecutionMode::Sequential);
        let first = plan.assignment(1).unwrap();
        assert_eq!(first.profile, CapabilityProfile::Researcher);
        assert!(!first.profile_overridden);
        let second = plan.assignment(2).unwrap();
        assert_eq!(second.profile, CapabilityProfile::Writer);
        assert!(second.profile_overridden);
        assert_eq!(plan.estimated_duration_secs(), 40 + 25);
    }

    #[test]
    fn test_missing_ids_default_to_position() {
        let subtasks = vec![
            SubtaskSpec {
                id: None,
                description: "x".to_string(),
                depends_on: vec![],
                profile: None,
                requirements: vec![],
            },
            SubtaskSpec {
                id: None,
                description: "y".to_string(),
                depends_on: vec![1],
                profile: None,
                requirements: vec![],
            },
        ];
        let plan = TaskCoordinator::new().plan("t", &subtasks, ExecutionMode::Dependency);
        assert_eq!(plan.flat_order(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_coordinate_suggests_tools_from_registry() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let coordinator = TaskCoordinator::new().with_registry(Arc::new(registry));

        let plan = coordinator
            .coordinate("t", &[SubtaskSpec::new(1, "say hi")], ExecutionMode::Sequential)
            .await;
        let a = plan.assignment(1).unwrap();
        assert_eq!(a.profile, CapabilityProfile::General);
        assert_eq!(a.suggested_tools, vec!["echo".to_string()]);
    }

    #[test]
    fn test_schema_describes_request() {
        let schema: serde_json::Value = serde_json::from_str(&coordinate_schema_json()).unwrap();
        assert!(schema["properties"].get("subtasks").is_some());
    }
}
