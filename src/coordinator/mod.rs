//! 任务协调：能力画像选择与依赖排序
//!
//! - **selector**: AgentSelector 与 CapabilityProfile（关键词分类）
//! - **graph**: 子任务依赖图（分层拓扑排序，环时整体冲刷）
//! - **plan**: 请求与计划类型
//! - **planner**: TaskCoordinator

pub mod graph;
pub mod plan;
pub mod planner;
pub mod selector;

pub use graph::{DependencyGraph, Layering};
pub use plan::{CoordinateRequest, CoordinationPlan, ExecutionMode, SubtaskAssignment, SubtaskSpec};
pub use planner::{coordinate_schema_json, TaskCoordinator};
pub use selector::{AgentSelector, CapabilityProfile, Selection};
