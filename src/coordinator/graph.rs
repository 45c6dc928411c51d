//! 子任务依赖图
//!
//! 邻接表 + 入度表，按层做拓扑排序（Kahn）。节点是子任务在输入列表中的位置，
//! 每层内按输入顺序排列；某一步没有就绪节点（存在环）时，剩余节点按输入顺序作为最后一层整体冲刷。

/// 分层结果；stuck 为因环而被冲刷的节点位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layering {
    pub layers: Vec<Vec<usize>>,
    pub stuck: Option<Vec<usize>>,
}

pub struct DependencyGraph {
    /// 邻接表：节点 -> 依赖它的节点
    adjacency: Vec<Vec<usize>>,
    /// 入度表：节点 -> 未满足的依赖数
    in_degree: Vec<usize>,
}

impl DependencyGraph {
    /// `ids[i]` 是第 i 个子任务的 ID，`deps[i]` 是它依赖的 ID 列表
    ///
    /// 指向不存在 ID 的依赖视为已满足；重复依赖只计一次；依赖自身视为环。
    pub fn new(ids: &[usize], deps: &[Vec<usize>]) -> Self {
        let n = ids.len();
        let mut adjacency = vec![Vec::new(); n];
        let mut in_degree = vec![0; n];

        for (node, node_deps) in deps.iter().enumerate().take(n) {
            let mut seen = Vec::new();
            for dep_id in node_deps {
                if seen.contains(dep_id) {
                    continue;
                }
                seen.push(*dep_id);
                for (dep_pos, id) in ids.iter().enumerate() {
                    if id == dep_id {
                        adjacency[dep_pos].push(node);
                        in_degree[node] += 1;
                    }
                }
            }
        }

        Self {
            adjacency,
            in_degree,
        }
    }

    pub fn len(&self) -> usize {
        self.in_degree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_degree.is_empty()
    }

    pub fn layers(&self) -> Layering {
        let n = self.len();
        let mut in_degree = self.in_degree.clone();
        let mut done = vec![false; n];
        let mut remaining = n;
        let mut layers = Vec::new();

        while remaining > 0 {
            let ready: Vec<usize> = (0..n).filter(|&i| !done[i] && in_degree[i] == 0).collect();
            if ready.is_empty() {
                let stuck: Vec<usize> = (0..n).filter(|&i| !done[i]).collect();
                layers.push(stuck.clone());
                return Layering {
                    layers,
                    stuck: Some(stuck),
                };
            }
            for &node in &ready {
                done[node] = true;
                remaining -= 1;
                for &dependent in &self.adjacency[node] {
                    in_degree[dependent] -= 1;
                }
            }
            layers.push(ready);
        }

        Layering {
            layers,
            stuck: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain() {
        let graph = DependencyGraph::new(&[1, 2, 3], &[vec![], vec![1], vec![2]]);
        let layering = graph.layers();
        assert_eq!(layering.layers, vec![vec![0], vec![1], vec![2]]);
        assert!(layering.stuck.is_none());
    }

    #[test]
    fn test_diamond_keeps_input_order_within_layer() {
        // 4 依赖 2 和 3；2、3 都依赖 1
        let graph = DependencyGraph::new(
            &[4, 3, 2, 1],
            &[vec![2, 3], vec![1], vec![1], vec![]],
        );
        assert_eq!(graph.layers().layers, vec![vec![3], vec![1, 2], vec![0]]);
    }

    #[test]
    fn test_cycle_flushes_remaining_once() {
        let graph = DependencyGraph::new(&[1, 2, 3], &[vec![], vec![3], vec![2]]);
        let layering = graph.layers();
        assert_eq!(layering.layers, vec![vec![0], vec![1, 2]]);
        assert_eq!(layering.stuck, Some(vec![1, 2]));
    }

    #[test]
    fn test_dangling_duplicate_and_self_dependencies() {
        let graph = DependencyGraph::new(&[1, 2], &[vec![99], vec![1, 1]]);
        assert_eq!(graph.layers().layers, vec![vec![0], vec![1]]);

        let looped = DependencyGraph::new(&[1], &[vec![1]]);
        assert_eq!(looped.layers().stuck, Some(vec![0]));
    }
}
