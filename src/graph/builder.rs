//! Graph builder for constructing the task dependency graph.
//!
//! The builder validates the task list (unique ids, known dependencies, no
//! cycles) and precomputes each task's topological depth.

use crate::errors::GraphError;
use crate::graph::task::{Task, TaskGraphFile};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Index into the task list.
pub type TaskIndex = usize;

/// A validated, acyclic graph of tasks.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// Graph version from the persisted document
    version: u32,
    /// Tasks in declaration order
    tasks: Vec<Task>,
    /// Map from task id to index
    index_map: HashMap<String, TaskIndex>,
    /// Forward edges: index -> tasks that depend on it
    forward_edges: Vec<Vec<TaskIndex>>,
    /// Reverse edges: index -> tasks it depends on
    reverse_edges: Vec<Vec<TaskIndex>>,
    /// Longest dependency chain from any root
    depths: Vec<usize>,
}

impl TaskGraph {
    /// Build a graph from a parsed document.
    pub fn from_file(file: TaskGraphFile) -> Result<Self, GraphError> {
        GraphBuilder::new(file.tasks)
            .with_version(file.version)
            .build()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_map.contains_key(id)
    }

    /// Get a task by id.
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index_map.get(id).and_then(|&i| self.tasks.get(i))
    }

    /// All tasks in declaration order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.id.as_str())
    }

    /// Longest dependency chain from any root; roots have depth 0.
    pub fn topological_depth(&self, id: &str) -> Option<usize> {
        self.index_map.get(id).map(|&i| self.depths[i])
    }

    /// Direct dependents of a task (reverse-edge lookup), in lexical order.
    pub fn dependents(&self, id: &str) -> BTreeSet<&str> {
        self.index_map
            .get(id)
            .map(|&i| {
                self.forward_edges[i]
                    .iter()
                    .map(|&d| self.tasks[d].id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Direct dependencies of a task, in declaration order.
    pub fn dependencies(&self, id: &str) -> &[String] {
        self.get(id).map_or(&[], |t| t.depends_on.as_slice())
    }

    /// Every task reachable through dependent edges, in lexical order.
    pub fn transitive_dependents(&self, id: &str) -> BTreeSet<&str> {
        let mut seen = BTreeSet::new();
        let Some(&start) = self.index_map.get(id) else {
            return seen;
        };

        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for &dependent in &self.forward_edges[node] {
                if seen.insert(self.tasks[dependent].id.as_str()) {
                    queue.push_back(dependent);
                }
            }
        }
        seen
    }

    /// Tasks with no dependencies.
    pub fn roots(&self) -> Vec<&str> {
        self.reverse_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| self.tasks[i].id.as_str())
            .collect()
    }

    /// Tasks nothing depends on.
    pub fn leaves(&self) -> Vec<&str> {
        self.forward_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| self.tasks[i].id.as_str())
            .collect()
    }

    /// Re-run structural validation over this graph's tasks.
    pub fn validate(&self) -> Result<(), GraphError> {
        GraphBuilder::new(self.tasks.clone())
            .with_version(self.version)
            .build()
            .map(|_| ())
    }

    /// Convert back into the persisted document form.
    pub fn to_file(&self) -> TaskGraphFile {
        TaskGraphFile {
            version: self.version,
            tasks: self.tasks.clone(),
        }
    }

    pub fn fingerprint(&self) -> String {
        self.to_file().fingerprint()
    }

    /// Build the next graph version with `original` split into `subtasks`.
    ///
    /// Each sub-task inherits the original's dependencies on top of its own
    /// (which may name sibling sub-tasks) and records `split_from`. Every
    /// dependent of the original is rewired to depend on all sub-tasks. The
    /// original stays in the graph so its ledger record survives.
    pub fn extend_with_split(
        &self,
        original: &str,
        subtasks: Vec<Task>,
    ) -> Result<TaskGraph, GraphError> {
        let parent = self.get(original).ok_or_else(|| GraphError::UnknownTask {
            id: original.to_string(),
        })?;
        if subtasks.is_empty() {
            return Err(GraphError::EmptySplit {
                task: original.to_string(),
            });
        }

        let sub_ids: Vec<String> = subtasks.iter().map(|t| t.id.clone()).collect();

        let mut tasks: Vec<Task> = self
            .tasks
            .iter()
            .map(|task| {
                let mut task = task.clone();
                if task.id != original && task.depends_on.iter().any(|d| d == original) {
                    task.depends_on = rewire(&task.depends_on, original, &sub_ids);
                }
                task
            })
            .collect();

        for mut sub in subtasks {
            let mut depends_on = parent.depends_on.clone();
            for dep in sub.depends_on.drain(..) {
                if dep != original && !depends_on.contains(&dep) {
                    depends_on.push(dep);
                }
            }
            sub.depends_on = depends_on;
            sub.split_from = Some(original.to_string());
            tasks.push(sub);
        }

        GraphBuilder::new(tasks)
            .with_version(self.version + 1)
            .build()
    }
}

/// Replace `original` in a dependency list with `replacements`, keeping order
/// and dropping duplicates.
fn rewire(depends_on: &[String], original: &str, replacements: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(depends_on.len() + replacements.len());
    for dep in depends_on {
        let expanded: &[String] = if dep == original {
            replacements
        } else {
            std::slice::from_ref(dep)
        };
        for id in expanded {
            if !out.contains(id) {
                out.push(id.clone());
            }
        }
    }
    out
}

/// Builder for constructing task graphs.
pub struct GraphBuilder {
    tasks: Vec<Task>,
    version: u32,
}

impl GraphBuilder {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks, version: 1 }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Build the task graph.
    ///
    /// Fails on empty or duplicate ids, dependencies on unknown tasks, and cycles.
    pub fn build(self) -> Result<TaskGraph, GraphError> {
        let mut index_map = HashMap::new();
        for (i, task) in self.tasks.iter().enumerate() {
            if task.id.trim().is_empty() {
                return Err(GraphError::EmptyId);
            }
            if index_map.insert(task.id.clone(), i).is_some() {
                return Err(GraphError::DuplicateTask {
                    id: task.id.clone(),
                });
            }
        }

        let mut forward_edges: Vec<Vec<TaskIndex>> = vec![Vec::new(); self.tasks.len()];
        let mut reverse_edges: Vec<Vec<TaskIndex>> = vec![Vec::new(); self.tasks.len()];

        for (to_idx, task) in self.tasks.iter().enumerate() {
            let mut seen = HashSet::new();
            for dep in &task.depends_on {
                let from_idx =
                    *index_map
                        .get(dep)
                        .ok_or_else(|| GraphError::UnknownDependency {
                            task: task.id.clone(),
                            dependency: dep.clone(),
                        })?;
                if !seen.insert(from_idx) {
                    continue;
                }
                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        detect_cycle(&self.tasks, &reverse_edges)?;
        let depths = compute_depths(&forward_edges, &reverse_edges);

        Ok(TaskGraph {
            version: self.version,
            tasks: self.tasks,
            index_map,
            forward_edges,
            reverse_edges,
            depths,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Depth-first search over dependency edges with a recursion-stack check.
///
/// Iterative so deep chains cannot overflow the call stack. The reported path
/// follows `depends_on` edges and repeats its first id at the end.
fn detect_cycle(tasks: &[Task], dependencies: &[Vec<TaskIndex>]) -> Result<(), GraphError> {
    let mut marks = vec![Mark::Unvisited; tasks.len()];

    for start in 0..tasks.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }

        // (node, next dependency to visit)
        let mut frames: Vec<(TaskIndex, usize)> = vec![(start, 0)];
        marks[start] = Mark::OnStack;

        while let Some(frame) = frames.last_mut() {
            let (node, cursor) = *frame;
            let Some(&dep) = dependencies[node].get(cursor) else {
                marks[node] = Mark::Done;
                frames.pop();
                continue;
            };
            frame.1 += 1;

            match marks[dep] {
                Mark::Unvisited => {
                    marks[dep] = Mark::OnStack;
                    frames.push((dep, 0));
                }
                Mark::OnStack => {
                    let from = frames.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                    let mut path: Vec<String> = frames[from..]
                        .iter()
                        .map(|&(n, _)| tasks[n].id.clone())
                        .collect();
                    path.push(tasks[dep].id.clone());
                    return Err(GraphError::Cycle { path });
                }
                Mark::Done => {}
            }
        }
    }

    Ok(())
}

/// Longest-path depth via Kahn's algorithm. Assumes the graph is acyclic.
fn compute_depths(dependents: &[Vec<TaskIndex>], dependencies: &[Vec<TaskIndex>]) -> Vec<usize> {
    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut depths = vec![0; dependencies.len()];

    let mut queue: VecDeque<TaskIndex> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, deg)| *deg == 0)
        .map(|(i, _)| i)
        .collect();

    while let Some(node) = queue.pop_front() {
        for &dependent in &dependents[node] {
            depths[dependent] = depths[dependent].max(depths[node] + 1);
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    depths
}
