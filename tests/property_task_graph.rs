use proptest::prelude::*;
use research_swarm::domain::models::{Task, TaskGraph, TaskKind, TaskStatus};
use std::collections::{HashMap, HashSet};

/// Random DAG: task `i` may only depend on tasks with a smaller index.
fn dag_strategy() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..30).prop_flat_map(|size| {
        (0..size)
            .map(|i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    proptest::collection::vec(0..i, 0..=i.min(4)).boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}

fn build(deps: &[Vec<usize>]) -> TaskGraph {
    let tasks = deps.iter().enumerate().map(|(i, parents)| {
        let mut unique: Vec<usize> = parents.clone();
        unique.sort_unstable();
        unique.dedup();
        Task::new(format!("t{i}"), TaskKind::Retrieval, format!("query {i}"))
            .with_dependencies(unique.into_iter().map(|p| format!("t{p}")))
    });
    TaskGraph::from_tasks(tasks).unwrap()
}

proptest! {
    /// Every dependency sits in an earlier layer than its dependent.
    #[test]
    fn prop_layers_respect_dependencies(deps in dag_strategy()) {
        let graph = build(&deps);
        let layers = graph.get_topological_layers().unwrap();

        let mut layer_of = HashMap::new();
        for (index, layer) in layers.iter().enumerate() {
            for id in layer {
                layer_of.insert(id.clone(), index);
            }
        }

        for task in graph.tasks() {
            for dep in &task.dependencies {
                prop_assert!(layer_of[dep] < layer_of[&task.id]);
            }
        }
    }

    /// The layers partition the task set exactly.
    #[test]
    fn prop_every_task_emitted_once(deps in dag_strategy()) {
        let graph = build(&deps);
        let layers = graph.get_topological_layers().unwrap();

        let flat: Vec<&String> = layers.iter().flatten().collect();
        let unique: HashSet<&String> = flat.iter().copied().collect();
        prop_assert_eq!(flat.len(), graph.len());
        prop_assert_eq!(unique.len(), graph.len());
        prop_assert!(layers.iter().all(|layer| !layer.is_empty()));
    }

    /// On a fresh graph the ready set is exactly the first layer.
    #[test]
    fn prop_ready_tasks_are_first_layer(deps in dag_strategy()) {
        let graph = build(&deps);
        let layers = graph.get_topological_layers().unwrap();

        let ready: HashSet<String> = graph.get_ready_tasks().into_iter().map(|t| t.id.clone()).collect();
        let first: HashSet<String> = layers[0].iter().cloned().collect();
        prop_assert_eq!(ready, first);
    }

    /// Completing a task never makes a task with a failed dependency ready.
    #[test]
    fn prop_failed_dependency_blocks_dependents(deps in dag_strategy()) {
        let mut graph = build(&deps);
        graph.mark_failed("t0", "boom").unwrap();

        for task in graph.get_ready_tasks() {
            prop_assert_eq!(task.status, TaskStatus::Pending);
            prop_assert!(!task.dependencies.iter().any(|d| d == "t0"));
        }
    }
}

#[test]
fn test_cycle_names_stuck_tasks() {
    let mut graph = TaskGraph::new();
    graph.add_task(Task::new("root", TaskKind::Retrieval, "root")).unwrap();
    graph.add_task(Task::new("a", TaskKind::Retrieval, "a").depends_on("root")).unwrap();
    graph.add_task(Task::new("b", TaskKind::Retrieval, "b").depends_on("a")).unwrap();
    graph.add_dependency("a", "b").unwrap();

    let err = graph.get_topological_layers().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Task dependency cycle detected among: a -> b"
    );
    assert!(graph.validate().is_err());
}
