//! Provisioning plan
//!
//! A plan is the acyclic dependency graph of steps for one run. Construction
//! validates the graph, so an orchestrator never sees a cycle.

use crate::error::{BootstrapError, Result};
use crate::step::Step;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Validated set of steps with a topological order
#[derive(Debug, Clone)]
pub struct Plan {
    steps: Vec<Step>,
    index: HashMap<String, usize>,
    order: Vec<usize>,
}

impl Plan {
    /// Validate `steps` and compute a topological order
    ///
    /// Steps without a dependency relation keep their declaration order.
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        let mut index = HashMap::with_capacity(steps.len());
        for (i, step) in steps.iter().enumerate() {
            if index.insert(step.id.clone(), i).is_some() {
                return Err(BootstrapError::DuplicateStep(step.id.clone()));
            }
        }

        for step in &steps {
            for dep in step.dependencies() {
                if !index.contains_key(&dep) {
                    return Err(BootstrapError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep,
                    });
                }
            }
            if let Some(placeholder) = step.unbound_placeholders().into_iter().next() {
                return Err(BootstrapError::UnresolvedPlaceholder {
                    step: step.id.clone(),
                    placeholder,
                });
            }
        }

        let order = topological_order(&steps, &index)?;
        Ok(Self {
            steps,
            index,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Step> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    /// Steps in topological order
    pub fn ordered(&self) -> impl Iterator<Item = &Step> {
        self.order.iter().map(|&i| &self.steps[i])
    }

    /// Step ids in topological order
    pub fn order(&self) -> Vec<&str> {
        self.ordered().map(|s| s.id.as_str()).collect()
    }
}

// Kahn's algorithm; the ready queue is seeded and refilled in declaration
// order so the result is deterministic.
fn topological_order(steps: &[Step], index: &HashMap<String, usize>) -> Result<Vec<usize>> {
    let mut in_degree = vec![0usize; steps.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
    for (i, step) in steps.iter().enumerate() {
        for dep in step.dependencies() {
            let d = index[&dep];
            in_degree[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut ready: VecDeque<usize> = (0..steps.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(steps.len());
    while let Some(i) = ready.pop_front() {
        order.push(i);
        let mut released: BTreeSet<usize> = BTreeSet::new();
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                released.insert(d);
            }
        }
        ready.extend(released);
    }

    if order.len() != steps.len() {
        return Err(BootstrapError::DependencyCycle(find_cycle(steps, index, &order)));
    }
    Ok(order)
}

fn find_cycle(steps: &[Step], index: &HashMap<String, usize>, placed: &[usize]) -> Vec<String> {
    let placed: BTreeSet<usize> = placed.iter().copied().collect();
    let Some(start) = (0..steps.len()).find(|i| !placed.contains(i)) else {
        return Vec::new();
    };

    // Every unplaced step has an unplaced dependency, so walking them must
    // revisit a step.
    let mut path = Vec::new();
    let mut seen = HashMap::new();
    let mut current = start;
    loop {
        if let Some(&pos) = seen.get(&current) {
            let mut cycle: Vec<String> = path[pos..]
                .iter()
                .map(|&i: &usize| steps[i].id.clone())
                .collect();
            cycle.push(steps[current].id.clone());
            return cycle;
        }
        seen.insert(current, path.len());
        path.push(current);
        let next = steps[current]
            .dependencies()
            .into_iter()
            .map(|dep| index[&dep])
            .find(|i| !placed.contains(i));
        match next {
            Some(n) => current = n,
            None => return path.iter().map(|&i| steps[i].id.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str) -> Step {
        Step::new(id, ["az", id])
    }

    #[test]
    fn test_orders_by_dependency() {
        let plan = Plan::new(vec![
            step("container").after("storage"),
            step("storage").after("group"),
            step("group"),
        ])
        .unwrap();
        assert_eq!(plan.order(), vec!["group", "storage", "container"]);
    }

    #[test]
    fn test_independent_steps_keep_declaration_order() {
        let plan = Plan::new(vec![step("b"), step("a"), step("c").after("a")]).unwrap();
        assert_eq!(plan.order(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_rejects_cycle() {
        let err = Plan::new(vec![
            step("a").after("c"),
            step("b").after("a"),
            step("c").after("b"),
            step("d"),
        ])
        .unwrap_err();
        match err {
            BootstrapError::DependencyCycle(cycle) => {
                assert_eq!(cycle.first(), cycle.last());
                assert_eq!(cycle.len(), 4);
                assert!(!cycle.contains(&"d".to_string()));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_cycle_through_output_reference() {
        let err = Plan::new(vec![
            Step::new("a", ["az", "{{x}}"]).output_of("x", "b", "id"),
            Step::new("b", ["az", "{{y}}"]).output_of("y", "a", "id"),
        ])
        .unwrap_err();
        assert!(matches!(err, BootstrapError::DependencyCycle(_)));
    }

    #[test]
    fn test_rejects_self_dependency() {
        let err = Plan::new(vec![step("a").after("a")]).unwrap_err();
        assert!(matches!(err, BootstrapError::DependencyCycle(_)));
    }

    #[test]
    fn test_rejects_unknown_dependency() {
        let err = Plan::new(vec![step("a").after("ghost")]).unwrap_err();
        assert!(matches!(
            err,
            BootstrapError::UnknownDependency { ref dependency, .. } if dependency == "ghost"
        ));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = Plan::new(vec![step("a"), step("a")]).unwrap_err();
        assert!(matches!(err, BootstrapError::DuplicateStep(ref id) if id == "a"));
    }

    #[test]
    fn test_rejects_unbound_placeholder() {
        let err = Plan::new(vec![Step::new("a", ["az", "{{name}}"])]).unwrap_err();
        assert!(matches!(err, BootstrapError::UnresolvedPlaceholder { .. }));
    }

    #[test]
    fn test_lookup_by_id() {
        let plan = Plan::new(vec![step("a"), step("b").after("a"), step("c")]).unwrap();
        assert!(plan.get("b").is_some_and(|s| s.dependencies().contains("a")));
        assert!(plan.get("c").is_some());
        assert_eq!(plan.len(), 3);
    }
}
