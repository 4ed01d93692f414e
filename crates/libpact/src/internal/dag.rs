use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;

/// Dependency graph used to compute the execution order of a target set.
///
/// Unlike a strict DAG walker, [`walk_tolerant`][1] does not fail on
/// cycles: the installer treats mutually dependent packages as co-equal,
/// so a cycle is reported to the caller and its members are emitted in
/// registration order.
///
/// [1]: DepGraph::walk_tolerant
#[derive(Debug)]
pub struct DepGraph<T: Hash + Eq + Clone + Display> {
    /// Outstanding dependencies per node.
    nodes: HashMap<T, HashSet<T>>,
    /// Node registration order, the tie breaker keeping the walk stable.
    order: Vec<T>,
}

impl<T> DepGraph<T>
where
    T: Hash + Eq + Clone + Display,
{
    pub fn new() -> DepGraph<T> {
        DepGraph {
            nodes: HashMap::new(),
            order: vec![],
        }
    }

    /// Register a node with no dependencies. No-op if already present.
    pub fn register_node(&mut self, node: T) {
        if !self.nodes.contains_key(&node) {
            self.order.push(node.clone());
            self.nodes.insert(node, HashSet::new());
        }
    }

    /// Register a node with a dependency edge. The dependency is also
    /// registered if it has not been.
    pub fn register_dep(&mut self, node: T, dep_node: T) {
        self.register_node(node.clone());
        self.register_node(dep_node.clone());
        self.nodes.get_mut(&node).unwrap().insert(dep_node);
    }

    /// Pop every node which has no outstanding dependency, in registration
    /// order, and release its dependents.
    fn step(&mut self) -> Vec<T> {
        let ready = self
            .order
            .iter()
            .filter(|node| self.nodes.get(node).map(|d| d.is_empty()).unwrap_or(false))
            .cloned()
            .collect::<Vec<_>>();
        for node in ready.iter() {
            self.unregister(node);
        }
        ready
    }

    fn unregister(&mut self, node: &T) {
        self.nodes.remove(node);
        self.order.retain(|n| n != node);
        for deps in self.nodes.values_mut() {
            deps.remove(node);
        }
    }

    /// Walk the whole graph, dependencies first.
    ///
    /// Returns the flattened resolution order and whether a cycle was hit.
    /// When a cycle is detected its members are appended in registration
    /// order and the flag is set, the walk never gets stuck.
    pub fn walk_tolerant(mut self) -> (Vec<T>, bool) {
        let mut res = vec![];
        let mut cyclic = false;
        while !self.nodes.is_empty() {
            let step = self.step();
            if step.is_empty() {
                cyclic = true;
                let rest = std::mem::take(&mut self.order);
                self.nodes.clear();
                res.extend(rest);
                break;
            }
            res.extend(step);
        }
        (res, cyclic)
    }
}

#[cfg(test)]
mod test {
    use super::DepGraph;

    #[test]
    fn test_simple_order() {
        let mut graph = DepGraph::<String>::new();
        graph.register_dep("filesystem".into(), "glibc".into());
        graph.register_dep("bash".into(), "glibc".into());
        graph.register_dep("bash".into(), "filesystem".into());
        let (order, cyclic) = graph.walk_tolerant();
        assert!(!cyclic);
        assert_eq!(order, vec!["glibc", "filesystem", "bash"]);
    }

    #[test]
    fn test_stable_among_free_nodes() {
        let mut graph = DepGraph::<String>::new();
        graph.register_node("zlib".into());
        graph.register_node("acl".into());
        graph.register_node("pcre".into());
        let (order, cyclic) = graph.walk_tolerant();
        assert!(!cyclic);
        // no edges: registration order is preserved, not hash order
        assert_eq!(order, vec!["zlib", "acl", "pcre"]);
    }

    #[test]
    fn test_cycle_tolerated() {
        let mut graph = DepGraph::<String>::new();
        graph.register_dep("libfoo".into(), "libbar".into());
        graph.register_dep("libbar".into(), "libfoo".into());
        graph.register_dep("app".into(), "libfoo".into());
        let (order, cyclic) = graph.walk_tolerant();
        assert!(cyclic);
        assert_eq!(order.len(), 3);
        // the cycle members come out in registration order
        assert_eq!(order, vec!["libfoo", "libbar", "app"]);
    }

    #[test]
    fn test_self_cycle() {
        let mut graph = DepGraph::<String>::new();
        graph.register_dep("selfref".into(), "selfref".into());
        let (order, cyclic) = graph.walk_tolerant();
        assert!(cyclic);
        assert_eq!(order, vec!["selfref"]);
    }
}
