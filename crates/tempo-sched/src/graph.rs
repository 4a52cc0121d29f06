//! The job graph: a DAG of job vertices with "is-parent-of" edges.
//!
//! The graph owns the job vertices and the per-vertex dependency-invocation
//! sets (which parents have completed since the vertex last fired). It is
//! pure state: it never emits events and never talks to storage. Acyclicity
//! holds by construction because [`JobGraph::add_dependency`] rejects edges
//! whose target can already reach their source.

use std::collections::{BTreeSet, HashMap};

use petgraph::Direction;
use petgraph::algo::has_path_connecting;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};

use crate::error::{Error, Result};
use crate::job::{DependencyJob, Job};

/// A directed acyclic graph of jobs keyed by name.
#[derive(Debug, Default)]
pub struct JobGraph {
    /// Edge structure; node weights are job names.
    graph: StableDiGraph<String, ()>,
    /// Name -> node index for fast lookup.
    index_map: HashMap<String, NodeIndex>,
    /// Name -> job vertex payload.
    vertices: HashMap<String, Job>,
    /// Name -> parents that completed since the vertex last fired.
    invocations: HashMap<String, BTreeSet<String>>,
}

impl JobGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Returns true if no vertices are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Inserts a vertex, or replaces the payload of an existing one.
    ///
    /// Edges are untouched when the name already exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJob`] if the job name fails validation.
    pub fn add_vertex(&mut self, job: Job) -> Result<()> {
        job.validate_name()?;
        let name = job.name().to_string();
        if !self.index_map.contains_key(&name) {
            let idx = self.graph.add_node(name.clone());
            self.index_map.insert(name.clone(), idx);
        }
        self.vertices.insert(name, job);
        Ok(())
    }

    /// Replaces the payload of an existing vertex, preserving its edges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RenameUnsupported`] if the names differ and
    /// [`Error::JobNotFound`] if the vertex does not exist.
    pub fn replace_vertex(&mut self, old: &Job, new: Job) -> Result<()> {
        if old.name() != new.name() {
            return Err(Error::RenameUnsupported {
                from: old.name().to_string(),
                to: new.name().to_string(),
            });
        }
        if !self.vertices.contains_key(new.name()) {
            return Err(Error::JobNotFound {
                name: new.name().to_string(),
            });
        }
        self.vertices.insert(new.name().to_string(), new);
        Ok(())
    }

    /// Removes a vertex and all edges touching it.
    ///
    /// Unknown names are a no-op: removal is idempotent.
    pub fn remove_vertex(&mut self, name: &str) {
        if let Some(idx) = self.index_map.remove(name) {
            self.graph.remove_node(idx);
        }
        self.vertices.remove(name);
        self.invocations.remove(name);
    }

    /// Looks up a vertex by name.
    #[must_use]
    pub fn lookup_vertex(&self, name: &str) -> Option<&Job> {
        self.vertices.get(name)
    }

    /// Names of the children of `name`, sorted for determinism.
    #[must_use]
    pub fn children(&self, name: &str) -> Vec<String> {
        let Some(&idx) = self.index_map.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<String> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect();
        out.sort();
        out
    }

    /// Resolves the registered parents of a dependency-based job.
    ///
    /// Parents that no longer resolve (removed without rewriting the child)
    /// are silently omitted.
    #[must_use]
    pub fn parent_jobs(&self, job: &DependencyJob) -> Vec<&Job> {
        job.parents
            .iter()
            .filter_map(|parent| self.vertices.get(parent))
            .collect()
    }

    /// Adds an "is-parent-of" edge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JobNotFound`] if either endpoint is unregistered and
    /// [`Error::CycleDetected`] if `parent` is reachable from `child`.
    pub fn add_dependency(&mut self, parent: &str, child: &str) -> Result<()> {
        let parent_idx = *self.index_map.get(parent).ok_or_else(|| Error::JobNotFound {
            name: parent.to_string(),
        })?;
        let child_idx = *self.index_map.get(child).ok_or_else(|| Error::JobNotFound {
            name: child.to_string(),
        })?;

        if parent_idx == child_idx || has_path_connecting(&self.graph, child_idx, parent_idx, None)
        {
            return Err(Error::CycleDetected {
                parent: parent.to_string(),
                child: child.to_string(),
            });
        }

        // Idempotent: a duplicate edge changes nothing observable.
        if !self.graph.contains_edge(parent_idx, child_idx) {
            self.graph.add_edge(parent_idx, child_idx, ());
        }
        Ok(())
    }

    /// Records that `parent` completed and returns the children of `parent`
    /// that are now executable (all of their parents have completed).
    ///
    /// This is the sole reader of the invocation sets: entries it returns
    /// are removed, so the next round starts empty.
    pub fn executable_children(&mut self, parent: &str) -> Vec<String> {
        let mut ready = Vec::new();
        for child in self.children(parent) {
            let Some(Job::DependencyBased(dep)) = self.vertices.get(&child) else {
                continue;
            };
            let wanted = dep.parents.clone();
            let seen = self.invocations.entry(child.clone()).or_default();
            seen.insert(parent.to_string());
            if wanted.iter().all(|p| seen.contains(p)) {
                self.invocations.remove(&child);
                ready.push(child);
            }
        }
        ready
    }

    /// Clears the dependency-invocation set for `name`.
    pub fn reset_dependency_invocations(&mut self, name: &str) {
        self.invocations.remove(name);
    }

    /// The current invocation set for `name`, if any parents have reported.
    #[must_use]
    pub fn dependency_invocations(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.invocations.get(name)
    }

    /// Drops all vertices, edges, and invocation state.
    pub fn reset(&mut self) {
        self.graph.clear();
        self.index_map.clear();
        self.vertices.clear();
        self.invocations.clear();
    }
}
