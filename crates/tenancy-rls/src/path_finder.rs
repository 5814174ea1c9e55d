//! Shortest eligible paths to the tenants table.
//!
//! For every table, the finder walks outgoing eligible edges depth first and
//! keeps the best route to the root:
//!
//! 1. a path without nullable edges beats a path with any nullable edge;
//! 2. among equal nullability, fewer edges win;
//! 3. otherwise the first candidate found is kept.
//!
//! Each table remembers two routes, its shortest non-nullable one and its
//! shortest one overall. A nullable edge can only extend the latter, since any
//! path through it is nullable.
//!
//! Edges leading back onto the current recursion stack are cyclic and skipped.
//! A table on a cycle whose only routes are cyclic is [`Resolution::Recursive`].
//! A table with no route at all, or whose routes only lead into such a cycle,
//! is a [`Resolution::DeadEnd`].

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::classifier::ConstraintClassifier;
use crate::error::RlsError;
use crate::schema::{ForeignKeyEdge, SchemaGraph};

/// One hop of a policy path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub local_column: String,
    pub foreign_table: String,
    pub foreign_column: String,
    pub nullable: bool,
}

impl From<&ForeignKeyEdge> for PathStep {
    fn from(edge: &ForeignKeyEdge) -> Self {
        Self {
            local_column: edge.source_column.clone(),
            foreign_table: edge.target_table.clone(),
            foreign_column: edge.target_column.clone(),
            nullable: edge.nullable,
        }
    }
}

/// Ordered edges from a table to the tenants table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Path {
    steps: Vec<PathStep>,
}

impl Path {
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// True if any edge is nullable.
    pub fn is_nullable(&self) -> bool {
        self.steps.iter().any(|s| s.nullable)
    }

    /// Tables visited after the starting table.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.foreign_table.as_str())
    }

    fn prefixed(&self, edge: &ForeignKeyEdge) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.push(PathStep::from(edge));
        steps.extend(self.steps.iter().cloned());
        Self { steps }
    }

    fn touches(&self, stack: &[String]) -> bool {
        self.tables().any(|t| stack.iter().any(|s| s == t))
    }
}

/// Outcome of resolving one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Path(Path),
    DeadEnd,
    Recursive,
}

/// Result of resolving every table of a graph.
#[derive(Debug, Clone, Default)]
pub struct ShortestPaths {
    /// Tables with a path to the root (the root itself excluded).
    pub paths: BTreeMap<String, Path>,
    /// Tables with no eligible route to the root, including tables that only
    /// lead into a closed cycle.
    pub unreachable: BTreeSet<String>,
    /// Tables on a cycle with no way out to the root.
    pub recursive: BTreeSet<String>,
}

impl ShortestPaths {
    /// Topology errors, one per recursive table.
    pub fn errors(&self) -> Vec<RlsError> {
        self.recursive
            .iter()
            .map(|table| RlsError::RecursiveRelationship {
                table: table.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct Routes {
    non_nullable: Option<Path>,
    shortest: Option<Path>,
}

impl Routes {
    fn root() -> Self {
        Self {
            non_nullable: Some(Path::default()),
            shortest: Some(Path::default()),
        }
    }

    fn touches(&self, stack: &[String]) -> bool {
        [&self.non_nullable, &self.shortest]
            .into_iter()
            .flatten()
            .any(|path| path.touches(stack))
    }

    fn best(&self) -> Option<&Path> {
        self.non_nullable.as_ref().or(self.shortest.as_ref())
    }

    /// Extend with the routes of `sub` reached over `edge`. Ties keep the first.
    fn extend(&mut self, edge: &ForeignKeyEdge, sub: &Routes) {
        if let Some(path) = &sub.shortest {
            keep_shorter(&mut self.shortest, path.prefixed(edge));
        }
        if !edge.nullable {
            if let Some(path) = &sub.non_nullable {
                keep_shorter(&mut self.non_nullable, path.prefixed(edge));
            }
        }
    }
}

fn keep_shorter(slot: &mut Option<Path>, candidate: Path) {
    if slot.as_ref().is_none_or(|current| candidate.len() < current.len()) {
        *slot = Some(candidate);
    }
}

struct Resolved {
    routes: Routes,
    /// The table sits on a cycle and has no route out of it.
    recursive: bool,
    /// Tables further up the stack that cyclic edges below ran into. The
    /// result depends on them, so it must not be cached while non-empty.
    cycle_hits: BTreeSet<String>,
}

impl Resolved {
    fn resolution(&self) -> Resolution {
        match self.routes.best() {
            Some(path) => Resolution::Path(path.clone()),
            None if self.recursive => Resolution::Recursive,
            None => Resolution::DeadEnd,
        }
    }
}

/// Finds shortest eligible paths from tables to the root table.
pub struct PathFinder<'g> {
    graph: &'g SchemaGraph,
    classifier: ConstraintClassifier,
    root: String,
    cache: HashMap<String, Routes>,
}

impl<'g> PathFinder<'g> {
    pub fn new(
        graph: &'g SchemaGraph,
        classifier: ConstraintClassifier,
        root: impl Into<String>,
    ) -> Result<Self, RlsError> {
        let root = root.into();
        if !graph.contains(&root) {
            return Err(RlsError::UnknownRootTable(root));
        }
        Ok(Self {
            graph,
            classifier,
            root,
            cache: HashMap::new(),
        })
    }

    /// Resolve every table of the graph.
    pub fn shortest_paths(&mut self) -> ShortestPaths {
        let mut result = ShortestPaths::default();
        let tables: Vec<String> = self.graph.table_names().map(str::to_string).collect();

        for table in tables {
            if table == self.root {
                continue;
            }
            match self.resolve(&table) {
                Resolution::Path(path) => {
                    result.paths.insert(table, path);
                }
                Resolution::DeadEnd => {
                    result.unreachable.insert(table);
                }
                Resolution::Recursive => {
                    tracing::warn!(table = %table, "Table only reaches the root through cycles");
                    result.recursive.insert(table);
                }
            }
        }

        result
    }

    /// Resolve a single table.
    pub fn resolve(&mut self, table: &str) -> Resolution {
        let mut stack = Vec::new();
        self.resolve_with_stack(table, &mut stack).resolution()
    }

    fn resolve_with_stack(&mut self, table: &str, stack: &mut Vec<String>) -> Resolved {
        if table == self.root {
            return Resolved {
                routes: Routes::root(),
                recursive: false,
                cycle_hits: BTreeSet::new(),
            };
        }

        if let Some(cached) = self.cache.get(table) {
            // A cached path through a table on the stack would close a cycle.
            if !cached.touches(stack) {
                return Resolved {
                    routes: cached.clone(),
                    recursive: false,
                    cycle_hits: BTreeSet::new(),
                };
            }
        }

        let graph = self.graph;
        stack.push(table.to_string());

        let mut routes = Routes::default();
        let mut cycle_hits = BTreeSet::new();

        for edge in graph.edges_from(table) {
            if !self.classifier.is_eligible(&edge.annotation) {
                continue;
            }

            if stack.iter().any(|t| *t == edge.target_table) {
                cycle_hits.insert(edge.target_table.clone());
                continue;
            }

            let sub = self.resolve_with_stack(&edge.target_table, stack);
            cycle_hits.extend(sub.cycle_hits);
            routes.extend(edge, &sub.routes);
        }

        // Only hits on this frame or above put this table on a cycle; the
        // frames below have been popped already.
        cycle_hits.retain(|t| stack.iter().any(|s| s == t));
        let recursive = routes.best().is_none() && !cycle_hits.is_empty();

        stack.pop();
        cycle_hits.remove(table);

        if cycle_hits.is_empty() && !recursive {
            self.cache.insert(table.to_string(), routes.clone());
        }

        Resolved {
            routes,
            recursive,
            cycle_hits,
        }
    }
}
