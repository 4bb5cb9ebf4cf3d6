//! Read-only dependency queries over the IMPORTS relation and node metrics.

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::errors::SmellResult;
use crate::models::RELATIONSHIP_IMPORTS;
use crate::query::guards::{
    clamp_limit, truncate_pattern, MAX_CYCLE_LENGTH, MAX_RANKED_RESULTS, MAX_REPORTED_CYCLES,
};
use crate::store::graph::{row_i64, row_names, row_str, GraphStore};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LayerViolation {
    pub source_path: String,
    pub target_path: String,
    pub imported_names: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GodObject {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub start_line: i64,
    pub method_count: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ComplexFunction {
    pub id: String,
    pub name: String,
    pub file_path: String,
    pub start_line: i64,
    pub cyclomatic_complexity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileCentrality {
    pub file_path: String,
    pub in_degree: usize,
    pub out_degree: usize,
}

impl FileCentrality {
    pub fn degree(&self) -> usize {
        self.in_degree + self.out_degree
    }
}

/// Dependency query engine borrowing a graph store.
pub struct DependencyQueries<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> DependencyQueries<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    fn import_pairs(&self) -> SmellResult<Vec<(String, String)>> {
        self.store
            .query(
                "SELECT source_key, target_key FROM edges WHERE relationship = ?1 \
                 ORDER BY source_key, target_key;",
                &[Value::from(RELATIONSHIP_IMPORTS)],
            )?
            .iter()
            .map(|row| Ok((row_str(row, "source_key")?, row_str(row, "target_key")?)))
            .collect()
    }

    /// Every elementary cycle of length > 1 in the IMPORTS relation.
    ///
    /// Each cycle starts at its lexicographically smallest path and the list
    /// is sorted, so output is stable across runs.
    pub fn find_circular_dependencies(&self) -> SmellResult<Vec<Vec<String>>> {
        let pairs = self.import_pairs()?;
        let paths: BTreeSet<&str> = pairs
            .iter()
            .flat_map(|(s, t)| [s.as_str(), t.as_str()])
            .collect();

        // Nodes are inserted in path order, so index order is path order.
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();
        for path in &paths {
            index.insert(*path, graph.add_node(path.to_string()));
        }
        for (source, target) in &pairs {
            graph.add_edge(index[source.as_str()], index[target.as_str()], ());
        }

        let mut cycles = Vec::new();
        for component in tarjan_scc(&graph) {
            if component.len() < 2 {
                continue;
            }
            let members: HashSet<NodeIndex> = component.iter().copied().collect();
            let mut starts = component.clone();
            starts.sort();
            for start in starts {
                let mut path = vec![start];
                let mut on_path: HashSet<NodeIndex> = HashSet::from([start]);
                walk_cycles(
                    &graph,
                    start,
                    start,
                    &members,
                    &mut path,
                    &mut on_path,
                    &mut cycles,
                );
            }
        }
        if cycles.len() >= MAX_REPORTED_CYCLES {
            debug!("Cycle enumeration stopped at {MAX_REPORTED_CYCLES} cycles");
        }
        cycles.sort();
        Ok(cycles)
    }

    /// IMPORTS edges whose source contains `from_pattern` and whose target
    /// contains `to_pattern`.
    pub fn find_layer_violations(
        &self,
        from_pattern: &str,
        to_pattern: &str,
    ) -> SmellResult<Vec<LayerViolation>> {
        let rows = self.store.query(
            "SELECT source_key, target_key, imported_names FROM edges \
             WHERE relationship = ?1 AND instr(source_key, ?2) > 0 AND instr(target_key, ?3) > 0 \
             ORDER BY source_key, target_key;",
            &[
                Value::from(RELATIONSHIP_IMPORTS),
                Value::from(truncate_pattern(from_pattern)),
                Value::from(truncate_pattern(to_pattern)),
            ],
        )?;
        rows.iter()
            .map(|row| {
                Ok(LayerViolation {
                    source_path: row_str(row, "source_key")?,
                    target_path: row_str(row, "target_key")?,
                    imported_names: row_names(row, "imported_names"),
                })
            })
            .collect()
    }

    pub fn find_god_objects(&self, method_threshold: i64) -> SmellResult<Vec<GodObject>> {
        let rows = self.store.query(
            "SELECT id, name, file_path, start_line, method_count FROM types \
             WHERE method_count >= ?1 ORDER BY method_count DESC, id ASC;",
            &[Value::from(method_threshold)],
        )?;
        rows.iter()
            .map(|row| {
                Ok(GodObject {
                    id: row_str(row, "id")?,
                    name: row_str(row, "name")?,
                    file_path: row_str(row, "file_path")?,
                    start_line: row_i64(row, "start_line")?,
                    method_count: row_i64(row, "method_count")?,
                })
            })
            .collect()
    }

    pub fn find_high_complexity_functions(
        &self,
        threshold: i64,
    ) -> SmellResult<Vec<ComplexFunction>> {
        let rows = self.store.query(
            "SELECT id, name, file_path, start_line, cyclomatic_complexity FROM functions \
             WHERE cyclomatic_complexity >= ?1 ORDER BY cyclomatic_complexity DESC, id ASC;",
            &[Value::from(threshold)],
        )?;
        rows.iter()
            .map(|row| {
                Ok(ComplexFunction {
                    id: row_str(row, "id")?,
                    name: row_str(row, "name")?,
                    file_path: row_str(row, "file_path")?,
                    start_line: row_i64(row, "start_line")?,
                    cyclomatic_complexity: row_i64(row, "cyclomatic_complexity")?,
                })
            })
            .collect()
    }

    /// Files that `file_path` imports directly.
    pub fn get_dependencies(&self, file_path: &str) -> SmellResult<Vec<String>> {
        self.neighbors(
            "SELECT target_key AS path FROM edges \
             WHERE relationship = ?1 AND source_key = ?2 ORDER BY target_key;",
            file_path,
        )
    }

    /// Files that import `file_path` directly.
    pub fn get_dependents(&self, file_path: &str) -> SmellResult<Vec<String>> {
        self.neighbors(
            "SELECT source_key AS path FROM edges \
             WHERE relationship = ?1 AND target_key = ?2 ORDER BY source_key;",
            file_path,
        )
    }

    fn neighbors(&self, sql: &str, file_path: &str) -> SmellResult<Vec<String>> {
        self.store
            .query(
                sql,
                &[Value::from(RELATIONSHIP_IMPORTS), Value::from(file_path)],
            )?
            .iter()
            .map(|row| row_str(row, "path"))
            .collect()
    }

    /// In + out IMPORTS degree for every known file, highest first.
    pub fn compute_centrality(&self) -> SmellResult<Vec<FileCentrality>> {
        let mut degrees: HashMap<String, (usize, usize)> = self
            .store
            .file_paths()?
            .into_iter()
            .map(|path| (path, (0, 0)))
            .collect();
        for (source, target) in self.import_pairs()? {
            degrees.entry(source).or_default().1 += 1;
            degrees.entry(target).or_default().0 += 1;
        }

        let mut ranked: Vec<FileCentrality> = degrees
            .into_iter()
            .map(|(file_path, (in_degree, out_degree))| FileCentrality {
                file_path,
                in_degree,
                out_degree,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.degree()
                .cmp(&a.degree())
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        Ok(ranked)
    }

    /// The `limit` files with the largest blast radius.
    pub fn most_central(&self, limit: i64) -> SmellResult<Vec<FileCentrality>> {
        let limit = clamp_limit(limit, MAX_RANKED_RESULTS) as usize;
        let mut ranked = self.compute_centrality()?;
        ranked.truncate(limit);
        Ok(ranked)
    }
}

/// Depth-first enumeration of cycles through `start`, visiting only nodes
/// ordered after it so each cycle is found once.
fn walk_cycles(
    graph: &DiGraph<String, ()>,
    start: NodeIndex,
    node: NodeIndex,
    members: &HashSet<NodeIndex>,
    path: &mut Vec<NodeIndex>,
    on_path: &mut HashSet<NodeIndex>,
    cycles: &mut Vec<Vec<String>>,
) {
    let mut next_nodes: Vec<NodeIndex> = graph.neighbors(node).collect();
    next_nodes.sort();
    next_nodes.dedup();
    for next in next_nodes {
        if cycles.len() >= MAX_REPORTED_CYCLES {
            return;
        }
        if next == start {
            if path.len() > 1 {
                cycles.push(path.iter().map(|i| graph[*i].clone()).collect());
            }
            continue;
        }
        if next.index() < start.index()
            || !members.contains(&next)
            || on_path.contains(&next)
            || path.len() >= MAX_CYCLE_LENGTH
        {
            continue;
        }
        path.push(next);
        on_path.insert(next);
        walk_cycles(graph, start, next, members, path, on_path, cycles);
        on_path.remove(&next);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileRecord, ImportEdge, ParsedFile, TypeRecord, FunctionRecord};
    use crate::store::graph::SqliteGraphStore;

    fn file(path: &str) -> ParsedFile {
        ParsedFile {
            file: FileRecord {
                path: path.to_string(),
                language: "python".to_string(),
                lines_of_code: 1,
            },
            types: Vec::new(),
            functions: Vec::new(),
            imports: Vec::new(),
        }
    }

    fn edge(source: &str, target: &str) -> ImportEdge {
        ImportEdge {
            source_path: source.to_string(),
            target_path: target.to_string(),
            imported_names: vec!["x".to_string()],
        }
    }

    fn store_with(edges: &[(&str, &str)], files: &[&str]) -> SqliteGraphStore {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        for path in files {
            let outgoing: Vec<ImportEdge> = edges
                .iter()
                .filter(|(s, _)| s == path)
                .map(|(s, t)| edge(s, t))
                .collect();
            store.replace_file(&file(path), &outgoing).unwrap();
        }
        store
    }

    #[test]
    fn three_file_ring_is_one_cycle() {
        let store = store_with(
            &[("b.py", "c.py"), ("a.py", "b.py"), ("c.py", "a.py")],
            &["a.py", "b.py", "c.py"],
        );
        let cycles = DependencyQueries::new(&store)
            .find_circular_dependencies()
            .unwrap();
        assert_eq!(cycles, vec![vec!["a.py", "b.py", "c.py"]]);
    }

    #[test]
    fn acyclic_graph_has_no_cycles() {
        let store = store_with(
            &[("a.py", "b.py"), ("b.py", "c.py"), ("a.py", "c.py")],
            &["a.py", "b.py", "c.py"],
        );
        let queries = DependencyQueries::new(&store);
        assert!(queries.find_circular_dependencies().unwrap().is_empty());
    }

    #[test]
    fn overlapping_cycles_are_reported_separately() {
        let store = store_with(
            &[("a.py", "b.py"), ("b.py", "a.py"), ("b.py", "c.py"), ("c.py", "b.py")],
            &["a.py", "b.py", "c.py"],
        );
        let cycles = DependencyQueries::new(&store)
            .find_circular_dependencies()
            .unwrap();
        assert_eq!(
            cycles,
            vec![vec!["a.py", "b.py"], vec!["b.py", "c.py"]]
        );
    }

    #[test]
    fn layer_violations_match_substrings() {
        let store = store_with(
            &[
                ("app/domain/order.py", "app/infrastructure/db.py"),
                ("app/domain/order.py", "app/domain/money.py"),
                ("app/api/view.py", "app/infrastructure/db.py"),
            ],
            &[
                "app/domain/order.py",
                "app/domain/money.py",
                "app/api/view.py",
                "app/infrastructure/db.py",
            ],
        );
        let hits = DependencyQueries::new(&store)
            .find_layer_violations("domain", "infrastructure")
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_path, "app/domain/order.py");
        assert_eq!(hits[0].imported_names, vec!["x".to_string()]);
    }

    #[test]
    fn neighbors_and_centrality() {
        let store = store_with(
            &[("a.py", "hub.py"), ("b.py", "hub.py"), ("hub.py", "c.py")],
            &["a.py", "b.py", "c.py", "hub.py", "lonely.py"],
        );
        let queries = DependencyQueries::new(&store);
        assert_eq!(queries.get_dependencies("hub.py").unwrap(), vec!["c.py"]);
        assert_eq!(queries.get_dependents("hub.py").unwrap(), vec!["a.py", "b.py"]);

        let ranked = queries.compute_centrality().unwrap();
        assert_eq!(ranked[0].file_path, "hub.py");
        assert_eq!(ranked[0].degree(), 3);
        assert_eq!(ranked.last().unwrap().file_path, "lonely.py");
        assert_eq!(queries.most_central(2).unwrap().len(), 2);
    }

    #[test]
    fn ranking_queries_use_inclusive_thresholds() {
        let store = SqliteGraphStore::open_in_memory().unwrap();
        let mut parsed = file("svc.py");
        let mut big = TypeRecord::new("svc.py", "Big", 1, 100);
        big.method_count = 12;
        let mut edge_case = TypeRecord::new("svc.py", "Edge", 101, 150);
        edge_case.method_count = 10;
        let mut small = TypeRecord::new("svc.py", "Small", 151, 160);
        small.method_count = 2;
        parsed.types = vec![small, edge_case, big];
        let mut tangled = FunctionRecord::new("svc.py", "tangled", None, 1, 40);
        tangled.cyclomatic_complexity = 15;
        let simple = FunctionRecord::new("svc.py", "simple", None, 41, 42);
        parsed.functions = vec![simple, tangled];
        store.replace_file(&parsed, &[]).unwrap();

        let queries = DependencyQueries::new(&store);
        let gods: Vec<String> = queries
            .find_god_objects(10)
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(gods, vec!["Big", "Edge"]);

        let complex = queries.find_high_complexity_functions(15).unwrap();
        assert_eq!(complex.len(), 1);
        assert_eq!(complex[0].name, "tangled");
    }
}
