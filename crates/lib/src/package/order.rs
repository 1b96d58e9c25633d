//! Build order checks.
//!
//! The build order is the declared list order; nothing here reorders packages.
//! [`validate_order`] runs once at startup and rejects a list whose `depends_on`
//! edges it does not honor.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::package::Package;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
  #[error("dependency cycle involving package '{0}'")]
  Cycle(String),

  #[error("package '{package}' depends on unknown package '{dependency}'")]
  UnknownDependency { package: String, dependency: String },

  #[error("package '{package}' is listed before its dependency '{dependency}'")]
  OutOfOrder { package: String, dependency: String },

  #[error("package '{0}' is declared more than once")]
  Duplicate(String),

  #[error("unknown package '{0}'")]
  UnknownPackage(String),
}

/// Check that every dependency is declared, the dependency graph is acyclic, and
/// each package is listed after everything it depends on.
pub fn validate_order(packages: &[Package]) -> Result<(), OrderError> {
  let mut graph: DiGraph<&str, ()> = DiGraph::new();
  let mut nodes: HashMap<&str, (NodeIndex, usize)> = HashMap::new();

  for (position, pkg) in packages.iter().enumerate() {
    let idx = graph.add_node(pkg.name.as_str());
    if nodes.insert(pkg.name.as_str(), (idx, position)).is_some() {
      return Err(OrderError::Duplicate(pkg.name.clone()));
    }
  }

  // Edges run from dependency to dependent.
  for pkg in packages {
    let Some(&(to, _)) = nodes.get(pkg.name.as_str()) else {
      continue;
    };
    for dep in &pkg.depends_on {
      let Some(&(from, _)) = nodes.get(dep.as_str()) else {
        return Err(OrderError::UnknownDependency {
          package: pkg.name.clone(),
          dependency: dep.clone(),
        });
      };
      graph.add_edge(from, to, ());
    }
  }

  toposort(&graph, None).map_err(|cycle| OrderError::Cycle(graph[cycle.node_id()].to_string()))?;

  for (position, pkg) in packages.iter().enumerate() {
    for dep in &pkg.depends_on {
      if let Some(&(_, dep_position)) = nodes.get(dep.as_str())
        && dep_position > position
      {
        return Err(OrderError::OutOfOrder {
          package: pkg.name.clone(),
          dependency: dep.clone(),
        });
      }
    }
  }

  Ok(())
}

/// Restrict `packages` to the names in `only`, keeping declared order.
///
/// An empty `only` selects everything.
pub fn select(packages: Vec<Package>, only: &[String]) -> Result<Vec<Package>, OrderError> {
  if only.is_empty() {
    return Ok(packages);
  }

  if let Some(missing) = only.iter().find(|name| !packages.iter().any(|p| &p.name == *name)) {
    return Err(OrderError::UnknownPackage(missing.clone()));
  }

  Ok(packages.into_iter().filter(|p| only.contains(&p.name)).collect())
}
