use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Dependency structure over node indices.
///
/// Indices are positions in the owning workflow's node arena, so insertion
/// order doubles as the tie-breaker for scheduling.
#[derive(Debug, Clone, Default)]
pub struct Graph {
  /// Index -> indices it depends on.
  upstream: Vec<Vec<usize>>,
  /// Index -> indices that depend on it.
  downstream: Vec<Vec<usize>>,
}

impl Graph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append a node with the given (already existing) dependencies.
  pub(crate) fn push(&mut self, dependencies: Vec<usize>) -> usize {
    let index = self.upstream.len();
    for &dep in &dependencies {
      self.downstream[dep].push(index);
    }
    self.upstream.push(dependencies);
    self.downstream.push(Vec::new());
    index
  }

  pub fn len(&self) -> usize {
    self.upstream.len()
  }

  pub fn is_empty(&self) -> bool {
    self.upstream.is_empty()
  }

  /// Nodes this node depends on.
  pub fn upstream(&self, index: usize) -> &[usize] {
    self.upstream.get(index).map(|v| v.as_slice()).unwrap_or(&[])
  }

  /// Nodes that depend on this node.
  pub fn downstream(&self, index: usize) -> &[usize] {
    self
      .downstream
      .get(index)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Whether `to` is reachable from `from` over at least one edge.
  pub fn has_path(&self, from: usize, to: usize) -> bool {
    if from >= self.len() || to >= self.len() {
      return false;
    }

    let mut visited = vec![false; self.len()];
    let mut stack: Vec<usize> = self.downstream[from].clone();
    while let Some(current) = stack.pop() {
      if current == to {
        return true;
      }
      if visited[current] {
        continue;
      }
      visited[current] = true;
      stack.extend(self.downstream[current].iter().copied());
    }
    false
  }

  /// Kahn's algorithm; ties go to the lowest index.
  ///
  /// Returns `None` if the graph contains a cycle.
  pub fn topological_order(&self) -> Option<Vec<usize>> {
    kahn(self.len(), |i| self.upstream[i].as_slice())
  }
}

/// Stable Kahn ordering over `count` nodes with the given dependency lists.
///
/// Returns `None` when some nodes can never be released (a cycle).
pub(crate) fn kahn<'a>(count: usize, upstream: impl Fn(usize) -> &'a [usize]) -> Option<Vec<usize>> {
  let (order, remaining) = kahn_partial(count, upstream);
  remaining.is_empty().then_some(order)
}

/// Like [`kahn`], but also returns the nodes that were never released.
pub(crate) fn kahn_partial<'a>(
  count: usize,
  upstream: impl Fn(usize) -> &'a [usize],
) -> (Vec<usize>, Vec<usize>) {
  let mut in_degree = vec![0usize; count];
  let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); count];
  for (node, degree) in in_degree.iter_mut().enumerate() {
    for &dep in upstream(node) {
      *degree += 1;
      downstream[dep].push(node);
    }
  }

  let mut ready: BinaryHeap<Reverse<usize>> = in_degree
    .iter()
    .enumerate()
    .filter(|(_, degree)| **degree == 0)
    .map(|(i, _)| Reverse(i))
    .collect();

  let mut order = Vec::with_capacity(count);
  while let Some(Reverse(node)) = ready.pop() {
    order.push(node);
    for &next in &downstream[node] {
      in_degree[next] -= 1;
      if in_degree[next] == 0 {
        ready.push(Reverse(next));
      }
    }
  }

  let remaining = (0..count).filter(|&i| in_degree[i] > 0).collect();
  (order, remaining)
}
