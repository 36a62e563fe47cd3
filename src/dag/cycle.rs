// src/dag/cycle.rs

//! Depth-first cycle detection with full-path reporting.
//!
//! `petgraph::algo::toposort` only names a single node on a cycle. Users need
//! the whole loop (`deploy.a -> deploy.b -> deploy.a`) to fix their config, so
//! this walks the graph with the classic white/gray/black colouring and
//! returns the gray stack slice that closes the loop.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Find a cycle among `nodes`, following `successors`.
///
/// The returned path starts and ends with the same node. Nodes are visited
/// in sorted order so the reported cycle is deterministic.
pub fn find_cycle<K, F, I>(nodes: impl IntoIterator<Item = K>, mut successors: F) -> Option<Vec<K>>
where
    K: Ord + Clone,
    F: FnMut(&K) -> I,
    I: IntoIterator<Item = K>,
{
    let mut colors: BTreeMap<K, Color> = nodes.into_iter().map(|n| (n, Color::White)).collect();
    let roots: Vec<K> = colors.keys().cloned().collect();

    for root in roots {
        if colors.get(&root) != Some(&Color::White) {
            continue;
        }

        // Explicit stack of (node, remaining successors) to avoid recursion
        // on deep graphs.
        let mut stack: Vec<(K, std::vec::IntoIter<K>)> = Vec::new();
        colors.insert(root.clone(), Color::Gray);
        let succ = sorted(successors(&root));
        stack.push((root, succ));

        while let Some((node, iter)) = stack.last_mut() {
            match iter.next() {
                Some(next) => match colors.get(&next).copied().unwrap_or(Color::White) {
                    Color::White => {
                        colors.insert(next.clone(), Color::Gray);
                        let succ = sorted(successors(&next));
                        stack.push((next, succ));
                    }
                    Color::Gray => {
                        let start = stack
                            .iter()
                            .position(|(n, _)| *n == next)
                            .unwrap_or(0);
                        let mut path: Vec<K> =
                            stack[start..].iter().map(|(n, _)| n.clone()).collect();
                        path.push(next);
                        return Some(path);
                    }
                    Color::Black => {}
                },
                None => {
                    colors.insert(node.clone(), Color::Black);
                    stack.pop();
                }
            }
        }
    }

    None
}

fn sorted<K: Ord, I: IntoIterator<Item = K>>(iter: I) -> std::vec::IntoIter<K> {
    let mut v: Vec<K> = iter.into_iter().collect();
    v.sort();
    v.into_iter()
}
