//! Degree-ranked candidate pool spread over `k` hubs with bounded k-means.
//!
//! Each cluster is represented by its medoid (the member node nearest the
//! cluster mean), never by a synthetic point, so every result is a real node.

use itertools::Itertools;

use crate::domain::{Network, NodeId, Point3};

/// Bounded k-means over `candidates`, returning one medoid per cluster.
///
/// Centroids start at the first `k` candidates. Converges when every
/// medoid moves less than `tolerance`, or after `max_iterations` rounds.
/// An empty cluster keeps its previous medoid.
pub fn kmeans_medoids(
    network: &Network,
    candidates: &[NodeId],
    k: usize,
    max_iterations: usize,
    tolerance: f64,
) -> Vec<NodeId> {
    if k >= candidates.len() {
        return candidates.to_vec();
    }
    let pos = |n: NodeId| network.position(n);
    let mut medoids: Vec<NodeId> = candidates[..k].to_vec();

    for _ in 0..max_iterations {
        let mut clusters: Vec<Vec<NodeId>> = vec![Vec::new(); k];
        for &candidate in candidates {
            let p = pos(candidate);
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (i, &m) in medoids.iter().enumerate() {
                let d = p.distance(&pos(m));
                if d < best_dist {
                    best_dist = d;
                    best = i;
                }
            }
            clusters[best].push(candidate);
        }

        let next: Vec<NodeId> = clusters
            .iter()
            .zip(&medoids)
            .map(|(members, &previous)| medoid(network, members).unwrap_or(previous))
            .collect();

        let converged = medoids
            .iter()
            .zip(&next)
            .all(|(&old, &new)| pos(old).distance(&pos(new)) < tolerance);
        medoids = next;
        if converged {
            break;
        }
    }
    medoids
}

/// Member nearest to the mean of `members` (first one on ties)
fn medoid(network: &Network, members: &[NodeId]) -> Option<NodeId> {
    if members.is_empty() {
        return None;
    }
    let n = members.len() as f64;
    let (sx, sy, sz) = members.iter().fold((0.0, 0.0, 0.0), |acc, &m| {
        let p = network.position(m);
        (acc.0 + p.x, acc.1 + p.y, acc.2 + p.z)
    });
    let center = Point3::new(sx / n, sy / n, sz / n);

    let mut best = members[0];
    let mut best_dist = network.position(best).distance(&center);
    for &m in &members[1..] {
        let d = network.position(m).distance(&center);
        if d < best_dist {
            best_dist = d;
            best = m;
        }
    }
    Some(best)
}

/// Pick `k` well-spread central hubs.
///
/// Nodes are ranked by degree (stable, so ties keep id order) and the top
/// `2k` form the candidate pool. Restricted nodes are never candidates.
pub fn select_central_hubs(
    network: &Network,
    k: usize,
    max_iterations: usize,
    tolerance: f64,
) -> Vec<NodeId> {
    let eligible: Vec<NodeId> = network
        .node_ids()
        .filter(|&n| !network.is_restricted(n))
        .collect();
    if k >= eligible.len() {
        return eligible;
    }
    let pool: Vec<NodeId> = eligible
        .into_iter()
        .sorted_by(|a, b| network.degree(*b).cmp(&network.degree(*a)))
        .take(k.saturating_mul(2))
        .collect();
    kmeans_medoids(network, &pool, k, max_iterations, tolerance)
}
