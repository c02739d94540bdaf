//! Property tests for hub selection and direction balancing on random graphs.

use ledgrid_planner::balancer::balance;
use ledgrid_planner::config::BalanceConfig;
use ledgrid_planner::coverage::plan_hubs;
use ledgrid_planner::domain::{
    Axis, EdgeCategory, EdgeInput, Network, NetworkInput, NodeId, Point3, RowId,
};
use ledgrid_planner::progress::{CancelFlag, NoopObserver};
use proptest::prelude::*;

/// Cables between random lattice points, self-loops dropped
fn network_strategy() -> impl Strategy<Value = NetworkInput> {
    prop::collection::vec((0u8..6, 0u8..5, 0u8..6, 0u8..5), 1..30).prop_map(|pairs| {
        let edges = pairs
            .into_iter()
            .filter(|&(ax, ay, bx, by)| (ax, ay) != (bx, by))
            .map(|(ax, ay, bx, by)| EdgeInput {
                start: Point3::new(ax as f64, ay as f64, 0.0),
                end: Point3::new(bx as f64, by as f64, 0.0),
                category: EdgeCategory::Normal,
            })
            .collect();
        NetworkInput::from_edges(edges)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Without intercom cables the greedy cover reaches every edge
    #[test]
    fn greedy_cover_is_complete(input in network_strategy()) {
        prop_assume!(!input.edges.is_empty());
        let network = Network::from_input(&input, Axis::Y).unwrap();
        let plan = plan_hubs(&network, None, &NoopObserver, &CancelFlag::new());

        prop_assert!(plan.stats.is_complete());
        prop_assert!(plan.uncovered.is_empty());
        for edge in network.edges() {
            prop_assert!(plan.hubs.contains(edge.a) || plan.hubs.contains(edge.b));
        }
    }

    /// Every covered edge keeps exactly one direction, sourced at a hub
    #[test]
    fn balanced_directions_start_at_hubs(input in network_strategy()) {
        prop_assume!(!input.edges.is_empty());
        let network = Network::from_input(&input, Axis::Y).unwrap();
        let plan = plan_hubs(&network, None, &NoopObserver, &CancelFlag::new());
        let result = balance(
            &network,
            &plan.hubs,
            &BalanceConfig::default(),
            &NoopObserver,
            &CancelFlag::new(),
        );

        prop_assert_eq!(result.directed_edges().count(), network.edge_count());
        for d in result.directed_edges() {
            prop_assert!(plan.hubs.contains(d.source));
            prop_assert_ne!(d.source, d.sink);
        }
        let row_total: u32 = result.row_loads.iter().sum();
        prop_assert_eq!(row_total as usize, network.edge_count());
    }

    /// Reported violations are exactly the hubs and rows over their limits
    #[test]
    fn violations_match_recomputed_limits(
        input in network_strategy(),
        port_limit in 1u32..5,
        amp_limit in 1u32..8,
    ) {
        prop_assume!(!input.edges.is_empty());
        let network = Network::from_input(&input, Axis::Y).unwrap();
        let plan = plan_hubs(&network, None, &NoopObserver, &CancelFlag::new());
        let config = BalanceConfig {
            port_limit,
            amp_limit,
            ..BalanceConfig::default()
        };
        let result = balance(&network, &plan.hubs, &config, &NoopObserver, &CancelFlag::new());

        let mut outputs = vec![0u32; network.node_count()];
        let mut row_loads = vec![0u32; network.rows().len()];
        for d in result.directed_edges() {
            outputs[d.source.0] += 1;
            row_loads[network.row_of(d.source).0] += 1;
        }
        prop_assert_eq!(&row_loads, &result.row_loads);

        let over_ports: Vec<(NodeId, u32)> = network
            .node_ids()
            .filter(|n| outputs[n.0] > port_limit)
            .map(|n| (n, outputs[n.0]))
            .collect();
        let mut reported_ports: Vec<(NodeId, u32)> =
            result.port_violations.iter().map(|v| (v.hub, v.outputs)).collect();
        reported_ports.sort();
        prop_assert_eq!(reported_ports, over_ports);

        let over_rows: Vec<(RowId, u32)> = row_loads
            .iter()
            .enumerate()
            .filter(|&(_, &load)| load > amp_limit)
            .map(|(i, &load)| (RowId(i), load))
            .collect();
        let mut reported_rows: Vec<(RowId, u32)> =
            result.row_violations.iter().map(|v| (v.row, v.load)).collect();
        reported_rows.sort();
        prop_assert_eq!(reported_rows, over_rows);

        if result.is_satisfied() {
            for hub in plan.hubs.iter() {
                prop_assert!(result.outputs_of(hub) <= port_limit);
            }
            prop_assert!(result.max_row_load() <= amp_limit);
        }
    }
}
