//! Property tests over random DEMs

use drainnet_algorithms::hydrology::{accumulate, fill, route, sources_by_threshold};
use drainnet_algorithms::network::JunctionNetwork;
use drainnet_core::raster::{d8, Raster};
use proptest::prelude::*;

const NODATA: f64 = -9999.0;

/// Random grids of whole-metre elevations with scattered no-data.
fn dem_strategy() -> impl Strategy<Value = Raster<f64>> {
    (3usize..12, 3usize..12).prop_flat_map(|(rows, cols)| {
        prop::collection::vec(
            prop_oneof![9 => (0u32..60).prop_map(f64::from), 1 => Just(NODATA)],
            rows * cols,
        )
        .prop_map(move |values| {
            let mut dem = Raster::from_vec(values, rows, cols).unwrap();
            dem.set_nodata(Some(NODATA));
            dem
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn fill_is_idempotent_and_leaves_no_pits(dem in dem_strategy()) {
        let once = fill(&dem, 0.0001).unwrap();
        let twice = fill(&once, 0.0001).unwrap();
        prop_assert_eq!(once.data(), twice.data());

        let (rows, cols) = once.shape();
        for r in 0..rows {
            for c in 0..cols {
                if !once.is_valid(r, c) {
                    prop_assert_eq!(once.get(r, c).unwrap(), NODATA);
                    continue;
                }
                let z = once.get(r, c).unwrap();
                let mut seed = r == 0 || c == 0 || r + 1 == rows || c + 1 == cols;
                let mut lower = false;
                for (_, nr, nc) in d8::neighbors(r, c, rows, cols) {
                    if !once.is_valid(nr, nc) {
                        seed = true;
                    } else if once.get(nr, nc).unwrap() < z {
                        lower = true;
                    }
                }
                prop_assert!(seed || lower, "pit left at ({}, {})", r, c);
            }
        }
    }

    #[test]
    fn flow_paths_terminate(dem in dem_strategy()) {
        let flow = route(&fill(&dem, 0.0001).unwrap()).unwrap();
        for start in flow.stack().iter().copied() {
            let mut node = start;
            let mut steps = 0usize;
            while flow.receiver(node) != node {
                node = flow.receiver(node);
                steps += 1;
                prop_assert!(steps <= flow.len(), "cycle through {}", start);
            }
            prop_assert!(flow.is_outlet(node));
        }
    }

    #[test]
    fn accumulation_is_conserved(dem in dem_strategy()) {
        let flow = route(&fill(&dem, 0.0001).unwrap()).unwrap();
        let acc = accumulate(&flow).unwrap();
        let at = |n: usize| {
            let (r, c) = flow.row_col(n);
            acc.get(r, c).unwrap()
        };

        for n in flow.stack().iter().copied() {
            let upstream: u32 = flow.donors(n).iter().map(|&d| at(d)).sum();
            prop_assert!(at(n) >= 1);
            prop_assert_eq!(at(n), 1 + upstream);
        }
        let total: u32 = flow.outlets().map(at).sum();
        prop_assert_eq!(total as usize, flow.valid_count());
        prop_assert_eq!(flow.valid_count(), dem.valid_count());
    }

    #[test]
    fn threshold_sources_are_minimal(dem in dem_strategy(), k in 1u32..8) {
        let flow = route(&fill(&dem, 0.0001).unwrap()).unwrap();
        let acc = accumulate(&flow).unwrap();
        let k = k.min(flow.len() as u32);
        let at = |n: usize| {
            let (r, c) = flow.row_col(n);
            acc.get(r, c).unwrap()
        };

        for s in sources_by_threshold(&acc, &flow, k).unwrap() {
            prop_assert!(at(s) > k);
            for &d in flow.donors(s) {
                prop_assert!(at(d) <= k);
            }
        }
    }

    #[test]
    fn stream_order_never_decreases_downstream(dem in dem_strategy(), k in 1u32..6) {
        let flow = route(&fill(&dem, 0.0001).unwrap()).unwrap();
        let acc = accumulate(&flow).unwrap();
        let k = k.min(flow.len() as u32);
        let sources = sources_by_threshold(&acc, &flow, k).unwrap();
        let network = JunctionNetwork::new(&sources, &flow).unwrap();

        for &s in network.sources() {
            let mut last = 0u32;
            for node in flow.flow_path(s) {
                let j = network.junction_of(node);
                prop_assert!(j.is_some());
                let order = network.stream_order(j.unwrap()).unwrap();
                prop_assert!(order >= last);
                last = order;
            }
        }
    }

    #[test]
    fn junction_indices_are_injective(dem in dem_strategy(), k in 1u32..6) {
        let flow = route(&fill(&dem, 0.0001).unwrap()).unwrap();
        let acc = accumulate(&flow).unwrap();
        let k = k.min(flow.len() as u32);
        let sources = sources_by_threshold(&acc, &flow, k).unwrap();
        let network = JunctionNetwork::new(&sources, &flow).unwrap();

        let mut seen = std::collections::HashSet::new();
        for j in 0..network.n_junctions() {
            let node = network.junction_node(j).unwrap();
            prop_assert!(seen.insert(node));
            prop_assert_eq!(network.junction_at(node), Some(j));
        }

        // Every channel cell sits on exactly one link
        let mut on_links = vec![0usize; flow.len()];
        for j in 0..network.n_links() {
            for &n in network.link(j).unwrap() {
                on_links[n] += 1;
            }
        }
        for n in 0..flow.len() {
            prop_assert_eq!(on_links[n], usize::from(network.is_channel(n)));
        }
    }
}
