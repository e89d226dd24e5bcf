//! Chi-profile refinement of channel head positions
//!
//! Chi integrates `(A0 / A)^(m/n)` along a flow path from its downstream
//! end. On a channel, elevation is close to linear in chi; on the hillslope
//! above the head it is not. Splitting a profile into two straight segments
//! and minimising the combined misfit puts the head at the break.

use drainnet_core::raster::Raster;
use drainnet_core::Result;
use tracing::debug;

use super::junction::JunctionNetwork;
use crate::config::{ChiTieBreak, ExtractionConfig};
use crate::hydrology::{ensure_matches, FlowGraph};

/// Chi at each cell of `path` (listed downstream), zero at its last cell.
///
/// Drainage area is accumulation times cell area. Steps use the trapezoid
/// rule over the planimetric distance between consecutive cells.
pub fn chi_profile(
    path: &[usize],
    graph: &FlowGraph,
    accumulation: &Raster<u32>,
    a_0: f64,
    m_over_n: f64,
) -> Result<Vec<f64>> {
    ensure_matches(accumulation, graph)?;
    let cell_area = graph.cell_area();
    let acc = accumulation.data();
    let integrand = |node: usize| {
        let area = acc[graph.row_col(node)].max(1) as f64 * cell_area;
        (a_0 / area).powf(m_over_n)
    };

    let mut chi = vec![0.0; path.len()];
    for i in (0..path.len().saturating_sub(1)).rev() {
        let step = graph.step_length(path[i]);
        chi[i] = chi[i + 1] + 0.5 * (integrand(path[i]) + integrand(path[i + 1])) * step;
    }
    Ok(chi)
}

/// Residual sum of squares of the least-squares line through `(x, y)`.
pub fn segment_misfit(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    if x.is_empty() {
        return 0.0;
    }
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (&xi, &yi) in x.iter().zip(y) {
        sxx += (xi - mx) * (xi - mx);
        sxy += (xi - mx) * (yi - my);
        syy += (yi - my) * (yi - my);
    }
    if sxx <= 0.0 {
        return syy;
    }
    (syy - sxy * sxy / sxx).max(0.0)
}

/// Split index of a profile into two straight segments.
///
/// Candidate `k` splits into `[..k]` and `[k..]`, each with at least
/// `min_segment` cells. Splits whose misfit lies within `1e-9 * (1 + min)`
/// of the smallest one count as equally good; `tie_break` chooses among
/// them. `None` when the profile is too short.
pub fn best_split(
    chi: &[f64],
    elevation: &[f64],
    min_segment: usize,
    tie_break: ChiTieBreak,
) -> Option<usize> {
    let n = chi.len().min(elevation.len());
    let min_segment = min_segment.max(2);
    if n < 2 * min_segment {
        return None;
    }

    let scores: Vec<(usize, f64)> = (min_segment..=n - min_segment)
        .map(|k| {
            let upper = segment_misfit(&chi[..k], &elevation[..k]);
            let lower = segment_misfit(&chi[k..n], &elevation[k..n]);
            (k, upper + lower)
        })
        .collect();

    let min = scores.iter().map(|&(_, s)| s).fold(f64::INFINITY, f64::min);
    if !min.is_finite() {
        return None;
    }
    let tol = 1e-9 * (1.0 + min.abs());
    let mut near_best = scores.iter().filter(|&&(_, s)| s <= min + tol).map(|&(k, _)| k);

    match tie_break {
        ChiTieBreak::MostUpstream => near_best.next(),
        ChiTieBreak::FirstBest => near_best.last(),
    }
}

/// Move each source of `network` to the break of its chi profile.
///
/// The profile runs from the source down to the end of the link
/// `search_depth` junctions below it. Sources whose profile is too short
/// to split stay where they are. The result keeps the order of
/// [`JunctionNetwork::sources`] and may hold repeats.
pub fn refine_heads(
    network: &JunctionNetwork,
    graph: &FlowGraph,
    accumulation: &Raster<u32>,
    config: &ExtractionConfig,
) -> Result<Vec<usize>> {
    config.validate_chi()?;

    let mut refined = Vec::with_capacity(network.sources().len());
    let mut moved = 0usize;
    for (j, &source) in network.sources().iter().enumerate() {
        let last = network.junction_downstream(j, config.search_depth);
        let mut path = Vec::new();
        let mut current = j;
        loop {
            if let Some(link) = network.link(current) {
                path.extend_from_slice(link);
            }
            if current == last {
                break;
            }
            match network.receiver_junction(current) {
                Some(next) => current = next,
                None => break,
            }
        }

        let chi = chi_profile(&path, graph, accumulation, config.a_0, config.m_over_n)?;
        let elevation: Vec<f64> = path.iter().map(|&n| graph.elevation(n)).collect();
        let head = best_split(&chi, &elevation, config.min_segment_length, config.chi_tie_break)
            .map_or(source, |k| path[k]);
        if head != source {
            moved += 1;
        }
        refined.push(head);
    }

    debug!("chi refinement moved {} of {} heads", moved, refined.len());
    Ok(refined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::{accumulate, route};
    use approx::assert_relative_eq;
    use drainnet_core::GeoTransform;

    fn kinked_profile() -> (Vec<f64>, Vec<f64>) {
        let chi: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let z = chi
            .iter()
            .map(|&x| if x <= 8.0 { 2.0 * x } else { 16.0 + 0.5 * (x - 8.0) })
            .collect();
        (chi, z)
    }

    #[test]
    fn test_misfit_of_line_is_zero() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        assert_relative_eq!(segment_misfit(&x, &y), 0.0, epsilon = 1e-12);
        assert_relative_eq!(segment_misfit(&[1.0, 1.0], &[0.0, 2.0]), 2.0);
    }

    #[test]
    fn test_tie_break_rules() {
        // Splitting at 8 or 9 both leave two exact lines: the kink cell
        // lies on both of them
        let (chi, z) = kinked_profile();
        assert_eq!(best_split(&chi, &z, 3, ChiTieBreak::MostUpstream), Some(8));
        assert_eq!(best_split(&chi, &z, 3, ChiTieBreak::FirstBest), Some(9));
    }

    #[test]
    fn test_short_profile_has_no_split() {
        let (chi, z) = kinked_profile();
        assert_eq!(best_split(&chi[..5], &z[..5], 3, ChiTieBreak::MostUpstream), None);
    }

    /// 13 x 13 trunk down column 6 with steep side slopes, so side cells
    /// run diagonally into it. Heads (0, 3) and (0, 0) join the trunk at
    /// (3, 6) and (6, 6).
    fn trunk_network() -> (FlowGraph, Raster<u32>, JunctionNetwork) {
        let n = 13;
        let z = (0..n * n)
            .map(|i| {
                let (r, c) = (i / n, i % n);
                200.0 - 10.0 * r as f64 + 20.0 * (c as f64 - 6.0).abs()
            })
            .collect();
        let mut dem = Raster::from_vec(z, n, n).unwrap();
        dem.set_transform(GeoTransform::new(0.0, 130.0, 10.0, -10.0));
        let g = route(&dem).unwrap();
        let acc = accumulate(&g).unwrap();
        let heads = [g.node(0, 6), g.node(0, 3), g.node(0, 0)];
        let net = JunctionNetwork::new(&heads, &g).unwrap();
        (g, acc, net)
    }

    #[test]
    fn test_refine_heads_per_source() {
        let (g, acc, net) = trunk_network();
        assert_eq!(net.sources(), &[g.node(0, 6), g.node(0, 3), g.node(0, 0)]);
        assert_eq!(net.junction_node(3), Some(g.node(3, 6)));
        assert_eq!(net.junction_node(4), Some(g.node(6, 6)));

        let mut cfg = ExtractionConfig {
            min_segment_length: 2,
            search_depth: 1,
            ..Default::default()
        };
        let refined = refine_heads(&net, &g, &acc, &cfg).unwrap();
        assert_eq!(refined, vec![g.node(2, 6), g.node(2, 5), g.node(5, 5)]);

        // One junction further down, both trunk heads break just above (6, 6)
        cfg.search_depth = 2;
        let refined = refine_heads(&net, &g, &acc, &cfg).unwrap();
        assert_eq!(refined, vec![g.node(5, 6), g.node(5, 6), g.node(5, 5)]);
    }

    #[test]
    fn test_refine_heads_keeps_short_profiles() {
        let (g, acc, net) = trunk_network();
        let cfg = ExtractionConfig {
            min_segment_length: 10,
            ..Default::default()
        };
        let refined = refine_heads(&net, &g, &acc, &cfg).unwrap();
        assert_eq!(refined, net.sources());
    }

    #[test]
    fn test_chi_profile_trapezoid() {
        let dem = Raster::from_vec(vec![4.0, 3.0, 2.0, 1.0, 0.0], 1, 5).unwrap();
        let g = route(&dem).unwrap();
        let acc = accumulate(&g).unwrap();
        let path = g.flow_path(0);
        let chi = chi_profile(&path, &g, &acc, 1.0, 0.5).unwrap();

        assert_eq!(chi.len(), 5);
        assert_eq!(chi[4], 0.0);
        let expected = 0.5 * (1.0 / 4f64.sqrt() + 1.0 / 5f64.sqrt());
        assert_relative_eq!(chi[3], expected, epsilon = 1e-12);
        assert!(chi.windows(2).all(|w| w[0] > w[1]));
    }
}
