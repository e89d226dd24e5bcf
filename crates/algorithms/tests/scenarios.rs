//! End-to-end channel extraction scenarios on synthetic DEMs

use approx::assert_relative_eq;
use drainnet_algorithms::heads::{remove_single_pixel_channels, DetectorKind};
use drainnet_algorithms::hydrology::{accumulate, fill, route};
use drainnet_algorithms::network::JunctionNetwork;
use drainnet_algorithms::pipeline::{prepare, run_detector, run_detectors};
use drainnet_algorithms::spectral::isolate_channels;
use drainnet_algorithms::ExtractionConfig;
use drainnet_core::raster::{GeoTransform, Raster};

const NODATA: f64 = -9999.0;

fn raster(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
    let z = (0..rows * cols).map(|i| f(i / cols, i % cols)).collect();
    let mut r = Raster::from_vec(z, rows, cols).unwrap();
    r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
    r.set_nodata(Some(NODATA));
    r
}

/// 21 x 21 grid whose valid cells form a three-column band sloping south
/// along column 10, with the flanks dropping into the centre line and a
/// 2-unit pit dug into the centre.
fn v_valley() -> Raster<f64> {
    raster(21, 21, |r, c| {
        if !(9..=11).contains(&c) {
            return NODATA;
        }
        let z = 100.0 - r as f64 + 10.0 * (c as f64 - 10.0).abs();
        if (r, c) == (10, 10) {
            z - 2.0
        } else {
            z
        }
    })
}

#[test]
fn scenario_a_v_valley_has_one_head() {
    let dem = v_valley();
    let filled = fill(&dem, 0.0001).unwrap();

    // The pit is gone: the centre drains to the cell below it
    assert!(filled.get(10, 10).unwrap() > filled.get(11, 10).unwrap());
    assert_relative_eq!(filled.get(10, 10).unwrap(), 89.0001, epsilon = 1e-9);

    let flow = route(&filled).unwrap();
    let outlets: Vec<usize> = flow.outlets().collect();
    assert_eq!(outlets, vec![flow.node(20, 10)]);

    let config = ExtractionConfig {
        threshold_contributing_pixels: 5,
        ..Default::default()
    };
    let prepared = prepare(dem, &config).unwrap();
    let run = run_detector(DetectorKind::AreaThreshold, &prepared, &config).unwrap();

    // Topmost interior cell of the centre line
    assert_eq!(run.heads, vec![prepared.flow.node(1, 10)]);
    assert_eq!(run.network.n_junctions(), 1);
    assert_eq!(run.network.link(0).unwrap().len(), 20);
}

#[test]
fn scenario_b_flat_plateau_drains_deterministically() {
    // 7 x 7 flat plateau inside a one-cell no-data frame
    let dem = raster(9, 9, |r, c| {
        if r == 0 || c == 0 || r == 8 || c == 8 {
            NODATA
        } else {
            50.0
        }
    });
    let filled = fill(&dem, 0.0001).unwrap();
    let flow = route(&filled).unwrap();
    let again = route(&fill(&dem, 0.0001).unwrap()).unwrap();

    for n in 0..flow.len() {
        assert_eq!(flow.receiver(n), again.receiver(n));
    }

    // Ring cells touching no-data are the outlets; every other cell's path
    // ends at exactly one of them
    for n in flow.stack().iter().copied() {
        let path = flow.flow_path(n);
        assert!(path.len() <= flow.len());
        let end = *path.last().unwrap();
        assert!(flow.is_outlet(end));
        assert!(flow.is_edge_or_nodata_adjacent(end));
        assert_eq!(path.iter().filter(|&&p| flow.is_outlet(p)).count(), 1);
    }

    // Four equal orthogonal descents from the centre: east comes first
    assert_eq!(flow.direction(flow.node(4, 4)), 1);
    // North beats west at the upper-left inner corner
    assert_eq!(flow.direction(flow.node(2, 2)), 3);
}

#[test]
fn scenario_c_uniform_surface_gives_empty_dreich_network() {
    let dem = raster(24, 24, |r, c| {
        if r == 0 || c == 0 || r == 23 || c == 23 {
            NODATA
        } else {
            120.0
        }
    });
    let config = ExtractionConfig {
        surface_fitting_radius: 3.0,
        connected_components_threshold: 3,
        min_segment_length: 3,
        ..Default::default()
    };

    let isolation = isolate_channels(&dem, 0.0, 3.0, &config).unwrap();
    assert!(isolation.mask.data().iter().all(|&m| m == 0));

    let prepared = prepare(dem, &config).unwrap();
    let run = run_detector(DetectorKind::Dreich, &prepared, &config).unwrap();
    assert!(run.heads.is_empty());
    assert_eq!(run.network.n_junctions(), 0);
    assert_eq!(run.network.n_links(), 0);
    assert!(run.diagnostics.curvature_threshold.is_none());
}

#[test]
fn single_pixel_channel_into_outlet_is_removed() {
    // Short valley: the cell above the bottom outlet would be a one-cell channel
    let dem = raster(6, 5, |r, c| 50.0 - 5.0 * r as f64 + 20.0 * (c as f64 - 2.0).abs());
    let flow = route(&fill(&dem, 0.0001).unwrap()).unwrap();
    let outlet = flow.node(5, 2);
    let above = flow.node(4, 2);
    assert!(flow.is_outlet(outlet));
    assert_eq!(flow.receiver(above), outlet);

    let top = flow.node(0, 2);
    let kept = remove_single_pixel_channels(&[above, top], &flow).unwrap();
    assert_eq!(kept, vec![top]);

    let kept = remove_single_pixel_channels(&[above], &flow).unwrap();
    assert!(kept.is_empty());
    let network = JunctionNetwork::new(&kept, &flow).unwrap();
    assert!(network.is_empty());
}

/// Gently tilted surface with two parabolic valleys cut into it.
fn two_valleys() -> Raster<f64> {
    raster(48, 40, |r, c| {
        let x = c as f64;
        let left = -6.0 * (-((x - 12.0) / 4.0).powi(2)).exp();
        let right = -6.0 * (-((x - 28.0) / 4.0).powi(2)).exp();
        let valley_depth = (r as f64 / 48.0).min(1.0);
        200.0 - 0.8 * r as f64 + valley_depth * (left + right) + 0.02 * (x - 20.0).powi(2)
    })
}

#[test]
fn all_detectors_return_valid_heads() {
    let config = ExtractionConfig {
        threshold_contributing_pixels: 30,
        connected_components_threshold: 5,
        surface_fitting_radius: 2.5,
        long_wavelength_radius: 6.0,
        pruning_drainage_area: 20.0,
        minimum_drainage_area: 10.0,
        min_segment_length: 4,
        pelletier_border_width: 2,
        pelletier_initial_threshold: 40,
        curvature_threshold: 0.01,
        ..Default::default()
    };
    let prepared = prepare(two_valleys(), &config).unwrap();
    let results = run_detectors(&DetectorKind::ALL, &prepared, &config);
    assert_eq!(results.len(), 4);

    for (kind, result) in results {
        let run = result.unwrap_or_else(|e| panic!("{} failed: {}", kind, e));
        assert_eq!(run.detector, kind);
        let flow = run.flow(&prepared);
        let mut seen = std::collections::HashSet::new();
        for &h in &run.heads {
            assert!(flow.is_valid(h), "{} produced a no-data head", kind);
            assert!(seen.insert(h), "{} produced a repeated head", kind);
        }
        for &s in run.network.sources() {
            assert!(run.heads.contains(&s));
        }
        assert_eq!(kind == DetectorKind::Pelletier, run.own_flow.is_some());
        assert!(!run.heads.is_empty(), "{} found no heads", kind);

        // The skeleton detectors put a head in each valley
        if matches!(kind, DetectorKind::Wiener | DetectorKind::Dreich) {
            for axis in [12usize, 28] {
                assert!(
                    run.heads.iter().any(|&h| flow.row_col(h).1.abs_diff(axis) <= 3),
                    "{} missed the valley at column {}",
                    kind,
                    axis
                );
            }
        }
    }
}

#[test]
fn area_threshold_heads_follow_the_valleys() {
    let config = ExtractionConfig {
        threshold_contributing_pixels: 30,
        ..Default::default()
    };
    let prepared = prepare(two_valleys(), &config).unwrap();
    let run = run_detector(DetectorKind::AreaThreshold, &prepared, &config).unwrap();
    assert!(!run.heads.is_empty());

    let acc = accumulate(&prepared.flow).unwrap();
    for row in run.network.export_rows() {
        assert!(acc.get(row.row, row.col).unwrap() > 30);
        assert!(row.stream_order >= 1);
    }
}
