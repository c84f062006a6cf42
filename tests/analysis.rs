use approx::assert_relative_eq;
use ndarray::{Array3, ArrayD, ArrayView3, IxDyn};

use tilestats::{
    analyze_colocalization, analyze_grid, analyze_objects, analyze_skeleton, regions_from_labels,
    AnalysisError, AnalysisParams, AxisModel, CalibratedAxis, CorrelationKind, NeighbourhoodSpec,
    ObjectGrouping, PointKind, ResultTable, RunOptions, SkeletonExtractor, SkeletonPoint, Value,
};

fn axes(labels: &[&str], scale: f64) -> AxisModel {
    AxisModel::new(labels.iter().map(|l| CalibratedAxis::new(l, scale)).collect())
        .unwrap()
        .with_channel_axis()
}

fn row_set(table: &ResultTable) -> Vec<String> {
    let mut rows: Vec<String> = table.rows().iter().map(|row| format!("{:?}", row)).collect();
    rows.sort();
    rows
}

#[test]
fn test_grid_cell_centres() {
    let axes = axes(&["X", "Y", "Z", "C"], 1.0);
    let volume = ArrayD::from_shape_fn(IxDyn(&[4, 4, 1, 1]), |ix| (ix[0] + 4 * ix[1]) as f32);
    let spec = NeighbourhoodSpec::new(vec![2, 2, 1, 1]).unwrap();

    let report = analyze_grid(&volume, &axes, &spec, &RunOptions::with_parallelism(1)).unwrap();
    let table = report.concatenated();

    assert_eq!(table.len(), 4);
    assert_eq!(table.column_f64("X"), vec![1.0, 2.0, 1.0, 2.0]);
    assert_eq!(table.column_f64("Y"), vec![1.0, 1.0, 2.0, 2.0]);
    assert_eq!(table.column_f64("Z"), vec![0.5; 4]);
    // values 0, 1, 4, 5 in the first cell
    assert_relative_eq!(table.rows()[0].get_f64("Mean").unwrap(), 2.5);
}

#[test]
fn test_single_cell_statistics() {
    let axes = axes(&["X", "Y"], 1.0);
    let values = vec![1.0f32, 2.0, 3.0, 4.0, 5.0];
    let volume = ArrayD::from_shape_vec(IxDyn(&[5, 1, 1]), values).unwrap();
    let spec = NeighbourhoodSpec::new(vec![5, 1, 1]).unwrap();

    let report = analyze_grid(&volume, &axes, &spec, &RunOptions::default()).unwrap();
    let table = report.concatenated();
    assert_eq!(table.len(), 1);

    let row = &table.rows()[0];
    assert_relative_eq!(row.get_f64("Mean").unwrap(), 3.0);
    assert_relative_eq!(row.get_f64("Variance").unwrap(), 2.5);
    assert_relative_eq!(row.get_f64("Population Variance").unwrap(), 2.0);
    assert_relative_eq!(row.get_f64("Sum").unwrap(), 15.0);
    assert_relative_eq!(row.get_f64("Min").unwrap(), 1.0);
    assert_relative_eq!(row.get_f64("Max").unwrap(), 5.0);
    assert_relative_eq!(row.get_f64("Median").unwrap(), 3.0);
}

#[test]
fn test_trailing_cells_clamped() {
    let axes = axes(&["X", "Y"], 1.0);
    let volume = ArrayD::<u16>::ones(IxDyn(&[5, 3, 2]));
    let spec = NeighbourhoodSpec::new(vec![2, 2, 1]).unwrap();

    let report = analyze_grid(&volume, &axes, &spec, &RunOptions::with_parallelism(3)).unwrap();
    let table = report.concatenated();

    // 3 x 2 x 2 cells; every voxel of every channel is counted once
    assert_eq!(table.len(), 12);
    let total: f64 = table.column_f64("Sum").iter().sum();
    assert_relative_eq!(total, 30.0);
}

#[test]
fn test_grid_is_idempotent() {
    let axes = axes(&["X", "Y", "C"], 0.5);
    let volume = ArrayD::from_shape_fn(IxDyn(&[9, 7, 2]), |ix| {
        ((ix[0] * 31 + ix[1] * 17 + ix[2]) % 13) as f32
    });
    let spec = NeighbourhoodSpec::new(vec![3, 2, 1]).unwrap();

    let first = analyze_grid(&volume, &axes, &spec, &RunOptions::with_parallelism(4)).unwrap();
    let second = analyze_grid(&volume, &axes, &spec, &RunOptions::with_parallelism(3)).unwrap();

    assert_eq!(first.row_count(), 3 * 4 * 2);
    assert_eq!(row_set(&first.concatenated()), row_set(&second.concatenated()));
}

#[test]
fn test_time_points_get_their_own_centre() {
    let axes = axes(&["X", "Y", "T"], 1.0);
    let volume = ArrayD::from_shape_fn(IxDyn(&[2, 2, 2, 1]), |ix| (ix[2] * 100) as f32);
    let spec = NeighbourhoodSpec::new(vec![2, 2, 1, 1]).unwrap();

    let report = analyze_grid(&volume, &axes, &spec, &RunOptions::default()).unwrap();
    let table = report.into_concatenated();

    assert_eq!(table.len(), 2);
    assert_eq!(table.column_f64("X"), vec![1.0, 1.0]);
    assert_eq!(table.column_f64("T"), vec![0.5, 1.0]);
    assert_eq!(table.column_f64("Mean"), vec![0.0, 100.0]);
}

#[test]
fn test_cells_never_span_channels() {
    let axes = axes(&["X", "Y", "C"], 1.0);
    let volume = ArrayD::from_shape_fn(IxDyn(&[2, 2, 2]), |ix| (ix[2] * 100) as f32);
    let spec = NeighbourhoodSpec::new(vec![2, 2, 2]).unwrap();

    let report = analyze_grid(&volume, &axes, &spec, &RunOptions::default()).unwrap();
    let table = report.into_concatenated();
    assert_eq!(table.len(), 2);
    assert_eq!(table.column_f64("Channel"), vec![0.0, 1.0]);
    assert_eq!(table.column_f64("Mean"), vec![0.0, 100.0]);

    let output = analyze_colocalization(&volume, &axes, &spec, &RunOptions::default()).unwrap();
    assert_eq!(output.report.row_count(), 1);
    assert!(output.maps.iter().all(|(_, map)| map.shape() == [1, 1]));
}

#[test]
fn test_anticorrelated_channels() {
    let axes = axes(&["X", "Y", "C"], 1.0);
    let volume = ArrayD::from_shape_fn(IxDyn(&[2, 2, 2]), |ix| {
        let v = (ix[0] * 2 + ix[1] + 1) as f32;
        if ix[2] == 0 {
            v
        } else {
            5.0 - v
        }
    });
    let spec = NeighbourhoodSpec::new(vec![2, 2, 1]).unwrap();

    let output = analyze_colocalization(&volume, &axes, &spec, &RunOptions::default()).unwrap();
    let table = output.report.concatenated();

    assert_eq!(table.len(), 1);
    assert_relative_eq!(table.rows()[0].get_f64("PC_0_1").unwrap(), -1.0, epsilon = 1e-12);
    assert_relative_eq!(table.rows()[0].get_f64("SC_0_1").unwrap(), -1.0, epsilon = 1e-12);

    let map = output.maps.map(CorrelationKind::Pearson, 0, 1).unwrap();
    assert_relative_eq!(map.get(&[0, 0]).unwrap(), -1.0, epsilon = 1e-6);
}

#[test]
fn test_constant_channel_is_nan() {
    let axes = axes(&["X", "Y", "C"], 1.0);
    let volume = ArrayD::from_shape_fn(IxDyn(&[4, 4, 2]), |ix| {
        if ix[2] == 0 {
            7.0f32
        } else {
            ix[0] as f32
        }
    });
    let spec = NeighbourhoodSpec::new(vec![2, 2, 1]).unwrap();

    let opts = RunOptions::with_parallelism(2);
    let output = analyze_colocalization(&volume, &axes, &spec, &opts).unwrap();
    assert!(!output.report.is_partial());
    let table = output.report.concatenated();
    assert_eq!(table.len(), 4);
    assert!(table.column_f64("PC_0_1").iter().all(|v| v.is_nan()));
    assert!(table.column_f64("SC_0_1").iter().all(|v| v.is_nan()));
}

#[test]
fn test_correlation_maps_written_once() {
    let axes = axes(&["X", "Y", "C"], 1.0);
    let volume = ArrayD::from_shape_fn(IxDyn(&[8, 6, 3]), |ix| {
        ((ix[0] * 7 + ix[1] * 13 + ix[2] * 5) % 11) as f32 + (ix[2] * ix[0]) as f32
    });
    let spec = NeighbourhoodSpec::new(vec![2, 3, 1]).unwrap();

    let opts = RunOptions::with_parallelism(3);
    let output = analyze_colocalization(&volume, &axes, &spec, &opts).unwrap();
    let table = output.report.concatenated();

    // one row per spatial cell, never one per channel
    assert_eq!(table.len(), 4 * 2);
    let mut sites: Vec<(i64, i64)> = table
        .rows()
        .iter()
        .map(|row| {
            let x = row.get_f64("X").unwrap() as i64;
            let y = (row.get_f64("Y").unwrap() * 2.0) as i64;
            (x, y)
        })
        .collect();
    sites.sort();
    sites.dedup();
    assert_eq!(sites.len(), 8);

    for (name, map) in output.maps.iter() {
        assert_eq!(map.shape(), &[4, 2]);
        assert!(map.to_array().iter().all(|v| v.is_finite()), "{} has unwritten cells", name);
    }

    // map values agree with the row that produced them
    for row in table.rows() {
        let x = row.get_f64("X").unwrap() as usize - 1;
        let y = (row.get_f64("Y").unwrap() / 1.5) as usize - 1;
        for &(c1, c2) in output.maps.pairs() {
            let kind = CorrelationKind::Spearman;
            let expected = row.get_f64(&kind.column(c1, c2)).unwrap() as f32;
            assert_eq!(output.maps.map(kind, c1, c2).unwrap().get(&[x, y]), Some(expected));
        }
    }
}

#[test]
fn test_object_statistics() {
    let axes = axes(&["X", "Y"], 0.5);
    let volume = ArrayD::from_shape_fn(IxDyn(&[4, 4, 2]), |ix| {
        (ix[0] * 4 + ix[1]) as f32 + 100.0 * ix[2] as f32
    });

    let mut labels = ArrayD::<u32>::zeros(IxDyn(&[4, 4]));
    labels[[1, 1]] = 9;
    labels[[1, 2]] = 9;
    labels[[2, 1]] = 9;
    labels[[3, 3]] = 4;
    let regions = regions_from_labels(&labels);

    let params = AnalysisParams {
        channel_names: vec![String::from("DAPI"), String::from("GFP")],
        ..Default::default()
    };
    let opts = RunOptions::default();
    let report = analyze_objects(&volume, &axes, &regions, &params, Some("DAPI"), &opts).unwrap();
    let table = report.concatenated();

    assert_eq!(table.len(), 2);
    let row = table
        .rows()
        .iter()
        .find(|row| row.get("Object ID") == Some(&Value::Int(9)))
        .unwrap();
    // channel 0 values 5, 6 and 9
    assert_relative_eq!(row.get_f64("DAPI_Mean").unwrap(), 20.0 / 3.0, epsilon = 1e-9);
    assert_relative_eq!(row.get_f64("GFP_Mean").unwrap(), 100.0 + 20.0 / 3.0, epsilon = 1e-9);
    assert_relative_eq!(row.get_f64("X").unwrap(), (4.0 / 3.0) * 0.5, epsilon = 1e-9);
    assert_eq!(row.get("Detection Channel"), Some(&Value::Text(String::from("DAPI"))));

    let per_channel = AnalysisParams {
        grouping: ObjectGrouping::PerRegionChannel,
        ..params
    };
    let opts = RunOptions::with_parallelism(2);
    let report = analyze_objects(&volume, &axes, &regions, &per_channel, None, &opts).unwrap();
    assert_eq!(report.row_count(), 4);
}

#[test]
fn test_object_centroid_dimension_checked() {
    let axes = axes(&["X", "Y", "Z"], 1.0);
    let volume = ArrayD::<f32>::zeros(IxDyn(&[2, 2, 2, 1]));
    let labels = ArrayD::<u32>::ones(IxDyn(&[2, 2]));
    let regions = regions_from_labels(&labels);

    let params = AnalysisParams::default();
    let err = analyze_objects(&volume, &axes, &regions, &params, None, &RunOptions::default())
        .unwrap_err();
    assert!(matches!(err, AnalysisError::DimensionMismatch { .. }));
}

#[test]
fn test_invalid_configuration_rejected() {
    let axes = axes(&["X", "Y"], 1.0);
    let volume = ArrayD::<f32>::zeros(IxDyn(&[4, 4, 1]));
    let spec = NeighbourhoodSpec::new(vec![2, 2]).unwrap();
    assert!(matches!(
        analyze_grid(&volume, &axes, &spec, &RunOptions::default()),
        Err(AnalysisError::DimensionMismatch { .. })
    ));
}

// Fails on any cell that is completely filled.
struct RejectsSolid;

impl SkeletonExtractor for RejectsSolid {
    fn classify(&self, cell: ArrayView3<'_, bool>) -> tilestats::Result<Vec<SkeletonPoint>> {
        if cell.iter().all(|&v| v) {
            return Err(AnalysisError::Extractor(String::from("not a skeleton")));
        }
        Ok(cell
            .indexed_iter()
            .filter(|(_, &v)| v)
            .map(|((x, y, z), _)| SkeletonPoint {
                position: [x, y, z],
                kind: PointKind::End,
            })
            .collect())
    }
}

#[test]
fn test_skeleton_partial_failure_reported() {
    let mut skeleton = Array3::from_elem((8, 2, 1), false);
    skeleton[[0, 0, 0]] = true;
    skeleton[[3, 1, 0]] = true;
    for x in 4..8 {
        for y in 0..2 {
            skeleton[[x, y, 0]] = true;
        }
    }
    let spec = NeighbourhoodSpec::new(vec![2, 2, 1]).unwrap();

    let opts = RunOptions::with_parallelism(2);
    let report = analyze_skeleton(skeleton.view(), &spec, &RejectsSolid, &opts).unwrap();

    assert!(report.is_partial());
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].items, 2..4);
    assert!(failures[0].table.is_empty());

    let table = report.concatenated();
    assert_eq!(table.len(), 2);
    assert_eq!(table.rows()[1].get("X"), Some(&Value::Int(3)));
    assert_eq!(table.rows()[1].get("Y"), Some(&Value::Int(1)));
}

#[test]
fn test_skeleton_cells_clamped_to_volume() {
    let mut skeleton = Array3::from_elem((3, 3, 1), false);
    for i in 0..3 {
        skeleton[[i, 1, 0]] = true;
    }
    let spec = NeighbourhoodSpec::new(vec![10, 10, 10]).unwrap();

    let report = analyze_skeleton(
        skeleton.view(),
        &spec,
        &tilestats::NeighbourCountExtractor,
        &RunOptions::default(),
    )
    .unwrap();
    let table = report.concatenated();

    assert_eq!(table.len(), 2);
    let end = Value::Text(String::from("End"));
    assert!(table.column("Type").iter().all(|v| *v == Some(&end)));
}

#[test]
fn test_skeleton_with_locally_owned_extractor() {
    let mut skeleton = Array3::from_elem((4, 4, 1), false);
    skeleton[[1, 1, 0]] = true;
    let spec = NeighbourhoodSpec::new(vec![2, 2, 1]).unwrap();

    let report = {
        let extractor = tilestats::NeighbourCountExtractor;
        analyze_skeleton(skeleton.view(), &spec, &extractor, &RunOptions::default()).unwrap()
    };
    assert_eq!(report.row_count(), 1);
}
