use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};

use tilestats::input::{read_raw_labels, read_raw_mask, read_raw_volume, RawDtype};
use tilestats::output::{output_path, write_parameters, write_table, OutputFormat};
use tilestats::volume::{with_channel_axis, xyz_view};
use tilestats::{
    analyze_colocalization, analyze_grid, analyze_objects, analyze_skeleton, regions_from_labels,
    AnalysisParams, AxisModel, AxisRole, CalibratedAxis, ColocalizationOutput,
    NeighbourCountExtractor, NeighbourhoodSpec, ObjectGrouping, RunOptions, RunReport,
};

#[derive(Parser, Debug)]
#[command(name = "tilestats")]
#[command(about = "Tile an image volume into neighbourhoods and measure intensities, \
channel colocalisation, labelled objects and skeleton points.")]
struct Args {
    // raw little-endian image volume, optionally gzipped
    image: String,

    #[arg(long, value_delimiter = ',', required = true)]
    shape: Vec<usize>,

    #[arg(long, value_delimiter = ',', default_value = "X,Y")]
    axes: Vec<String>,

    #[arg(long, value_delimiter = ',')]
    scale: Vec<f64>,

    #[arg(long, value_enum, default_value_t = RawDtype::U16)]
    dtype: RawDtype,

    #[arg(short, long, default_value = ".")]
    output_dir: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    output_fmt: OutputFormat,

    #[arg(long, default_value_t = 50.0)]
    neighbourhood_x: f64,

    #[arg(long, default_value_t = 50.0)]
    neighbourhood_y: f64,

    #[arg(long, default_value_t = 50.0)]
    neighbourhood_z: f64,

    #[arg(long, default_value_t = false)]
    do_3d: bool,

    #[arg(long, default_value_t = false)]
    colocalize: bool,

    #[arg(long, value_delimiter = ',')]
    channel_names: Vec<String>,

    // raw label volumes over the channel-free dimensions
    #[arg(long)]
    labels: Vec<String>,

    #[arg(long, value_enum, default_value_t = RawDtype::U16)]
    labels_dtype: RawDtype,

    #[arg(long)]
    regions_name: Vec<String>,

    #[arg(long, default_value = None)]
    detection_channel: Option<String>,

    // emit one object row per region and channel instead of one per region
    #[arg(long, default_value_t = false)]
    per_channel_rows: bool,

    #[arg(long, default_value = None)]
    skeleton: Option<String>,

    #[arg(long, default_value = "Skeleton")]
    skeleton_name: String,

    #[arg(short = 't', long, default_value = None)]
    nthreads: Option<usize>,

    #[arg(long, default_value_t = false)]
    no_progress: bool,
}

fn image_stem(path: &str) -> String {
    let name = Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| String::from("image"));
    match name.split_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name,
    }
}

fn run_options(args: &Args) -> RunOptions {
    let progress = if args.no_progress {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
                .expect("Invalid progress bar template"),
        );
        bar
    };
    RunOptions {
        parallelism: args.nthreads,
        progress,
    }
}

fn write_report(report: RunReport, filename: &Path, fmt: OutputFormat) {
    if report.is_partial() {
        warn!(
            "{} of {} workers failed; writing the {} rows that completed",
            report.failures().count(),
            report.workers.len(),
            report.row_count()
        );
    }
    write_table(filename, fmt, &report.into_concatenated())
        .unwrap_or_else(|err| panic!("Unable to write {}: {}", filename.display(), err));
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.axes.len() != args.shape.len() {
        panic!(
            "--axes names {} dimensions but --shape has {}",
            args.axes.len(),
            args.shape.len()
        );
    }
    let scale = if args.scale.is_empty() {
        vec![1.0; args.shape.len()]
    } else if args.scale.len() == args.shape.len() {
        args.scale.clone()
    } else {
        panic!("--scale must give one value per dimension");
    };

    let axes = AxisModel::new(
        args.axes
            .iter()
            .zip(&scale)
            .map(|(label, &s)| CalibratedAxis::new(label, s))
            .collect(),
    )
    .unwrap_or_else(|err| panic!("Invalid axes: {}", err))
    .with_channel_axis();

    let params = AnalysisParams {
        neighbourhood: [args.neighbourhood_x, args.neighbourhood_y, args.neighbourhood_z],
        do_3d: args.do_3d,
        colocalize: args.colocalize,
        parallelism: args.nthreads,
        grouping: if args.per_channel_rows {
            ObjectGrouping::PerRegionChannel
        } else {
            ObjectGrouping::PerRegion
        },
        channel_names: args.channel_names.clone(),
    };

    let image = read_raw_volume(Path::new(&args.image), &args.shape, args.dtype)
        .unwrap_or_else(|err| panic!("Unable to read {}: {}", args.image, err));
    let volume = with_channel_axis(image.view(), &axes);
    let spec = NeighbourhoodSpec::from_physical(&axes, &params)
        .unwrap_or_else(|err| panic!("Invalid neighbourhood: {}", err));
    info!("Neighbourhood extents (voxels): {:?}", spec.extents());

    let output_dir = PathBuf::from(&args.output_dir);
    std::fs::create_dir_all(&output_dir).expect("Unable to create output directory");
    let stem = image_stem(&args.image);
    let fmt = args.output_fmt;

    if params.colocalize {
        let opts = run_options(&args);
        let ColocalizationOutput { report, maps } =
            analyze_colocalization(&volume, &axes, &spec, &opts)
                .unwrap_or_else(|err| panic!("Colocalisation failed: {}", err));
        opts.progress.finish();
        write_report(report, &output_path(&output_dir, &stem, "results", fmt), fmt);

        for (name, map) in maps.iter() {
            let filename = output_path(&output_dir, &stem, &name, fmt);
            write_table(&filename, fmt, &map.to_table(maps.site_labels()))
                .unwrap_or_else(|err| panic!("Unable to write {}: {}", filename.display(), err));
        }
    } else {
        let opts = run_options(&args);
        let report = analyze_grid(&volume, &axes, &spec, &opts)
            .unwrap_or_else(|err| panic!("Grid analysis failed: {}", err));
        opts.progress.finish();
        write_report(report, &output_path(&output_dir, &stem, "results", fmt), fmt);
    }

    let site_shape: Vec<usize> = axes.site_dims().iter().map(|&d| volume.shape()[d]).collect();

    for (i, labels_path) in args.labels.iter().enumerate() {
        let regions_name = args
            .regions_name
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("Regions{}", i));

        let labels = read_raw_labels(Path::new(labels_path), &site_shape, args.labels_dtype)
            .unwrap_or_else(|err| panic!("Unable to read {}: {}", labels_path, err));
        let regions = regions_from_labels(&labels);
        info!("{}: {} labelled regions", regions_name, regions.len());

        let opts = run_options(&args);
        let report = analyze_objects(
            &volume,
            &axes,
            &regions,
            &params,
            args.detection_channel.as_deref(),
            &opts,
        )
        .unwrap_or_else(|err| panic!("Object analysis failed: {}", err));
        opts.progress.finish();

        let suffix = format!("{}_object_results", regions_name);
        write_report(report, &output_path(&output_dir, &stem, &suffix, fmt), fmt);
    }

    if let Some(skeleton_path) = &args.skeleton {
        let mask = read_raw_mask(Path::new(skeleton_path), &site_shape, RawDtype::U8)
            .unwrap_or_else(|err| panic!("Unable to read {}: {}", skeleton_path, err));
        let skeleton = xyz_view(mask.view(), &axes)
            .unwrap_or_else(|err| panic!("Unsupported skeleton layout: {}", err));

        let extent = |role: AxisRole| axes.index(role).map(|d| spec.extent(d)).unwrap_or(1);
        let skeleton_spec = NeighbourhoodSpec::new(vec![
            extent(AxisRole::X),
            extent(AxisRole::Y),
            extent(AxisRole::Z),
        ])
        .unwrap_or_else(|err| panic!("Invalid neighbourhood: {}", err));

        let opts = run_options(&args);
        let report = analyze_skeleton(skeleton, &skeleton_spec, &NeighbourCountExtractor, &opts)
            .unwrap_or_else(|err| panic!("Skeleton analysis failed: {}", err));
        opts.progress.finish();

        let suffix = format!("{}_skeleton_results", args.skeleton_name);
        write_report(report, &output_path(&output_dir, &stem, &suffix, fmt), fmt);
    }

    write_parameters(&output_dir.join("analysis_parameters.json"), &params)
        .unwrap_or_else(|err| panic!("Unable to write analysis parameters: {}", err));
}
