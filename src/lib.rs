pub mod analysis;
pub mod axes;
pub mod distribute;
pub mod error;
pub mod grid;
pub mod input;
pub mod output;
pub mod params;
pub mod regions;
pub mod stats;
pub mod table;
pub mod volume;

pub use analysis::coloc::{CorrelationKind, CorrelationMap, CorrelationMaps};
pub use analysis::skeleton::{NeighbourCountExtractor, PointKind, SkeletonExtractor, SkeletonPoint};
pub use analysis::{
    analyze_colocalization, analyze_grid, analyze_objects, analyze_skeleton, ColocalizationOutput,
};
pub use axes::{AxisModel, AxisRole, CalibratedAxis, NeighbourhoodSpec};
pub use distribute::{RunOptions, RunReport, WorkerOutcome};
pub use error::{AnalysisError, Result};
pub use params::{AnalysisParams, ObjectGrouping};
pub use regions::{regions_from_labels, LabelRegion, VoxelRegion};
pub use table::{ResultRow, ResultTable, Value};
pub use volume::Volume;
