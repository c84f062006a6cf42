// Run parameters shared by the library entry points and the binary.

use serde_json::{json, Value as JsonValue};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ObjectGrouping {
    // one row per region, statistics columns prefixed with the channel name
    PerRegion,
    // one row per region and channel, with a Channel column
    PerRegionChannel,
}

#[derive(Clone, Debug)]
pub struct AnalysisParams {
    // physical neighbourhood size along X, Y, Z
    pub neighbourhood: [f64; 3],
    pub do_3d: bool,
    pub colocalize: bool,
    pub parallelism: Option<usize>,
    pub grouping: ObjectGrouping,
    pub channel_names: Vec<String>,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        AnalysisParams {
            neighbourhood: [50.0, 50.0, 50.0],
            do_3d: false,
            colocalize: false,
            parallelism: None,
            grouping: ObjectGrouping::PerRegion,
            channel_names: Vec::new(),
        }
    }
}

impl AnalysisParams {
    pub fn channel_name(&self, c: usize) -> String {
        self.channel_names
            .get(c)
            .cloned()
            .unwrap_or_else(|| format!("C{}", c))
    }

    pub fn channel_names_for(&self, nchannels: usize) -> Vec<String> {
        (0..nchannels).map(|c| self.channel_name(c)).collect()
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "neighbourhood_x": self.neighbourhood[0],
            "neighbourhood_y": self.neighbourhood[1],
            "neighbourhood_z": self.neighbourhood[2],
            "do_3d": self.do_3d,
            "colocalize": self.colocalize,
            "parallelism": self.parallelism,
            "grouping": match self.grouping {
                ObjectGrouping::PerRegion => "per_region",
                ObjectGrouping::PerRegionChannel => "per_region_channel",
            },
            "channel_names": self.channel_names,
        })
    }
}
