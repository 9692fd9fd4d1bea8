pub mod crs;
pub mod errors;
pub mod formats;
pub mod model;

pub use crs::{AlbersEqualArea, SourceCrs};
pub use errors::ParserError;
pub use formats::schema;
pub use formats::{
    attribute_group_for, parse_attribute_table, parse_streamflow, read_basin_shapefile,
    HRU_ID_FIELD, MISSING_DISCHARGE,
};
pub use model::{
    AttributeGroup, AttributeTable, BasinCollection, BasinShape, QualityFlag, StreamflowSeries,
};
