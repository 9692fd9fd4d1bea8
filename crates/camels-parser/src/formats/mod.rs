mod attributes;
mod basin;
mod common;
pub mod schema;
mod streamflow;

pub use attributes::{attribute_group_for, parse_attribute_table};
pub use basin::{read_basin_shapefile, HRU_ID_FIELD};
pub use streamflow::{parse_streamflow, MISSING_DISCHARGE};

#[cfg(test)]
pub(crate) use attributes::parse_with_custom_builder;
