mod tabular;
pub mod wkb;
pub mod zarr;

pub use tabular::{read_tabular, stage_tabular, write_tabular, StagedTable, TabularFormat};
pub use zarr::{
    stage_array_store, write_array_store, ArrayInfo, ArrayStoreOptions, StagedStore, ZarrStore,
};
