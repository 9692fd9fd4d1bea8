use crate::model::AttributeGroup;
use crate::model::AttributeGroup::{Clim, Geol, Hydro, Name, Soil, Topo, Vege};

pub const GAUGE_ID_COLUMN: &str = "gauge_id";
pub const GAUGE_NAME_COLUMN: &str = "gauge_name";
pub const HUC_COLUMN: &str = "huc_02";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Float,
    Text,
}

#[derive(Debug, Clone, Copy)]
pub struct AttributeField {
    pub name: &'static str,
    pub group: AttributeGroup,
    pub kind: FieldKind,
    pub units: Option<&'static str>,
}

const fn float(name: &'static str, group: AttributeGroup, units: &'static str) -> AttributeField {
    AttributeField {
        name,
        group,
        kind: FieldKind::Float,
        units: Some(units),
    }
}

const fn text(name: &'static str, group: AttributeGroup) -> AttributeField {
    AttributeField {
        name,
        group,
        kind: FieldKind::Text,
        units: None,
    }
}

/// Every column the CAMELS v2.0 attribute tables may carry besides `gauge_id`.
pub const ATTRIBUTE_FIELDS: &[AttributeField] = &[
    float("p_mean", Clim, "mm day-1"),
    float("pet_mean", Clim, "mm day-1"),
    float("p_seasonality", Clim, "1"),
    float("frac_snow", Clim, "1"),
    float("aridity", Clim, "1"),
    float("high_prec_freq", Clim, "days yr-1"),
    float("high_prec_dur", Clim, "days"),
    text("high_prec_timing", Clim),
    float("low_prec_freq", Clim, "days yr-1"),
    float("low_prec_dur", Clim, "days"),
    text("low_prec_timing", Clim),
    text("geol_1st_class", Geol),
    float("glim_1st_class_frac", Geol, "1"),
    text("geol_2nd_class", Geol),
    float("glim_2nd_class_frac", Geol, "1"),
    float("carbonate_rocks_frac", Geol, "1"),
    float("geol_porostiy", Geol, "1"),
    float("geol_permeability", Geol, "log10(m2)"),
    float("q_mean", Hydro, "mm day-1"),
    float("runoff_ratio", Hydro, "1"),
    float("slope_fdc", Hydro, "1"),
    float("baseflow_index", Hydro, "1"),
    float("stream_elas", Hydro, "1"),
    float("q5", Hydro, "mm day-1"),
    float("q95", Hydro, "mm day-1"),
    float("high_q_freq", Hydro, "days yr-1"),
    float("high_q_dur", Hydro, "days"),
    float("low_q_freq", Hydro, "days yr-1"),
    float("low_q_dur", Hydro, "days"),
    float("zero_q_freq", Hydro, "percent"),
    float("hfd_mean", Hydro, "day of year"),
    text("huc_02", Name),
    text("gauge_name", Name),
    float("soil_depth_pelletier", Soil, "m"),
    float("soil_depth_statsgo", Soil, "m"),
    float("soil_porosity", Soil, "1"),
    float("soil_conductivity", Soil, "cm hr-1"),
    float("max_water_content", Soil, "m"),
    float("sand_frac", Soil, "percent"),
    float("silt_frac", Soil, "percent"),
    float("clay_frac", Soil, "percent"),
    float("water_frac", Soil, "percent"),
    float("organic_frac", Soil, "percent"),
    float("other_frac", Soil, "percent"),
    float("gauge_lat", Topo, "degrees_north"),
    float("gauge_lon", Topo, "degrees_east"),
    float("elev_mean", Topo, "m"),
    float("slope_mean", Topo, "m km-1"),
    float("area_gages2", Topo, "km2"),
    float("area_geospa_fabric", Topo, "km2"),
    float("frac_forest", Vege, "1"),
    float("lai_max", Vege, "1"),
    float("lai_diff", Vege, "1"),
    float("gvf_max", Vege, "1"),
    float("gvf_diff", Vege, "1"),
    float("dom_land_cover_frac", Vege, "1"),
    text("dom_land_cover", Vege),
    float("root_depth_50", Vege, "m"),
    float("root_depth_99", Vege, "m"),
];

pub fn lookup_field(name: &str) -> Option<&'static AttributeField> {
    ATTRIBUTE_FIELDS.iter().find(|field| field.name == name)
}
