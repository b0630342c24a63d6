//! Catalogue of ModelMW endpoints and their families.
//!
//! Endpoints are paths relative to the service host, always with a trailing `/`.

pub const PRODUCTION_HOST: &str = "https://modelmywatershed.org";
pub const STAGING_HOST: &str = "https://staging.modelmywatershed.org";

pub const API: &str = "api/";
pub const ANALYZE: &str = "api/analyze/";
pub const MODELING: &str = "api/modeling/";
pub const LEGACY_MODELING: &str = "mmw/modeling/";
pub const PROJECTS: &str = "mmw/modeling/projects/";

pub const PROTECTED_LANDS: &str = "api/analyze/protected-lands/";
pub const SOIL: &str = "api/analyze/soil/";
pub const TERRAIN: &str = "api/analyze/terrain/";
pub const CLIMATE: &str = "api/analyze/climate/";
pub const POINT_SOURCE: &str = "api/analyze/pointsource/";
pub const ANIMALS: &str = "api/analyze/animals/";
pub const CATCHMENT_WATER_QUALITY: &str = "api/analyze/catchment-water-quality/";

pub const GWLFE_PREPARE: &str = "api/modeling/gwlf-e/prepare/";
pub const GWLFE_RUN: &str = "api/modeling/gwlf-e/run/";
pub const SUBBASIN_PREPARE: &str = "api/modeling/subbasin/prepare/";
pub const SUBBASIN_RUN: &str = "api/modeling/subbasin/run/";

pub const TR55: &str = "mmw/modeling/tr55/";
pub const SUBBASINS: &str = "mmw/modeling/subbasins";
pub const LOGIN: &str = "user/login";

/// Land-use layer keys and the geoprocessing layer each one reads.
pub const LAND_USE_LAYERS: &[(&str, &str)] = &[
    ("2019_2019", "nlcd-2019-30m-epsg5070-512-byte"),
    ("2019_2016", "nlcd-2016-30m-epsg5070-512-byte"),
    ("2019_2011", "nlcd-2011-30m-epsg5070-512-byte"),
    ("2019_2006", "nlcd-2006-30m-epsg5070-512-byte"),
    ("2019_2001", "nlcd-2001-30m-epsg5070-512-byte"),
    ("2011_2011", "nlcd-2011-30m-epsg5070-512-int8"),
];

/// Delaware River Basin 2100 land-use prediction keys.
pub const DRB_2100_KEYS: &[&str] = &[
    "centers",
    "centers_np",
    "centers_osi",
    "corridors",
    "corridors_np",
    "corridors_osi",
];

pub const STREAM_SOURCES: &[&str] = &["nhd", "nhdhr", "drb"];

pub const WEATHER_LAYERS: &[&str] = &["NASA_NLDAS_2000_2019", "RCP45_2080_2099", "RCP85_2080_2099"];

/// Modification hash the service treats as "no modifications".
pub const INPUTMOD_HASH: &str = "d751713988987e9331980363e24189ced751713988987e9331980363e24189ce";

pub fn land(layer_key: &str) -> String {
    format!("{ANALYZE}land/{layer_key}/")
}

pub fn drb_2100_land(key: &str) -> String {
    format!("{ANALYZE}drb-2100-land/{key}/")
}

pub fn streams(source: &str) -> String {
    format!("{ANALYZE}streams/{source}/")
}

pub fn project(id: &str) -> String {
    format!("{PROJECTS}{id}")
}

pub fn project_weather(id: &str, layer: &str) -> String {
    format!("{PROJECTS}{id}/weather/{layer}")
}

/// Geoprocessing layer name for a land-use key, if known.
pub fn land_use_layer(key: &str) -> Option<&'static str> {
    LAND_USE_LAYERS
        .iter()
        .find(|(layer_key, _)| *layer_key == key)
        .map(|(_, layer)| *layer)
}

/// Encoding family of an endpoint, decided by path prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointFamily {
    /// `api/analyze/*` and `api/modeling/*`: JSON bodies.
    Api,
    /// `mmw/modeling/projects/*`: JSON bodies with project referer.
    Projects,
    /// Legacy `mmw/modeling/*`: form-encoded bodies.
    LegacyModeling,
}

impl EndpointFamily {
    pub fn classify(endpoint: &str) -> Option<Self> {
        let path = endpoint.trim_start_matches('/');
        if path.starts_with(API) {
            Some(Self::Api)
        } else if path.starts_with(PROJECTS) || path.starts_with(PROJECTS.trim_end_matches('/')) {
            Some(Self::Projects)
        } else if path.starts_with(LEGACY_MODELING) {
            Some(Self::LegacyModeling)
        } else {
            None
        }
    }

    pub fn uses_json(&self) -> bool {
        !matches!(self, Self::LegacyModeling)
    }

    /// Path under which this family's jobs are polled.
    pub fn jobs_root(&self) -> &'static str {
        match self {
            Self::Api => "api/jobs/",
            Self::Projects | Self::LegacyModeling => "mmw/modeling/jobs/",
        }
    }

    /// Page the browser client would have been on when calling this family.
    pub fn referer_path(&self) -> &'static str {
        match self {
            Self::Api => "analyze",
            Self::Projects | Self::LegacyModeling => "project/",
        }
    }
}

/// Short, filesystem-safe name for an endpoint, e.g. `land_2019_2019`.
pub fn display_name(endpoint: &str) -> String {
    endpoint
        .trim_start_matches('/')
        .replace(ANALYZE, "")
        .replace(MODELING, "")
        .replace('/', "_")
        .trim_matches(|c| c == ' ' || c == '_')
        .to_string()
}

/// All fixed endpoints with a short description, for listing.
pub fn catalogue() -> Vec<(String, &'static str)> {
    let mut entries: Vec<(String, &'static str)> = vec![
        (PROTECTED_LANDS.to_string(), "protected lands analysis"),
        (SOIL.to_string(), "soil analysis"),
        (TERRAIN.to_string(), "terrain analysis"),
        (CLIMATE.to_string(), "climate analysis"),
        (POINT_SOURCE.to_string(), "point source analysis"),
        (ANIMALS.to_string(), "animal analysis"),
        (CATCHMENT_WATER_QUALITY.to_string(), "catchment water quality (SRAT)"),
    ];
    for (key, _) in LAND_USE_LAYERS {
        entries.push((land(key), "land use analysis"));
    }
    for key in DRB_2100_KEYS {
        entries.push((drb_2100_land(key), "DRB 2100 land use forecast"));
    }
    for source in STREAM_SOURCES {
        entries.push((streams(source), "streams analysis"));
    }
    entries.extend([
        (GWLFE_PREPARE.to_string(), "GWLF-E prepare (MapShed)"),
        (GWLFE_RUN.to_string(), "GWLF-E run"),
        (SUBBASIN_PREPARE.to_string(), "subbasin GWLF-E prepare"),
        (SUBBASIN_RUN.to_string(), "subbasin GWLF-E run"),
        (TR55.to_string(), "TR-55 site storm model"),
    ]);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_families() {
        assert_eq!(EndpointFamily::classify(SOIL), Some(EndpointFamily::Api));
        assert_eq!(EndpointFamily::classify(GWLFE_RUN), Some(EndpointFamily::Api));
        assert_eq!(
            EndpointFamily::classify("/api/analyze/land/2019_2019/"),
            Some(EndpointFamily::Api)
        );
        assert_eq!(EndpointFamily::classify(TR55), Some(EndpointFamily::LegacyModeling));
        assert_eq!(
            EndpointFamily::classify(&project("42")),
            Some(EndpointFamily::Projects)
        );
        assert_eq!(EndpointFamily::classify("user/login"), None);
        assert_eq!(EndpointFamily::classify("apix/analyze/"), None);
    }

    #[test]
    fn test_family_rules() {
        assert!(EndpointFamily::Api.uses_json());
        assert!(EndpointFamily::Projects.uses_json());
        assert!(!EndpointFamily::LegacyModeling.uses_json());
        assert_eq!(EndpointFamily::Api.jobs_root(), "api/jobs/");
        assert_eq!(EndpointFamily::LegacyModeling.jobs_root(), "mmw/modeling/jobs/");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(&land("2019_2019")), "land_2019_2019");
        assert_eq!(display_name(GWLFE_PREPARE), "gwlf-e_prepare");
        assert_eq!(display_name(TR55), "mmw_modeling_tr55");
        assert_eq!(display_name(&streams("nhdhr")), "streams_nhdhr");
    }

    #[test]
    fn test_land_use_layer_lookup() {
        assert_eq!(
            land_use_layer("2011_2011"),
            Some("nlcd-2011-30m-epsg5070-512-int8")
        );
        assert_eq!(land_use_layer("1992_1992"), None);
    }

    #[test]
    fn test_catalogue_entries_all_classify() {
        for (endpoint, _) in catalogue() {
            assert!(
                EndpointFamily::classify(&endpoint).is_some(),
                "{endpoint} should belong to a family"
            );
        }
    }
}
