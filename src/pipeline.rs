//! End-to-end batch runs driven by a [`ReconcileConfig`].

use std::path::Path;
use std::time::Instant;

use log::info;

use crate::config::{DatasetConfig, DatasetKind, ReconcileConfig};
use crate::io::{read_basemap, read_dataset, read_model, ID_PROPERTY};
use crate::model::StreetModel;
use crate::street::NetworkMatchOptions;
#[cfg(not(feature = "parallel"))]
use crate::street::match_street_network_to_osm as match_network;
#[cfg(feature = "parallel")]
use crate::street::match_street_network_to_osm_parallel as match_network;
use crate::{MatchError, Result};

fn match_dataset(
    model: &mut StreetModel,
    dataset: &DatasetConfig,
    config: &ReconcileConfig,
) -> Result<()> {
    let records = read_dataset(&dataset.path, &dataset.id_column)?;
    let table = match dataset.kind {
        DatasetKind::Streets => {
            let options = NetworkMatchOptions {
                segment_ids: dataset.segment_ids.clone(),
                config: config.matching.clone(),
            };
            match_network(model.basemap(), model.segments(), &records, model.grid(), &options)
        }
        DatasetKind::Points => crate::points::match_points_to_osm(model.basemap(), &records),
    };

    info!(
        "[StreetMatcher] Column '{}': {} of {} basemap lines matched",
        dataset.column,
        table.matched_count(),
        model.basemap().len()
    );
    model.set_column(dataset.column.clone(), table);
    Ok(())
}

/// Load the basemap, build the grid and match every configured dataset into
/// its own column.
pub fn reconcile(config: &ReconcileConfig) -> Result<StreetModel> {
    let started = Instant::now();
    config.validate()?;

    let basemap = read_basemap(&config.basemap.paths, &config.basemap.id_column)?;
    let mut model = StreetModel::new(basemap, config.grid()?);
    for dataset in &config.datasets {
        match_dataset(&mut model, dataset, config)?;
    }

    info!(
        "[StreetMatcher] Reconciled {} datasets in {:?}",
        config.datasets.len(),
        started.elapsed()
    );
    Ok(model)
}

/// Reload the model at `model_path` and merge a newer snapshot of the
/// dataset configured for `column`.
///
/// Every configured column is restored; only `column` changes.
pub fn update(
    config: &ReconcileConfig,
    model_path: impl AsRef<Path>,
    column: &str,
    input: impl AsRef<Path>,
) -> Result<StreetModel> {
    let dataset = config
        .dataset(column)
        .ok_or_else(|| MatchError::UnknownColumn(column.to_string()))?;

    let columns: Vec<&str> = config.datasets.iter().map(|d| d.column.as_str()).collect();
    let mut model = read_model(model_path, ID_PROPERTY, &columns, config.grid()?)?;
    let records = read_dataset(input, &dataset.id_column)?;

    let outcome = match dataset.kind {
        DatasetKind::Streets => model.apply_street_update(column, &records, &config.matching)?,
        DatasetKind::Points => model.apply_point_update(column, &records)?,
    };
    info!(
        "[StreetMatcher] Update of '{}': {} new records, {} matched, {} unassigned",
        column, outcome.new_records, outcome.matched, outcome.unassigned
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::write_model;
    use std::fs;

    const OSM: &str = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "properties": {"id": 1},
         "geometry": {"type": "LineString", "coordinates": [[1.0, 1.0], [3.0, 2.5]]}},
        {"type": "Feature", "properties": {"id": 2},
         "geometry": {"type": "LineString", "coordinates": [[6.0, 6.0], [8.0, 7.0]]}}
    ]}"#;

    const CENSUS: &str = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "properties": {"OBJECTID": 10},
         "geometry": {"type": "LineString", "coordinates": [[1.0001, 1.0001], [3.0001, 2.5001]]}}
    ]}"#;

    // OBJECTID 10 was removed from the newer snapshot
    const CENSUS_NEXT: &str = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "properties": {"OBJECTID": 11},
         "geometry": {"type": "LineString", "coordinates": [[6.0001, 6.0001], [8.0001, 7.0001]]}}
    ]}"#;

    const COUNTERS: &str = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "properties": {"id": "cnt-1"},
         "geometry": {"type": "Point", "coordinates": [7.0, 6.6]}}
    ]}"#;

    fn config_in(dir: &Path) -> ReconcileConfig {
        let files = [
            ("osm.geojson", OSM),
            ("census.geojson", CENSUS),
            ("counters.geojson", COUNTERS),
        ];
        for (name, text) in files {
            fs::write(dir.join(name), text).unwrap();
        }
        let text = format!(
            r#"{{
                "bbox": [0, 0, 10, 10],
                "num_segments": 2,
                "basemap": {{"paths": ["{dir}/osm.geojson"]}},
                "datasets": [
                    {{"column": "census", "path": "{dir}/census.geojson", "id_column": "OBJECTID"}},
                    {{"column": "counters", "path": "{dir}/counters.geojson", "kind": "points"}}
                ],
                "output": "{dir}/model.geojson"
            }}"#,
            dir = dir.display()
        );
        ReconcileConfig::from_json(&text).unwrap()
    }

    #[test]
    fn test_reconcile_and_update() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let model = reconcile(&config).unwrap();
        let census = model.column("census").unwrap();
        assert_eq!(census.get("1"), Some("10"));
        assert_eq!(census.get("2"), None);
        assert_eq!(model.column("counters").unwrap().get("2"), Some("cnt-1"));

        write_model(&config.output, &model).unwrap();
        let next = dir.path().join("census_next.geojson");
        fs::write(&next, CENSUS_NEXT).unwrap();

        let updated = update(&config, &config.output, "census", &next).unwrap();
        assert_eq!(updated.column("census").unwrap().get("1"), Some("10"));
        assert_eq!(updated.column("census").unwrap().get("2"), Some("11"));
        assert_eq!(updated.column("counters"), model.column("counters"));
    }

    #[test]
    fn test_update_unknown_column() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let model = dir.path().join("model.geojson");
        let result = update(&config, model, "traffic", dir.path().join("x"));
        assert!(matches!(result, Err(MatchError::UnknownColumn(_))));
    }
}
