//! Choropleth join: colors district polygons by the risk published for a date.

use anyhow::{Result, bail};
use serde::Serialize;
use serde_json::{Value, json};

use crate::pipeline::risk::NO_DATA_COLOR;
use crate::pipeline::types::DailySnapshot;

/// GeoJSON property the districts file names polygons by.
pub const DEFAULT_NAME_PROPERTY: &str = "NAME_2";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PaintSummary {
    pub features: usize,
    pub matched: usize,
    pub no_data: usize,
}

/// Annotates every feature of a GeoJSON `FeatureCollection` in place.
///
/// Matched features get `fillColor`, `score` and `risk` properties; features
/// without a record get [`NO_DATA_COLOR`].
pub fn paint(geojson: &mut Value, snapshot: &DailySnapshot, name_property: &str) -> Result<PaintSummary> {
    let Some(features) = geojson.get_mut("features").and_then(Value::as_array_mut) else {
        bail!("GeoJSON input is not a FeatureCollection");
    };

    let mut summary = PaintSummary::default();
    for feature in features.iter_mut() {
        summary.features += 1;

        let Some(obj) = feature.as_object_mut() else {
            summary.no_data += 1;
            continue;
        };
        let properties = obj
            .entry("properties")
            .or_insert_with(|| json!({}));
        if !properties.is_object() {
            *properties = json!({});
        }
        let Some(props) = properties.as_object_mut() else {
            continue;
        };

        let record = props
            .get(name_property)
            .and_then(Value::as_str)
            .and_then(|name| snapshot.record(name.trim()));

        match record {
            Some(record) => {
                summary.matched += 1;
                props.insert("fillColor".to_string(), json!(record.risk.color()));
                props.insert("score".to_string(), json!(record.score));
                props.insert("risk".to_string(), json!(record.risk));
            }
            None => {
                summary.no_data += 1;
                props.insert("fillColor".to_string(), json!(NO_DATA_COLOR));
            }
        }
    }

    Ok(summary)
}
