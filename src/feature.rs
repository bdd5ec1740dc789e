use crate::error::ConvertError;
use geojson::{JsonObject, JsonValue, Position};
use log::debug;

/// Ordered key/value tags. Keys are unique because they come from a JSON object.
pub type Tags = Vec<(String, String)>;

/// A planar coordinate in the run's source CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Coord { x, y }
    }
}

/// Geometry kinds the converter knows how to map.
///
/// Anything else is carried as `Other` with its GeoJSON type name so the
/// mapper can skip it explicitly.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    LineString(Vec<Coord>),
    /// Outer ring only.
    Polygon(Vec<Coord>),
    /// Outer ring of every member polygon.
    MultiPolygon(Vec<Vec<Coord>>),
    Other(String),
}

impl Geometry {
    pub fn kind(&self) -> &str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::Other(kind) => kind,
        }
    }

    /// Convert a parsed GeoJSON geometry, keeping only the rings we map.
    pub fn from_geojson(geometry: geojson::Geometry) -> Result<Self, String> {
        use geojson::Value;

        let converted = match geometry.value {
            Value::Point(position) => Geometry::Point(coord(&position)?),
            Value::LineString(line) => Geometry::LineString(coords(&line)?),
            Value::Polygon(rings) => {
                if rings.len() > 1 {
                    debug!("Dropping {} interior ring(s) of Polygon", rings.len() - 1);
                }
                match rings.first() {
                    Some(outer) => Geometry::Polygon(coords(outer)?),
                    None => Geometry::Polygon(Vec::new()),
                }
            }
            Value::MultiPolygon(polygons) => {
                let mut outers = Vec::with_capacity(polygons.len());
                for rings in &polygons {
                    if rings.len() > 1 {
                        debug!(
                            "Dropping {} interior ring(s) of MultiPolygon member",
                            rings.len() - 1
                        );
                    }
                    if let Some(outer) = rings.first() {
                        outers.push(coords(outer)?);
                    }
                }
                Geometry::MultiPolygon(outers)
            }
            Value::MultiPoint(_) => Geometry::Other("MultiPoint".to_string()),
            Value::MultiLineString(_) => Geometry::Other("MultiLineString".to_string()),
            Value::GeometryCollection(_) => Geometry::Other("GeometryCollection".to_string()),
        };
        Ok(converted)
    }
}

fn coord(position: &Position) -> Result<Coord, String> {
    match position.as_slice() {
        [x, y, ..] => Ok(Coord::new(*x, *y)),
        _ => Err(format!(
            "position needs at least two values, got {}",
            position.len()
        )),
    }
}

fn coords(positions: &[Position]) -> Result<Vec<Coord>, String> {
    positions.iter().map(coord).collect()
}

/// One geometry plus its stringified properties, the unit of conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry,
    pub tags: Tags,
}

impl Feature {
    pub fn new(geometry: Geometry, tags: Tags) -> Self {
        Feature { geometry, tags }
    }

    /// Wrap a bare geometry into a feature without tags.
    pub fn untagged(geometry: Geometry) -> Self {
        Feature::new(geometry, Tags::new())
    }

    pub fn from_geojson(feature: geojson::Feature) -> Result<Self, String> {
        let geometry = match feature.geometry {
            Some(geometry) => Geometry::from_geojson(geometry)?,
            None => Geometry::Other("null".to_string()),
        };
        let tags = feature.properties.map(tags_from_properties).unwrap_or_default();
        Ok(Feature::new(geometry, tags))
    }

    /// Parse a single JSON object holding a GeoJSON `Feature`.
    ///
    /// `line` is only used for error reporting.
    pub fn from_json_value(value: JsonValue, line: usize) -> Result<Self, ConvertError> {
        Feature::parse_value(value).map_err(|reason| ConvertError::MalformedRecord { line, reason })
    }

    /// Like [`Feature::from_json_value`] but leaves error classification to the caller.
    pub fn parse_value(value: JsonValue) -> Result<Self, String> {
        let parsed = geojson::Feature::from_json_value(value).map_err(|e| e.to_string())?;
        Feature::from_geojson(parsed)
    }

    /// Parse one line of text holding a GeoJSON `Feature` object.
    pub fn from_json_str(text: &str, line: usize) -> Result<Self, ConvertError> {
        let value: JsonValue =
            serde_json::from_str(text).map_err(|e| ConvertError::MalformedRecord {
                line,
                reason: e.to_string(),
            })?;
        Feature::from_json_value(value, line)
    }
}

/// Coerce every property value to text, keeping property order.
pub fn tags_from_properties(properties: JsonObject) -> Tags {
    properties
        .into_iter()
        .map(|(key, value)| (key, tag_value(value)))
        .collect()
}

fn tag_value(value: JsonValue) -> String {
    match value {
        JsonValue::String(text) => text,
        JsonValue::Number(number) => number_text(&number),
        other => other.to_string(),
    }
}

/// Whole floats print without a fraction, so ogr2ogr's `123.0` becomes
/// `123` like any other integer.
fn number_text(number: &serde_json::Number) -> String {
    match number.as_f64() {
        Some(value) if number.is_f64() && value == 0.0 => "0".to_string(),
        Some(value) if number.is_f64() && value.fract() == 0.0 && value.abs() < 1e21 => {
            format!("{:.0}", value)
        }
        _ => number.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_properties_keep_order_and_become_text() {
        let value = json!({
            "type": "Feature",
            "properties": {"zeta": "last?", "alpha": 3, "flag": true, "none": null, "list": [1, 2]},
            "geometry": {"type": "Point", "coordinates": [1.5, 2.5]}
        });
        let feature = Feature::from_json_value(value, 1).unwrap();

        assert_eq!(feature.geometry, Geometry::Point(Coord::new(1.5, 2.5)));
        assert_eq!(
            feature.tags,
            vec![
                ("zeta".to_string(), "last?".to_string()),
                ("alpha".to_string(), "3".to_string()),
                ("flag".to_string(), "true".to_string()),
                ("none".to_string(), "null".to_string()),
                ("list".to_string(), "[1,2]".to_string()),
            ]
        );
    }

    #[test]
    fn test_whole_floats_lose_their_fraction() {
        let value = json!({
            "type": "Feature",
            "properties": {"area": 123.0, "h": 1e3, "ratio": 0.25, "neg": -0.0, "count": 7},
            "geometry": {"type": "Point", "coordinates": [0, 0]}
        });
        let feature = Feature::from_json_value(value, 1).unwrap();

        assert_eq!(
            feature.tags,
            vec![
                ("area".to_string(), "123".to_string()),
                ("h".to_string(), "1000".to_string()),
                ("ratio".to_string(), "0.25".to_string()),
                ("neg".to_string(), "0".to_string()),
                ("count".to_string(), "7".to_string()),
            ]
        );
    }

    #[test]
    fn test_ogr_real_field_from_text() {
        let feature = Feature::from_json_str(
            r#"{"type":"Feature","properties":{"area":123.0,"h":1e3},"geometry":{"type":"Point","coordinates":[1,2]}}"#,
            1,
        )
        .unwrap();
        assert_eq!(
            feature.tags,
            vec![
                ("area".to_string(), "123".to_string()),
                ("h".to_string(), "1000".to_string()),
            ]
        );
    }

    #[test]
    fn test_polygon_keeps_outer_ring_only() {
        let value = json!({
            "type": "Feature",
            "properties": null,
            "geometry": {"type": "Polygon", "coordinates": [
                [[0, 0], [4, 0], [4, 4], [0, 0]],
                [[1, 1], [2, 1], [2, 2], [1, 1]]
            ]}
        });
        let feature = Feature::from_json_value(value, 7).unwrap();

        match feature.geometry {
            Geometry::Polygon(ring) => {
                assert_eq!(ring.len(), 4);
                assert_eq!(ring[1], Coord::new(4.0, 0.0));
            }
            other => panic!("expected polygon, got {:?}", other),
        }
        assert!(feature.tags.is_empty());
    }

    #[test]
    fn test_unsupported_kinds_are_other() {
        let value = json!({
            "type": "Feature",
            "properties": {},
            "geometry": {"type": "GeometryCollection", "geometries": []}
        });
        let feature = Feature::from_json_value(value, 1).unwrap();
        assert_eq!(feature.geometry.kind(), "GeometryCollection");

        let value = json!({"type": "Feature", "properties": {}, "geometry": null});
        let feature = Feature::from_json_value(value, 1).unwrap();
        assert_eq!(feature.geometry, Geometry::Other("null".to_string()));
    }

    #[test]
    fn test_short_position_is_malformed() {
        let err = Feature::from_json_str(
            r#"{"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[1]}}"#,
            12,
        )
        .unwrap_err();
        assert!(matches!(err, ConvertError::MalformedRecord { line: 12, .. }));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = Feature::from_json_str(r#"{"type":"Feature","#, 3).unwrap_err();
        assert!(matches!(err, ConvertError::MalformedRecord { line: 3, .. }));
    }
}
