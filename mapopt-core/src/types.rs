//! Feature model shared by the culling and sampling stages
//!
//! Features follow the GeoJSON layout (`geometry` + `properties`) but with a
//! closed geometry enum and a typed property record. Geometry that cannot be
//! interpreted is represented as `None` so the culler can drop it without
//! failing the whole collection.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// A longitude/latitude pair in degrees, with the altitude when the source had one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lng: f64,
    pub lat: f64,
    pub alt: Option<f64>,
}

impl Position {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat, alt: None }
    }

    pub fn with_alt(mut self, alt: f64) -> Self {
        self.alt = Some(alt);
        self
    }

    fn from_value(value: &Value) -> Option<Self> {
        let coords = value.as_array()?;
        let lng = coords.first()?.as_f64()?;
        let lat = coords.get(1)?.as_f64()?;
        if !lng.is_finite() || !lat.is_finite() {
            return None;
        }
        let alt = coords.get(2).and_then(Value::as_f64);
        Some(Self { lng, lat, alt })
    }

    fn to_value(self) -> Value {
        match self.alt {
            Some(alt) => Value::from(vec![self.lng, self.lat, alt]),
            None => Value::from(vec![self.lng, self.lat]),
        }
    }
}

/// Geometry kinds understood by the culler
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    /// Rings of the polygon; the first ring is the outer boundary
    Polygon(Vec<Vec<Position>>),
    /// Any other GeoJSON geometry type; `raw` is the whole geometry object,
    /// written back out unchanged
    Unknown { kind: String, raw: Value },
}

impl Geometry {
    pub fn kind(&self) -> &str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::Unknown { kind, .. } => kind,
        }
    }

    /// Number of positions stored in the geometry
    pub fn vertex_count(&self) -> usize {
        match self {
            Geometry::Point(_) => 1,
            Geometry::LineString(line) => line.len(),
            Geometry::Polygon(rings) => rings.iter().map(Vec::len).sum(),
            Geometry::Unknown { .. } => 0,
        }
    }

    /// `None` for anything that is not a geometry object with a string `type`
    fn from_value(value: Value) -> Option<Self> {
        let kind = value.get("type")?.as_str()?.to_string();
        let coordinates = value.get("coordinates").unwrap_or(&Value::Null);
        match kind.as_str() {
            "Point" => Position::from_value(coordinates).map(Geometry::Point),
            "LineString" => Some(Geometry::LineString(positions(coordinates))),
            "Polygon" => {
                let rings = coordinates
                    .as_array()
                    .map(|rings| rings.iter().map(positions).collect())
                    .unwrap_or_default();
                Some(Geometry::Polygon(rings))
            }
            _ => Some(Geometry::Unknown { kind, raw: value }),
        }
    }

    fn to_value(&self) -> Value {
        let coordinates = match self {
            Geometry::Point(p) => p.to_value(),
            Geometry::LineString(line) => Value::Array(line.iter().map(|p| p.to_value()).collect()),
            Geometry::Polygon(rings) => Value::Array(
                rings
                    .iter()
                    .map(|ring| Value::Array(ring.iter().map(|p| p.to_value()).collect()))
                    .collect(),
            ),
            Geometry::Unknown { raw, .. } => return raw.clone(),
        };
        json!({ "type": self.kind(), "coordinates": coordinates })
    }
}

/// Malformed vertices are skipped rather than failing the geometry
fn positions(value: &Value) -> Vec<Position> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Position::from_value).collect())
        .unwrap_or_default()
}

/// Attributes used by priority scoring; everything else lands in `extra`.
///
/// A scored key holding an unexpected JSON type (`"type": 3`) is kept in
/// `extra` so it still round-trips, and does not count towards the score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct FeatureProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Value> for FeatureProperties {
    fn from(value: Value) -> Self {
        let Value::Object(mut extra) = value else {
            return Self::default();
        };

        let mut take_string = |key: &str| match extra.remove(key) {
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                extra.insert(key.to_string(), other);
                None
            }
            None => None,
        };
        let status = take_string("status");
        let kind = take_string("type");
        let importance = take_string("importance");

        let active = match extra.remove("active") {
            Some(Value::Bool(b)) => Some(b),
            Some(other) => {
                extra.insert("active".to_string(), other);
                None
            }
            None => None,
        };

        Self {
            status,
            kind,
            importance,
            active,
            extra,
        }
    }
}

/// A single map feature as handed to the optimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFeature", into = "RawFeature")]
pub struct Feature {
    pub id: Option<Value>,
    /// `None` when the source had no geometry or its coordinates were unusable
    pub geometry: Option<Geometry>,
    pub properties: FeatureProperties,
}

impl Feature {
    pub fn new(geometry: Option<Geometry>) -> Self {
        Self {
            id: None,
            geometry,
            properties: FeatureProperties::default(),
        }
    }

    pub fn point(lng: f64, lat: f64) -> Self {
        Self::new(Some(Geometry::Point(Position::new(lng, lat))))
    }

    pub fn line_string(vertices: &[(f64, f64)]) -> Self {
        let line = vertices.iter().map(|&(lng, lat)| Position::new(lng, lat)).collect();
        Self::new(Some(Geometry::LineString(line)))
    }

    pub fn polygon(outer_ring: &[(f64, f64)]) -> Self {
        let ring = outer_ring.iter().map(|&(lng, lat)| Position::new(lng, lat)).collect();
        Self::new(Some(Geometry::Polygon(vec![ring])))
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.properties.status = Some(status.to_string());
        self
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.properties.kind = Some(kind.to_string());
        self
    }

    pub fn with_importance(mut self, importance: &str) -> Self {
        self.properties.importance = Some(importance.to_string());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.properties.active = Some(active);
        self
    }

    /// Rough in-memory footprint used for memory accounting
    pub fn estimated_bytes(&self) -> usize {
        const BASE: usize = 64;
        const PER_POSITION: usize = 16;
        const PER_EXTRA: usize = 32;

        let geometry = self
            .geometry
            .as_ref()
            .map(|g| g.vertex_count() * PER_POSITION)
            .unwrap_or(0);
        let props = &self.properties;
        let strings = [&props.status, &props.kind, &props.importance]
            .iter()
            .filter_map(|s| s.as_ref().map(String::len))
            .sum::<usize>();
        let extra = props
            .extra
            .keys()
            .map(|key| key.len() + PER_EXTRA)
            .sum::<usize>();

        BASE + geometry + strings + extra
    }
}

/// Wire form of a feature. Geometry stays a loose `Value` so one bad
/// geometry culls its feature instead of failing the collection.
#[derive(Serialize, Deserialize)]
struct RawFeature {
    #[serde(rename = "type", default = "feature_tag")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    #[serde(default)]
    geometry: Option<Value>,
    #[serde(default)]
    properties: Option<FeatureProperties>,
}

fn feature_tag() -> String {
    "Feature".to_string()
}

impl From<RawFeature> for Feature {
    fn from(raw: RawFeature) -> Self {
        Self {
            id: raw.id,
            geometry: raw.geometry.and_then(Geometry::from_value),
            properties: raw.properties.unwrap_or_default(),
        }
    }
}

impl From<Feature> for RawFeature {
    fn from(feature: Feature) -> Self {
        Self {
            kind: feature_tag(),
            id: feature.id,
            geometry: feature.geometry.as_ref().map(Geometry::to_value),
            properties: Some(feature.properties),
        }
    }
}

/// A GeoJSON `FeatureCollection`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "collection_tag")]
    kind: String,
    pub features: Vec<Feature>,
}

fn collection_tag() -> String {
    "FeatureCollection".to_string()
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: collection_tag(),
            features,
        }
    }

    /// Parse either a `FeatureCollection` or a bare array of features
    pub fn from_json(input: &str) -> CoreResult<Self> {
        let value: Value = serde_json::from_str(input)?;
        if value.is_array() {
            return Ok(Self::new(serde_json::from_value(value)?));
        }
        if !value.is_object() {
            return Err(CoreError::UnsupportedDocument("expected an object or array".into()));
        }

        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        match kind.as_deref() {
            Some("FeatureCollection") | None => Ok(serde_json::from_value(value)?),
            Some("Feature") => Ok(Self::new(vec![serde_json::from_value(value)?])),
            Some(other) => Err(CoreError::UnsupportedDocument(other.to_string())),
        }
    }

    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Viewport bounds in degrees. Antimeridian wraparound is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> CoreResult<Self> {
        let finite = [north, south, east, west].iter().all(|v| v.is_finite());
        if !finite || north < south || east < west {
            return Err(CoreError::InvalidBounds { north, south, east, west });
        }
        Ok(Self { north, south, east, west })
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn center(&self) -> Position {
        Position::new((self.east + self.west) / 2.0, (self.north + self.south) / 2.0)
    }

    /// Grow every side by `ratio` times the span on that axis
    pub fn expanded(&self, ratio: f64) -> Self {
        let lat_pad = self.height() * ratio;
        let lng_pad = self.width() * ratio;
        Self {
            north: self.north + lat_pad,
            south: self.south - lat_pad,
            east: self.east + lng_pad,
            west: self.west - lng_pad,
        }
    }

    /// Inclusive on all edges
    pub fn contains(&self, p: &Position) -> bool {
        p.lat >= self.south && p.lat <= self.north && p.lng >= self.west && p.lng <= self.east
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.north, self.south, self.east, self.west)
    }
}

impl FromStr for BoundingBox {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| CoreError::BoundsFormat { input: s.to_string() })?;

        match parts.as_slice() {
            [north, south, east, west] => Self::new(*north, *south, *east, *west),
            _ => Err(CoreError::BoundsFormat { input: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_validation() {
        assert!(BoundingBox::new(10.0, 0.0, 10.0, 0.0).is_ok());
        assert!(BoundingBox::new(0.0, 10.0, 10.0, 0.0).is_err());
        assert!(BoundingBox::new(10.0, 0.0, 0.0, 10.0).is_err());
        assert!(BoundingBox::new(f64::NAN, 0.0, 10.0, 0.0).is_err());
    }

    #[test]
    fn test_bounds_expansion() {
        let bounds = BoundingBox::new(10.0, 0.0, 20.0, 0.0).unwrap();
        let grown = bounds.expanded(0.1);
        assert_eq!(grown.north, 11.0);
        assert_eq!(grown.south, -1.0);
        assert_eq!(grown.east, 22.0);
        assert_eq!(grown.west, -2.0);
    }

    #[test]
    fn test_bounds_parse() {
        let bounds: BoundingBox = "51.6, 51.4, 0.1, -0.3".parse().unwrap();
        assert_eq!(bounds.north, 51.6);
        assert_eq!(bounds.west, -0.3);
        assert!("1,2,3".parse::<BoundingBox>().is_err());
        assert!("a,b,c,d".parse::<BoundingBox>().is_err());
    }

    #[test]
    fn test_geojson_feature_parsing() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "id": 7,
                 "geometry": {"type": "Point", "coordinates": [-0.12, 51.5]},
                 "properties": {"status": "red", "type": "CCTV", "active": true, "name": "cam-7"}},
                {"type": "Feature",
                 "geometry": {"type": "MultiPoint", "coordinates": [[0, 0], [1, 1]]},
                 "properties": null},
                {"type": "Feature",
                 "geometry": {"type": "Point", "coordinates": "broken"},
                 "properties": {"active": "yes"}}
            ]
        }"#;

        let collection = FeatureCollection::from_json(json).unwrap();
        assert_eq!(collection.len(), 3);

        let cam = &collection.features[0];
        assert_eq!(cam.geometry, Some(Geometry::Point(Position::new(-0.12, 51.5))));
        assert_eq!(cam.properties.status.as_deref(), Some("red"));
        assert_eq!(cam.properties.kind.as_deref(), Some("CCTV"));
        assert_eq!(cam.properties.active, Some(true));
        assert_eq!(cam.properties.extra.get("name"), Some(&Value::from("cam-7")));

        assert!(matches!(
            collection.features[1].geometry,
            Some(Geometry::Unknown { ref kind, .. }) if kind == "MultiPoint"
        ));

        assert_eq!(collection.features[2].geometry, None);
        assert_eq!(collection.features[2].properties.active, None);
    }

    #[test]
    fn test_feature_serializes_as_geojson() {
        let feature = Feature::point(1.5, 2.5).with_id("a").with_status("orange");
        let value = serde_json::to_value(&feature).unwrap();
        assert_eq!(value["type"], "Feature");
        assert_eq!(value["geometry"]["type"], "Point");
        assert_eq!(value["geometry"]["coordinates"], serde_json::json!([1.5, 2.5]));
        assert_eq!(value["properties"]["status"], "orange");
        assert!(value["properties"].get("importance").is_none());
    }

    #[test]
    fn test_malformed_geometry_is_culled_not_fatal() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0.5, 0.5]}, "properties": {}},
                {"type": "Feature", "geometry": {"coordinates": [0.5, 0.5]}, "properties": {}},
                {"type": "Feature", "geometry": "garbage", "properties": {}},
                {"type": "Feature", "geometry": 42, "properties": "not-an-object"},
                {"type": "Feature", "geometry": {"type": 7, "coordinates": [0.5, 0.5]}}
            ]
        }"#;

        let collection = FeatureCollection::from_json(json).unwrap();
        assert_eq!(collection.len(), 5);
        assert_eq!(collection.features[0].geometry, Some(Geometry::Point(Position::new(0.5, 0.5))));
        for feature in &collection.features[1..] {
            assert_eq!(feature.geometry, None);
        }
        assert_eq!(collection.features[3].properties, FeatureProperties::default());

        let bounds = BoundingBox::new(1.0, 0.0, 1.0, 0.0).unwrap();
        let visible = collection
            .features
            .iter()
            .filter(|f| crate::cull::is_visible(f, &bounds))
            .count();
        assert_eq!(visible, 1);
    }

    #[test]
    fn test_geojson_round_trip_keeps_source_data() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature",
                 "geometry": {"type": "Point", "coordinates": [0.5, 0.5, 120.0]},
                 "properties": {"type": 3, "active": "yes", "status": "red"}},
                {"type": "Feature",
                 "geometry": {"type": "GeometryCollection", "geometries": [
                     {"type": "Point", "coordinates": [1.0, 2.0]}
                 ]},
                 "properties": {}}
            ]
        }"#;

        let collection = FeatureCollection::from_json(json).unwrap();
        let point = &collection.features[0];
        assert_eq!(point.geometry, Some(Geometry::Point(Position::new(0.5, 0.5).with_alt(120.0))));
        assert_eq!(point.properties.kind, None);
        assert_eq!(point.properties.active, None);
        assert_eq!(point.properties.status.as_deref(), Some("red"));

        let written: Value = serde_json::from_str(&collection.to_json().unwrap()).unwrap();
        let original: Value = serde_json::from_str(json).unwrap();
        assert_eq!(written["features"][0]["geometry"]["coordinates"], serde_json::json!([0.5, 0.5, 120.0]));
        assert_eq!(written["features"][0]["properties"], original["features"][0]["properties"]);
        assert_eq!(written["features"][1]["geometry"], original["features"][1]["geometry"]);
    }

    #[test]
    fn test_estimated_bytes_grows_with_vertices() {
        let point = Feature::point(0.0, 0.0);
        let line = Feature::line_string(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        assert!(line.estimated_bytes() > point.estimated_bytes());
    }
}
