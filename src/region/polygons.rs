//! Country polygons read from a GeoJSON feature collection

use crate::errors::{RegionAggError, Result};
use geo::{BoundingRect, Intersects, LineString, MultiPolygon, Point, Polygon, Rect};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// One feature of the polygon dataset
#[derive(Debug, Clone)]
pub struct CountryPolygon {
    /// Value of the code property; `None` if the feature has none
    pub code: Option<String>,
    pub geometry: MultiPolygon<f64>,
    bbox: Option<Rect<f64>>,
}

impl CountryPolygon {
    #[must_use]
    pub fn new(code: Option<String>, geometry: MultiPolygon<f64>) -> Self {
        let bbox = geometry.bounding_rect();
        Self {
            code,
            geometry,
            bbox,
        }
    }

    /// Boundary-inclusive point test with a bounding-box prefilter
    #[must_use]
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        let Some(bbox) = self.bbox else {
            return false;
        };
        let (min, max) = (bbox.min(), bbox.max());
        if lon < min.x || lon > max.x || lat < min.y || lat > max.y {
            return false;
        }
        self.geometry.intersects(&Point::new(lon, lat))
    }
}

/// The polygon dataset consulted by the spatial join
#[derive(Debug, Clone, Default)]
pub struct CountryPolygons {
    features: Vec<CountryPolygon>,
}

impl CountryPolygons {
    #[must_use]
    pub fn new(features: Vec<CountryPolygon>) -> Self {
        Self { features }
    }

    /// Load a GeoJSON feature collection from disk
    ///
    /// # Errors
    ///
    /// Returns [`RegionAggError::PolygonDatasetMissing`] if `path` does not exist,
    /// or a parse error if the file is not a usable feature collection.
    pub fn load(path: &Path, code_field: &str) -> Result<Self> {
        if !path.exists() {
            return Err(RegionAggError::PolygonDatasetMissing {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path)?;
        let polygons = Self::from_geojson_str(&text, code_field)?;
        log::info!(
            "Loaded {} country polygons from {}",
            polygons.len(),
            path.display()
        );
        Ok(polygons)
    }

    /// Parse a GeoJSON feature collection
    ///
    /// Features with point, line or null geometries are skipped. Codes may be
    /// strings or numbers (some datasets store `-99` numerically).
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or a document without a `features` array.
    pub fn from_geojson_str(text: &str, code_field: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(text)?;
        let features = document
            .get("features")
            .and_then(Value::as_array)
            .ok_or_else(|| RegionAggError::PolygonDataset {
                message: "expected a FeatureCollection with a 'features' array".into(),
            })?;

        let mut parsed = Vec::with_capacity(features.len());
        for (i, feature) in features.iter().enumerate() {
            let code = feature
                .get("properties")
                .and_then(|p| p.get(code_field))
                .and_then(code_value);
            let Some(geometry) = feature.get("geometry").filter(|g| !g.is_null()) else {
                log::debug!("Skipping feature {i} without geometry");
                continue;
            };
            match parse_geometry(geometry)? {
                Some(multi) => parsed.push(CountryPolygon::new(code, multi)),
                None => log::debug!("Skipping feature {i} with non-polygonal geometry"),
            }
        }

        Ok(Self { features: parsed })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    #[must_use]
    pub fn features(&self) -> &[CountryPolygon] {
        &self.features
    }

    /// First feature in dataset order covering the point
    #[must_use]
    pub fn locate(&self, lon: f64, lat: f64) -> Option<&CountryPolygon> {
        self.features.iter().find(|f| f.covers(lon, lat))
    }
}

fn code_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_geometry(geometry: &Value) -> Result<Option<MultiPolygon<f64>>> {
    let kind = geometry.get("type").and_then(Value::as_str).unwrap_or_default();
    let coordinates = geometry.get("coordinates");
    match (kind, coordinates) {
        ("Polygon", Some(rings)) => Ok(Some(MultiPolygon::new(vec![parse_polygon(rings)?]))),
        ("MultiPolygon", Some(Value::Array(polygons))) => {
            let polygons = polygons
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(MultiPolygon::new(polygons)))
        }
        ("Polygon" | "MultiPolygon", _) => Err(RegionAggError::PolygonDataset {
            message: format!("{kind} geometry without coordinates"),
        }),
        _ => Ok(None),
    }
}

fn parse_polygon(rings: &Value) -> Result<Polygon<f64>> {
    let rings = rings.as_array().ok_or_else(|| RegionAggError::PolygonDataset {
        message: "polygon coordinates must be an array of rings".into(),
    })?;
    let mut rings = rings.iter().map(parse_ring);
    let exterior = rings.next().transpose()?.unwrap_or_else(|| LineString::new(Vec::new()));
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(ring: &Value) -> Result<LineString<f64>> {
    let positions = ring.as_array().ok_or_else(|| RegionAggError::PolygonDataset {
        message: "ring must be an array of positions".into(),
    })?;
    let coords = positions
        .iter()
        .map(|position| {
            let x = position.get(0).and_then(Value::as_f64);
            let y = position.get(1).and_then(Value::as_f64);
            x.zip(y).ok_or_else(|| RegionAggError::PolygonDataset {
                message: format!("invalid position {position}"),
            })
        })
        .collect::<Result<Vec<(f64, f64)>>>()?;
    Ok(LineString::from(coords))
}
