use crate::error::{ConvertError, Result};
use crate::feature::Coord;
use proj4rs::proj::Proj;
use std::fmt;

/// Resolves a CRS identifier to a projection definition.
///
/// Accepts `EPSG:<code>` (case-insensitive prefix) looked up in the bundled
/// EPSG registry, or a raw proj4 string starting with `+proj=`.
pub fn resolve_crs(crs: &str) -> Result<Proj> {
    let invalid = || ConvertError::InvalidCrs {
        crs: crs.to_string(),
    };

    let trimmed = crs.trim();
    let definition = if trimmed.starts_with("+proj=") {
        trimmed
    } else {
        let code = trimmed
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("EPSG:"))
            .and_then(|_| trimmed[5..].parse::<u16>().ok())
            .ok_or_else(invalid)?;
        crs_definitions::from_code(code).ok_or_else(invalid)?.proj4
    };

    Proj::from_proj_string(definition).map_err(|_| invalid())
}

enum Transform {
    Identity,
    Proj { source: Proj, target: Proj },
}

/// Transforms coordinates from a source CRS into a target CRS.
///
/// When both identifiers are equal the transform is the identity and no
/// registry lookup happens, so the converter runs without any projection
/// definitions at all in the common case.
pub struct Reprojector {
    transform: Transform,
}

impl fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.transform {
            Transform::Identity => "identity",
            Transform::Proj { .. } => "proj4",
        };
        f.debug_struct("Reprojector").field("transform", &kind).finish()
    }
}

impl Reprojector {
    pub fn new(source_crs: &str, target_crs: &str) -> Result<Self> {
        let transform = if source_crs == target_crs {
            Transform::Identity
        } else {
            Transform::Proj {
                source: resolve_crs(source_crs)?,
                target: resolve_crs(target_crs)?,
            }
        };
        Ok(Reprojector { transform })
    }

    pub fn identity() -> Self {
        Reprojector {
            transform: Transform::Identity,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.transform, Transform::Identity)
    }

    pub fn reproject(&self, coord: Coord) -> Result<Coord> {
        let (source, target) = match &self.transform {
            Transform::Identity => return Ok(coord),
            Transform::Proj { source, target } => (source, target),
        };

        // proj4rs works in radians for geographic systems
        let mut point = if source.is_latlong() {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        proj4rs::transform::transform(source, target, &mut point).map_err(|e| {
            ConvertError::Projection {
                reason: e.to_string(),
            }
        })?;

        if target.is_latlong() {
            Ok(Coord::new(point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok(Coord::new(point.0, point.1))
        }
    }
}
