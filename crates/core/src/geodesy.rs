//! Spherical geometry on the unit sphere.
//!
//! Coordinates follow the GeoJSON convention: `x` is longitude and `y` is
//! latitude, both in degrees. Distances are great-circle angles in degrees,
//! which is the scale every covariance model in geokrig is expressed in.

/// Longitude/latitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Longitude in degrees
    pub x: f64,
    /// Latitude in degrees
    pub y: f64,
}

impl GeoPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn unit_vector(&self) -> UnitVector {
        UnitVector::from_lonlat(self.x, self.y)
    }

    /// Great-circle angle to another point, in degrees.
    pub fn arc_distance(&self, other: &GeoPoint) -> f64 {
        self.unit_vector().arc_distance(&other.unit_vector())
    }
}

/// A point on the unit sphere in Cartesian coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl UnitVector {
    pub fn from_lonlat(lon_deg: f64, lat_deg: f64) -> Self {
        let lat = lat_deg.to_radians();
        let lon = lon_deg.to_radians();
        Self {
            x: lat.cos() * lon.cos(),
            y: lat.cos() * lon.sin(),
            z: lat.sin(),
        }
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Straight-line (chord) distance through the sphere.
    pub fn chord(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Great-circle angle in degrees.
    ///
    /// Computed from the chord rather than `acos(dot)` so that nearby
    /// points keep full precision.
    pub fn arc_distance(&self, other: &Self) -> f64 {
        chord_to_arc(self.chord(other))
    }
}

/// Convert a unit-sphere chord length to the great-circle angle in degrees.
#[inline]
pub fn chord_to_arc(chord: f64) -> f64 {
    (2.0 * (0.5 * chord).clamp(0.0, 1.0).asin()).to_degrees()
}

/// Yadrenko transform: the chordal distance corresponding to a great-circle
/// angle, expressed in degree units so that it matches the angle for small
/// separations.
#[inline]
pub fn arc_to_chordal_degrees(arc_deg: f64) -> f64 {
    (2.0 * (0.5 * arc_deg.to_radians()).sin()).to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_quarter_circle() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(90.0, 0.0);
        assert_relative_eq!(a.arc_distance(&b), 90.0, epsilon = 1e-10);

        let pole = GeoPoint::new(45.0, 90.0);
        assert_relative_eq!(a.arc_distance(&pole), 90.0, epsilon = 1e-10);
    }

    #[test]
    fn test_one_degree_along_meridian() {
        let a = GeoPoint::new(-100.0, 35.0);
        let b = GeoPoint::new(-100.0, 36.0);
        assert_relative_eq!(a.arc_distance(&b), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_longitude_shrinks_with_latitude() {
        let eq = GeoPoint::new(0.0, 0.0).arc_distance(&GeoPoint::new(1.0, 0.0));
        let north = GeoPoint::new(0.0, 60.0).arc_distance(&GeoPoint::new(1.0, 60.0));
        assert!(north < eq);
        assert_relative_eq!(north, 0.5, epsilon = 1e-3);
    }

    #[test]
    fn test_identical_points() {
        let a = GeoPoint::new(12.5, -33.0);
        assert_eq!(a.arc_distance(&a), 0.0);
    }

    #[test]
    fn test_chordal_transform() {
        // Small angles are nearly unchanged
        assert_relative_eq!(arc_to_chordal_degrees(0.1), 0.1, epsilon = 1e-6);
        // Antipodal points: chord = 2 radians
        assert_relative_eq!(arc_to_chordal_degrees(180.0), 2.0_f64.to_degrees(), epsilon = 1e-10);
        // Chord never exceeds the arc
        for arc in [1.0, 10.0, 45.0, 120.0] {
            assert!(arc_to_chordal_degrees(arc) <= arc);
        }
    }
}
