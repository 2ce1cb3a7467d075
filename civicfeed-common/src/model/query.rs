use crate::{
    geo::GeoPoint,
    model::{
        post::{Category, Status},
        validation::ValidationError,
    },
};
use std::str::FromStr;

pub const DEFAULT_NEAR_RADIUS_METERS: f64 = 5000.0;
pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Proximity filter, written `lat,lng[,radius]` on the wire.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct NearQuery {
    pub point: GeoPoint,
    pub radius_meters: f64,
}

impl NearQuery {
    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        self.point.distance_meters(point) <= self.radius_meters
    }
}

impl FromStr for NearQuery {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidNear(s.to_owned());

        let parts = s
            .split(',')
            .map(|part| part.trim().parse::<f64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        let (latitude, longitude, radius_meters) = match parts[..] {
            [latitude, longitude] => (latitude, longitude, DEFAULT_NEAR_RADIUS_METERS),
            [latitude, longitude, radius] => (latitude, longitude, radius),
            _ => return Err(invalid()),
        };

        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(invalid());
        }

        Ok(Self {
            point: GeoPoint::new(longitude, latitude)?,
            radius_meters,
        })
    }
}

#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct PostFilter {
    pub category: Option<Category>,
    pub status: Option<Status>,
    pub near: Option<NearQuery>,
}

/// One-indexed page of results.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Pagination {
    limit: u32,
    page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            page: 1,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, page: Option<u32>) -> Result<Self, ValidationError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(ValidationError::OutOfRange {
                field: "limit",
                value: limit,
                max: MAX_PAGE_LIMIT,
            });
        }

        let page = page.unwrap_or(1);
        if page == 0 {
            return Err(ValidationError::OutOfRange {
                field: "page",
                value: page,
                max: u32::MAX,
            });
        }

        Ok(Self { limit, page })
    }

    #[must_use]
    pub fn limit(self) -> u32 {
        self.limit
    }

    /// Number of results skipped before this page.
    #[must_use]
    pub fn offset(self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        geo::GeoPoint,
        model::{
            query::{DEFAULT_NEAR_RADIUS_METERS, NearQuery, Pagination},
            validation::ValidationError,
        },
    };

    #[test]
    fn near_defaults_radius() {
        let near: NearQuery = "40.0,-75.0".parse().unwrap();
        assert!((near.point.latitude() - 40.0).abs() < f64::EPSILON);
        assert!((near.point.longitude() + 75.0).abs() < f64::EPSILON);
        assert!((near.radius_meters - DEFAULT_NEAR_RADIUS_METERS).abs() < f64::EPSILON);

        let near: NearQuery = " 40.0 , -75.0 , 1000 ".parse().unwrap();
        assert!((near.radius_meters - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn near_contains_points_within_radius() {
        let near: NearQuery = "40.0,-75.0,1000".parse().unwrap();

        assert!(near.contains(GeoPoint::new(-75.0, 40.0).unwrap()));
        assert!(near.contains(GeoPoint::new(-75.0, 40.008).unwrap()));
        assert!(!near.contains(GeoPoint::new(-75.0, 40.01).unwrap()));
        assert!(!near.contains(GeoPoint::new(-75.0, 41.0).unwrap()));
    }

    #[test]
    fn malformed_near_is_rejected() {
        for bad in ["", "40.0", "40,-75,1,2", "a,b", "40,-75,-5", "40,-75,0", "40,-75,inf"] {
            assert_eq!(
                bad.parse::<NearQuery>(),
                Err(ValidationError::InvalidNear(bad.to_owned())),
                "{bad}"
            );
        }
        assert!(matches!(
            "95,-75".parse::<NearQuery>(),
            Err(ValidationError::Coordinates(_))
        ));
    }

    #[test]
    fn pagination_skips_whole_pages() {
        assert_eq!(Pagination::default().offset(), 0);
        assert_eq!(Pagination::new(None, None).unwrap(), Pagination::default());

        let third = Pagination::new(Some(10), Some(3)).unwrap();
        assert_eq!(third.limit(), 10);
        assert_eq!(third.offset(), 20);
    }

    #[test]
    fn pagination_bounds() {
        assert!(Pagination::new(Some(0), None).is_err());
        assert!(Pagination::new(Some(101), None).is_err());
        assert!(Pagination::new(Some(100), None).is_ok());
        assert!(Pagination::new(None, Some(0)).is_err());
    }
}
