use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in the coordinate system of the target layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bbox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Bbox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Parses the `minx,miny,maxx,maxy` form used by the `BBOX` query parameter.
    ///
    /// A trailing fifth element (a CRS identifier, as allowed by WFS 1.1) is ignored.
    pub fn parse_query(value: &str) -> Result<Bbox, String> {
        let parts: Vec<&str> = value.split(',').map(str::trim).collect();
        if parts.len() != 4 && parts.len() != 5 {
            return Err(format!("BBOX must have four coordinates, got '{}'", value));
        }

        let mut coords = [0.0; 4];
        for (slot, part) in coords.iter_mut().zip(&parts) {
            *slot = part
                .parse::<f64>()
                .map_err(|_| format!("Invalid BBOX coordinate '{}'", part))?;
        }

        Ok(Bbox::new(coords[0], coords[1], coords[2], coords[3]))
    }

    /// Builds a box from GML `lowerCorner`/`upperCorner` texts ("x y" pairs).
    pub fn from_corners(lower: &str, upper: &str) -> Result<Bbox, String> {
        let (min_x, min_y) = parse_pair(lower)?;
        let (max_x, max_y) = parse_pair(upper)?;
        Ok(Bbox::new(min_x, min_y, max_x, max_y))
    }

    /// True when the two boxes share at least one point (touching edges count).
    pub fn intersects(&self, other: &Bbox) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }
}

impl Display for Bbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{},{}", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

fn parse_pair(text: &str) -> Result<(f64, f64), String> {
    let mut numbers = text.split_whitespace().map(|n| {
        n.parse::<f64>()
            .map_err(|_| format!("Invalid corner coordinate '{}'", n))
    });

    match (numbers.next(), numbers.next(), numbers.next()) {
        (Some(x), Some(y), None) => Ok((x?, y?)),
        _ => Err(format!("Corner must be an 'x y' pair, got '{}'", text.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_bbox() {
        let bbox = Bbox::parse_query("8,44,9,45").unwrap();
        assert_eq!(bbox, Bbox::new(8.0, 44.0, 9.0, 45.0));

        let with_crs = Bbox::parse_query("8, 44, 9, 45,EPSG:4326").unwrap();
        assert_eq!(with_crs, bbox);
    }

    #[test]
    fn test_parse_query_bbox_rejects_garbage() {
        assert!(Bbox::parse_query("8,44,9").is_err());
        assert!(Bbox::parse_query("a,b,c,d").is_err());
    }

    #[test]
    fn test_from_corners_matches_query_form() {
        let corners = Bbox::from_corners(" 8 44 ", "9\t45").unwrap();
        assert_eq!(corners, Bbox::parse_query("8,44,9,45").unwrap());
        assert!(Bbox::from_corners("8", "9 45").is_err());
        assert!(Bbox::from_corners("8 44 1", "9 45").is_err());
    }

    #[test]
    fn test_intersects() {
        let area = Bbox::new(8.0, 44.0, 9.0, 45.0);
        assert!(area.intersects(&Bbox::new(8.5, 44.5, 8.5, 44.5)));
        assert!(area.intersects(&Bbox::new(9.0, 45.0, 10.0, 46.0)));
        assert!(!area.intersects(&Bbox::new(9.1, 44.0, 10.0, 45.0)));
        assert!(!area.intersects(&Bbox::new(0.0, 0.0, 1.0, 1.0)));
    }
}
