//! Defensive coordinate parsing.
//!
//! Providers encode points in whatever shape their systems emit. This
//! parser accepts the encodings seen in practice and snaps the result to the
//! integer grid used by the graph builder.

use serde_json::Value;

use crate::domain::Point;

/// Error parsing a coordinate value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordError {
    /// Value is JSON null
    #[error("coordinate is null")]
    Null,

    /// Value has a shape we do not understand
    #[error("unrecognized coordinate shape: {0}")]
    Shape(String),

    /// A component is not a number
    #[error("coordinate component is not a number: {0}")]
    NotANumber(String),

    /// A component is NaN or infinite
    #[error("coordinate component is not finite")]
    NonFinite,
}

/// Parse a point and round it to integer grid coordinates.
///
/// Accepted encodings:
/// - `[x, y]` (components may be numbers or numeric strings)
/// - `{"x": .., "y": ..}`
/// - `"x,y"`, `"x y"`, `"(x, y)"`, `"[x, y]"`, `"POINT(x y)"`
///
/// # Examples
///
/// ```
/// use mobility_engine::catalog::parse_point;
/// use mobility_engine::domain::Point;
/// use serde_json::json;
///
/// assert_eq!(parse_point(&json!([1.6, 2])).unwrap(), Point::new(2.0, 2.0));
/// assert_eq!(parse_point(&json!("(3, 4)")).unwrap(), Point::new(3.0, 4.0));
/// assert!(parse_point(&json!("nowhere")).is_err());
/// ```
pub fn parse_point(value: &Value) -> Result<Point, CoordError> {
    let (x, y) = match value {
        Value::Null => return Err(CoordError::Null),
        Value::Array(items) => match items.as_slice() {
            [x, y] => (component(x)?, component(y)?),
            _ => return Err(CoordError::Shape(format!("array of {}", items.len()))),
        },
        Value::Object(map) => match (map.get("x"), map.get("y")) {
            (Some(x), Some(y)) => (component(x)?, component(y)?),
            _ => return Err(CoordError::Shape("object without x/y".into())),
        },
        Value::String(s) => parse_str(s)?,
        other => return Err(CoordError::Shape(other.to_string())),
    };

    if !x.is_finite() || !y.is_finite() {
        return Err(CoordError::NonFinite);
    }

    Ok(Point::new(x, y).rounded())
}

fn component(value: &Value) -> Result<f64, CoordError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| CoordError::NotANumber(n.to_string())),
        Value::String(s) => number(s),
        other => Err(CoordError::NotANumber(other.to_string())),
    }
}

fn number(s: &str) -> Result<f64, CoordError> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| CoordError::NotANumber(s.to_string()))
}

fn parse_str(raw: &str) -> Result<(f64, f64), CoordError> {
    let mut s = raw.trim();
    if s.get(..5).is_some_and(|prefix| prefix.eq_ignore_ascii_case("point")) {
        s = s[5..].trim_start();
    }
    let s = s
        .trim_start_matches(['(', '['])
        .trim_end_matches([')', ']'])
        .trim();

    let parts: Vec<&str> = s
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();

    match parts.as_slice() {
        [x, y] => Ok((number(x)?, number(y)?)),
        _ => Err(CoordError::Shape(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(x: f64, y: f64) -> Point {
        Point::new(x, y)
    }

    #[test]
    fn array_forms() {
        assert_eq!(parse_point(&json!([1, 2])).unwrap(), p(1.0, 2.0));
        assert_eq!(parse_point(&json!([1.4, -2.6])).unwrap(), p(1.0, -3.0));
        assert_eq!(parse_point(&json!(["5", " 6 "])).unwrap(), p(5.0, 6.0));
    }

    #[test]
    fn object_form() {
        assert_eq!(parse_point(&json!({"x": 3, "y": 4.2})).unwrap(), p(3.0, 4.0));
        assert!(matches!(
            parse_point(&json!({"lat": 1, "lon": 2})),
            Err(CoordError::Shape(_))
        ));
    }

    #[test]
    fn string_forms() {
        assert_eq!(parse_point(&json!("1,2")).unwrap(), p(1.0, 2.0));
        assert_eq!(parse_point(&json!("(1, 2)")).unwrap(), p(1.0, 2.0));
        assert_eq!(parse_point(&json!("[1.2, 2.7]")).unwrap(), p(1.0, 3.0));
        assert_eq!(parse_point(&json!("1 2")).unwrap(), p(1.0, 2.0));
        assert_eq!(parse_point(&json!("POINT(7 8)")).unwrap(), p(7.0, 8.0));
        assert_eq!(parse_point(&json!("point (7, 8)")).unwrap(), p(7.0, 8.0));
    }

    #[test]
    fn rejects_wrong_arity() {
        assert!(matches!(
            parse_point(&json!([1, 2, 3])),
            Err(CoordError::Shape(_))
        ));
        assert!(matches!(parse_point(&json!("1")), Err(CoordError::Shape(_))));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_point(&json!(null)), Err(CoordError::Null));
        assert!(matches!(
            parse_point(&json!(["a", 1])),
            Err(CoordError::NotANumber(_))
        ));
        assert!(matches!(parse_point(&json!(true)), Err(CoordError::Shape(_))));
        assert!(matches!(
            parse_point(&json!([true, 1])),
            Err(CoordError::NotANumber(_))
        ));
    }

    #[test]
    fn rejects_non_finite_strings() {
        assert_eq!(parse_point(&json!("inf, 1")), Err(CoordError::NonFinite));
        assert_eq!(parse_point(&json!(["NaN", 1])), Err(CoordError::NonFinite));
    }
}
