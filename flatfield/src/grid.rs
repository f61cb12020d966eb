//! Per-pixel arrays as nested JSON lists.
//!
//! Model files store every per-pixel parameter as a list of rows
//! (`[[a, b], [c, d]]`) rather than ndarray's own serde layout, so they stay
//! readable by any tool that understands plain JSON.
//!
//! JSON has no NaN or infinity. Non-finite floats are written as the strings
//! `"NaN"`, `"Infinity"` and `"-Infinity"`; `null` also reads back as NaN.

use ndarray::Array2;
use serde::de::{self, Error as _, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A value that can sit in a stored grid
pub trait Cell: Sized {
    fn serialize_cell<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>;
    fn deserialize_cell<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error>;
}

impl Cell for bool {
    fn serialize_cell<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(*self)
    }

    fn deserialize_cell<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        bool::deserialize(deserializer)
    }
}

impl Cell for f64 {
    fn serialize_cell<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        float::serialize(self, serializer)
    }

    fn deserialize_cell<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        float::deserialize(deserializer)
    }
}

/// A single float that may be non-finite
pub mod float {
    use super::*;

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { "Infinity" } else { "-Infinity" })
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(FloatVisitor)
    }

    struct FloatVisitor;

    impl<'de> Visitor<'de> for FloatVisitor {
        type Value = f64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number, null, \"NaN\", \"Infinity\" or \"-Infinity\"")
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<f64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<f64, E> {
            Ok(value as f64)
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<f64, E> {
            Ok(value as f64)
        }

        fn visit_unit<E: de::Error>(self) -> Result<f64, E> {
            Ok(f64::NAN)
        }

        fn visit_none<E: de::Error>(self) -> Result<f64, E> {
            Ok(f64::NAN)
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<f64, E> {
            match value {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => Err(E::invalid_value(Unexpected::Str(other), &self)),
            }
        }
    }
}

/// Borrowed view that serializes an array as a list of rows
pub struct Rows<'a, T>(pub &'a Array2<T>);

impl<T: Cell> Serialize for Rows<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.outer_iter().map(RowSlice))
    }
}

struct RowSlice<'a, T>(ndarray::ArrayView1<'a, T>);

impl<T: Cell> Serialize for RowSlice<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter().map(CellRef))
    }
}

struct CellRef<'a, T>(&'a T);

impl<T: Cell> Serialize for CellRef<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize_cell(serializer)
    }
}

struct OwnedCell<T>(T);

impl<'de, T: Cell> Deserialize<'de> for OwnedCell<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize_cell(deserializer).map(OwnedCell)
    }
}

fn unwrap_rows<T>(rows: Vec<Vec<OwnedCell<T>>>) -> Vec<Vec<T>> {
    rows.into_iter()
        .map(|row| row.into_iter().map(|cell| cell.0).collect())
        .collect()
}

/// Build a 2-D array from rows, rejecting ragged input
pub fn from_rows<T>(rows: Vec<Vec<T>>) -> Result<Array2<T>, String> {
    let nrows = rows.len();
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some((k, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != ncols) {
        return Err(format!(
            "ragged grid: row {k} has {} values, expected {ncols}",
            row.len()
        ));
    }
    let flat: Vec<T> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((nrows, ncols), flat).map_err(|e| e.to_string())
}

pub fn serialize<S, T>(array: &Array2<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Cell,
{
    Rows(array).serialize(serializer)
}

pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Array2<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Cell,
{
    let rows = Vec::<Vec<OwnedCell<T>>>::deserialize(deserializer)?;
    from_rows(unwrap_rows(rows)).map_err(D::Error::custom)
}

/// Same layout for an optional array (absent or `null` maps to `None`)
pub mod optional {
    use super::*;

    pub fn serialize<S, T>(array: &Option<Array2<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Cell,
    {
        array.as_ref().map(Rows).serialize(serializer)
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Array2<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Cell,
    {
        Option::<Vec<Vec<OwnedCell<T>>>>::deserialize(deserializer)?
            .map(|rows| from_rows(unwrap_rows(rows)))
            .transpose()
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "super")]
        values: Array2<f64>,
        #[serde(default, with = "optional")]
        mask: Option<Array2<bool>>,
    }

    #[test]
    fn test_nested_list_layout() {
        let holder = Holder {
            values: array![[1.0, 2.0], [3.0, 4.5]],
            mask: Some(array![[true, false], [false, false]]),
        };
        let json = serde_json::to_value(&holder).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "values": [[1.0, 2.0], [3.0, 4.5]],
                "mask": [[true, false], [false, false]]
            })
        );
    }

    #[test]
    fn test_missing_optional_grid() {
        let holder: Holder = serde_json::from_str(r#"{"values": [[1.0], [2.0]]}"#).unwrap();
        assert_eq!(holder.values.dim(), (2, 1));
        assert!(holder.mask.is_none());
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result: Result<Holder, _> = serde_json::from_str(r#"{"values": [[1.0, 2.0], [3.0]]}"#);
        let message = result.err().unwrap().to_string();
        assert!(message.contains("ragged"), "{message}");
    }

    #[test]
    fn test_non_finite_values() {
        let holder = Holder {
            values: array![[f64::NAN, 1.5], [f64::INFINITY, f64::NEG_INFINITY]],
            mask: None,
        };
        let json = serde_json::to_value(&holder).unwrap();
        assert_eq!(
            json["values"],
            serde_json::json!([["NaN", 1.5], ["Infinity", "-Infinity"]])
        );

        let back: Holder = serde_json::from_value(json).unwrap();
        assert!(back.values[[0, 0]].is_nan());
        assert_eq!(back.values[[0, 1]], 1.5);
        assert_eq!(back.values[[1, 0]], f64::INFINITY);
        assert_eq!(back.values[[1, 1]], f64::NEG_INFINITY);

        let holder: Holder = serde_json::from_str(r#"{"values": [[null, 2]]}"#).unwrap();
        assert!(holder.values[[0, 0]].is_nan());
        assert_eq!(holder.values[[0, 1]], 2.0);

        let result: Result<Holder, _> = serde_json::from_str(r#"{"values": [["inf"]]}"#);
        assert!(result.is_err());
    }
}
