use time::OffsetDateTime;

/// A single time-series point: one row of a measurement table.
///
/// Points are keyed by `(measurement, ts, tags)`. Writing the same key twice
/// overwrites the fields, which is what makes monthly re-runs idempotent.
/// Text fields are plain columns and never part of the key.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: &'static str,
    pub ts: OffsetDateTime,
    pub tags: Vec<(&'static str, String)>,
    pub fields: Vec<(&'static str, f64)>,
    pub text_fields: Vec<(&'static str, String)>,
}

impl Point {
    pub fn new(measurement: &'static str, ts: OffsetDateTime) -> Self {
        Self {
            measurement,
            ts,
            tags: Vec::new(),
            fields: Vec::new(),
            text_fields: Vec::new(),
        }
    }

    pub fn tag(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.tags.push((key, value.into()));
        self
    }

    pub fn field(mut self, key: &'static str, value: f64) -> Self {
        self.fields.push((key, value));
        self
    }

    pub fn text(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.text_fields.push((key, value.into()));
        self
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn field_value(&self, key: &str) -> Option<f64> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub fn text_value(&self, key: &str) -> Option<&str> {
        self.text_fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Conversion of a domain record into the point that stores it.
pub trait ToPoint {
    fn to_point(&self) -> Point;
}

impl ToPoint for Point {
    fn to_point(&self) -> Point {
        self.clone()
    }
}
