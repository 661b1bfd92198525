// Data structures shared by the filter engine, the inventory loader and the API.

use serde::{Deserialize, Deserializer, Serialize};

// A single stock vehicle. Every field is optional: inventory feeds are patchy and
// the filter engine treats a missing field as "cannot exclude".
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")] // Match JavaScript frontend keys
pub struct VehicleRecord {
    #[serde(default)]
    pub stock: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub model_code: Option<String>,
    #[serde(default, rename = "type")]
    pub vehicle_type: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub price: Option<f64>, // Customer currency (USD)
    #[serde(default, rename = "engineCC")]
    pub engine_cc: Option<u32>,
    #[serde(default)]
    pub fuel: Option<String>,
    #[serde(default)]
    pub mileage: Option<f64>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub exterior_color: Option<String>,
    #[serde(default)]
    pub drive: Option<String>,
    #[serde(default)]
    pub transmission: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
}

// Search criteria as typed by the user. Values stay raw strings so that a
// half-typed year or a stray letter never rejects the whole request; the
// filter engine parses numeric bounds itself and ignores what it cannot read.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    // Free-typed, substring match
    #[serde(default, deserialize_with = "loose_string")]
    pub make: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub model: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub model_code: Option<String>,

    // Selector-driven, exact match
    #[serde(default, rename = "type", deserialize_with = "loose_string")]
    pub vehicle_type: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub fuel: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub drive: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub transmission: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub stock: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub region: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub exterior_color: Option<String>,

    // Exact numeric
    #[serde(default, rename = "engineCC", deserialize_with = "loose_string")]
    pub engine_cc: Option<String>,

    // Inclusive ranges
    #[serde(default, deserialize_with = "loose_string")]
    pub year_from: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub year_to: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub price_from: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub price_to: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub mileage_from: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub mileage_to: Option<String>,

    // Free text over title, make, model, keywords and model code
    #[serde(default, deserialize_with = "loose_string")]
    pub keyword: Option<String>,
}

impl FilterCriteria {
    /// The all-empty criteria. Applying it returns the whole collection.
    pub fn reset() -> Self {
        Self::default()
    }

    /// True when no field carries a non-blank value.
    pub fn is_empty(&self) -> bool {
        self.values().iter().all(|v| v.is_none_or(|s| s.trim().is_empty()))
    }

    fn values(&self) -> [Option<&str>; 19] {
        [
            self.make.as_deref(),
            self.model.as_deref(),
            self.model_code.as_deref(),
            self.vehicle_type.as_deref(),
            self.fuel.as_deref(),
            self.drive.as_deref(),
            self.transmission.as_deref(),
            self.stock.as_deref(),
            self.country.as_deref(),
            self.region.as_deref(),
            self.exterior_color.as_deref(),
            self.engine_cc.as_deref(),
            self.year_from.as_deref(),
            self.year_to.as_deref(),
            self.price_from.as_deref(),
            self.price_to.as_deref(),
            self.mileage_from.as_deref(),
            self.mileage_to.as_deref(),
            self.keyword.as_deref(),
        ]
    }
}

// JSON clients send numbers for numeric inputs, forms send strings. Accept both.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawInput {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawInput>::deserialize(deserializer)?;
    Ok(raw.map(|value| match value {
        RawInput::Text(s) => s,
        RawInput::Integer(i) => i.to_string(),
        RawInput::Float(f) => f.to_string(),
        RawInput::Flag(b) => b.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criteria_accepts_numbers_and_strings() {
        let criteria: FilterCriteria =
            serde_json::from_str(r#"{"yearFrom": 2020, "priceTo": "15000", "make": "toyota"}"#)
                .expect("criteria should deserialize");
        assert_eq!(criteria.year_from.as_deref(), Some("2020"));
        assert_eq!(criteria.price_to.as_deref(), Some("15000"));
        assert_eq!(criteria.make.as_deref(), Some("toyota"));
        assert!(criteria.model.is_none());
    }

    #[test]
    fn test_criteria_renamed_keys() {
        let criteria: FilterCriteria =
            serde_json::from_str(r#"{"type": "SUV", "engineCC": 1500, "modelCode": "DBA"}"#)
                .expect("criteria should deserialize");
        assert_eq!(criteria.vehicle_type.as_deref(), Some("SUV"));
        assert_eq!(criteria.engine_cc.as_deref(), Some("1500"));
        assert_eq!(criteria.model_code.as_deref(), Some("DBA"));
    }

    #[test]
    fn test_reset_is_empty() {
        assert!(FilterCriteria::reset().is_empty());

        let blank = FilterCriteria { make: Some("   ".to_string()), ..Default::default() };
        assert!(blank.is_empty());

        let active = FilterCriteria { fuel: Some("Diesel".to_string()), ..Default::default() };
        assert!(!active.is_empty());
    }

    #[test]
    fn test_vehicle_record_json_keys() {
        let record: VehicleRecord = serde_json::from_str(
            r#"{"make":"Toyota","type":"Sedan","engineCC":1800,"exteriorColor":"White","year":2019}"#,
        )
        .expect("record should deserialize");
        assert_eq!(record.vehicle_type.as_deref(), Some("Sedan"));
        assert_eq!(record.engine_cc, Some(1800));
        assert_eq!(record.exterior_color.as_deref(), Some("White"));
        assert_eq!(record.year, Some(2019));
        assert!(record.price.is_none());
    }
}
