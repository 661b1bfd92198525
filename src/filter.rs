// Vehicle filter engine: facet derivation and criteria matching over an
// in-memory stock list. Everything here is pure and total; nothing errors.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::models::{FilterCriteria, VehicleRecord};

/// Filterable fields that expose a list of selectable values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FacetField {
    #[serde(rename = "make")]
    Make,
    #[serde(rename = "model")]
    Model,
    #[serde(rename = "modelCode")]
    ModelCode,
    #[serde(rename = "type")]
    VehicleType,
    #[serde(rename = "year")]
    Year,
    #[serde(rename = "fuel")]
    Fuel,
    #[serde(rename = "engineCC")]
    EngineCc,
    #[serde(rename = "drive")]
    Drive,
    #[serde(rename = "transmission")]
    Transmission,
    #[serde(rename = "stock")]
    Stock,
    #[serde(rename = "country")]
    Country,
    #[serde(rename = "region")]
    Region,
    #[serde(rename = "exteriorColor")]
    ExteriorColor,
}

impl FacetField {
    pub const ALL: [FacetField; 13] = [
        FacetField::Make,
        FacetField::Model,
        FacetField::ModelCode,
        FacetField::VehicleType,
        FacetField::Year,
        FacetField::Fuel,
        FacetField::EngineCc,
        FacetField::Drive,
        FacetField::Transmission,
        FacetField::Stock,
        FacetField::Country,
        FacetField::Region,
        FacetField::ExteriorColor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FacetField::Make => "make",
            FacetField::Model => "model",
            FacetField::ModelCode => "modelCode",
            FacetField::VehicleType => "type",
            FacetField::Year => "year",
            FacetField::Fuel => "fuel",
            FacetField::EngineCc => "engineCC",
            FacetField::Drive => "drive",
            FacetField::Transmission => "transmission",
            FacetField::Stock => "stock",
            FacetField::Country => "country",
            FacetField::Region => "region",
            FacetField::ExteriorColor => "exteriorColor",
        }
    }

    fn value_of(&self, vehicle: &VehicleRecord) -> Option<FacetValue> {
        let text = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| FacetValue::Text(s.to_string()))
        };
        match self {
            FacetField::Make => text(&vehicle.make),
            FacetField::Model => text(&vehicle.model),
            FacetField::ModelCode => text(&vehicle.model_code),
            FacetField::VehicleType => text(&vehicle.vehicle_type),
            FacetField::Year => vehicle.year.map(|y| FacetValue::Number(i64::from(y))),
            FacetField::Fuel => text(&vehicle.fuel),
            FacetField::EngineCc => vehicle.engine_cc.map(|cc| FacetValue::Number(i64::from(cc))),
            FacetField::Drive => text(&vehicle.drive),
            FacetField::Transmission => text(&vehicle.transmission),
            FacetField::Stock => text(&vehicle.stock),
            FacetField::Country => text(&vehicle.country),
            FacetField::Region => text(&vehicle.region),
            FacetField::ExteriorColor => text(&vehicle.exterior_color),
        }
    }
}

impl fmt::Display for FacetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown facet field '{0}'")]
pub struct UnknownFacet(pub String);

impl FromStr for FacetField {
    type Err = UnknownFacet;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FacetField::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownFacet(s.to_string()))
    }
}

/// A selectable facet value. A single field only ever yields one variant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum FacetValue {
    Number(i64),
    Text(String),
}

impl fmt::Display for FacetValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacetValue::Number(n) => write!(f, "{}", n),
            FacetValue::Text(s) => f.write_str(s),
        }
    }
}

/// Distinct, non-empty values of `field`, sorted ascending.
pub fn derive_facets(vehicles: &[VehicleRecord], field: FacetField) -> Vec<FacetValue> {
    vehicles
        .iter()
        .filter_map(|v| field.value_of(v))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Every facet at once, keyed by field.
pub fn derive_all_facets(vehicles: &[VehicleRecord]) -> BTreeMap<FacetField, Vec<FacetValue>> {
    FacetField::ALL
        .into_iter()
        .map(|field| (field, derive_facets(vehicles, field)))
        .collect()
}

/// Result of a filter pass. `total` is the size of the unfiltered collection so
/// callers can tell "nothing matched" apart from "nothing in stock".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOutcome<'a> {
    pub total: usize,
    pub count: usize,
    pub vehicles: Vec<&'a VehicleRecord>,
}

pub fn filter_vehicles<'a>(vehicles: &'a [VehicleRecord], criteria: &FilterCriteria) -> FilterOutcome<'a> {
    let matched = apply_filters(vehicles, criteria);
    FilterOutcome { total: vehicles.len(), count: matched.len(), vehicles: matched }
}

/// Stable filter: keeps the records matching every active criterion, in their
/// original order. All-empty criteria keep everything.
pub fn apply_filters<'a>(vehicles: &'a [VehicleRecord], criteria: &FilterCriteria) -> Vec<&'a VehicleRecord> {
    let compiled = CompiledCriteria::from(criteria);
    vehicles.iter().filter(|v| compiled.matches(v)).collect()
}

#[derive(Debug, Clone, Copy, Default)]
struct Range {
    from: Option<f64>,
    to: Option<f64>,
}

impl Range {
    fn parse(from: &Option<String>, to: &Option<String>) -> Self {
        Range { from: parse_number(from), to: parse_number(to) }
    }

    // Null-safe: a vehicle without the value is not excluded.
    fn admits(&self, value: Option<f64>) -> bool {
        let Some(value) = value else { return true };
        self.from.is_none_or(|from| value >= from) && self.to.is_none_or(|to| value <= to)
    }
}

// Criteria with blank strings dropped, text lowercased and numbers parsed once
// per call rather than once per vehicle.
#[derive(Debug, Default)]
struct CompiledCriteria {
    contains: Vec<(TextField, String)>,
    equals: Vec<(TextField, String)>,
    engine_cc: Option<f64>,
    year: Range,
    price: Range,
    mileage: Range,
    keyword: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum TextField {
    Make,
    Model,
    ModelCode,
    VehicleType,
    Fuel,
    Drive,
    Transmission,
    Stock,
    Country,
    Region,
    ExteriorColor,
}

impl TextField {
    fn get<'a>(&self, v: &'a VehicleRecord) -> Option<&'a str> {
        let value = match self {
            TextField::Make => &v.make,
            TextField::Model => &v.model,
            TextField::ModelCode => &v.model_code,
            TextField::VehicleType => &v.vehicle_type,
            TextField::Fuel => &v.fuel,
            TextField::Drive => &v.drive,
            TextField::Transmission => &v.transmission,
            TextField::Stock => &v.stock,
            TextField::Country => &v.country,
            TextField::Region => &v.region,
            TextField::ExteriorColor => &v.exterior_color,
        };
        value.as_deref().filter(|s| !s.trim().is_empty())
    }
}

fn active(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
}

// Parse failure means "no constraint".
fn parse_number(value: &Option<String>) -> Option<f64> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.replace(',', "").parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

impl From<&FilterCriteria> for CompiledCriteria {
    fn from(c: &FilterCriteria) -> Self {
        let pick = |fields: &[(TextField, &Option<String>)]| {
            fields
                .iter()
                .filter_map(|(field, value)| active(value).map(|v| (*field, v)))
                .collect::<Vec<_>>()
        };

        CompiledCriteria {
            contains: pick(&[
                (TextField::Make, &c.make),
                (TextField::Model, &c.model),
                (TextField::ModelCode, &c.model_code),
            ]),
            equals: pick(&[
                (TextField::VehicleType, &c.vehicle_type),
                (TextField::Fuel, &c.fuel),
                (TextField::Drive, &c.drive),
                (TextField::Transmission, &c.transmission),
                (TextField::Stock, &c.stock),
                (TextField::Country, &c.country),
                (TextField::Region, &c.region),
                (TextField::ExteriorColor, &c.exterior_color),
            ]),
            engine_cc: parse_number(&c.engine_cc),
            year: Range::parse(&c.year_from, &c.year_to),
            price: Range::parse(&c.price_from, &c.price_to),
            mileage: Range::parse(&c.mileage_from, &c.mileage_to),
            keyword: active(&c.keyword),
        }
    }
}

impl CompiledCriteria {
    fn matches(&self, v: &VehicleRecord) -> bool {
        let contains_ok = self.contains.iter().all(|(field, needle)| {
            field.get(v).is_none_or(|value| value.to_lowercase().contains(needle.as_str()))
        });
        let equals_ok = self.equals.iter().all(|(field, wanted)| {
            field.get(v).is_none_or(|value| value.trim().to_lowercase() == *wanted)
        });
        let engine_ok = match (self.engine_cc, v.engine_cc) {
            (Some(wanted), Some(cc)) => f64::from(cc) == wanted,
            _ => true,
        };

        contains_ok
            && equals_ok
            && engine_ok
            && self.year.admits(v.year.map(f64::from))
            && self.price.admits(v.price)
            && self.mileage.admits(v.mileage)
            && self.keyword.as_deref().is_none_or(|keyword| search_text(v).contains(keyword))
    }
}

// Lowercased title, make, model, keywords and model code, space-joined.
fn search_text(v: &VehicleRecord) -> String {
    [&v.title, &v.make, &v.model, &v.keywords, &v.model_code]
        .into_iter()
        .filter_map(|s| s.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
