//! Laws the vehicle filter engine must hold over a realistic stock list.

use autoexport_rust::filter::{FacetField, FacetValue, apply_filters, derive_facets};
use autoexport_rust::inventory;
use autoexport_rust::models::{FilterCriteria, VehicleRecord};

fn stock() -> Vec<VehicleRecord> {
    inventory::load(concat!(env!("CARGO_MANIFEST_DIR"), "/data/inventory.csv"))
        .expect("sample inventory should load")
}

// Each entry adds one more constraint to the previous criteria.
fn narrowing_chain() -> Vec<FilterCriteria> {
    let mut chain = vec![FilterCriteria::reset()];
    let steps: Vec<Box<dyn Fn(&mut FilterCriteria)>> = vec![
        Box::new(|c: &mut FilterCriteria| c.make = Some("toyota".into())),
        Box::new(|c: &mut FilterCriteria| c.year_from = Some("2016".into())),
        Box::new(|c: &mut FilterCriteria| c.fuel = Some("DIESEL".into())),
        Box::new(|c: &mut FilterCriteria| c.price_to = Some("30000".into())),
        Box::new(|c: &mut FilterCriteria| c.keyword = Some("van".into())),
    ];
    for step in steps {
        let mut next = chain.last().cloned().unwrap_or_default();
        step(&mut next);
        chain.push(next);
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_criteria_is_identity() {
        let vehicles = stock();
        let result = apply_filters(&vehicles, &FilterCriteria::reset());
        assert_eq!(result.len(), vehicles.len());
        assert!(result.iter().zip(vehicles.iter()).all(|(a, b)| std::ptr::eq(*a, b)));
    }

    #[test]
    fn test_adding_a_constraint_only_narrows() {
        let vehicles = stock();
        let chain = narrowing_chain();
        for pair in chain.windows(2) {
            let wider = apply_filters(&vehicles, &pair[0]);
            let narrower = apply_filters(&vehicles, &pair[1]);
            assert!(narrower.len() <= wider.len());
            for v in &narrower {
                assert!(wider.iter().any(|w| std::ptr::eq(*w, *v)), "narrowing produced a new record");
            }
        }
    }

    #[test]
    fn test_filter_preserves_order() {
        let vehicles = stock();
        let criteria = FilterCriteria { vehicle_type: Some("suv".into()), ..Default::default() };
        let stocks: Vec<_> = apply_filters(&vehicles, &criteria)
            .iter()
            .filter_map(|v| v.stock.as_deref())
            .collect();
        assert_eq!(stocks, vec!["JX-1003", "JX-1005", "JX-1007"]);
    }

    #[test]
    fn test_facets_are_sorted_distinct_and_non_empty() {
        let vehicles = stock();
        for field in FacetField::ALL {
            let values = derive_facets(&vehicles, field);
            assert!(values.windows(2).all(|w| w[0] < w[1]), "{} facets not strictly ascending", field);
            assert!(
                values.iter().all(|v| !matches!(v, FacetValue::Text(s) if s.trim().is_empty())),
                "{} facets contain an empty value",
                field
            );
        }
    }

    #[test]
    fn test_price_range_keeps_unpriced_vehicles() {
        let vehicles = stock();
        let criteria = FilterCriteria { price_to: Some("10000".into()), ..Default::default() };
        let stocks: Vec<_> = apply_filters(&vehicles, &criteria)
            .iter()
            .filter_map(|v| v.stock.as_deref())
            .collect();
        // JX-1008 has no price and is not excluded by a price bound
        assert_eq!(stocks, vec!["JX-1001", "JX-1004", "JX-1008"]);
    }
}
