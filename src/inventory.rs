// Loads the stock list the filter engine works over. The list is read once and
// never mutated afterwards.

use anyhow::{Context, Result, bail};
use std::path::Path;

use crate::models::VehicleRecord;

pub fn load(path: impl AsRef<Path>) -> Result<Vec<VehicleRecord>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let vehicles = match extension.as_str() {
        "csv" => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open inventory {}", path.display()))?;
            from_csv(file).with_context(|| format!("Failed to parse inventory {}", path.display()))?
        }
        "json" => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read inventory {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse inventory {}", path.display()))?
        }
        other => bail!("Unsupported inventory format '{}' for {}", other, path.display()),
    };

    tracing::info!(count = vehicles.len(), path = %path.display(), "Loaded vehicle inventory");
    Ok(vehicles)
}

// Headers are the camelCase record keys; blank cells become absent values.
pub fn from_csv<R: std::io::Read>(reader: R) -> Result<Vec<VehicleRecord>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut vehicles = Vec::new();
    for (row, record) in rdr.deserialize::<VehicleRecord>().enumerate() {
        // Row numbers are 1-based and skip the header line
        let vehicle = record.with_context(|| format!("Invalid inventory row {}", row + 2))?;
        vehicles.push(vehicle);
    }
    Ok(vehicles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CSV: &str = "\
stock,title,make,model,modelCode,type,year,price,engineCC,fuel,mileage,country,region,exteriorColor,drive,transmission,keywords
A100,2019 Toyota Prius,Toyota,Prius,DAA-ZVW50,Hatchback,2019,8000,1800,Hybrid,42000,Japan,Asia,White,2WD,Automatic,eco
A101,2021 Honda Fit,Honda,Fit,,Hatchback,2021,15000,,Petrol,,Japan,Asia,,,,
";

    #[test]
    fn test_from_csv_blank_cells_are_absent() {
        let vehicles = from_csv(CSV.as_bytes()).unwrap();
        assert_eq!(vehicles.len(), 2);

        let prius = &vehicles[0];
        assert_eq!(prius.model_code.as_deref(), Some("DAA-ZVW50"));
        assert_eq!(prius.engine_cc, Some(1800));
        assert_eq!(prius.mileage, Some(42000.0));

        let fit = &vehicles[1];
        assert!(fit.model_code.is_none());
        assert!(fit.engine_cc.is_none());
        assert!(fit.mileage.is_none());
        assert_eq!(fit.price, Some(15000.0));
    }

    #[test]
    fn test_from_csv_reports_bad_row() {
        let bad = "stock,year\nA1,2019\nA2,not-a-year\n";
        let err = from_csv(bad.as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("row 3"));
    }

    #[test]
    fn test_load_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"[{{"make":"Nissan","year":2018,"engineCC":1200}}]"#).unwrap();

        let vehicles = load(file.path()).unwrap();
        assert_eq!(vehicles.len(), 1);
        assert_eq!(vehicles[0].make.as_deref(), Some("Nissan"));
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".xml").tempfile().unwrap();
        assert!(load(file.path()).is_err());
    }
}
