use std::path::Path;

use tracing::debug;

use super::model::{MetadataRow, MetadataTable, MetadataValue};
use crate::error::Result;

/// Load a cohort table from a CSV file with a header row.
///
/// Cells are typed with [`MetadataValue::guess`]; empty cells become `Null`.
/// Spreadsheet sources must be exported to CSV first.
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<MetadataTable> {
    let path = path.as_ref();
    let reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    read_table(reader, path.display().to_string())
}

/// Parse a cohort table from any CSV source.
pub fn read_table<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    name: impl Into<String>,
) -> Result<MetadataTable> {
    let name = name.into();
    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = MetadataRow::default();
        for (col_idx, column) in columns.iter().enumerate() {
            let value = record
                .get(col_idx)
                .map_or(MetadataValue::Null, |raw| MetadataValue::guess(raw.trim()));
            row.fields.insert(column.clone(), value);
        }
        rows.push(row);
    }

    debug!(table = %name, rows = rows.len(), columns = columns.len(), "loaded metadata table");
    Ok(MetadataTable::new(name, columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> MetadataTable {
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(text.as_bytes());
        read_table(reader, "inline").unwrap()
    }

    #[test]
    fn test_reads_header_and_typed_cells() {
        let table = parse("PID,SID,Series\nP001,3,T2\nP002,,FLAIR\n");
        assert_eq!(table.columns, vec!["PID", "SID", "Series"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].get("SID"), Some(&MetadataValue::Integer(3)));
        assert_eq!(table.rows[1].get("SID"), Some(&MetadataValue::Null));
        assert_eq!(table.rows[1].get("Series"), Some(&MetadataValue::from("FLAIR")));
    }

    #[test]
    fn test_short_records_fill_null() {
        let table = parse("a,b,c\n1,2\n");
        assert_eq!(table.rows[0].get("c"), Some(&MetadataValue::Null));
    }

    #[test]
    fn test_load_csv_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.csv");
        std::fs::write(&path, "Patient_ID,is_Duplicate\nN1,NO\n").unwrap();
        let table = load_csv(&path).unwrap();
        assert_eq!(table.rows[0].get("is_Duplicate"), Some(&MetadataValue::from("NO")));
        assert!(table.name.ends_with("meta.csv"));
    }
}
