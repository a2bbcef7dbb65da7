use std::path::Path;

use tracing::info;

use super::AppError;
use crate::core::MonthlyMatrix;

/// Writes the monthly matrix as CSV: a `month` column, then one column per
/// path in ascending order of ending value.
pub fn write_paths_csv(path: &Path, matrix: &MonthlyMatrix) -> Result<(), AppError> {
    let export_err = |e: csv::Error| AppError::Export {
        path: path.display().to_string(),
        message: e.to_string(),
    };
    let mut writer = csv::Writer::from_path(path).map_err(export_err)?;

    let mut header = Vec::with_capacity(matrix.columns.len() + 1);
    header.push("month".to_string());
    header.extend((1..=matrix.columns.len()).map(|i| format!("path_{i}")));
    writer.write_record(&header).map_err(export_err)?;

    for (row, month) in matrix.months.iter().enumerate() {
        let mut record = Vec::with_capacity(matrix.columns.len() + 1);
        record.push(month.format("%Y-%m-%d").to_string());
        record.extend(
            matrix
                .columns
                .iter()
                .map(|column| column.get(row).map(|v| format!("{v:.0}")).unwrap_or_default()),
        );
        writer.write_record(&record).map_err(export_err)?;
    }

    writer.flush()?;
    info!(
        path = %path.display(),
        rows = matrix.months.len(),
        paths = matrix.columns.len(),
        "exported monthly paths"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn writes_month_column_and_one_column_per_path() {
        let matrix = MonthlyMatrix {
            months: vec![
                NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
                NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
            ],
            columns: vec![vec![100.0, 90.0], vec![100.0, 125.0]],
        };
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("paths.csv");

        write_paths_csv(&path, &matrix).expect("export");

        let contents = std::fs::read_to_string(&path).expect("read back");
        assert_eq!(
            contents,
            "month,path_1,path_2\n2025-01-31,100,100\n2025-02-28,90,125\n"
        );
    }

    #[test]
    fn unwritable_path_is_an_export_error() {
        let matrix = MonthlyMatrix {
            months: Vec::new(),
            columns: Vec::new(),
        };
        let err = write_paths_csv(Path::new("/nonexistent/dir/paths.csv"), &matrix).unwrap_err();
        assert!(matches!(err, AppError::Export { .. }));
    }
}
