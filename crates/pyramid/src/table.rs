//! Source point table: `x_pixel_coordinate`, `y_pixel_coordinate`, a label
//! column and an owner column, read from a `.csv`, a gzipped `.csv.gz`, or a
//! `.zip` holding one.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::csv_text::{has_extension, open_text, CsvText};
use crate::error::{PyramidError, Result};

pub const X_COLUMNS: &[&str] = &["x_pixel_coordinate"];
pub const Y_COLUMNS: &[&str] = &["y_pixel_coordinate"];
pub const LABEL_COLUMNS: &[&str] = &["gene_name", "label"];
pub const OWNER_COLUMNS: &[&str] = &["cell_id", "owner_id"];

/// One input row. `owner_id` keeps the exact source text.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRow {
    pub x: f64,
    pub y: f64,
    pub label: String,
    pub owner_id: String,
}

#[derive(Debug, Clone)]
pub struct PointTable {
    pub source: PathBuf,
    pub rows: Vec<PointRow>,
}

impl PointTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Unique labels in sorted order.
    pub fn labels(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|r| r.label.as_str()).collect()
    }

    /// Largest finite x and y, if any row has them.
    pub fn max_xy(&self) -> Option<(f64, f64)> {
        let mut max: Option<(f64, f64)> = None;
        for row in &self.rows {
            if !(row.x.is_finite() && row.y.is_finite()) {
                continue;
            }
            max = Some(match max {
                Some((mx, my)) => (mx.max(row.x), my.max(row.y)),
                None => (row.x, row.y),
            });
        }
        max
    }
}

/// Read a point table from `path`; `.zip` archives are searched for their
/// first `.csv` entry and `.gz` files are decompressed while reading.
pub fn read_point_table(path: &Path) -> Result<PointTable> {
    info!("Loading point table from {}", path.display());

    let rows = if has_extension(path, "zip") {
        debug!("Opening ZIP archive");
        let mut archive = zip::ZipArchive::new(File::open(path)?)?;

        let csv_name = archive
            .file_names()
            .find(|n| n.to_ascii_lowercase().ends_with(".csv"))
            .ok_or_else(|| PyramidError::NoCsvInArchive {
                path: path.to_owned(),
            })?
            .to_owned();

        debug!("Found CSV in ZIP: {}", csv_name);
        let entry = archive.by_name(&csv_name)?;
        parse_point_rows(entry, path)?
    } else {
        parse_point_rows(open_text(path)?, path)?
    };

    if rows.is_empty() {
        return Err(PyramidError::EmptyTable {
            path: path.to_owned(),
        });
    }

    info!("Loaded {} points", rows.len());

    Ok(PointTable {
        source: path.to_owned(),
        rows,
    })
}

fn missing(path: &Path, names: &[&str]) -> PyramidError {
    PyramidError::MissingColumn {
        path: path.to_owned(),
        expected: names.join(", "),
    }
}

/// Parse rows from any reader. `path` is used for error messages only.
pub fn parse_point_rows<R: Read>(reader: R, path: &Path) -> Result<Vec<PointRow>> {
    let table_err = |line: usize, message: String| PyramidError::Table {
        path: path.to_owned(),
        line,
        message,
    };

    let csv = match CsvText::open(reader)? {
        Some(Ok(csv)) => csv,
        Some(Err((line, msg))) => return Err(table_err(line, msg.to_owned())),
        None => return Ok(Vec::new()),
    };

    let x_col = csv.column(X_COLUMNS).ok_or_else(|| missing(path, X_COLUMNS))?;
    let y_col = csv.column(Y_COLUMNS).ok_or_else(|| missing(path, Y_COLUMNS))?;
    let label_col = csv
        .column(LABEL_COLUMNS)
        .ok_or_else(|| missing(path, LABEL_COLUMNS))?;
    let owner_col = csv
        .column(OWNER_COLUMNS)
        .ok_or_else(|| missing(path, OWNER_COLUMNS))?;
    let width = x_col.max(y_col).max(label_col).max(owner_col) + 1;

    let mut rows = Vec::new();
    for record in csv {
        let (line, fields) = record?;
        let fields = fields.map_err(|msg| table_err(line, msg.to_owned()))?;

        if fields.len() < width {
            return Err(table_err(
                line,
                format!("expected at least {} fields, found {}", width, fields.len()),
            ));
        }

        let coord = |col: usize| -> Result<f64> {
            let raw = fields[col].trim();
            raw.parse::<f64>()
                .map_err(|_| table_err(line, format!("invalid coordinate `{raw}`")))
        };

        rows.push(PointRow {
            x: coord(x_col)?,
            y: coord(y_col)?,
            label: fields[label_col].clone(),
            owner_id: fields[owner_col].trim().to_owned(),
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(text: &str) -> Result<Vec<PointRow>> {
        parse_point_rows(text.as_bytes(), Path::new("test.csv"))
    }

    #[test]
    fn reads_named_columns_in_any_order() {
        let rows = parse(
            ",cell_id,gene_name,y_pixel_coordinate,x_pixel_coordinate,extra\n\
             0,17,ACTB,20.5,10.25,z\n\
             1,900719925474099312345,\"GAP,DH\",0,1024,z\n",
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            PointRow {
                x: 10.25,
                y: 20.5,
                label: "ACTB".into(),
                owner_id: "17".into(),
            }
        );
        assert_eq!(rows[1].label, "GAP,DH");
        assert_eq!(rows[1].owner_id, "900719925474099312345");
    }

    #[test]
    fn accepts_generic_column_names() {
        let rows = parse("x_pixel_coordinate,y_pixel_coordinate,label,owner_id\n1,2,a,b\n").unwrap();
        assert_eq!(rows[0].label, "a");
        assert_eq!(rows[0].owner_id, "b");
    }

    #[test]
    fn reports_missing_column() {
        let err = parse("x_pixel_coordinate,y_pixel_coordinate,gene_name\n1,2,a\n").unwrap_err();
        assert!(matches!(err, PyramidError::MissingColumn { .. }));
    }

    #[test]
    fn reports_bad_row_with_line_number() {
        let err = parse("x_pixel_coordinate,y_pixel_coordinate,gene_name,cell_id\n1,2,a,1\nfoo,2,a,1\n")
            .unwrap_err();
        match err {
            PyramidError::Table { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error {other:?}"),
        }

        let err = parse("x_pixel_coordinate,y_pixel_coordinate,gene_name,cell_id\n1,2\n").unwrap_err();
        assert!(matches!(err, PyramidError::Table { line: 2, .. }));
    }

    #[test]
    fn empty_file_is_an_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "x_pixel_coordinate,y_pixel_coordinate,gene_name,cell_id\n").unwrap();

        let err = read_point_table(&path).unwrap_err();
        assert!(matches!(err, PyramidError::EmptyTable { .. }));
    }

    #[test]
    fn reads_csv_from_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.zip");

        let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
        writer
            .start_file("data/points.csv", zip::write::FileOptions::default())
            .unwrap();
        writer
            .write_all(b"x_pixel_coordinate,y_pixel_coordinate,gene_name,cell_id\n3,4,A,9\n")
            .unwrap();
        writer.finish().unwrap();

        let table = read_point_table(&path).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.max_xy(), Some((3.0, 4.0)));
    }

    #[test]
    fn reads_gzipped_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcripts.csv.gz");

        let mut encoder = flate2::write::GzEncoder::new(
            File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        encoder
            .write_all(b"x_pixel_coordinate,y_pixel_coordinate,gene_name,cell_id\n3,4,A,9\n")
            .unwrap();
        encoder.finish().unwrap();

        let table = read_point_table(&path).unwrap();
        assert_eq!(
            table.rows,
            vec![PointRow {
                x: 3.0,
                y: 4.0,
                label: "A".into(),
                owner_id: "9".into(),
            }]
        );
    }
}
