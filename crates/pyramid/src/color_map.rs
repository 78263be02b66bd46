use std::collections::BTreeMap;
use std::path::Path;

use log::{info, warn};
use rand::Rng;

use crate::csv_text::{open_text, CsvText};
use crate::error::{PyramidError, Result};

/// Label -> RGB mapping. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorMap {
    colors: BTreeMap<String, [u8; 3]>,
}

/// Parse `#RRGGBB` (the leading `#` is optional).
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

impl ColorMap {
    pub fn get(&self, label: &str) -> Option<[u8; 3]> {
        self.colors.get(label).copied()
    }

    pub fn insert(&mut self, label: impl Into<String>, color: [u8; 3]) {
        self.colors.insert(label.into(), color);
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, [u8; 3])> {
        self.colors.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// One uniformly random color per label.
    pub fn generate<'a, R, I>(labels: I, rng: &mut R) -> Self
    where
        R: Rng,
        I: IntoIterator<Item = &'a str>,
    {
        let mut map = Self::default();
        for label in labels {
            map.colors
                .entry(label.to_owned())
                .or_insert_with(|| [rng.gen(), rng.gen(), rng.gen()]);
        }

        info!("Generated a color map of {} colors", map.len());
        map
    }

    /// Load a `gene`/`label` + `color` table, gzipped when it ends in `.gz`.
    /// Returns `Ok(None)` when the file holds no entries.
    pub fn from_csv(path: &Path) -> Result<Option<Self>> {
        let csv = match CsvText::open(open_text(path)?)? {
            Some(Ok(csv)) => csv,
            Some(Err((line, msg))) => {
                return Err(PyramidError::Table {
                    path: path.to_owned(),
                    line,
                    message: msg.to_owned(),
                })
            }
            None => {
                warn!("Color map {} is empty", path.display());
                return Ok(None);
            }
        };

        let label_col = csv
            .column(&["gene", "gene_name", "label"])
            .ok_or_else(|| PyramidError::MissingColumn {
                path: path.to_owned(),
                expected: "gene, gene_name, label".into(),
            })?;
        let color_col = csv
            .column(&["color"])
            .ok_or_else(|| PyramidError::MissingColumn {
                path: path.to_owned(),
                expected: "color".into(),
            })?;

        let mut map = Self::default();
        for record in csv {
            let (line, fields) = record?;
            let fields = fields.map_err(|msg| PyramidError::Table {
                path: path.to_owned(),
                line,
                message: msg.to_owned(),
            })?;

            let (Some(label), Some(value)) = (fields.get(label_col), fields.get(color_col)) else {
                return Err(PyramidError::Table {
                    path: path.to_owned(),
                    line,
                    message: "row is missing the label or color field".into(),
                });
            };

            let color = parse_hex_color(value).ok_or_else(|| PyramidError::InvalidColor {
                label: label.clone(),
                value: value.clone(),
            })?;

            map.insert(label.clone(), color);
        }

        if map.is_empty() {
            warn!("Color map {} is empty", path.display());
            return Ok(None);
        }

        info!("Loaded {} colors from {}", map.len(), path.display());
        Ok(Some(map))
    }
}
