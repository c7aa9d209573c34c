// src/coefficients.rs - Per-specimen EFD coefficient storage

use std::io;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use nalgebra::DMatrix;

use crate::config::Config;
use crate::errors::{Result, WingShapeError};

/// Fallback name for the sex column used by older exports
const SEX_COLUMN_ALIAS: &str = "gender";

/// One of the four coefficient series of an elliptical Fourier descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coefficient {
    A,
    B,
    C,
    D,
}

impl Coefficient {
    pub const ALL: [Coefficient; 4] = [Coefficient::A, Coefficient::B, Coefficient::C, Coefficient::D];

    fn offset(self) -> usize {
        match self {
            Coefficient::A => 0,
            Coefficient::B => 1,
            Coefficient::C => 2,
            Coefficient::D => 3,
        }
    }
}

/// Harmonic coefficients {a_n, b_n, c_n, d_n | n = 1..H} of one specimen.
///
/// Values are stored series-major (a1..aH, b1..bH, c1..cH, d1..dH), the
/// same order as the columns of the coefficient matrix. A `None` marks a
/// cell that was empty in the source table.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientSet {
    harmonics: usize,
    values: Vec<Option<f64>>,
}

impl CoefficientSet {
    /// Build from series-major values; `values.len()` must be 4 * `harmonics`
    pub fn new(harmonics: usize, values: Vec<Option<f64>>) -> Result<Self> {
        if values.len() != 4 * harmonics {
            return Err(WingShapeError::Numeric(format!(
                "expected {} coefficients for {} harmonics, got {}",
                4 * harmonics,
                harmonics,
                values.len()
            )));
        }
        Ok(Self { harmonics, values })
    }

    /// Build a complete set from per-harmonic `[a, b, c, d]` rows
    pub fn from_harmonics(rows: &[[f64; 4]]) -> Self {
        let harmonics = rows.len();
        let mut values = vec![None; 4 * harmonics];
        for (n, row) in rows.iter().enumerate() {
            for kind in Coefficient::ALL {
                values[kind.offset() * harmonics + n] = Some(row[kind.offset()]);
            }
        }
        Self { harmonics, values }
    }

    pub fn harmonics(&self) -> usize {
        self.harmonics
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    /// Coefficient of series `kind` for harmonic `n` (1-based)
    pub fn get(&self, kind: Coefficient, n: usize) -> Option<f64> {
        if n == 0 || n > self.harmonics {
            return None;
        }
        self.values[kind.offset() * self.harmonics + n - 1]
    }

    /// `(a_n, b_n, c_n, d_n)` with absent coefficients contributing zero
    pub fn harmonic_or_zero(&self, n: usize) -> [f64; 4] {
        Coefficient::ALL.map(|kind| self.get(kind, n).unwrap_or(0.0))
    }

    /// `[a1, b1, c1, d1]`, or `None` when any of them is absent
    pub fn first_harmonic(&self) -> Option<[f64; 4]> {
        Some([
            self.get(Coefficient::A, 1)?,
            self.get(Coefficient::B, 1)?,
            self.get(Coefficient::C, 1)?,
            self.get(Coefficient::D, 1)?,
        ])
    }

    /// Every coefficient multiplied by `factor`; absent cells stay absent
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            harmonics: self.harmonics,
            values: self.values.iter().map(|v| v.map(|x| x * factor)).collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }
}

/// A single wing sample: identity, categorical metadata and coefficients
#[derive(Debug, Clone, PartialEq)]
pub struct Specimen {
    pub id: String,
    pub species: String,
    pub sex: String,
    pub coefficients: CoefficientSet,
}

impl Specimen {
    pub fn new(
        id: impl Into<String>,
        species: impl Into<String>,
        sex: impl Into<String>,
        coefficients: CoefficientSet,
    ) -> Self {
        Self {
            id: id.into(),
            species: species.into(),
            sex: sex.into(),
            coefficients,
        }
    }

    /// Species x sex grouping key
    pub fn group_key(&self) -> (String, String) {
        (self.species.clone(), self.sex.clone())
    }
}

/// Column names `{s}{n}` for each symbol s and n = 1..H, series-major
pub fn coefficient_column_names(symbols: [char; 4], harmonics: usize) -> Vec<String> {
    symbols
        .iter()
        .flat_map(|s| (1..=harmonics).map(move |n| format!("{}{}", s, n)))
        .collect()
}

/// Layout of the source table, kept so outputs can reproduce its schema
#[derive(Debug, Clone)]
struct SourceTable {
    headers: StringRecord,
    rows: Vec<StringRecord>,
    coefficient_columns: Vec<usize>,
}

/// Specimens loaded from a coefficient table; read-only after construction.
///
/// Row order is specimen identity and is shared by every downstream
/// matrix and table.
#[derive(Debug, Clone)]
pub struct CoefficientStore {
    harmonics: usize,
    symbols: [char; 4],
    specimens: Vec<Specimen>,
    source: Option<SourceTable>,
}

impl CoefficientStore {
    /// Build from in-memory specimens; all must share the harmonic order
    pub fn from_specimens(harmonics: usize, specimens: Vec<Specimen>) -> Result<Self> {
        for s in &specimens {
            if s.coefficients.harmonics() != harmonics {
                return Err(WingShapeError::data_format(
                    &s.id,
                    format!(
                        "has {} harmonics, expected {}",
                        s.coefficients.harmonics(),
                        harmonics
                    ),
                ));
            }
        }
        Ok(Self {
            harmonics,
            symbols: ['a', 'b', 'c', 'd'],
            specimens,
            source: None,
        })
    }

    /// Load a CSV coefficient table
    pub fn from_csv_path<P: AsRef<Path>>(path: P, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Reading coefficients from '{}'", path.display());
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, config)
    }

    /// Load a CSV coefficient table from any reader
    pub fn from_reader<R: io::Read>(reader: R, config: &Config) -> Result<Self> {
        let harmonics = config.harmonics;
        let symbols = config.symbols();
        let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = reader.headers()?.clone();

        let position = |name: &str| headers.iter().position(|h| h == name);

        let species_idx = position(&config.species_column);
        let sex_idx = position(&config.sex_column).or_else(|| position(SEX_COLUMN_ALIAS));
        let id_idx = position(&config.id_column);

        let names = coefficient_column_names(symbols, harmonics);
        let mut missing: Vec<String> = Vec::new();
        if species_idx.is_none() {
            missing.push(config.species_column.clone());
        }
        if sex_idx.is_none() {
            missing.push(config.sex_column.clone());
        }
        let coefficient_columns: Vec<usize> = names
            .iter()
            .filter_map(|name| {
                let idx = position(name);
                if idx.is_none() {
                    missing.push(name.clone());
                }
                idx
            })
            .collect();
        let (species_idx, sex_idx) = match (species_idx, sex_idx) {
            (Some(sp), Some(sx)) if missing.is_empty() => (sp, sx),
            _ => return Err(WingShapeError::MissingColumns(missing)),
        };

        let mut specimens = Vec::new();
        let mut rows = Vec::new();
        for (row_no, result) in reader.records().enumerate() {
            let record = result?;
            let id = id_idx
                .and_then(|i| record.get(i))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("row {}", row_no + 1));

            let species = record.get(species_idx).unwrap_or("").to_string();
            let sex = record.get(sex_idx).unwrap_or("").to_string();
            if species.is_empty() || sex.is_empty() {
                return Err(WingShapeError::data_format(&id, "species or sex label is empty"));
            }

            let values = coefficient_columns
                .iter()
                .zip(&names)
                .map(|(&col, name)| parse_cell(record.get(col).unwrap_or(""), &id, name))
                .collect::<Result<Vec<_>>>()?;

            specimens.push(Specimen::new(id, species, sex, CoefficientSet::new(harmonics, values)?));
            rows.push(record);
        }

        if specimens.is_empty() {
            return Err(WingShapeError::EmptyDataset);
        }
        log::info!("Loaded {} specimens with {} harmonics", specimens.len(), harmonics);

        Ok(Self {
            harmonics,
            symbols,
            specimens,
            source: Some(SourceTable {
                headers,
                rows,
                coefficient_columns,
            }),
        })
    }

    /// Same table with replaced coefficient sets (e.g. after normalization)
    pub fn with_coefficients(&self, sets: Vec<CoefficientSet>) -> Result<Self> {
        if sets.len() != self.specimens.len() {
            return Err(WingShapeError::Numeric(format!(
                "expected {} coefficient sets, got {}",
                self.specimens.len(),
                sets.len()
            )));
        }
        let specimens = self
            .specimens
            .iter()
            .zip(sets)
            .map(|(s, coefficients)| Specimen {
                coefficients,
                ..s.clone()
            })
            .collect();
        Ok(Self {
            harmonics: self.harmonics,
            symbols: self.symbols,
            specimens,
            source: self.source.clone(),
        })
    }

    pub fn harmonics(&self) -> usize {
        self.harmonics
    }

    pub fn specimens(&self) -> &[Specimen] {
        &self.specimens
    }

    pub fn len(&self) -> usize {
        self.specimens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specimens.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        coefficient_column_names(self.symbols, self.harmonics)
    }

    pub fn species_labels(&self) -> Vec<&str> {
        self.specimens.iter().map(|s| s.species.as_str()).collect()
    }

    pub fn sex_labels(&self) -> Vec<&str> {
        self.specimens.iter().map(|s| s.sex.as_str()).collect()
    }

    /// Samples x 4H coefficient matrix. Every cell must be present.
    pub fn coefficient_matrix(&self) -> Result<DMatrix<f64>> {
        let width = 4 * self.harmonics;
        let mut matrix = DMatrix::zeros(self.specimens.len(), width);
        for (row, specimen) in self.specimens.iter().enumerate() {
            for (col, value) in specimen.coefficients.values().iter().enumerate() {
                matrix[(row, col)] = value.ok_or_else(|| {
                    WingShapeError::data_format(
                        &specimen.id,
                        format!("coefficient column {} is empty", col + 1),
                    )
                })?;
            }
        }
        Ok(matrix)
    }

    /// Header and rows of the source table with coefficient cells
    /// re-rendered from the current coefficient sets
    pub fn table_records(&self) -> (StringRecord, Vec<StringRecord>) {
        match &self.source {
            Some(source) => {
                let rows = source
                    .rows
                    .iter()
                    .zip(&self.specimens)
                    .map(|(raw, specimen)| {
                        let mut cells: Vec<String> = raw.iter().map(str::to_string).collect();
                        for (&col, value) in source.coefficient_columns.iter().zip(specimen.coefficients.values()) {
                            cells[col] = format_cell(*value);
                        }
                        StringRecord::from(cells)
                    })
                    .collect();
                (source.headers.clone(), rows)
            }
            None => {
                let mut headers = vec!["image_id".to_string(), "species".to_string(), "sex".to_string()];
                headers.extend(self.column_names());
                let rows = self
                    .specimens
                    .iter()
                    .map(|s| {
                        let mut cells = vec![s.id.clone(), s.species.clone(), s.sex.clone()];
                        cells.extend(s.coefficients.values().iter().map(|v| format_cell(*v)));
                        StringRecord::from(cells)
                    })
                    .collect();
                (StringRecord::from(headers), rows)
            }
        }
    }
}

fn parse_cell(cell: &str, specimen: &str, column: &str) -> Result<Option<f64>> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    let value: f64 = cell.parse().map_err(|_| {
        WingShapeError::data_format(specimen, format!("column {}: '{}' is not a number", column, cell))
    })?;
    if value.is_nan() {
        return Ok(None);
    }
    if !value.is_finite() {
        return Err(WingShapeError::data_format(
            specimen,
            format!("column {}: value is not finite", column),
        ));
    }
    Ok(Some(value))
}

fn format_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
