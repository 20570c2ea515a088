use crate::core::descriptor::{DescriptorError, KeySchema};
use crate::core::models::evaluation::{Candidate, EvaluationRecord, EvaluationTable};
use std::path::{Path, PathBuf};
use thiserror::Error;

const ID_COLUMN: &str = "material_id";
const CIF_COLUMN: &str = "cif_file";
const ENERGY_COLUMN: &str = "Energy";
const GENERATION_COLUMN: &str = "generation";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error for '{path}': {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("Invalid header in '{path}': {reason}")]
    Header { path: PathBuf, reason: String },
    #[error("Invalid value '{value}' in column '{column}' of row {row} in '{path}'")]
    InvalidValue {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },
    #[error("Descriptor columns of '{path}' do not match the pinned schema")]
    SchemaMismatch { path: PathBuf },
    #[error("Inconsistent descriptor data: {0}")]
    Descriptor(#[from] DescriptorError),
}

fn csv_error(path: &Path) -> impl Fn(csv::Error) -> TableError + '_ {
    move |source| TableError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

fn header_error(path: &Path, reason: impl Into<String>) -> TableError {
    TableError::Header {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn parse_f64(path: &Path, row: usize, column: &str, value: &str) -> Result<f64, TableError> {
    value.trim().parse().map_err(|_| TableError::InvalidValue {
        path: path.to_path_buf(),
        row,
        column: column.to_string(),
        value: value.to_string(),
    })
}

/// Column layout discovered from a table header.
struct Layout {
    schema: KeySchema,
    energy: Option<usize>,
    generation: Option<usize>,
}

fn parse_header(
    path: &Path,
    headers: &csv::StringRecord,
    expect_energy: bool,
) -> Result<Layout, TableError> {
    if headers.get(0) != Some(ID_COLUMN) || headers.get(1) != Some(CIF_COLUMN) {
        return Err(header_error(
            path,
            format!("table must start with '{ID_COLUMN},{CIF_COLUMN}'"),
        ));
    }
    let energy = headers.iter().position(|h| h == ENERGY_COLUMN);
    if expect_energy && energy.is_none() {
        return Err(header_error(path, format!("missing '{ENERGY_COLUMN}' column")));
    }
    let keys_end = energy.unwrap_or(headers.len());
    let keys: Vec<&str> = headers.iter().take(keys_end).skip(2).collect();
    let schema = KeySchema::new(keys.iter().copied());
    if schema.keys().iter().map(String::as_str).ne(keys.iter().copied()) {
        return Err(header_error(
            path,
            "descriptor columns must be unique and sorted",
        ));
    }
    let generation = energy.and_then(|e| {
        headers
            .iter()
            .skip(e + 1)
            .position(|h| h == GENERATION_COLUMN)
            .map(|offset| e + 1 + offset)
    });
    Ok(Layout {
        schema,
        energy,
        generation,
    })
}

fn parse_descriptor(
    path: &Path,
    row: usize,
    record: &csv::StringRecord,
    schema: &KeySchema,
) -> Result<Vec<f64>, TableError> {
    schema
        .keys()
        .iter()
        .enumerate()
        .map(|(i, key)| parse_f64(path, row, key, record.get(i + 2).unwrap_or("")))
        .collect()
}

/// Reads an evaluation table written by [`write_table`].
///
/// The trailing `generation` column is optional; rows without it are
/// attributed to generation 0.
pub fn read_table(path: &Path) -> Result<EvaluationTable, TableError> {
    let mut reader = csv::Reader::from_path(path).map_err(csv_error(path))?;
    let headers = reader.headers().map_err(csv_error(path))?.clone();
    let layout = parse_header(path, &headers, true)?;
    let energy_idx = layout.energy.unwrap_or(headers.len());

    let mut table = EvaluationTable::new(layout.schema.clone());
    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(csv_error(path))?;
        let row = row + 1;
        let descriptor = parse_descriptor(path, row, &record, &layout.schema)?;
        let energy = parse_f64(path, row, ENERGY_COLUMN, record.get(energy_idx).unwrap_or(""))?;
        let generation = match layout.generation.and_then(|i| record.get(i)) {
            Some(value) if !value.trim().is_empty() => {
                value
                    .trim()
                    .parse()
                    .map_err(|_| TableError::InvalidValue {
                        path: path.to_path_buf(),
                        row,
                        column: GENERATION_COLUMN.to_string(),
                        value: value.to_string(),
                    })?
            }
            _ => 0,
        };
        table.push(EvaluationRecord {
            material_id: record.get(0).unwrap_or("").to_string(),
            cif_file: record.get(1).unwrap_or("").to_string(),
            descriptor,
            energy,
            generation,
        })?;
    }
    Ok(table)
}

/// Reads a table and checks that its descriptor columns equal `schema`.
pub fn read_table_with_schema(
    path: &Path,
    schema: &KeySchema,
) -> Result<EvaluationTable, TableError> {
    let table = read_table(path)?;
    if table.schema() != schema {
        return Err(TableError::SchemaMismatch {
            path: path.to_path_buf(),
        });
    }
    Ok(table)
}

/// Writes `material_id, cif_file, <keys...>, Energy, generation`.
pub fn write_table(path: &Path, table: &EvaluationTable) -> Result<(), TableError> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error(path))?;
    let mut header: Vec<&str> = vec![ID_COLUMN, CIF_COLUMN];
    header.extend(table.schema().keys().iter().map(String::as_str));
    header.push(ENERGY_COLUMN);
    header.push(GENERATION_COLUMN);
    writer.write_record(&header).map_err(csv_error(path))?;

    for record in table.records() {
        let mut row = vec![record.material_id.clone(), record.cif_file.clone()];
        row.extend(record.descriptor.iter().map(f64::to_string));
        row.push(record.energy.to_string());
        row.push(record.generation.to_string());
        writer.write_record(&row).map_err(csv_error(path))?;
    }
    writer.flush().map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes swarm candidates as `material_id, cif_file, <keys...>`.
pub fn write_candidates(
    path: &Path,
    schema: &KeySchema,
    candidates: &[Candidate],
) -> Result<(), TableError> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error(path))?;
    let mut header: Vec<&str> = vec![ID_COLUMN, CIF_COLUMN];
    header.extend(schema.keys().iter().map(String::as_str));
    writer.write_record(&header).map_err(csv_error(path))?;

    for candidate in candidates {
        schema.check_len(&candidate.descriptor)?;
        let mut row = vec![
            candidate.material_id.clone(),
            format!("{}.cif", candidate.material_id),
        ];
        row.extend(candidate.descriptor.iter().map(f64::to_string));
        writer.write_record(&row).map_err(csv_error(path))?;
    }
    writer.flush().map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_candidates(path: &Path) -> Result<(KeySchema, Vec<Candidate>), TableError> {
    let mut reader = csv::Reader::from_path(path).map_err(csv_error(path))?;
    let headers = reader.headers().map_err(csv_error(path))?.clone();
    let layout = parse_header(path, &headers, false)?;

    let mut candidates = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(csv_error(path))?;
        candidates.push(Candidate {
            material_id: record.get(0).unwrap_or("").to_string(),
            descriptor: parse_descriptor(path, row + 1, &record, &layout.schema)?,
        });
    }
    Ok((layout.schema, candidates))
}
