use crate::core::io::traits::StructureFile;
use crate::core::models::structure::{Lattice, Species, Structure, StructureError};
use nalgebra::Vector3;
use std::io::{self, BufRead, Write};
use thiserror::Error;

const DEFAULT_COMMENT: &str = "Generated by apollox";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CoordinateMode {
    #[default]
    Direct,
    Cartesian,
}

impl CoordinateMode {
    fn from_marker(line: &str) -> Self {
        match line.trim_start().chars().next() {
            Some('C' | 'c' | 'K' | 'k') => CoordinateMode::Cartesian,
            _ => CoordinateMode::Direct,
        }
    }

    fn marker(self) -> &'static str {
        match self {
            CoordinateMode::Direct => "Direct",
            CoordinateMode::Cartesian => "Cartesian",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoscarMetadata {
    pub comment: String,
    pub coordinate_mode: CoordinateMode,
}

impl Default for PoscarMetadata {
    fn default() -> Self {
        Self {
            comment: DEFAULT_COMMENT.to_string(),
            coordinate_mode: CoordinateMode::Direct,
        }
    }
}

#[derive(Debug, Error)]
pub enum PoscarError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: usize,
        kind: PoscarParseErrorKind,
    },
    #[error("Invalid structure: {0}")]
    Structure(#[from] StructureError),
}

#[derive(Debug, Error, PartialEq)]
pub enum PoscarParseErrorKind {
    #[error("Unexpected end of file while reading {expected}")]
    UnexpectedEof { expected: &'static str },
    #[error("Invalid float value '{value}'")]
    InvalidFloat { value: String },
    #[error("Invalid atom count '{value}'")]
    InvalidCount { value: String },
    #[error("Expected {expected} values but found {found}")]
    WrongFieldCount { expected: usize, found: usize },
    #[error("Element symbol line is missing (VASP 4 files are not supported)")]
    MissingElementSymbols,
    #[error("{symbols} element symbols but {counts} atom counts")]
    SymbolCountMismatch { symbols: usize, counts: usize },
    #[error("Total atom count overflows")]
    AtomCountOverflow,
}

fn parse_error(line: usize, kind: PoscarParseErrorKind) -> PoscarError {
    PoscarError::Parse { line, kind }
}

struct LineCursor<I> {
    lines: I,
    line_num: usize,
}

impl<I: Iterator<Item = io::Result<String>>> LineCursor<I> {
    fn next(&mut self, expected: &'static str) -> Result<(usize, String), PoscarError> {
        loop {
            self.line_num += 1;
            match self.lines.next() {
                Some(line) => {
                    let line = line?;
                    // Blank lines are tolerated everywhere except the comment line.
                    if self.line_num > 1 && line.trim().is_empty() {
                        continue;
                    }
                    return Ok((self.line_num, line));
                }
                None => {
                    return Err(parse_error(
                        self.line_num,
                        PoscarParseErrorKind::UnexpectedEof { expected },
                    ));
                }
            }
        }
    }
}

fn parse_floats<const N: usize>(line_num: usize, line: &str) -> Result<[f64; N], PoscarError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < N {
        return Err(parse_error(
            line_num,
            PoscarParseErrorKind::WrongFieldCount {
                expected: N,
                found: fields.len(),
            },
        ));
    }
    let mut values = [0.0; N];
    for (value, field) in values.iter_mut().zip(&fields) {
        *value = field.parse().map_err(|_| {
            parse_error(
                line_num,
                PoscarParseErrorKind::InvalidFloat {
                    value: field.to_string(),
                },
            )
        })?;
    }
    Ok(values)
}

/// VASP-style structure file (`POSCAR`, `*.vasp`).
pub struct PoscarFile;

impl StructureFile for PoscarFile {
    type Metadata = PoscarMetadata;
    type Error = PoscarError;

    fn read_from(reader: &mut impl BufRead) -> Result<(Structure, Self::Metadata), Self::Error> {
        let mut cursor = LineCursor {
            lines: reader.lines(),
            line_num: 0,
        };

        let (_, comment) = cursor.next("comment line")?;

        let (scale_line, line) = cursor.next("scale factor")?;
        let [scale] = parse_floats::<1>(scale_line, &line)?;

        let mut rows = [[0.0; 3]; 3];
        for row in rows.iter_mut() {
            let (line_num, line) = cursor.next("lattice vector")?;
            *row = parse_floats::<3>(line_num, &line)?;
        }
        let unscaled = Lattice::from_rows(rows)?;
        // A negative scale factor is the target cell volume.
        let factor = if scale < 0.0 {
            (scale.abs() / unscaled.volume()).cbrt()
        } else {
            scale
        };
        let lattice = unscaled.scaled(factor)?;

        let (symbols_line, line) = cursor.next("element symbols")?;
        let symbols: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if symbols.iter().any(|s| s.parse::<f64>().is_ok()) {
            return Err(parse_error(
                symbols_line,
                PoscarParseErrorKind::MissingElementSymbols,
            ));
        }

        let (counts_line, line) = cursor.next("atom counts")?;
        let counts = line
            .split_whitespace()
            .map(|field| {
                field.parse::<usize>().map_err(|_| {
                    parse_error(
                        counts_line,
                        PoscarParseErrorKind::InvalidCount {
                            value: field.to_string(),
                        },
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if counts.len() != symbols.len() {
            return Err(parse_error(
                counts_line,
                PoscarParseErrorKind::SymbolCountMismatch {
                    symbols: symbols.len(),
                    counts: counts.len(),
                },
            ));
        }
        let species: Vec<Species> = symbols
            .into_iter()
            .zip(counts)
            .map(|(symbol, count)| Species::new(symbol, count))
            .collect();
        let total = species
            .iter()
            .try_fold(0usize, |acc, s| acc.checked_add(s.count))
            .ok_or_else(|| parse_error(counts_line, PoscarParseErrorKind::AtomCountOverflow))?;

        let (_, mut mode_line) = cursor.next("coordinate mode")?;
        if mode_line.trim_start().starts_with(['S', 's']) {
            mode_line = cursor.next("coordinate mode")?.1;
        }
        let coordinate_mode = CoordinateMode::from_marker(&mode_line);

        let mut coordinates = Vec::new();
        for _ in 0..total {
            let (line_num, line) = cursor.next("atomic coordinates")?;
            coordinates.push(Vector3::from(parse_floats::<3>(line_num, &line)?));
        }

        let structure = match coordinate_mode {
            CoordinateMode::Direct => Structure::from_fractional(lattice, species, &coordinates)?,
            CoordinateMode::Cartesian => {
                let positions = coordinates.into_iter().map(|c| c * factor).collect();
                Structure::new(lattice, species, positions)?
            }
        };

        Ok((
            structure,
            PoscarMetadata {
                comment: comment.trim().to_string(),
                coordinate_mode,
            },
        ))
    }

    fn write_to(
        structure: &Structure,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        writeln!(writer, "{}", metadata.comment)?;
        writeln!(writer, "1.0")?;
        for v in structure.lattice().vectors() {
            writeln!(writer, "  {:>22.16} {:>22.16} {:>22.16}", v.x, v.y, v.z)?;
        }
        let species = structure.species();
        let symbols: Vec<&str> = species.iter().map(|s| s.symbol.as_str()).collect();
        let counts: Vec<String> = species.iter().map(|s| s.count.to_string()).collect();
        writeln!(writer, "  {}", symbols.join(" "))?;
        writeln!(writer, "  {}", counts.join(" "))?;
        writeln!(writer, "{}", metadata.coordinate_mode.marker())?;

        let coordinates = match metadata.coordinate_mode {
            CoordinateMode::Direct => structure.fractional_positions(),
            CoordinateMode::Cartesian => structure.positions().to_vec(),
        };
        for c in coordinates {
            writeln!(writer, "  {:>22.16} {:>22.16} {:>22.16}", c.x, c.y, c.z)?;
        }
        Ok(())
    }
}
