use crate::core::models::structure::Structure;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading and writing periodic structure file formats.
///
/// Implementors handle format-specific parsing and serialization, while the
/// path-based helpers take care of opening and buffering files.
pub trait StructureFile {
    /// Format-specific information that is not part of [`Structure`] but is
    /// needed to write a file back faithfully (comment line, coordinate mode).
    type Metadata: Default;

    /// The error type for I/O and parse failures.
    type Error: Error + From<io::Error>;

    /// Reads a structure and its metadata from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or the reader fails.
    fn read_from(reader: &mut impl BufRead) -> Result<(Structure, Self::Metadata), Self::Error>;

    /// Writes a structure using the given metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_to(
        structure: &Structure,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error>;

    /// Reads a structure from a file path.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<(Structure, Self::Metadata), Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    /// Writes a structure with metadata to a file path.
    fn write_to_path<P: AsRef<Path>>(
        structure: &Structure,
        metadata: &Self::Metadata,
        path: P,
    ) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(structure, metadata, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Writes a structure to a file path with default metadata.
    fn write_structure_to_path<P: AsRef<Path>>(
        structure: &Structure,
        path: P,
    ) -> Result<(), Self::Error> {
        Self::write_to_path(structure, &Self::Metadata::default(), path)
    }
}
