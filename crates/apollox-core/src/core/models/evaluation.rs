use crate::core::descriptor::{DescriptorError, KeySchema};
use std::collections::HashSet;

/// Builds the identifier of the `index`-th candidate of `generation`.
///
/// Identifiers are unique within a generation as long as indices are.
pub fn material_id(formula: &str, generation: u32, index: usize) -> String {
    format!("POSCAR-{formula}-{generation}_{index}")
}

/// A descriptor vector proposed by the swarm, not yet evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub material_id: String,
    pub descriptor: Vec<f64>,
}

/// One successfully relaxed and described structure.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRecord {
    pub material_id: String,
    pub cif_file: String,
    pub descriptor: Vec<f64>,
    pub energy: f64,
    pub generation: u32,
}

impl EvaluationRecord {
    pub fn new(
        material_id: impl Into<String>,
        descriptor: Vec<f64>,
        energy: f64,
        generation: u32,
    ) -> Self {
        let material_id = material_id.into();
        Self {
            cif_file: format!("{material_id}.cif"),
            material_id,
            descriptor,
            energy,
            generation,
        }
    }
}

/// Evaluation records sharing one pinned [`KeySchema`], in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationTable {
    schema: KeySchema,
    records: Vec<EvaluationRecord>,
}

impl EvaluationTable {
    pub fn new(schema: KeySchema) -> Self {
        Self {
            schema,
            records: Vec::new(),
        }
    }

    pub fn with_records(
        schema: KeySchema,
        records: Vec<EvaluationRecord>,
    ) -> Result<Self, DescriptorError> {
        let mut table = Self::new(schema);
        for record in records {
            table.push(record)?;
        }
        Ok(table)
    }

    pub fn schema(&self) -> &KeySchema {
        &self.schema
    }

    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<EvaluationRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, material_id: &str) -> bool {
        self.records.iter().any(|r| r.material_id == material_id)
    }

    /// Appends a record without deduplication.
    pub fn push(&mut self, record: EvaluationRecord) -> Result<(), DescriptorError> {
        self.schema.check_len(&record.descriptor)?;
        self.records.push(record);
        Ok(())
    }

    /// Unions `incoming` into the table, keeping the first record seen for each
    /// material identifier. Returns the number of records actually added.
    pub fn merge_dedup<I>(&mut self, incoming: I) -> Result<usize, DescriptorError>
    where
        I: IntoIterator<Item = EvaluationRecord>,
    {
        let mut seen: HashSet<String> =
            self.records.iter().map(|r| r.material_id.clone()).collect();
        let before = self.records.len();
        for record in incoming {
            if seen.contains(&record.material_id) {
                continue;
            }
            self.schema.check_len(&record.descriptor)?;
            seen.insert(record.material_id.clone());
            self.records.push(record);
        }
        Ok(self.records.len() - before)
    }

    /// Removes and returns up to `n` records from the front.
    pub fn take_front(&mut self, n: usize) -> Vec<EvaluationRecord> {
        let n = n.min(self.records.len());
        self.records.drain(..n).collect()
    }

    /// A new table holding clones of the first `n` records.
    pub fn head(&self, n: usize) -> Self {
        Self {
            schema: self.schema.clone(),
            records: self.records.iter().take(n).cloned().collect(),
        }
    }

    pub fn descriptors(&self) -> Vec<Vec<f64>> {
        self.records.iter().map(|r| r.descriptor.clone()).collect()
    }

    pub fn energies(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.energy).collect()
    }

    /// The record with the lowest energy, if any.
    pub fn best(&self) -> Option<&EvaluationRecord> {
        self.records
            .iter()
            .min_by(|a, b| a.energy.total_cmp(&b.energy))
    }
}
