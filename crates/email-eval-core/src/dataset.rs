//! Email evaluation dataset.
//!
//! The dataset is stored column-wise (five parallel lists, the layout the
//! dataset authors maintain) and zipped into [`DatasetRow`]s exactly once,
//! after checking that every column has the same length. Rows are immutable
//! and identified by their index.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{ConfigError, EmailInput, EvalError, Result, TriageLabel};

const BUILTIN_DATASET: &str = include_str!("../data/email_dataset.json");

/// Column-oriented on-disk layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetColumns {
    pub email_inputs: Vec<EmailInput>,
    pub email_names: Vec<String>,
    pub response_criteria_list: Vec<String>,
    pub triage_outputs_list: Vec<TriageLabel>,
    pub expected_tool_calls: Vec<Vec<String>>,
}

/// One aligned dataset entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetRow {
    pub index: usize,
    pub email_input: EmailInput,
    pub name: String,
    pub criteria: String,
    pub expected_triage: TriageLabel,
    pub expected_tool_calls: Vec<String>,
}

/// A row selected for tool-call evaluation (expected triage is `respond`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseCase {
    pub index: usize,
    pub email_input: EmailInput,
    pub name: String,
    pub criteria: String,
    pub expected_calls: Vec<String>,
}

impl From<&DatasetRow> for ResponseCase {
    fn from(row: &DatasetRow) -> Self {
        Self {
            index: row.index,
            email_input: row.email_input.clone(),
            name: row.name.clone(),
            criteria: row.criteria.clone(),
            expected_calls: row.expected_tool_calls.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailDataset {
    rows: Vec<DatasetRow>,
    digest: String,
}

impl EmailDataset {
    /// Zip five parallel columns into rows. Fails if lengths diverge.
    pub fn from_columns(
        email_inputs: Vec<EmailInput>,
        email_names: Vec<String>,
        response_criteria_list: Vec<String>,
        triage_outputs_list: Vec<TriageLabel>,
        expected_tool_calls: Vec<Vec<String>>,
    ) -> Result<Self> {
        Self::from_dataset_columns(DatasetColumns {
            email_inputs,
            email_names,
            response_criteria_list,
            triage_outputs_list,
            expected_tool_calls,
        })
    }

    pub fn from_dataset_columns(columns: DatasetColumns) -> Result<Self> {
        let n = columns.email_inputs.len();
        if columns.email_names.len() != n
            || columns.response_criteria_list.len() != n
            || columns.triage_outputs_list.len() != n
            || columns.expected_tool_calls.len() != n
        {
            return Err(ConfigError::MisalignedDataset {
                inputs: n,
                names: columns.email_names.len(),
                criteria: columns.response_criteria_list.len(),
                triage: columns.triage_outputs_list.len(),
                tool_calls: columns.expected_tool_calls.len(),
            }
            .into());
        }

        let digest = {
            let bytes = serde_json::to_vec(&columns)?;
            hex::encode(Sha256::digest(&bytes))
        };

        let DatasetColumns {
            email_inputs,
            email_names,
            response_criteria_list,
            triage_outputs_list,
            expected_tool_calls,
        } = columns;

        let rows = email_inputs
            .into_iter()
            .zip(email_names)
            .zip(response_criteria_list)
            .zip(triage_outputs_list)
            .zip(expected_tool_calls)
            .enumerate()
            .map(
                |(index, ((((email_input, name), criteria), expected_triage), expected_tool_calls))| {
                    DatasetRow {
                        index,
                        email_input,
                        name,
                        criteria,
                        expected_triage,
                        expected_tool_calls,
                    }
                },
            )
            .collect();

        Ok(Self { rows, digest })
    }

    /// Parse the column-oriented JSON layout.
    pub fn from_json(raw: &str) -> Result<Self> {
        let columns: DatasetColumns = serde_json::from_str(raw)
            .map_err(|e| EvalError::from(ConfigError::InvalidDataset(e.to_string())))?;
        Self::from_dataset_columns(columns)
    }

    /// The dataset bundled with this crate.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_DATASET)
    }

    /// Load a dataset file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn rows(&self) -> &[DatasetRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// SHA-256 hex digest of the dataset columns.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Rows whose expected triage is `respond`. Tool-call behavior is only
    /// meaningful when the assistant is expected to act.
    pub fn response_cases(&self) -> Vec<ResponseCase> {
        let cases: Vec<ResponseCase> = self
            .rows
            .iter()
            .filter(|row| row.expected_triage == TriageLabel::Respond)
            .map(ResponseCase::from)
            .collect();
        tracing::debug!(
            cases = cases.len(),
            total = self.rows.len(),
            "selected emails requiring responses"
        );
        cases
    }
}
