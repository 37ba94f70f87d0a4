//! Run report: the (name, address) pairs a pipeline produced.

use comfy_table::{Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::deployer::ContractHandle;

/// One reported (label, value) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub label: String,
    pub value: String,
}

/// Collects report entries in call order for the duration of one run.
///
/// Append-only; rendered once at the end of the run.
#[derive(Debug, Default)]
pub struct Reporter {
    entries: Vec<ReportEntry>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Order-preserving.
    pub fn record(&mut self, label: impl Into<String>, value: impl ToString) {
        let entry = ReportEntry {
            label: label.into(),
            value: value.to_string(),
        };
        tracing::debug!(label = %entry.label, value = %entry.value, "report entry recorded");
        self.entries.push(entry);
    }

    /// Append a (contract name, address) entry for a deployed contract.
    pub fn record_contract(&mut self, handle: &ContractHandle) {
        self.record(handle.name.clone(), handle.address);
    }

    /// All entries recorded so far, in call order.
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the report as a terminal table. Pure projection, no mutation.
    pub fn render(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec!["Contract", "Address"]);
        for entry in &self.entries {
            table.add_row(vec![entry.label.clone(), entry.value.clone()]);
        }
        table.to_string()
    }
}
