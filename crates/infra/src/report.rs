//! Report actions handed to the client to render documents.

use serde::{Deserialize, Serialize};

use shipadvice_invoicing::InvoiceId;

pub const REPORT_ACTION_TYPE: &str = "ir.actions.report";
pub const INVOICE_REPORT: &str = "account.report_invoice";
pub const PDF_REPORT_TYPE: &str = "qweb-pdf";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportContext {
    pub active_ids: Vec<InvoiceId>,
}

/// Request to render `report_name` for the records in `context.active_ids`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub report_name: String,
    pub report_type: String,
    pub context: ReportContext,
}

impl ReportAction {
    pub fn new(report_name: impl Into<String>, active_ids: Vec<InvoiceId>) -> Self {
        Self {
            action_type: REPORT_ACTION_TYPE.to_string(),
            report_name: report_name.into(),
            report_type: PDF_REPORT_TYPE.to_string(),
            context: ReportContext { active_ids },
        }
    }

    /// PDF of the given invoices.
    pub fn invoices(ids: Vec<InvoiceId>) -> Self {
        Self::new(INVOICE_REPORT, ids)
    }

    pub fn active_ids(&self) -> &[InvoiceId] {
        &self.context.active_ids
    }
}
