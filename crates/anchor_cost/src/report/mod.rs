//! Report data structure (CSV and HTML are rendered by the anchor_cost_report crate).

use crate::stitch::Stitched;
use serde::Serialize;

/// Input to the report renderer: one stitched ledger plus the smoothing window
/// used for the fiat-fee trend column.
#[derive(Clone, Debug, Serialize)]
pub struct ReportData {
    pub stitched: Stitched,
    pub sma_window: usize,
    pub created_utc_rfc3339: String,
}

impl ReportData {
    pub fn new(stitched: Stitched, sma_window: usize) -> Self {
        let created_utc_rfc3339 = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        Self {
            stitched,
            sma_window,
            created_utc_rfc3339,
        }
    }
}
