//! Raw CSV row as handed from the parser to the Row Matcher

use serde::{Deserialize, Serialize};

/// One data row of an import file
///
/// Values are trimmed but otherwise unvalidated; the Row Matcher decides
/// whether the row is well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    /// 1-based position among data rows
    pub row_index: u32,
    pub artist: String,
    pub album: String,
    pub format: String,
    pub year: Option<String>,
    pub external_id: Option<String>,
    pub catalog_number: Option<String>,
    pub media_condition: Option<String>,
    pub sleeve_condition: Option<String>,
}
