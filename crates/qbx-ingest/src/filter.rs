//! Client-side date window filter

use qbx_common::types::ExtractionWindow;
use serde_json::Value;

use crate::entity::DateField;

/// Length of a `YYYY-MM-DD` prefix
const DATE_PREFIX_LEN: usize = 10;

/// Date a record is filtered by: the first configured field with a value,
/// cut to its `YYYY-MM-DD` prefix.
pub fn comparison_date<'a>(record: &'a Value, fields: &[DateField]) -> Option<&'a str> {
    fields
        .iter()
        .find_map(|field| field.read(record))
        .map(|value| value.get(..DATE_PREFIX_LEN).unwrap_or(value))
}

/// Keep records whose comparison date falls inside the window.
///
/// Records with no usable date are dropped.
pub fn filter_by_window(
    records: Vec<Value>,
    window: &ExtractionWindow,
    fields: &[DateField],
) -> Vec<Value> {
    records
        .into_iter()
        .filter(|record| {
            comparison_date(record, fields).is_some_and(|date| window.contains(date))
        })
        .collect()
}
