//! Cache directory key.
//!
//! The key covers only the inputs that change *what* a sub-query returns
//! for a given window. Time range and output options are excluded so runs
//! over different ranges share one cache directory.

/// Hex MD5 of the concatenated query-shaping inputs.
pub fn cache_key(
    fields: &str,
    type_field: &str,
    type_value: &str,
    extra_condition: &str,
    window_hours: u32,
) -> String {
    let base = format!("{fields}{type_field}{type_value}{extra_condition}{window_hours}");
    format!("{:x}", md5::compute(base.as_bytes()))
}

/// Short hex digest distinguishing cache files that share a base name.
pub fn short_digest(text: &str) -> String {
    let mut hex = format!("{:x}", md5::compute(text.as_bytes()));
    hex.truncate(8);
    hex
}
