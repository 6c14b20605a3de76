use std::path::Path;

use crate::error::{LdscError, Result};

pub fn check_equal_length(
    left_len: usize,
    right_len: usize,
    left_name: &str,
    right_name: &str,
) -> Result<()> {
    if left_len != right_len {
        return Err(LdscError::InvalidArgument(format!(
            "Must specify either no {right_name} or one value for each entry in {left_name} \
             (got {right_len} for {left_len})"
        )));
    }
    Ok(())
}

/// Checks `min < value < max` when `exclusive`, `min <= value <= max` otherwise.
pub fn check_range_f64(value: f64, min: f64, max: f64, exclusive: bool, name: &str) -> Result<()> {
    if !value.is_finite() {
        return Err(LdscError::InvalidArgument(format!(
            "Value of {name} should be finite"
        )));
    }
    let below = if exclusive { value <= min } else { value < min };
    let above = if exclusive { value >= max } else { value > max };
    if below {
        return Err(LdscError::InvalidArgument(format!(
            "Value of {name} should be above {min}"
        )));
    }
    if above {
        return Err(LdscError::InvalidArgument(format!(
            "Value of {name} should be below {max}"
        )));
    }
    Ok(())
}

pub fn check_file_exists(path: &Path, name: &str) -> Result<()> {
    if !path.exists() {
        return Err(LdscError::InvalidArgument(format!(
            "File {path:?} passed to {name} does not exist"
        )));
    }
    Ok(())
}

pub fn check_min_rows(rows: usize, min_rows: usize, stage: &str) -> Result<()> {
    if rows < min_rows {
        return Err(LdscError::empty_stage(
            stage,
            format!("{rows} SNPs remain, at least {min_rows} required"),
        ));
    }
    Ok(())
}
