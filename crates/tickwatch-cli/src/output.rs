use std::io::Write;

use serde_json::Value;
use tickwatch_core::ApiResponse;

use crate::error::CliError;

/// Writes `envelope` to stdout as a single JSON document.
pub fn render(envelope: &ApiResponse<Value>, pretty: bool) -> Result<(), CliError> {
    let body = to_json(envelope, pretty)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{body}")?;
    Ok(())
}

fn to_json(envelope: &ApiResponse<Value>, pretty: bool) -> Result<String, CliError> {
    let body = if pretty {
        serde_json::to_string_pretty(envelope)?
    } else {
        serde_json::to_string(envelope)?
    };
    Ok(body)
}
