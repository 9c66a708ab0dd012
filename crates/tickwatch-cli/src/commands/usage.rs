use serde_json::Value;
use tickwatch_core::ApiResponse;

use crate::error::CliError;

use super::{into_value, Context};

/// Quota counters are process-local, so this reports a fresh window.
pub fn run(context: &Context) -> Result<ApiResponse<Value>, CliError> {
    into_value(context.service.handle_usage())
}
