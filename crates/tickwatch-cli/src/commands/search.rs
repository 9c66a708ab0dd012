use serde_json::Value;
use tickwatch_core::ApiResponse;

use crate::cli::SearchArgs;
use crate::error::CliError;

use super::{into_value, Context};

pub async fn run(args: &SearchArgs, context: &Context) -> Result<ApiResponse<Value>, CliError> {
    into_value(context.service.handle_search(&args.query).await)
}
