use serde_json::Value;
use tickwatch_core::ApiResponse;

use crate::cli::AssetArgs;
use crate::error::CliError;

use super::{into_value, Context};

pub async fn run(args: &AssetArgs, context: &Context) -> Result<ApiResponse<Value>, CliError> {
    let response = context
        .service
        .handle_details(&args.symbol, args.asset_type())
        .await;
    into_value(response)
}
