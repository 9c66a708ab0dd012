use serde::Serialize;
use serde_json::Value;
use tickwatch_core::{ApiResponse, AssetType, CandlestickData, Timeframe};

use crate::cli::ChartArgs;
use crate::error::CliError;

use super::{into_value, Context};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChartResponseData {
    symbol: String,
    asset_type: AssetType,
    timeframe: Timeframe,
    candles: Vec<CandlestickData>,
}

pub async fn run(args: &ChartArgs, context: &Context) -> Result<ApiResponse<Value>, CliError> {
    let asset_type = args.asset.asset_type();
    let response = context
        .service
        .handle_chart(&args.asset.symbol, asset_type, args.timeframe)
        .await
        .map(|candles| ChartResponseData {
            symbol: args.asset.symbol.trim().to_owned(),
            asset_type,
            timeframe: args.timeframe,
            candles,
        });
    into_value(response)
}
