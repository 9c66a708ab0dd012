//! The displayed candlestick series and chart UI mode.
//!
//! One `(asset, timeframe)` pair at a time. Changing either clears the data
//! and starts a new selection; a fetch that resolves after its selection was
//! replaced is dropped, even when the user has since returned to the same pair.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tickwatch_core::{
    normalize_series, ApiError, Asset, CandlestickData, Clock, ErrorState, MarketApi, Timeframe,
    UtcDateTime,
};
use tokio::sync::watch;
use tracing::debug;

use crate::FetchOutcome;

pub const DEFAULT_MAX_DATA_AGE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartState {
    pub current_asset: Option<Asset>,
    pub timeframe: Timeframe,
    pub data: Vec<CandlestickData>,
    pub loading: bool,
    pub error: Option<ErrorState>,
    pub last_updated: Option<UtcDateTime>,
    pub modal_open: bool,
    pub fullscreen: bool,
    #[serde(skip)]
    selection: u64,
}

impl Default for ChartState {
    fn default() -> Self {
        Self {
            current_asset: None,
            timeframe: Timeframe::OneDay,
            data: Vec::new(),
            loading: false,
            error: None,
            last_updated: None,
            modal_open: false,
            fullscreen: false,
            selection: 0,
        }
    }
}

impl ChartState {
    fn is_showing(&self, asset: &Asset, timeframe: Timeframe) -> bool {
        self.timeframe == timeframe && self.current_asset.as_ref() == Some(asset)
    }

    fn invalidate(&mut self) {
        self.data.clear();
        self.last_updated = None;
        self.error = None;
        self.loading = false;
    }

    fn reselect(&mut self) {
        self.invalidate();
        self.selection = self.selection.wrapping_add(1);
    }
}

pub struct ChartStore {
    clock: Arc<dyn Clock>,
    state: watch::Sender<ChartState>,
}

impl ChartStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: watch::Sender::new(ChartState::default()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChartState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ChartState {
        self.state.borrow().clone()
    }

    pub fn set_current_asset(&self, asset: Option<Asset>) {
        self.state.send_modify(|state| {
            if state.current_asset != asset {
                state.current_asset = asset;
                state.reselect();
            }
        });
    }

    pub fn set_timeframe(&self, timeframe: Timeframe) {
        self.state.send_modify(|state| {
            if state.timeframe != timeframe {
                state.timeframe = timeframe;
                state.reselect();
            }
        });
    }

    /// Stores `candles` sorted ascending with unique timestamps.
    pub fn set_data(&self, candles: Vec<CandlestickData>) {
        let data = normalize_series(candles);
        let now = self.clock.now();
        self.state.send_modify(|state| {
            state.data = data;
            state.last_updated = Some(now);
            state.loading = false;
            state.error = None;
        });
    }

    /// Upserts live candles into the current series.
    pub fn merge_data(&self, candles: Vec<CandlestickData>) {
        if candles.is_empty() {
            return;
        }
        let now = self.clock.now();
        self.state.send_modify(|state| {
            let mut merged = std::mem::take(&mut state.data);
            merged.extend(candles);
            state.data = normalize_series(merged);
            state.last_updated = Some(now);
        });
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.loading != loading;
            state.loading = loading;
            changed
        });
    }

    pub fn set_error(&self, error: Option<ErrorState>) {
        self.state.send_modify(|state| {
            state.error = error;
            state.loading = false;
        });
    }

    /// Selects `asset` and `timeframe` and opens the modal in one update.
    pub fn open_modal(&self, asset: Asset, timeframe: Option<Timeframe>) {
        let timeframe = timeframe.unwrap_or(Timeframe::OneDay);
        self.state.send_modify(|state| {
            if !state.is_showing(&asset, timeframe) {
                state.reselect();
            }
            state.current_asset = Some(asset);
            state.timeframe = timeframe;
            state.modal_open = true;
        });
    }

    pub fn close_modal(&self) {
        self.state.send_modify(|state| {
            state.modal_open = false;
            state.fullscreen = false;
        });
    }

    pub fn toggle_fullscreen(&self) {
        self.state.send_modify(|state| state.fullscreen = !state.fullscreen);
    }

    pub fn set_fullscreen(&self, fullscreen: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.fullscreen != fullscreen;
            state.fullscreen = fullscreen;
            changed
        });
    }

    pub fn clear_data(&self) {
        self.state.send_modify(ChartState::invalidate);
    }

    /// True when nothing was loaded yet or the data is older than `max_age`
    /// (five minutes by default).
    pub fn is_data_stale(&self, max_age: Option<Duration>) -> bool {
        let max_age = max_age.unwrap_or(DEFAULT_MAX_DATA_AGE);
        let state = self.state.borrow();
        match state.last_updated {
            None => true,
            Some(updated) => self.clock.now().duration_since(updated) > max_age,
        }
    }

    /// Loads the series for the current selection.
    ///
    /// The result is applied only if no other selection was made while the
    /// request was in flight.
    pub async fn fetch(&self, api: &dyn MarketApi) -> FetchOutcome {
        let (asset, timeframe, selection) = {
            let state = self.state.borrow();
            match &state.current_asset {
                Some(asset) => (asset.clone(), state.timeframe, state.selection),
                None => return FetchOutcome::Idle,
            }
        };

        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });
        let result = api.chart(&asset.symbol, asset.asset_type, timeframe).await;

        if self.state.borrow().selection != selection {
            debug!(symbol = %asset.symbol, %timeframe, "discarding stale chart response");
            return FetchOutcome::Discarded;
        }
        self.apply(result)
    }

    /// Applies a resolved fetch for `(asset, timeframe)`, or drops it when
    /// the selection has moved on.
    pub fn commit(
        &self,
        asset: &Asset,
        timeframe: Timeframe,
        result: Result<Vec<CandlestickData>, ApiError>,
    ) -> FetchOutcome {
        if !self.state.borrow().is_showing(asset, timeframe) {
            debug!(symbol = %asset.symbol, %timeframe, "discarding stale chart response");
            return FetchOutcome::Discarded;
        }
        self.apply(result)
    }

    fn apply(&self, result: Result<Vec<CandlestickData>, ApiError>) -> FetchOutcome {
        match result {
            Ok(candles) => self.set_data(candles),
            Err(error) => self.set_error(Some(error.to_error_state(self.clock.now()))),
        }
        FetchOutcome::Applied
    }
}
