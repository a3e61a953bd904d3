//! 시뮬레이션 거래소 백엔드.
//!
//! [`MatchingEngine`] 위에 시장 데이터 조회(`fetch_ticker`, `fetch_ohlcv`)를
//! 얹은 완전한 백엔드입니다. 주문용 시계열은 저가/고가만 있으면 되지만
//! 시장 데이터 조회는 다섯 컬럼 전체를 요구하므로 별도 검증본을 보관합니다.
//!
//! 모든 시장 데이터는 현재 시뮬레이션 시각으로 잘립니다. 미래 바를
//! 요구하는 조회는 `BadRequest`로 거부됩니다.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use backtest_core::{
    BacktestError, BacktestResult, Candle, Market, Order, OrderKind, Price, Quantity,
    TickerSnapshot, Timeframe, Side,
};

use crate::ledger::{BalanceCheck, BalanceSnapshot};
use crate::matching::{MatchingEngine, SharedClock};
use crate::series::{ceil_to, floor_minute, Column, PriceSeries, RawSeries};
use crate::traits::TradingBackend;

/// `fetch_ohlcv`의 기본 캔들 개수.
const DEFAULT_OHLCV_LIMIT: usize = 5;

/// 주문 매칭과 시장 데이터를 모두 제공하는 시뮬레이션 거래소.
#[derive(Debug)]
pub struct BacktestExchange {
    engine: MatchingEngine,
    clock: SharedClock,
    /// 시장 데이터 조회용 시계열 (다섯 컬럼 전체 검증)
    series: HashMap<String, PriceSeries>,
}

impl BacktestExchange {
    /// 새 시뮬레이션 거래소를 생성합니다.
    pub fn new(
        clock: SharedClock,
        balances: &HashMap<String, Decimal>,
        ohlcv: &HashMap<String, RawSeries>,
        markets: HashMap<String, Market>,
        check: BalanceCheck,
    ) -> BacktestResult<Self> {
        let engine = MatchingEngine::new(clock.clone(), balances, ohlcv, markets, check)?;
        let (start, end) = {
            let clock = clock.borrow();
            (clock.start(), clock.end())
        };

        let mut series = HashMap::with_capacity(ohlcv.len());
        for (symbol, raw) in ohlcv {
            let validated = PriceSeries::validate(raw, start, end, &Column::ALL)?;
            series.insert(symbol.clone(), validated);
        }

        Ok(Self {
            engine,
            clock,
            series,
        })
    }

    /// 드라이버와 공유하는 시계 핸들을 반환합니다.
    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    /// 주문을 생성합니다.
    pub fn create_order(
        &mut self,
        symbol: &str,
        side: Side,
        kind: OrderKind,
        amount: Quantity,
        limit_price: Option<Price>,
    ) -> BacktestResult<u64> {
        self.engine.create_order(symbol, side, kind, amount, limit_price)
    }

    /// 미체결 주문을 취소합니다.
    pub fn cancel_order(&mut self, order_id: u64) -> BacktestResult<Order> {
        self.engine.cancel_order(order_id)
    }

    /// 주문 하나를 조회합니다.
    pub fn fetch_order(&mut self, order_id: u64) -> BacktestResult<Order> {
        self.engine.fetch_order(order_id)
    }

    /// 미체결 주문 목록을 조회합니다.
    pub fn fetch_open_orders(
        &mut self,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> BacktestResult<Vec<Order>> {
        self.engine.fetch_open_orders(symbol, since, limit)
    }

    /// 체결된 주문 목록을 조회합니다.
    pub fn fetch_closed_orders(
        &mut self,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> BacktestResult<Vec<Order>> {
        self.engine.fetch_closed_orders(symbol, since, limit)
    }

    /// 자산별 잔고를 조회합니다.
    pub fn fetch_balance(&mut self) -> BacktestResult<BTreeMap<String, BalanceSnapshot>> {
        self.engine.fetch_balance()
    }

    /// 현재 분의 시세 스냅샷을 조회합니다.
    ///
    /// 호가창을 모델링하지 않으므로 미시구조 필드는 항상 `None`입니다.
    pub fn fetch_ticker(&mut self, symbol: &str) -> BacktestResult<TickerSnapshot> {
        let series = self
            .series
            .get(symbol)
            .ok_or_else(|| BacktestError::UnknownSymbol(format!("no prices for {}", symbol)))?;
        let current = floor_minute(self.clock.borrow().now());
        let bar = series.bar_at(current).ok_or_else(|| {
            BacktestError::Data(format!("no bar for {} at {}", symbol, current))
        })?;
        Ok(TickerSnapshot::from_bar(
            symbol,
            current,
            bar.require(Column::Open)?,
            bar.require(Column::High)?,
            bar.require(Column::Low)?,
            bar.require(Column::Close)?,
        ))
    }

    /// 과거 OHLCV 캔들을 리샘플링해 조회합니다.
    ///
    /// `since`는 타임프레임 경계로 올림되고, 조회 구간이 현재 바를 넘어
    /// 미래에 닿으면 `BadRequest`입니다. 마지막 캔들은 현재 분까지만
    /// 집계된 부분 캔들일 수 있습니다.
    pub fn fetch_ohlcv(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> BacktestResult<Vec<Candle>> {
        let series = self
            .series
            .get(symbol)
            .ok_or_else(|| BacktestError::UnknownSymbol(format!("no prices for {}", symbol)))?;
        let current = floor_minute(self.clock.borrow().now());
        let limit = limit.unwrap_or(DEFAULT_OHLCV_LIMIT);
        let bar_size = timeframe.interval();
        let one_minute = Duration::minutes(1);

        let start_of_data = series.first_timestamp().ok_or_else(|| {
            BacktestError::Data(format!("series for {} is empty", symbol))
        })?;
        let since = ceil_to(since.unwrap_or(start_of_data), bar_size);
        if since < start_of_data {
            return Err(BacktestError::BadRequest(
                "fetch_ohlcv: no date available at since".to_string(),
            ));
        }
        // i32 범위를 넘는 limit은 어차피 미래에 닿으므로 같은 사유로 거부한다.
        let limit = i32::try_from(limit).map_err(|_| {
            BacktestError::BadRequest(
                "fetch_ohlcv: since + limit * timeframe needs to be in the past".to_string(),
            )
        })?;
        let until = since + bar_size * limit - one_minute;
        if until >= current + bar_size {
            return Err(BacktestError::BadRequest(
                "fetch_ohlcv: since + limit * timeframe needs to be in the past".to_string(),
            ));
        }
        let until = until.min(current);

        let mut candles = Vec::new();
        let mut window_start = since;
        while window_start <= until {
            let window_end = (window_start + bar_size - one_minute).min(until);
            let bars = series.range(window_start, window_end);
            if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
                let mut high = first.require(Column::High)?;
                let mut low = first.require(Column::Low)?;
                let mut volume = Decimal::ZERO;
                for bar in bars {
                    high = high.max(bar.require(Column::High)?);
                    low = low.min(bar.require(Column::Low)?);
                    volume += bar.require(Column::Volume)?;
                }
                candles.push(Candle {
                    timestamp: window_start,
                    open: first.require(Column::Open)?,
                    high,
                    low,
                    close: last.require(Column::Close)?,
                    volume,
                });
            }
            window_start += bar_size;
        }
        Ok(candles)
    }
}

impl TradingBackend for BacktestExchange {
    fn create_order(
        &mut self,
        symbol: &str,
        side: Side,
        kind: OrderKind,
        amount: Quantity,
        limit_price: Option<Price>,
    ) -> BacktestResult<u64> {
        BacktestExchange::create_order(self, symbol, side, kind, amount, limit_price)
    }

    fn cancel_order(&mut self, order_id: u64) -> BacktestResult<Order> {
        BacktestExchange::cancel_order(self, order_id)
    }

    fn fetch_order(&mut self, order_id: u64) -> BacktestResult<Order> {
        BacktestExchange::fetch_order(self, order_id)
    }

    fn fetch_open_orders(
        &mut self,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> BacktestResult<Vec<Order>> {
        BacktestExchange::fetch_open_orders(self, symbol, since, limit)
    }

    fn fetch_closed_orders(
        &mut self,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> BacktestResult<Vec<Order>> {
        BacktestExchange::fetch_closed_orders(self, symbol, since, limit)
    }

    fn fetch_balance(&mut self) -> BacktestResult<BTreeMap<String, BalanceSnapshot>> {
        BacktestExchange::fetch_balance(self)
    }

    fn fetch_ticker(&mut self, symbol: &str) -> BacktestResult<TickerSnapshot> {
        BacktestExchange::fetch_ticker(self, symbol)
    }

    fn fetch_ohlcv(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> BacktestResult<Vec<Candle>> {
        BacktestExchange::fetch_ohlcv(self, symbol, timeframe, since, limit)
    }
}
