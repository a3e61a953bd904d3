//! 거래 백엔드 추상화.
//!
//! 전략 코드는 이 trait만 바라보므로 시뮬레이션 백엔드와 실거래 백엔드를
//! 같은 코드로 구동할 수 있습니다. 시뮬레이션은 지연 정산을 위해 조회
//! 연산에서도 내부 상태를 갱신하므로 모든 메서드가 `&mut self`입니다.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use backtest_core::{
    BacktestResult, Candle, Order, OrderKind, Price, Quantity, Side, TickerSnapshot, Timeframe,
};

use crate::ledger::BalanceSnapshot;

/// 주문과 시장 데이터를 제공하는 거래 백엔드.
pub trait TradingBackend {
    /// 주문을 생성하고 주문 ID를 반환합니다.
    fn create_order(
        &mut self,
        symbol: &str,
        side: Side,
        kind: OrderKind,
        amount: Quantity,
        limit_price: Option<Price>,
    ) -> BacktestResult<u64>;

    /// 미체결 주문을 취소합니다.
    fn cancel_order(&mut self, order_id: u64) -> BacktestResult<Order>;

    /// 주문 하나를 조회합니다.
    fn fetch_order(&mut self, order_id: u64) -> BacktestResult<Order>;

    /// 미체결 주문 목록을 조회합니다.
    fn fetch_open_orders(
        &mut self,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> BacktestResult<Vec<Order>>;

    /// 체결된 주문 목록을 조회합니다.
    fn fetch_closed_orders(
        &mut self,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> BacktestResult<Vec<Order>>;

    /// 자산별 잔고를 조회합니다.
    fn fetch_balance(&mut self) -> BacktestResult<BTreeMap<String, BalanceSnapshot>>;

    /// 현재 분의 시세 스냅샷을 조회합니다.
    fn fetch_ticker(&mut self, symbol: &str) -> BacktestResult<TickerSnapshot>;

    /// 과거 OHLCV 캔들을 조회합니다. 현재 시각 이후는 절대 반환하지
    /// 않습니다.
    fn fetch_ohlcv(
        &mut self,
        symbol: &str,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> BacktestResult<Vec<Candle>>;
}
