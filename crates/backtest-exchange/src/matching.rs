//! 주문 매칭 엔진.
//!
//! 엔진은 백그라운드 타이머 없이 지연 정산 방식으로 동작합니다.
//! 상태를 관찰하는 모든 연산은 먼저 [`MatchingEngine::settle`]을 호출해
//! 현재 시각까지 도래한 지정가 체결을 반영합니다. 덕분에 호출자는 언제
//! 시계를 전진시키든 항상 일관된 상태를 봅니다.
//!
//! 체결 가격 규칙:
//! - 시장가 매수: 현재 바 고가 x (1 + 0.0015)
//! - 시장가 매도: 현재 바 저가 x (1 - 0.0015)
//! - 지정가: 지정 가격 그대로, 현재 바 이후 처음 도달하는 바에서
//!
//! 현재 바의 저가/고가로 지정가를 즉시 체결하지 않는 것은 룩어헤드
//! 편향을 막기 위한 의도된 동작입니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use backtest_core::{
    BacktestError, BacktestResult, Market, Order, OrderKind, OrderStatus, Percentage, Price,
    Quantity, Side, SimulationClock,
};

use crate::ledger::{BalanceCheck, BalanceSnapshot, Ledger};
use crate::series::{floor_minute, Column, PriceSeries, RawSeries};

/// 드라이버와 엔진이 공유하는 시뮬레이션 시계.
pub type SharedClock = Rc<RefCell<SimulationClock>>;

/// 시장가 주문 슬리피지율 (0.15%).
const MARKET_SLIPPAGE: Decimal = dec!(0.0015);

/// 미체결 지정가 주문의 체결 대기 레코드.
#[derive(Debug, Clone)]
struct PendingFill {
    limit_price: Price,
    amount: Quantity,
    side: Side,
    base: String,
    quote: String,
    fee_rate: Percentage,
    /// 주문 생성 시점에 미리 계산한 체결 시각. 시계열에 도달 바가 없으면
    /// `None`이며 영원히 미체결로 남습니다.
    fillable_at: Option<DateTime<Utc>>,
}

/// 주문 매칭 엔진.
///
/// 단일 스레드 동기 구조이며 시계는 드라이버와 `Rc<RefCell>`로 공유합니다.
/// 주문 ID는 1부터 단조 증가하고, 검증에 실패한 생성 요청은 ID를 소비하지
/// 않습니다.
#[derive(Debug)]
pub struct MatchingEngine {
    clock: SharedClock,
    ledger: Ledger,
    series: HashMap<String, PriceSeries>,
    markets: HashMap<String, Market>,
    orders: BTreeMap<u64, Order>,
    pending: BTreeMap<u64, PendingFill>,
    /// 전역에서 가장 이른 (체결 시각, 주문 ID). 정산 루프의 시작점입니다.
    next_due: Option<(DateTime<Utc>, u64)>,
    last_order_id: u64,
}

impl MatchingEngine {
    /// 새 매칭 엔진을 생성합니다.
    ///
    /// 모든 시계열은 시뮬레이션 구간을 커버해야 하며 저가/고가 컬럼이
    /// 필수입니다. 검증 실패 시 엔진은 생성되지 않습니다.
    pub fn new(
        clock: SharedClock,
        balances: &HashMap<String, Decimal>,
        ohlcv: &HashMap<String, RawSeries>,
        markets: HashMap<String, Market>,
        check: BalanceCheck,
    ) -> BacktestResult<Self> {
        let ledger = Ledger::with_balances(balances, check)?;
        let (start, end) = {
            let clock = clock.borrow();
            (clock.start(), clock.end())
        };

        let mut series = HashMap::with_capacity(ohlcv.len());
        for (symbol, raw) in ohlcv {
            let validated =
                PriceSeries::validate(raw, start, end, &[Column::Low, Column::High])?;
            series.insert(symbol.clone(), validated);
        }

        Ok(Self {
            clock,
            ledger,
            series,
            markets,
            orders: BTreeMap::new(),
            pending: BTreeMap::new(),
            next_due: None,
            last_order_id: 0,
        })
    }

    /// 현재 시각까지 도래한 지정가 체결을 모두 반영합니다.
    ///
    /// 같은 시각에 체결되는 주문은 생성 순서(주문 ID 순)로 정산됩니다.
    pub fn settle(&mut self) -> BacktestResult<()> {
        let now = self.clock.borrow().now();
        while let Some((due, order_id)) = self.next_due {
            if due > now {
                break;
            }
            self.fill_pending(order_id, due)?;
            self.refresh_next_due();
        }

        // 지나간 바는 체결 판단에 다시 쓰이지 않으므로 잊습니다.
        let horizon = floor_minute(now);
        for series in self.series.values_mut() {
            series.forget_before(horizon);
        }
        Ok(())
    }

    /// 주문을 생성합니다.
    ///
    /// 시장가 주문은 현재 바 가격으로 즉시 체결되고, 지정가 주문은 해당
    /// 자산을 예약한 뒤 미체결로 등록됩니다. 검증이나 잔고 확보에 실패하면
    /// 엔진 상태는 변하지 않습니다.
    pub fn create_order(
        &mut self,
        symbol: &str,
        side: Side,
        kind: OrderKind,
        amount: Quantity,
        limit_price: Option<Price>,
    ) -> BacktestResult<u64> {
        self.settle()?;

        let price = match kind {
            OrderKind::Market => {
                if limit_price.is_some() {
                    return Err(BacktestError::InvalidOrder(
                        "market order has no price".to_string(),
                    ));
                }
                None
            }
            OrderKind::Limit => {
                let price = limit_price.ok_or_else(|| {
                    BacktestError::BadRequest("price needs to be a number".to_string())
                })?;
                if price <= Decimal::ZERO {
                    return Err(BacktestError::BadRequest(
                        "price needs to be positive".to_string(),
                    ));
                }
                Some(price)
            }
        };

        let market = self.markets.get(symbol).ok_or_else(|| {
            BacktestError::InvalidOrder(format!("market {} does not exist", symbol))
        })?;
        let base = market
            .base
            .clone()
            .ok_or_else(|| BacktestError::BadRequest(format!("market {} has no base", symbol)))?;
        let quote = market
            .quote
            .clone()
            .ok_or_else(|| BacktestError::BadRequest(format!("market {} has no quote", symbol)))?;
        let fee_rate = match kind {
            OrderKind::Market => market.taker,
            OrderKind::Limit => market.maker,
        }
        .unwrap_or(Decimal::ZERO);

        if !self.series.contains_key(symbol) {
            return Err(BacktestError::InvalidOrder(format!(
                "no prices available for {}",
                symbol
            )));
        }
        if amount <= Decimal::ZERO {
            return Err(BacktestError::BadRequest(
                "amount needs to be positive".to_string(),
            ));
        }

        let now = self.clock.borrow().now();
        match price {
            None => self.execute_market_order(symbol, side, amount, base, quote, fee_rate, now),
            Some(price) => {
                self.open_limit_order(symbol, side, amount, price, base, quote, fee_rate, now)
            }
        }
    }

    /// 미체결 주문을 취소하고 예약을 해제합니다.
    pub fn cancel_order(&mut self, order_id: u64) -> BacktestResult<Order> {
        self.settle()?;

        let status = self
            .orders
            .get(&order_id)
            .ok_or_else(|| {
                BacktestError::OrderNotFound(format!("order {} does not exist", order_id))
            })?
            .status;
        if status.is_final() {
            return Err(BacktestError::BadRequest(format!(
                "cannot cancel {} order {}",
                status, order_id
            )));
        }

        let pending = self.pending.remove(&order_id).ok_or_else(|| {
            BacktestError::Data(format!("pending record for order {} is missing", order_id))
        })?;
        self.release_reservation(&pending)?;

        if let Some(order) = self.orders.get_mut(&order_id) {
            order.status = OrderStatus::Canceled;
        }
        if self.next_due.is_some_and(|(_, id)| id == order_id) {
            self.refresh_next_due();
        }

        tracing::info!(order_id, "limit order canceled");
        self.orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| BacktestError::OrderNotFound(format!("order {} does not exist", order_id)))
    }

    /// 주문 하나를 조회합니다. 반환값은 스냅샷 복사본입니다.
    pub fn fetch_order(&mut self, order_id: u64) -> BacktestResult<Order> {
        self.settle()?;
        self.orders.get(&order_id).cloned().ok_or_else(|| {
            BacktestError::OrderNotFound(format!("order {} does not exist", order_id))
        })
    }

    /// 모든 자산의 잔고 스냅샷을 조회합니다.
    pub fn fetch_balance(&mut self) -> BacktestResult<BTreeMap<String, BalanceSnapshot>> {
        self.settle()?;
        Ok(self.ledger.snapshot_all())
    }

    /// 미체결 주문 목록을 생성 시각 순으로 조회합니다.
    ///
    /// `since`는 배타적 하한이며 생성 시각과 비교합니다.
    pub fn fetch_open_orders(
        &mut self,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> BacktestResult<Vec<Order>> {
        self.settle()?;
        let mut result: Vec<Order> = self
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::Open)
            .filter(|order| symbol.is_none_or(|s| order.symbol == s))
            .filter(|order| since.is_none_or(|s| order.created_at > s))
            .cloned()
            .collect();
        // BTreeMap 순회가 ID 오름차순이므로 안정 정렬 후 동시각은 생성 순
        result.sort_by_key(|order| order.created_at);
        if let Some(limit) = limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    /// 체결된 주문 목록을 체결 시각 순으로 조회합니다.
    ///
    /// 취소된 주문은 포함되지 않습니다. `since`는 배타적 하한이며 체결
    /// 시각과 비교합니다.
    pub fn fetch_closed_orders(
        &mut self,
        symbol: Option<&str>,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> BacktestResult<Vec<Order>> {
        self.settle()?;
        let mut result: Vec<Order> = self
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::Closed)
            .filter(|order| symbol.is_none_or(|s| order.symbol == s))
            .filter(|order| since.is_none_or(|s| order.filled_at.is_some_and(|at| at > s)))
            .cloned()
            .collect();
        result.sort_by_key(|order| order.filled_at);
        if let Some(limit) = limit {
            result.truncate(limit);
        }
        Ok(result)
    }

    fn execute_market_order(
        &mut self,
        symbol: &str,
        side: Side,
        amount: Quantity,
        base: String,
        quote: String,
        fee_rate: Percentage,
        now: DateTime<Utc>,
    ) -> BacktestResult<u64> {
        let bar_time = floor_minute(now);
        let series = self.series.get(symbol).ok_or_else(|| {
            BacktestError::InvalidOrder(format!("no prices available for {}", symbol))
        })?;
        let bar = series.bar_at(bar_time).ok_or_else(|| {
            BacktestError::Data(format!("no bar for {} at {}", symbol, bar_time))
        })?;
        let price = match side {
            Side::Buy => bar.require(Column::High)? * (Decimal::ONE + MARKET_SLIPPAGE),
            Side::Sell => bar.require(Column::Low)? * (Decimal::ONE - MARKET_SLIPPAGE),
        };

        // 차감이 먼저이므로 잔고가 부족하면 여기서 상태 변경 없이 실패
        self.apply_fill(side, &base, &quote, price, amount, fee_rate)?;

        let order_id = self.next_order_id();
        let fee_currency = match side {
            Side::Buy => base,
            Side::Sell => quote,
        };
        let mut order = Order::new(
            order_id,
            symbol,
            side,
            OrderKind::Market,
            amount,
            None,
            now,
            fee_currency,
        );
        order.fill(price, now, fee_rate);
        self.orders.insert(order_id, order);

        tracing::info!(order_id, %symbol, %side, %amount, %price, "market order filled");
        Ok(order_id)
    }

    #[allow(clippy::too_many_arguments)]
    fn open_limit_order(
        &mut self,
        symbol: &str,
        side: Side,
        amount: Quantity,
        price: Price,
        base: String,
        quote: String,
        fee_rate: Percentage,
        now: DateTime<Utc>,
    ) -> BacktestResult<u64> {
        let fillable_at = self
            .series
            .get(symbol)
            .and_then(|series| series.first_fillable_after(now, side, price));

        match side {
            Side::Buy => self.ledger.reserve(&quote, price * amount)?,
            Side::Sell => self.ledger.reserve(&base, amount)?,
        }

        let order_id = self.next_order_id();
        let fee_currency = match side {
            Side::Buy => base.clone(),
            Side::Sell => quote.clone(),
        };
        let order = Order::new(
            order_id,
            symbol,
            side,
            OrderKind::Limit,
            amount,
            Some(price),
            now,
            fee_currency,
        );
        self.orders.insert(order_id, order);
        self.pending.insert(
            order_id,
            PendingFill {
                limit_price: price,
                amount,
                side,
                base,
                quote,
                fee_rate,
                fillable_at,
            },
        );

        if let Some(at) = fillable_at {
            if self.next_due.is_none_or(|due| (at, order_id) < due) {
                self.next_due = Some((at, order_id));
            }
        }

        tracing::info!(order_id, %symbol, %side, %amount, %price, ?fillable_at, "limit order opened");
        Ok(order_id)
    }

    /// 도래한 지정가 주문 하나를 체결 처리합니다.
    fn fill_pending(&mut self, order_id: u64, due: DateTime<Utc>) -> BacktestResult<()> {
        let pending = self.pending.remove(&order_id).ok_or_else(|| {
            BacktestError::Data(format!("pending record for order {} is missing", order_id))
        })?;

        self.release_reservation(&pending)?;
        self.apply_fill(
            pending.side,
            &pending.base,
            &pending.quote,
            pending.limit_price,
            pending.amount,
            pending.fee_rate,
        )?;
        if let Some(order) = self.orders.get_mut(&order_id) {
            order.fill(pending.limit_price, due, pending.fee_rate);
        }

        tracing::debug!(order_id, price = %pending.limit_price, at = %due, "limit order filled");
        Ok(())
    }

    /// 미체결 주문의 예약을 해제합니다.
    fn release_reservation(&mut self, pending: &PendingFill) -> BacktestResult<()> {
        match pending.side {
            Side::Buy => self
                .ledger
                .reserve(&pending.quote, -(pending.limit_price * pending.amount)),
            Side::Sell => self.ledger.reserve(&pending.base, -pending.amount),
        }
    }

    /// 체결을 원장에 반영합니다. 차감이 입금보다 먼저입니다.
    fn apply_fill(
        &mut self,
        side: Side,
        base: &str,
        quote: &str,
        price: Price,
        amount: Quantity,
        fee_rate: Percentage,
    ) -> BacktestResult<()> {
        let keep = Decimal::ONE - fee_rate;
        match side {
            Side::Buy => {
                self.ledger.deposit_total(quote, -(price * amount))?;
                self.ledger.deposit_total(base, amount * keep)?;
            }
            Side::Sell => {
                self.ledger.deposit_total(base, -amount)?;
                self.ledger.deposit_total(quote, price * amount * keep)?;
            }
        }
        Ok(())
    }

    /// 대기 중인 체결 가운데 가장 이른 (시각, 주문 ID)를 다시 계산합니다.
    fn refresh_next_due(&mut self) {
        self.next_due = self
            .pending
            .iter()
            .filter_map(|(id, pending)| pending.fillable_at.map(|at| (at, *id)))
            .min();
    }

    fn next_order_id(&mut self) -> u64 {
        self.last_order_id += 1;
        self.last_order_id
    }
}
