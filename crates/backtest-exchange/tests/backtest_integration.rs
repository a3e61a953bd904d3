//! 거래소 백엔드와 드라이버를 함께 구동하는 통합 테스트.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use backtest_core::{Market, OrderKind, OrderStatus, Side, SimulationClock, Timeframe};
use backtest_exchange::{
    run_backtest, BacktestContext, BacktestExchange, BalanceCheck, ExitReason, RawBar, RawSeries,
    SharedClock, Strategy, StrategyControl,
};

fn date(min: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 6, 1, 10, 0, 0).unwrap() + Duration::minutes(min)
}

fn shared_clock(end_min: i64) -> SharedClock {
    Rc::new(RefCell::new(
        SimulationClock::new(date(0), date(end_min), Duration::minutes(1)).unwrap(),
    ))
}

/// (low, high) 목록으로 다섯 컬럼 시계열을 만듭니다.
fn series_from(lows_highs: &[(&str, &str)]) -> RawSeries {
    let mut raw = RawSeries::new();
    for (i, (low, high)) in lows_highs.iter().enumerate() {
        raw.push(RawBar {
            timestamp_ms: date(i as i64).timestamp_millis(),
            open: Some(low.to_string()),
            high: Some(high.to_string()),
            low: Some(low.to_string()),
            close: Some(high.to_string()),
            volume: Some("1".to_string()),
        });
    }
    raw
}

fn flat(count: usize, low: &'static str, high: &'static str) -> Vec<(&'static str, &'static str)> {
    vec![(low, high); count]
}

fn market(base: &str, quote: &str) -> Market {
    Market::new(base, quote)
}

fn exchange_with(
    clock: SharedClock,
    series: Vec<(&str, Vec<(&str, &str)>)>,
    balances: Vec<(&str, Decimal)>,
) -> BacktestExchange {
    let balances: HashMap<String, Decimal> = balances
        .into_iter()
        .map(|(asset, amount)| (asset.to_string(), amount))
        .collect();
    let mut ohlcv = HashMap::new();
    let mut markets = HashMap::new();
    for (symbol, bars) in series {
        ohlcv.insert(symbol.to_string(), series_from(&bars));
        let (base, quote) = symbol.split_once('/').unwrap();
        markets.insert(symbol.to_string(), market(base, quote));
    }
    BacktestExchange::new(clock, &balances, &ohlcv, markets, BalanceCheck::Enforced).unwrap()
}

#[test]
fn market_buy_fills_at_current_high_with_slippage() {
    let clock = shared_clock(5);
    let mut exchange = exchange_with(
        clock,
        vec![("ETH/BTC", flat(6, "4", "6"))],
        vec![("BTC", dec!(7))],
    );

    let id = exchange
        .create_order("ETH/BTC", Side::Buy, OrderKind::Market, dec!(1), None)
        .unwrap();
    let order = exchange.fetch_order(id).unwrap();

    assert_eq!(order.status, OrderStatus::Closed);
    assert_eq!(order.average_price, Some(dec!(6.009)));
    assert_eq!(order.filled_amount, dec!(1));

    let balances = exchange.fetch_balance().unwrap();
    assert_eq!(balances["BTC"].total, dec!(0.991));
    assert_eq!(balances["ETH"].total, dec!(1));
    assert_eq!(balances["ETH"].free, dec!(1));
}

#[test]
fn limit_buy_reserves_and_cancel_restores() {
    let clock = shared_clock(5);
    let mut exchange = exchange_with(
        clock,
        vec![("ETH/BTC", flat(6, "1", "2"))],
        vec![("BTC", dec!(3))],
    );

    let id = exchange
        .create_order("ETH/BTC", Side::Buy, OrderKind::Limit, dec!(2), Some(dec!(0.5)))
        .unwrap();

    let balances = exchange.fetch_balance().unwrap();
    assert_eq!(balances["BTC"].used, dec!(1.0));
    assert_eq!(balances["BTC"].free, dec!(2.0));

    exchange.cancel_order(id).unwrap();
    let balances = exchange.fetch_balance().unwrap();
    assert_eq!(balances["BTC"].used, dec!(0));
    assert_eq!(balances["BTC"].free, dec!(3.0));

    // 취소된 주문은 체결 목록에 나타나지 않음
    assert!(exchange.fetch_closed_orders(None, None, None).unwrap().is_empty());
}

#[test]
fn same_minute_fills_settle_in_creation_order_across_symbols() {
    let clock = shared_clock(5);
    let mut bars_eth = flat(6, "1", "2");
    bars_eth[2] = ("0.5", "2");
    let mut bars_xrp = flat(6, "1", "2");
    bars_xrp[2] = ("0.5", "2");

    let mut exchange = exchange_with(
        clock.clone(),
        vec![("ETH/BTC", bars_eth), ("XRP/BTC", bars_xrp)],
        vec![("BTC", dec!(3))],
    );

    let first = exchange
        .create_order("XRP/BTC", Side::Buy, OrderKind::Limit, dec!(1), Some(dec!(0.6)))
        .unwrap();
    let second = exchange
        .create_order("ETH/BTC", Side::Buy, OrderKind::Limit, dec!(1), Some(dec!(0.6)))
        .unwrap();

    clock.borrow_mut().advance();
    clock.borrow_mut().advance();

    let closed = exchange.fetch_closed_orders(None, None, None).unwrap();
    assert_eq!(closed.len(), 2);
    assert_eq!(closed[0].id, first);
    assert_eq!(closed[1].id, second);
    assert_eq!(closed[0].filled_at, closed[1].filled_at);
}

#[test]
fn fetch_ohlcv_refuses_future_window() {
    let clock = shared_clock(10);
    let mut exchange = exchange_with(
        clock.clone(),
        vec![("ETH/BTC", flat(11, "1", "2"))],
        vec![("BTC", dec!(3))],
    );
    clock.borrow_mut().advance();

    let err = exchange
        .fetch_ohlcv("ETH/BTC", Timeframe::M1, Some(date(2)), Some(1))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "bad request: fetch_ohlcv: since + limit * timeframe needs to be in the past"
    );
}

#[test]
fn fetch_balance_is_idempotent_after_settlement() {
    let clock = shared_clock(5);
    let mut bars = flat(6, "1", "2");
    bars[1] = ("0.5", "2");
    let mut exchange = exchange_with(
        clock.clone(),
        vec![("ETH/BTC", bars)],
        vec![("BTC", dec!(3))],
    );

    exchange
        .create_order("ETH/BTC", Side::Buy, OrderKind::Limit, dec!(1), Some(dec!(0.6)))
        .unwrap();
    clock.borrow_mut().advance();

    let first = exchange.fetch_balance().unwrap();
    let second = exchange.fetch_balance().unwrap();
    assert_eq!(first, second);
    assert_eq!(first["ETH"].total, dec!(1));
}

/// 5분마다 0.1 ETH를 시장가 매수하는 적립식 전략.
struct DcaStrategy {
    buys: usize,
    exit_reason: Option<ExitReason>,
}

impl Strategy for DcaStrategy {
    fn next_iteration(
        &mut self,
        ctx: &mut BacktestContext,
    ) -> backtest_core::BacktestResult<StrategyControl> {
        let now = ctx.now();
        if now.timestamp() % 300 == 0 {
            ctx.exchange("sim")?.create_order(
                "ETH/BTC",
                Side::Buy,
                OrderKind::Market,
                dec!(0.1),
                None,
            )?;
            self.buys += 1;
        }
        Ok(StrategyControl::Continue)
    }

    fn exit(&mut self, _ctx: &mut BacktestContext, reason: ExitReason) {
        self.exit_reason = Some(reason);
    }
}

#[test]
fn strategy_runs_to_completion_through_runner() {
    let clock = shared_clock(10);
    let exchange = exchange_with(
        clock.clone(),
        vec![("ETH/BTC", flat(11, "4", "6"))],
        vec![("BTC", dec!(7))],
    );

    let mut ctx = BacktestContext::new(clock);
    ctx.insert_exchange("sim", exchange);
    let mut strategy = DcaStrategy {
        buys: 0,
        exit_reason: None,
    };

    let reason = run_backtest(&mut ctx, &mut strategy).unwrap();
    assert_eq!(reason, ExitReason::Finished);
    // 10:00, 10:05, 10:10 세 번 매수
    assert_eq!(strategy.buys, 3);
    assert_eq!(strategy.exit_reason, Some(ExitReason::Finished));

    let balances = ctx.exchange("sim").unwrap().fetch_balance().unwrap();
    assert_eq!(balances["ETH"].total, dec!(0.3));
    // 7 - 3 x 0.1 x 6.009
    assert_eq!(balances["BTC"].total, dec!(5.1973));
}

#[test]
fn rejected_creation_leaves_no_trace() {
    let clock = shared_clock(5);
    let mut exchange = exchange_with(
        clock,
        vec![("ETH/BTC", flat(6, "4", "6"))],
        vec![("BTC", dec!(1))],
    );

    let err = exchange
        .create_order("ETH/BTC", Side::Buy, OrderKind::Market, dec!(1), None)
        .unwrap_err();
    assert!(err.is_funds_violation());

    assert!(exchange.fetch_open_orders(None, None, None).unwrap().is_empty());
    assert!(exchange.fetch_closed_orders(None, None, None).unwrap().is_empty());
    let balances = exchange.fetch_balance().unwrap();
    assert_eq!(balances["BTC"].total, dec!(1));

    // 다음 성공한 주문이 ID 1을 받음
    let id = exchange
        .create_order("ETH/BTC", Side::Buy, OrderKind::Limit, dec!(1), Some(dec!(0.5)))
        .unwrap();
    assert_eq!(id, 1);
}
