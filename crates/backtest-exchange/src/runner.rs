//! 백테스트 실행 드라이버.
//!
//! 시계를 틱 단위로 전진시키며 전략의 `next_iteration`을 호출합니다.
//! 전략이 중단을 요청하거나, 예외 처리에 실패하거나, 시뮬레이션 구간이
//! 끝나면 종료 훅을 호출하고 반환합니다.

use std::collections::HashMap;

use backtest_core::{BacktestError, BacktestResult};

use crate::backend::BacktestExchange;
use crate::matching::SharedClock;

/// 백테스트가 끝난 이유.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// 전략이 중단을 요청함
    Stopped,
    /// 처리되지 않은 에러로 중단됨
    Exception,
    /// 시뮬레이션 구간이 끝남
    Finished,
}

/// 전략이 반복마다 반환하는 제어 신호.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyControl {
    /// 다음 틱으로 계속
    Continue,
    /// 백테스트 중단
    Stop,
}

/// 백테스트 전략.
///
/// 드라이버가 틱마다 [`next_iteration`](Self::next_iteration)을 호출합니다.
/// 반복 중 에러가 나면 [`handle_exception`](Self::handle_exception)에게
/// 복구 기회를 주고, 복구마저 실패하면 백테스트를 중단합니다.
pub trait Strategy {
    /// 현재 틱에서 전략 로직을 실행합니다.
    fn next_iteration(&mut self, ctx: &mut BacktestContext) -> BacktestResult<StrategyControl>;

    /// 반복 중 발생한 에러를 처리합니다. 기본 동작은 에러를 그대로
    /// 전파하여 백테스트를 중단하는 것입니다.
    fn handle_exception(
        &mut self,
        _ctx: &mut BacktestContext,
        err: BacktestError,
    ) -> BacktestResult<()> {
        Err(err)
    }

    /// 백테스트가 끝날 때 한 번 호출됩니다.
    fn exit(&mut self, _ctx: &mut BacktestContext, _reason: ExitReason) {}
}

/// 전략에게 넘겨주는 실행 컨텍스트.
///
/// 이름으로 구분되는 여러 거래소와 공유 시계를 담습니다. 모든 거래소는
/// 같은 시계를 공유해야 합니다.
pub struct BacktestContext {
    clock: SharedClock,
    exchanges: HashMap<String, BacktestExchange>,
}

impl BacktestContext {
    /// 새 실행 컨텍스트를 생성합니다.
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            exchanges: HashMap::new(),
        }
    }

    /// 거래소를 등록합니다.
    pub fn insert_exchange(&mut self, name: impl Into<String>, exchange: BacktestExchange) {
        self.exchanges.insert(name.into(), exchange);
    }

    /// 이름으로 거래소를 찾습니다.
    pub fn exchange(&mut self, name: &str) -> BacktestResult<&mut BacktestExchange> {
        self.exchanges
            .get_mut(name)
            .ok_or_else(|| BacktestError::Config(format!("exchange {} is not registered", name)))
    }

    /// 현재 시뮬레이션 시각을 반환합니다.
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.borrow().now()
    }

    /// 공유 시계 핸들을 반환합니다.
    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }
}

/// 시뮬레이션 구간이 끝날 때까지 전략을 실행합니다.
///
/// 반복 순서는 틱마다 `next_iteration` 호출 후 시계 전진입니다. 마지막
/// 틱에서도 `next_iteration`이 호출됩니다.
pub fn run_backtest<S: Strategy>(
    ctx: &mut BacktestContext,
    strategy: &mut S,
) -> BacktestResult<ExitReason> {
    tracing::info!(start = %ctx.clock.borrow().start(), end = %ctx.clock.borrow().end(), "backtest started");

    while !ctx.clock.borrow().finished() {
        match strategy.next_iteration(ctx) {
            Ok(StrategyControl::Continue) => {}
            Ok(StrategyControl::Stop) => {
                tracing::info!("strategy requested stop");
                strategy.exit(ctx, ExitReason::Stopped);
                return Ok(ExitReason::Stopped);
            }
            Err(err) => {
                tracing::error!(error = %err, "error during next_iteration");
                if let Err(err) = strategy.handle_exception(ctx, err) {
                    tracing::error!(error = %err, "exiting because of unhandled error");
                    strategy.exit(ctx, ExitReason::Exception);
                    return Err(err);
                }
            }
        }
        ctx.clock.borrow_mut().advance();
    }

    tracing::info!("backtest finished");
    strategy.exit(ctx, ExitReason::Finished);
    Ok(ExitReason::Finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use backtest_core::SimulationClock;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn date(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 6, 1, 10, 0, 0).unwrap() + Duration::minutes(min)
    }

    fn context(end_min: i64) -> BacktestContext {
        let clock: SharedClock = Rc::new(RefCell::new(
            SimulationClock::new(date(0), date(end_min), Duration::minutes(1)).unwrap(),
        ));
        BacktestContext::new(clock)
    }

    #[derive(Default)]
    struct CountingStrategy {
        iterations: usize,
        stop_after: Option<usize>,
        fail_at: Option<usize>,
        recover: bool,
        handled: usize,
        exit_reason: Option<ExitReason>,
    }

    impl Strategy for CountingStrategy {
        fn next_iteration(
            &mut self,
            _ctx: &mut BacktestContext,
        ) -> BacktestResult<StrategyControl> {
            self.iterations += 1;
            if self.fail_at == Some(self.iterations) {
                return Err(BacktestError::Data("boom".to_string()));
            }
            if self.stop_after == Some(self.iterations) {
                return Ok(StrategyControl::Stop);
            }
            Ok(StrategyControl::Continue)
        }

        fn handle_exception(
            &mut self,
            _ctx: &mut BacktestContext,
            err: BacktestError,
        ) -> BacktestResult<()> {
            self.handled += 1;
            if self.recover {
                Ok(())
            } else {
                Err(err)
            }
        }

        fn exit(&mut self, _ctx: &mut BacktestContext, reason: ExitReason) {
            self.exit_reason = Some(reason);
        }
    }

    #[test]
    fn test_runs_every_tick_including_last() {
        let mut ctx = context(4);
        let mut strategy = CountingStrategy::default();

        let reason = run_backtest(&mut ctx, &mut strategy).unwrap();
        assert_eq!(reason, ExitReason::Finished);
        // 10:00~10:04 다섯 틱
        assert_eq!(strategy.iterations, 5);
        assert_eq!(strategy.exit_reason, Some(ExitReason::Finished));
    }

    #[test]
    fn test_stop_request_ends_early() {
        let mut ctx = context(10);
        let mut strategy = CountingStrategy {
            stop_after: Some(3),
            ..Default::default()
        };

        let reason = run_backtest(&mut ctx, &mut strategy).unwrap();
        assert_eq!(reason, ExitReason::Stopped);
        assert_eq!(strategy.iterations, 3);
        assert_eq!(strategy.exit_reason, Some(ExitReason::Stopped));
    }

    #[test]
    fn test_unhandled_error_aborts() {
        let mut ctx = context(10);
        let mut strategy = CountingStrategy {
            fail_at: Some(2),
            ..Default::default()
        };

        let err = run_backtest(&mut ctx, &mut strategy).unwrap_err();
        assert_eq!(err.to_string(), "data error: boom");
        assert_eq!(strategy.handled, 1);
        assert_eq!(strategy.exit_reason, Some(ExitReason::Exception));
    }

    #[test]
    fn test_handled_error_continues() {
        let mut ctx = context(4);
        let mut strategy = CountingStrategy {
            fail_at: Some(2),
            recover: true,
            ..Default::default()
        };

        let reason = run_backtest(&mut ctx, &mut strategy).unwrap();
        assert_eq!(reason, ExitReason::Finished);
        assert_eq!(strategy.iterations, 5);
        assert_eq!(strategy.handled, 1);
    }

    #[test]
    fn test_unknown_exchange_lookup_fails() {
        let mut ctx = context(1);
        let err = ctx.exchange("kraken").unwrap_err();
        assert_eq!(
            err.to_string(),
            "config error: exchange kraken is not registered"
        );
    }
}
