//! 시뮬레이션 시계.
//!
//! 시뮬레이션의 현재 시각과 경계를 보관합니다. 시계는 외부 드라이버만
//! 전진시키며, 엔진은 조회 시점에 현재 시각을 읽기만 합니다.

use chrono::{DateTime, Duration, Utc};

use crate::error::{BacktestError, BacktestResult};

/// 백테스트 구간을 나타내는 시뮬레이션 시계.
///
/// 불변식: `start <= current`. 시뮬레이션이 끝나면 `now()`는 `end`로
/// 고정됩니다.
#[derive(Debug, Clone)]
pub struct SimulationClock {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    current: DateTime<Utc>,
    interval: Duration,
}

impl SimulationClock {
    /// 새 시뮬레이션 시계를 생성합니다.
    ///
    /// `end`가 `start`보다 이르거나 `interval`이 0 이하이면 실패합니다.
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Duration,
    ) -> BacktestResult<Self> {
        if end < start {
            return Err(BacktestError::Config(
                "end date is smaller than start date".to_string(),
            ));
        }
        if interval <= Duration::zero() {
            return Err(BacktestError::Config(
                "interval needs to be positive".to_string(),
            ));
        }
        Ok(Self {
            start,
            end,
            current: start,
            interval,
        })
    }

    /// 현재 시각을 한 간격만큼 전진시킵니다.
    pub fn advance(&mut self) {
        self.current += self.interval;
    }

    /// 다음 틱이 `date` 이전인 동안 반복해서 전진시킵니다.
    ///
    /// 라이브 모드에서 밀린 시간을 따라잡을 때 사용하며, 순수 백테스트에서는
    /// 호출되지 않습니다.
    pub fn advance_until(&mut self, date: DateTime<Utc>) {
        while self.current + self.interval < date {
            self.advance();
        }
    }

    /// 현재 시뮬레이션 시각을 반환합니다. 종료 후에는 `end`로 고정됩니다.
    pub fn now(&self) -> DateTime<Utc> {
        if self.finished() {
            self.end
        } else {
            self.current
        }
    }

    /// 시뮬레이션이 종료되었는지 확인합니다.
    pub fn finished(&self) -> bool {
        self.current > self.end
    }

    /// 시뮬레이션 시작 시각을 반환합니다.
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// 시뮬레이션 종료 시각을 반환합니다.
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// 시계의 전진 간격을 반환합니다.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 6, 1, 10, min, 0).unwrap()
    }

    #[test]
    fn test_clock_rejects_reversed_window() {
        let err = SimulationClock::new(date(10), date(5), Duration::minutes(1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "config error: end date is smaller than start date"
        );
    }

    #[test]
    fn test_clock_rejects_non_positive_interval() {
        let err = SimulationClock::new(date(0), date(10), Duration::zero()).unwrap_err();
        assert_eq!(err.to_string(), "config error: interval needs to be positive");
    }

    #[test]
    fn test_clock_advance_and_clamp() {
        let mut clock = SimulationClock::new(date(0), date(2), Duration::minutes(1)).unwrap();
        assert_eq!(clock.now(), date(0));
        assert!(!clock.finished());

        clock.advance();
        assert_eq!(clock.now(), date(1));
        clock.advance();
        assert_eq!(clock.now(), date(2));
        assert!(!clock.finished());

        // 종료 후에는 end로 고정
        clock.advance();
        assert!(clock.finished());
        assert_eq!(clock.now(), date(2));
    }

    #[test]
    fn test_clock_advance_until() {
        let mut clock = SimulationClock::new(date(0), date(30), Duration::minutes(1)).unwrap();
        clock.advance_until(date(10));
        // 다음 틱이 목표 이전인 동안만 전진
        assert_eq!(clock.now(), date(9));

        // 이미 지난 시각은 no-op
        clock.advance_until(date(5));
        assert_eq!(clock.now(), date(9));
    }
}
