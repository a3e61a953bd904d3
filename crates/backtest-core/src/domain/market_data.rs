//! 시장 데이터 타입.
//!
//! 이 모듈은 시장 데이터 조회 결과 타입을 정의합니다:
//! - `Candle` - 리샘플링된 OHLCV 캔들
//! - `TickerSnapshot` - 현재 분의 시세 스냅샷

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Price, Quantity};

/// OHLCV 캔들.
///
/// `fetch_ohlcv` 조회의 결과 단위입니다. 타임스탬프는 캔들 시작 시각입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// 캔들 시작 시각
    pub timestamp: DateTime<Utc>,
    /// 시가
    pub open: Price,
    /// 고가
    pub high: Price,
    /// 저가
    pub low: Price,
    /// 종가
    pub close: Price,
    /// 거래량 (기준 자산 단위)
    pub volume: Quantity,
}

impl Candle {
    /// 캔들 범위(고가 - 저가)를 반환합니다.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// 양봉(종가 > 시가)인지 확인합니다.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// 현재 분의 시세 스냅샷.
///
/// 시뮬레이션은 호가창을 모델링하지 않으므로 미시구조 필드(호가, 체결량
/// 내역 등)는 항상 `None`입니다. 필드 구성은 실거래소 시세 응답과 같아
/// 전략 코드가 두 환경에서 동일하게 동작합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    /// 거래 심볼
    pub symbol: String,
    /// 스냅샷 시각 (현재 분으로 내림)
    pub timestamp: DateTime<Utc>,
    /// 시가
    pub open: Price,
    /// 고가
    pub high: Price,
    /// 저가
    pub low: Price,
    /// 종가
    pub close: Price,
    /// 최우선 매수 호가 (미지원)
    pub bid: Option<Price>,
    /// 매수 호가 수량 (미지원)
    pub bid_volume: Option<Quantity>,
    /// 최우선 매도 호가 (미지원)
    pub ask: Option<Price>,
    /// 매도 호가 수량 (미지원)
    pub ask_volume: Option<Quantity>,
    /// 거래량 가중 평균가 (미지원)
    pub vwap: Option<Price>,
    /// 최근 체결가 (미지원)
    pub last: Option<Price>,
    /// 전일 종가 (미지원)
    pub previous_close: Option<Price>,
    /// 가격 변동 (미지원)
    pub change: Option<Decimal>,
    /// 변동률 (미지원)
    pub percentage: Option<Decimal>,
    /// 평균가 (미지원)
    pub average: Option<Price>,
    /// 기준 자산 거래량 (미지원)
    pub base_volume: Option<Quantity>,
    /// 호가 자산 거래량 (미지원)
    pub quote_volume: Option<Quantity>,
}

impl TickerSnapshot {
    /// 현재 분의 OHLC로 스냅샷을 생성합니다. 미시구조 필드는 `None`입니다.
    pub fn from_bar(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            open,
            high,
            low,
            close,
            bid: None,
            bid_volume: None,
            ask: None,
            ask_volume: None,
            vwap: None,
            last: None,
            previous_close: None,
            change: None,
            percentage: None,
            average: None,
            base_volume: None,
            quote_volume: None,
        }
    }
}
