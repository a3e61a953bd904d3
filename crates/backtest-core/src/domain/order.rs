//! 주문 타입 및 상태.
//!
//! 이 모듈은 시뮬레이션 거래소의 주문 관련 타입을 정의합니다:
//! - `Side` - 주문 방향 (매수/매도)
//! - `OrderKind` - 주문 유형 (시장가/지정가)
//! - `OrderStatus` - 주문 상태
//! - `OrderFee` - 체결 수수료
//! - `Order` - 주문 엔티티

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Percentage, Price, Quantity};

/// 주문 방향 (매수 또는 매도).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// 주문 유형.
///
/// 시장가와 지정가만 지원합니다. 다른 유형은 타입 수준에서 표현할 수 없습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    /// 시장가 주문 - 현재 바 가격으로 즉시 체결
    Market,
    /// 지정가 주문 - 지정 가격 도달 시 체결
    Limit,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Market => write!(f, "market"),
            OrderKind::Limit => write!(f, "limit"),
        }
    }
}

/// 주문 상태.
///
/// 수명 주기: `Open -> Closed` (체결) 또는 `Open -> Canceled`.
/// 시장가 주문은 생성과 동시에 `Closed`가 됩니다. 최종 상태에서는
/// 더 이상 전이하지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// 미체결 (대기 중)
    Open,
    /// 전량 체결됨
    Closed,
    /// 취소됨
    Canceled,
}

impl OrderStatus {
    /// 주문이 최종 상태인지 확인합니다.
    pub fn is_final(&self) -> bool {
        matches!(self, OrderStatus::Closed | OrderStatus::Canceled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Open => write!(f, "open"),
            OrderStatus::Closed => write!(f, "closed"),
            OrderStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// 체결 수수료.
///
/// 수수료 통화는 매수면 기준 자산, 매도면 호가 자산입니다.
/// `rate`와 `cost`는 체결 시점에 채워집니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFee {
    /// 수수료 통화
    pub currency: String,
    /// 수수료율
    pub rate: Option<Percentage>,
    /// 수수료 비용
    pub cost: Option<Decimal>,
}

/// 시뮬레이션 거래소의 주문 엔티티.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// 엔진이 부여하는 단조 증가 주문 ID
    pub id: u64,
    /// 거래 심볼 (예: "BTC/USDT")
    pub symbol: String,
    /// 주문 방향
    pub side: Side,
    /// 주문 유형
    pub kind: OrderKind,
    /// 주문 수량
    pub amount: Quantity,
    /// 지정가 (지정가 주문에만 존재)
    pub limit_price: Option<Price>,
    /// 현재 상태
    pub status: OrderStatus,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 체결 수량 (체결 전에는 0)
    pub filled_amount: Quantity,
    /// 평균 체결 가격
    pub average_price: Option<Price>,
    /// 체결 대금 (수량 × 가격)
    pub cost: Option<Decimal>,
    /// 체결 시각
    pub filled_at: Option<DateTime<Utc>>,
    /// 체결 수수료
    pub fee: OrderFee,
}

impl Order {
    /// 새 미체결 주문을 생성합니다.
    pub fn new(
        id: u64,
        symbol: impl Into<String>,
        side: Side,
        kind: OrderKind,
        amount: Quantity,
        limit_price: Option<Price>,
        created_at: DateTime<Utc>,
        fee_currency: impl Into<String>,
    ) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            side,
            kind,
            amount,
            limit_price,
            status: OrderStatus::Open,
            created_at,
            filled_amount: Decimal::ZERO,
            average_price: None,
            cost: None,
            filled_at: None,
            fee: OrderFee {
                currency: fee_currency.into(),
                rate: None,
                cost: None,
            },
        }
    }

    /// 남은 체결 수량을 반환합니다.
    pub fn remaining(&self) -> Quantity {
        self.amount - self.filled_amount
    }

    /// 주문이 아직 대기 중인지 확인합니다.
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    /// 주문을 전량 체결 처리합니다.
    ///
    /// 수수료 비용은 매수면 수량, 매도면 체결 대금에 수수료율을 곱한 값입니다.
    pub fn fill(&mut self, price: Price, filled_at: DateTime<Utc>, fee_rate: Percentage) {
        let cost = self.amount * price;
        self.filled_amount = self.amount;
        self.average_price = Some(price);
        self.cost = Some(cost);
        self.filled_at = Some(filled_at);
        self.status = OrderStatus::Closed;
        self.fee.rate = Some(fee_rate);
        self.fee.cost = Some(match self.side {
            Side::Buy => fee_rate * self.amount,
            Side::Sell => fee_rate * cost,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 6, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_order_lifecycle_fill() {
        let mut order = Order::new(
            1,
            "ETH/BTC",
            Side::Buy,
            OrderKind::Limit,
            dec!(2),
            Some(dec!(0.5)),
            created_at(),
            "ETH",
        );
        assert!(order.is_open());
        assert_eq!(order.remaining(), dec!(2));

        order.fill(dec!(0.5), created_at(), dec!(0.001));
        assert_eq!(order.status, OrderStatus::Closed);
        assert_eq!(order.filled_amount, dec!(2));
        assert_eq!(order.remaining(), dec!(0));
        assert_eq!(order.cost, Some(dec!(1.0)));
        // 매수 수수료는 수량 기준
        assert_eq!(order.fee.cost, Some(dec!(0.002)));
    }

    #[test]
    fn test_sell_fee_charged_on_cost() {
        let mut order = Order::new(
            2,
            "ETH/BTC",
            Side::Sell,
            OrderKind::Market,
            dec!(4),
            None,
            created_at(),
            "BTC",
        );
        order.fill(dec!(0.25), created_at(), dec!(0.01));
        // 매도 수수료는 체결 대금 기준
        assert_eq!(order.fee.cost, Some(dec!(0.01)));
        assert!(order.status.is_final());
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }
}
