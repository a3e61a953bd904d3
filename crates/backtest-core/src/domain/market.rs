//! 시장 메타데이터.
//!
//! 시장 메타데이터 제공자로부터 받는 심볼별 거래 규칙입니다. 외부 제공자가
//! 주는 데이터는 불완전할 수 있으므로 기준/호가 자산과 수수료율은 모두
//! 선택적이며, 주문 생성 시점에 검증됩니다.

use serde::{Deserialize, Serialize};

use crate::types::Percentage;

/// 심볼 하나의 시장 메타데이터.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// 거래 심볼 (예: "ETH/BTC")
    pub symbol: String,
    /// 기준 자산 (예: "ETH")
    pub base: Option<String>,
    /// 호가 자산 (예: "BTC")
    pub quote: Option<String>,
    /// 지정가(메이커) 수수료율
    pub maker: Option<Percentage>,
    /// 시장가(테이커) 수수료율
    pub taker: Option<Percentage>,
}

impl Market {
    /// 기준/호가 자산이 채워진 시장 메타데이터를 생성합니다.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        let base = base.into();
        let quote = quote.into();
        Self {
            symbol: format!("{}/{}", base, quote),
            base: Some(base),
            quote: Some(quote),
            maker: None,
            taker: None,
        }
    }

    /// 수수료율을 설정합니다.
    pub fn with_fees(mut self, maker: Percentage, taker: Percentage) -> Self {
        self.maker = Some(maker);
        self.taker = Some(taker);
        self
    }

    /// 메이커 수수료율을 설정합니다.
    pub fn with_maker(mut self, maker: Percentage) -> Self {
        self.maker = Some(maker);
        self
    }

    /// 테이커 수수료율을 설정합니다.
    pub fn with_taker(mut self, taker: Percentage) -> Self {
        self.taker = Some(taker);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_market_builder() {
        let market = Market::new("ETH", "BTC").with_fees(dec!(0.001), dec!(0.002));
        assert_eq!(market.symbol, "ETH/BTC");
        assert_eq!(market.base.as_deref(), Some("ETH"));
        assert_eq!(market.quote.as_deref(), Some("BTC"));
        assert_eq!(market.maker, Some(dec!(0.001)));
        assert_eq!(market.taker, Some(dec!(0.002)));
    }
}
