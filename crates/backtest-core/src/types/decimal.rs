//! 정밀한 금융 계산을 위한 Decimal 유틸리티.
//!
//! 모든 금액과 가격은 이진 부동소수점이 아닌 고정 소수점(`Decimal`)으로
//! 다룹니다. 외부에서 들어오는 숫자 텍스트는 이 모듈을 통해서만 변환하여
//! 금융 합계의 반올림 오차를 방지합니다.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{BacktestError, BacktestResult};

/// 금융 정밀도를 위한 가격 타입.
pub type Price = Decimal;

/// 주문 수량을 위한 타입.
pub type Quantity = Decimal;

/// 퍼센트 타입 (0.01 = 1%).
pub type Percentage = Decimal;

/// 외부 숫자 텍스트를 정확한 고정 소수점으로 파싱합니다.
///
/// `Decimal`은 inf/nan을 표현할 수 없으므로, "inf" 같은 텍스트 입력은
/// f64 사전 파싱으로 구분하여 별도의 에러 메시지를 반환합니다.
/// 실패 메시지는 호출자가 검사하는 관찰 가능한 계약의 일부입니다.
pub fn parse_decimal_param(raw: &str, what: &str) -> BacktestResult<Decimal> {
    let raw = raw.trim();
    let as_float: f64 = raw
        .parse()
        .map_err(|_| BacktestError::BadRequest(format!("{} needs to be a number", what)))?;
    if !as_float.is_finite() {
        return Err(BacktestError::BadRequest(format!(
            "{} needs to be finite",
            what
        )));
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| BacktestError::BadRequest(format!("{} needs to be a number", what)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_exact() {
        assert_eq!(parse_decimal_param("0.1", "amount").unwrap(), dec!(0.1));
        assert_eq!(parse_decimal_param(" 3 ", "amount").unwrap(), dec!(3));
        assert_eq!(parse_decimal_param("1e3", "amount").unwrap(), dec!(1000));
    }

    #[test]
    fn test_parse_not_a_number() {
        let err = parse_decimal_param("abc", "price").unwrap_err();
        assert_eq!(err.to_string(), "bad request: price needs to be a number");
    }

    #[test]
    fn test_parse_not_finite() {
        let err = parse_decimal_param("inf", "fee").unwrap_err();
        assert_eq!(err.to_string(), "bad request: fee needs to be finite");

        let err = parse_decimal_param("nan", "fee").unwrap_err();
        assert_eq!(err.to_string(), "bad request: fee needs to be finite");
    }
}
