//! 백테스트 시스템의 에러 타입.
//!
//! 이 모듈은 시뮬레이션 거래소 전반에서 사용되는 에러 타입을 정의합니다.
//! 모든 에러는 호출자에게 반환되는 복구 가능한 도메인 에러이며,
//! 내부에서 재시도하지 않습니다. 실패한 호출은 엔진 상태를 변경하지 않습니다.

use thiserror::Error;

/// 핵심 백테스트 에러.
#[derive(Debug, Error)]
pub enum BacktestError {
    /// 잔고 부족 (원장 불변식 위반)
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// 구조적으로 잘못된 주문 요청
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// 잘못된 파라미터 또는 미래 데이터를 요구하는 조회
    #[error("bad request: {0}")]
    BadRequest(String),

    /// 주문을 찾을 수 없음
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// 가격 시계열이 로드되지 않은 심볼
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// 가격 시계열 검증 실패
    #[error("invalid series: {0}")]
    InvalidSeries(String),

    /// 설정 에러
    #[error("config error: {0}")]
    Config(String),

    /// 데이터 로딩/일관성 에러
    #[error("data error: {0}")]
    Data(String),
}

/// 백테스트 작업을 위한 Result 타입.
pub type BacktestResult<T> = Result<T, BacktestError>;

impl BacktestError {
    /// 호출자의 잘못된 요청으로 인한 에러인지 확인합니다.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            BacktestError::InvalidOrder(_)
                | BacktestError::BadRequest(_)
                | BacktestError::OrderNotFound(_)
                | BacktestError::UnknownSymbol(_)
        )
    }

    /// 원장 불변식 위반인지 확인합니다.
    pub fn is_funds_violation(&self) -> bool {
        matches!(self, BacktestError::InsufficientFunds(_))
    }
}

impl From<serde_json::Error> for BacktestError {
    fn from(err: serde_json::Error) -> Self {
        BacktestError::Data(err.to_string())
    }
}

impl From<config::ConfigError> for BacktestError {
    fn from(err: config::ConfigError) -> Self {
        BacktestError::Config(err.to_string())
    }
}
