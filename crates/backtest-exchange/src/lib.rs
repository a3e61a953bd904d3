//! # Backtest Exchange
//!
//! 결정적 주문 매칭과 원장을 갖춘 시뮬레이션 거래소입니다.
//!
//! 1분 단위 과거 가격 시계열을 재생하면서 주문이 언제, 어떤 가격에
//! 체결되는지 결정합니다. 모든 체결 판단은 현재 시뮬레이션 시각 이전의
//! 데이터만 사용합니다 (룩어헤드 편향 방지).
//!
//! 구성 요소:
//! - [`series`] - 가격 시계열 검증 및 보관
//! - [`ledger`] - 자산별 잔고 원장
//! - [`matching`] - 주문 매칭 엔진
//! - [`backend`] - 시장 데이터 조회를 포함한 거래소 백엔드
//! - [`runner`] - 시계를 전진시키며 전략을 실행하는 드라이버
//! - [`data`] - CSV 시계열 로딩
//!
//! 엔진은 단일 스레드 동기 방식이며 내부 잠금이 없습니다. 비동기
//! 인터페이스 뒤에 놓는 경우 그 계층이 호출을 직렬화해야 합니다.

pub mod backend;
pub mod data;
pub mod ledger;
pub mod matching;
pub mod runner;
pub mod series;
pub mod traits;

pub use backend::*;
pub use data::*;
pub use ledger::*;
pub use matching::*;
pub use runner::*;
pub use series::*;
pub use traits::*;
