//! # Backtest Core
//!
//! 시뮬레이션 거래소의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 백테스트 시스템 전반에서 사용되는 기본 타입을 제공합니다:
//! - 주문 및 주문 상태 타입
//! - 시장 메타데이터 (기준/호가 자산, 수수료율)
//! - 캔들 및 시세 스냅샷 구조체
//! - 시뮬레이션 시계 및 타임프레임
//! - 정밀 소수점 파싱 유틸리티
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
