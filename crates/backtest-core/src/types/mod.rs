//! 공용 타입 정의.

pub mod clock;
pub mod decimal;
pub mod timeframe;

pub use clock::*;
pub use decimal::*;
pub use timeframe::*;
