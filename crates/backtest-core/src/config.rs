//! 설정 관리.
//!
//! 이 모듈은 백테스트 실행 설정을 정의하고 관리합니다. 설정은 TOML 파일과
//! `BACKTEST_` 접두사의 환경 변수에서 로드됩니다. 금액과 수수료율은 정밀도
//! 손실을 막기 위해 문자열로 들어와 고정 소수점으로 파싱됩니다.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::domain::Market;
use crate::error::{BacktestError, BacktestResult};
use crate::types::{parse_decimal_param, Timeframe};

/// 백테스트 실행 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BacktestConfig {
    /// 시뮬레이션 구간 설정
    pub simulation: SimulationConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 데이터 디렉토리 설정
    #[serde(default)]
    pub data: DataConfig,
    /// 자산별 시작 잔고 (문자열 금액)
    #[serde(default)]
    pub balances: HashMap<String, String>,
    /// 심볼별 시장 메타데이터
    #[serde(default)]
    pub markets: HashMap<String, MarketConfig>,
}

impl BacktestConfig {
    /// TOML 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load(path: impl AsRef<Path>) -> BacktestResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix("BACKTEST").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// 시작 잔고를 고정 소수점으로 파싱합니다.
    pub fn parsed_balances(&self) -> BacktestResult<HashMap<String, Decimal>> {
        self.balances
            .iter()
            .map(|(asset, raw)| {
                let amount = parse_decimal_param(raw, &format!("balance {}", asset))?;
                Ok((asset.clone(), amount))
            })
            .collect()
    }

    /// 시장 메타데이터를 도메인 타입으로 변환합니다.
    pub fn parsed_markets(&self) -> BacktestResult<HashMap<String, Market>> {
        self.markets
            .iter()
            .map(|(symbol, market)| Ok((symbol.clone(), market.to_market(symbol)?)))
            .collect()
    }
}

/// 시뮬레이션 구간 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// 시작 일시 (RFC3339 또는 "YYYY-MM-DD [HH:MM]")
    pub start_date: String,
    /// 종료 일시
    pub end_date: String,
    /// 틱 간격 (예: "1m", "1h")
    #[serde(default = "default_interval")]
    pub interval: String,
}

fn default_interval() -> String {
    "1m".to_string()
}

impl SimulationConfig {
    /// 시작/종료 시각과 간격을 파싱합니다.
    pub fn window(&self) -> BacktestResult<(DateTime<Utc>, DateTime<Utc>, Duration)> {
        let start = parse_utc_date(&self.start_date)
            .ok_or_else(|| BacktestError::Config("start date is not valid".to_string()))?;
        let end = parse_utc_date(&self.end_date)
            .ok_or_else(|| BacktestError::Config("end date is not valid".to_string()))?;
        let interval = Timeframe::from_str(&self.interval)
            .map_err(|_| BacktestError::Config("interval is not valid".to_string()))?
            .interval();
        Ok((start, end, interval))
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 데이터 디렉토리 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    /// OHLCV CSV 파일 디렉토리 (`<dir>/<BASE>/<QUOTE>.csv`)
    pub ohlcv_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            ohlcv_dir: "data/ohlcv".to_string(),
        }
    }
}

/// 심볼 하나의 시장 메타데이터 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketConfig {
    /// 기준 자산
    pub base: String,
    /// 호가 자산
    pub quote: String,
    /// 메이커 수수료율 (문자열)
    #[serde(default)]
    pub maker: Option<String>,
    /// 테이커 수수료율 (문자열)
    #[serde(default)]
    pub taker: Option<String>,
}

impl MarketConfig {
    /// 수수료율을 파싱하여 도메인 `Market`으로 변환합니다.
    pub fn to_market(&self, symbol: &str) -> BacktestResult<Market> {
        let mut market = Market {
            symbol: symbol.to_string(),
            base: Some(self.base.clone()),
            quote: Some(self.quote.clone()),
            maker: None,
            taker: None,
        };
        if let Some(raw) = &self.maker {
            market.maker = Some(parse_decimal_param(raw, "fee")?);
        }
        if let Some(raw) = &self.taker {
            market.taker = Some(parse_decimal_param(raw, "fee")?);
        }
        Ok(market)
    }
}

/// 날짜 텍스트를 UTC 일시로 파싱합니다.
///
/// RFC3339, "YYYY-MM-DD HH:MM", "YYYY-MM-DD"를 지원합니다.
pub fn parse_utc_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M") {
        return Some(parsed.and_utc());
    }
    if let Ok(parsed) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(parsed.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}
