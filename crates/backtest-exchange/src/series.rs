//! 가격 시계열 검증 및 보관.
//!
//! 이 모듈은 엔진에 주입되는 1분 단위 OHLCV 시계열을 다룹니다.
//! 원본 데이터(`RawSeries`)는 문자열 셀을 그대로 들고 있으며,
//! [`PriceSeries::validate`]가 커버리지/컬럼/간격/숫자 검증을 통과한
//! 시계열만 고정 소수점으로 변환해 보관합니다. 검증 실패 메시지는
//! 호출자가 검사하는 관찰 가능한 계약입니다.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

use backtest_core::{BacktestError, BacktestResult, Price, Side};

/// OHLCV 컬럼 식별자.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// 시가
    Open,
    /// 고가
    High,
    /// 저가
    Low,
    /// 종가
    Close,
    /// 거래량
    Volume,
}

impl Column {
    /// 전체 컬럼 목록.
    pub const ALL: [Column; 5] = [
        Column::Open,
        Column::High,
        Column::Low,
        Column::Close,
        Column::Volume,
    ];

    /// 컬럼 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Open => "open",
            Column::High => "high",
            Column::Low => "low",
            Column::Close => "close",
            Column::Volume => "volume",
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 검증 전의 1분 바 하나.
///
/// 셀은 외부 입력(CSV 등)에서 온 숫자 텍스트이며, 컬럼이 없으면 `None`입니다.
#[derive(Debug, Clone, Default)]
pub struct RawBar {
    /// 바 시작 시각 (epoch 밀리초)
    pub timestamp_ms: i64,
    /// 시가
    pub open: Option<String>,
    /// 고가
    pub high: Option<String>,
    /// 저가
    pub low: Option<String>,
    /// 종가
    pub close: Option<String>,
    /// 거래량
    pub volume: Option<String>,
}

impl RawBar {
    /// 컬럼 셀 값을 반환합니다.
    pub fn cell(&self, column: Column) -> Option<&str> {
        match column {
            Column::Open => self.open.as_deref(),
            Column::High => self.high.as_deref(),
            Column::Low => self.low.as_deref(),
            Column::Close => self.close.as_deref(),
            Column::Volume => self.volume.as_deref(),
        }
    }
}

/// 검증 전의 가격 시계열.
#[derive(Debug, Clone, Default)]
pub struct RawSeries {
    /// 시간 오름차순 바 목록
    pub bars: Vec<RawBar>,
}

impl RawSeries {
    /// 빈 시계열을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 바 하나를 끝에 추가합니다.
    pub fn push(&mut self, bar: RawBar) {
        self.bars.push(bar);
    }

    /// 컬럼에 값이 하나라도 있는지 확인합니다.
    fn has_column(&self, column: Column) -> bool {
        self.bars.iter().any(|bar| bar.cell(column).is_some())
    }
}

/// 검증된 1분 바 하나.
///
/// 검증 시 요구하지 않아 로드되지 않은 컬럼은 `None`으로 남습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesBar {
    /// 바 시작 시각
    pub timestamp: DateTime<Utc>,
    /// 시가
    pub open: Option<Decimal>,
    /// 고가
    pub high: Option<Decimal>,
    /// 저가
    pub low: Option<Decimal>,
    /// 종가
    pub close: Option<Decimal>,
    /// 거래량
    pub volume: Option<Decimal>,
}

impl SeriesBar {
    /// 컬럼 값을 반환합니다.
    pub fn value(&self, column: Column) -> Option<Decimal> {
        match column {
            Column::Open => self.open,
            Column::High => self.high,
            Column::Low => self.low,
            Column::Close => self.close,
            Column::Volume => self.volume,
        }
    }

    /// 컬럼 값을 반환하되, 로드되지 않았으면 데이터 에러를 반환합니다.
    pub fn require(&self, column: Column) -> BacktestResult<Decimal> {
        self.value(column).ok_or_else(|| {
            BacktestError::Data(format!("ohlcv column {} is not loaded", column))
        })
    }
}

/// 검증을 통과한 1분 단위 가격 시계열.
///
/// 불변식: 바는 시간 오름차순이며 간격은 정확히 1분입니다.
/// [`forget_before`](Self::forget_before)로 지난 구간을 잘라내도
/// 남은 바의 인덱스 계산은 변하지 않습니다 (머리 오프셋 방식).
#[derive(Debug, Clone)]
pub struct PriceSeries {
    bars: Vec<SeriesBar>,
    head: usize,
}

/// 1분 바 간격 (밀리초).
const ONE_MINUTE_MS: i64 = 60_000;

impl PriceSeries {
    /// 원본 시계열을 검증하여 고정 소수점 시계열로 변환합니다.
    ///
    /// 검증 순서는 고정되어 있습니다:
    /// 1. `[start, end]` 커버리지
    /// 2. 요구 컬럼 존재 여부
    /// 3. 정확한 1분 간격
    /// 4. 값의 유한성/파싱 가능성
    pub fn validate(
        raw: &RawSeries,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        required: &[Column],
    ) -> BacktestResult<Self> {
        let (first, last) = match (raw.bars.first(), raw.bars.last()) {
            (Some(first), Some(last)) => (first.timestamp_ms, last.timestamp_ms),
            _ => {
                return Err(BacktestError::InvalidSeries(
                    "ohlcv needs to cover timeframe".to_string(),
                ))
            }
        };
        if first > start.timestamp_millis() || last < end.timestamp_millis() {
            return Err(BacktestError::InvalidSeries(
                "ohlcv needs to cover timeframe".to_string(),
            ));
        }

        for column in required {
            if !raw.has_column(*column) {
                return Err(BacktestError::InvalidSeries(format!(
                    "ohlcv {} needs to be provided",
                    column
                )));
            }
        }

        for window in raw.bars.windows(2) {
            if window[1].timestamp_ms - window[0].timestamp_ms != ONE_MINUTE_MS {
                return Err(BacktestError::InvalidSeries(
                    "ohlcv needs to be in one-minute format".to_string(),
                ));
            }
        }

        // 존재하는 모든 컬럼을 파싱합니다. 요구하지 않은 컬럼도 값이
        // 있으면 검증 대상입니다.
        let loaded: Vec<Column> = Column::ALL
            .into_iter()
            .filter(|column| raw.has_column(*column))
            .collect();

        let mut bars = Vec::with_capacity(raw.bars.len());
        for raw_bar in &raw.bars {
            let mut bar = SeriesBar {
                timestamp: Utc.timestamp_millis_opt(raw_bar.timestamp_ms).single().ok_or_else(
                    || BacktestError::InvalidSeries("ohlcv timestamp is out of range".to_string()),
                )?,
                open: None,
                high: None,
                low: None,
                close: None,
                volume: None,
            };
            for column in &loaded {
                let cell = raw_bar.cell(*column).ok_or_else(|| {
                    BacktestError::InvalidSeries("ohlcv needs to be finite".to_string())
                })?;
                let value = parse_series_value(cell)?;
                match column {
                    Column::Open => bar.open = Some(value),
                    Column::High => bar.high = Some(value),
                    Column::Low => bar.low = Some(value),
                    Column::Close => bar.close = Some(value),
                    Column::Volume => bar.volume = Some(value),
                }
            }
            bars.push(bar);
        }

        Ok(Self { bars, head: 0 })
    }

    /// 남은 바의 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.bars.len() - self.head
    }

    /// 남은 바가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 남은 첫 바의 시각을 반환합니다.
    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.get(self.head).map(|bar| bar.timestamp)
    }

    /// 마지막 바의 시각을 반환합니다.
    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.bars.last().map(|bar| bar.timestamp)
    }

    /// 주어진 시각의 바를 반환합니다.
    pub fn bar_at(&self, timestamp: DateTime<Utc>) -> Option<&SeriesBar> {
        let index = self.index_of(timestamp)?;
        let bar = self.bars.get(index)?;
        (bar.timestamp == timestamp).then_some(bar)
    }

    /// `[from, to]` 구간의 바 슬라이스를 반환합니다.
    pub fn range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> &[SeriesBar] {
        if from > to {
            return &[];
        }
        let lo = self
            .index_of(from)
            .map(|i| {
                if self.bars[i].timestamp < from {
                    i + 1
                } else {
                    i
                }
            })
            .unwrap_or(self.head);
        let hi = match self.index_of(to) {
            Some(i) => i + 1,
            None => self.head,
        };
        if lo >= hi {
            return &[];
        }
        &self.bars[lo..hi]
    }

    /// `after` 이후(미포함)에 지정가가 체결 가능해지는 첫 시각을 찾습니다.
    ///
    /// 매수는 저가가 지정가 이하로 내려오는 바, 매도는 고가가 지정가
    /// 이상으로 올라가는 바입니다. 현재 바는 절대 보지 않습니다.
    pub fn first_fillable_after(
        &self,
        after: DateTime<Utc>,
        side: Side,
        limit_price: Price,
    ) -> Option<DateTime<Utc>> {
        self.bars[self.head..]
            .iter()
            .filter(|bar| bar.timestamp > after)
            .find(|bar| match side {
                Side::Buy => matches!(bar.low, Some(low) if low <= limit_price),
                Side::Sell => matches!(bar.high, Some(high) if high >= limit_price),
            })
            .map(|bar| bar.timestamp)
    }

    /// `before` 이전 바를 잊습니다. 메모리를 앞에서부터 해제하는 대신
    /// 머리 오프셋만 전진시켜 할당을 유지합니다.
    pub fn forget_before(&mut self, before: DateTime<Utc>) {
        while self
            .bars
            .get(self.head)
            .is_some_and(|bar| bar.timestamp < before)
        {
            self.head += 1;
        }
    }

    /// `timestamp` 이하인 마지막 바의 인덱스를 반환합니다.
    fn index_of(&self, timestamp: DateTime<Utc>) -> Option<usize> {
        let slice = &self.bars[self.head..];
        let count = slice.partition_point(|bar| bar.timestamp <= timestamp);
        if count == 0 {
            None
        } else {
            Some(self.head + count - 1)
        }
    }
}

/// 시각을 1분 바 시작으로 내림합니다.
pub fn floor_minute(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let rem = timestamp.timestamp_millis().rem_euclid(ONE_MINUTE_MS);
    timestamp - chrono::Duration::milliseconds(rem)
}

/// 시각을 `step` 경계로 올림합니다. 이미 경계에 있으면 그대로입니다.
pub fn ceil_to(timestamp: DateTime<Utc>, step: chrono::Duration) -> DateTime<Utc> {
    let rem = timestamp
        .timestamp_millis()
        .rem_euclid(step.num_milliseconds());
    if rem == 0 {
        timestamp
    } else {
        timestamp + (step - chrono::Duration::milliseconds(rem))
    }
}

/// 시계열 셀 하나를 고정 소수점으로 파싱합니다.
///
/// `Decimal`은 inf/nan을 표현할 수 없으므로 f64 사전 파싱으로 유한성을
/// 먼저 검사합니다.
fn parse_series_value(cell: &str) -> BacktestResult<Decimal> {
    let cell = cell.trim();
    match cell.parse::<f64>() {
        Ok(value) if !value.is_finite() => {
            return Err(BacktestError::InvalidSeries(
                "ohlcv needs to be finite".to_string(),
            ))
        }
        _ => {}
    }
    Decimal::from_str(cell)
        .or_else(|_| Decimal::from_scientific(cell))
        .map_err(|err| BacktestError::InvalidSeries(format!("ohlcv {}", err)))
}

/// 테스트와 데모용 무작위 1분 시계열을 생성합니다.
///
/// 시가는 직전 종가를 이어받고, 고가/저가는 시가/종가를 항상 포함합니다.
pub fn generate_sample_series(
    start: DateTime<Utc>,
    count: usize,
    start_price: f64,
    volatility: f64,
) -> RawSeries {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    let mut series = RawSeries::new();
    let mut price = start_price;

    for i in 0..count {
        let open = price;
        let close = open * (1.0 + rng.gen_range(-volatility..volatility));
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..volatility / 2.0));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..volatility / 2.0));
        let volume = rng.gen_range(10.0..1000.0);

        series.push(RawBar {
            timestamp_ms: start.timestamp_millis() + i as i64 * ONE_MINUTE_MS,
            open: Some(format!("{:.8}", open)),
            high: Some(format!("{:.8}", high)),
            low: Some(format!("{:.8}", low)),
            close: Some(format!("{:.8}", close)),
            volume: Some(format!("{:.2}", volume)),
        });

        price = close;
    }

    series
}
