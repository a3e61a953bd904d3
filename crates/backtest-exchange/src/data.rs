//! OHLCV CSV 파일 로딩.
//!
//! `timestamp,open,high,low,close,volume` 형식의 CSV를 읽어 검증 전
//! [`RawSeries`]로 만듭니다. 타임스탬프는 epoch 밀리초 또는 날짜 텍스트를
//! 받습니다. 디렉토리 구조는 `<dir>/<BASE>/<QUOTE>.csv`입니다.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use backtest_core::{parse_utc_date, BacktestError, BacktestResult};

use crate::series::{RawBar, RawSeries};

/// CSV 파일 하나를 읽어 원본 시계열로 만듭니다.
///
/// 첫 줄이 `timestamp`로 시작하면 헤더로 간주하여 건너뜁니다. 빈 셀은
/// 값이 없는 컬럼으로 남으며, 검증 단계에서 걸러집니다.
pub fn load_raw_series(path: &Path) -> BacktestResult<RawSeries> {
    let text = fs::read_to_string(path).map_err(|err| {
        BacktestError::Data(format!("cannot read {}: {}", path.display(), err))
    })?;

    let mut raw = RawSeries::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line_no == 0 && line.to_ascii_lowercase().starts_with("timestamp") {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 6 {
            return Err(BacktestError::Data(format!(
                "{}: line {} has {} fields, expected 6",
                path.display(),
                line_no + 1,
                fields.len()
            )));
        }
        let timestamp_ms = parse_timestamp(fields[0]).ok_or_else(|| {
            BacktestError::Data(format!(
                "{}: line {} has an invalid timestamp",
                path.display(),
                line_no + 1
            ))
        })?;

        raw.push(RawBar {
            timestamp_ms,
            open: cell(fields[1]),
            high: cell(fields[2]),
            low: cell(fields[3]),
            close: cell(fields[4]),
            volume: cell(fields[5]),
        });
    }
    Ok(raw)
}

/// 심볼 목록의 CSV 파일을 디렉토리에서 읽습니다.
///
/// 심볼 목록이 비어 있으면 디렉토리를 훑어 모든 `<BASE>/<QUOTE>.csv`를
/// 로드합니다.
pub fn load_series_dir(
    dir: &Path,
    symbols: &[String],
) -> BacktestResult<HashMap<String, RawSeries>> {
    if symbols.is_empty() {
        return discover_series(dir);
    }

    let mut result = HashMap::with_capacity(symbols.len());
    for symbol in symbols {
        let (base, quote) = symbol.split_once('/').ok_or_else(|| {
            BacktestError::Data(format!("symbol {} is not of the form BASE/QUOTE", symbol))
        })?;
        let path = dir.join(base).join(format!("{}.csv", quote));
        if !path.is_file() {
            return Err(BacktestError::Data(format!(
                "cannot find symbol ({}) file in directory {}",
                symbol,
                dir.display()
            )));
        }
        tracing::debug!(%symbol, path = %path.display(), "loading ohlcv file");
        result.insert(symbol.clone(), load_raw_series(&path)?);
    }
    Ok(result)
}

/// 디렉토리를 훑어 모든 심볼의 시계열을 로드합니다.
fn discover_series(dir: &Path) -> BacktestResult<HashMap<String, RawSeries>> {
    let mut result = HashMap::new();
    let entries = fs::read_dir(dir).map_err(|err| {
        BacktestError::Data(format!("cannot read directory {}: {}", dir.display(), err))
    })?;

    for entry in entries {
        let entry = entry
            .map_err(|err| BacktestError::Data(format!("cannot read directory entry: {}", err)))?;
        if !entry.path().is_dir() {
            continue;
        }
        let base = entry.file_name().to_string_lossy().to_string();
        let files = fs::read_dir(entry.path()).map_err(|err| {
            BacktestError::Data(format!(
                "cannot read directory {}: {}",
                entry.path().display(),
                err
            ))
        })?;
        for file in files {
            let file = file.map_err(|err| {
                BacktestError::Data(format!("cannot read directory entry: {}", err))
            })?;
            let path = file.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
                continue;
            }
            let Some(quote) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let symbol = format!("{}/{}", base, quote);
            tracing::debug!(%symbol, path = %path.display(), "loading ohlcv file");
            result.insert(symbol, load_raw_series(&path)?);
        }
    }
    Ok(result)
}

fn cell(field: &str) -> Option<String> {
    (!field.is_empty()).then(|| field.to_string())
}

/// epoch 밀리초 또는 날짜 텍스트를 밀리초로 파싱합니다.
fn parse_timestamp(field: &str) -> Option<i64> {
    field
        .parse::<i64>()
        .ok()
        .or_else(|| parse_utc_date(field).map(|date| date.timestamp_millis()))
}
