//! OHLCV 데이터 검증 명령어.
//!
//! 디렉토리의 CSV 시계열이 주어진 구간을 커버하고 1분 형식과 숫자 규칙을
//! 지키는지 확인합니다. 백테스트 실행 전에 데이터 문제를 미리 찾을 때
//! 사용합니다.
//!
//! # 사용 예시
//!
//! ```bash
//! backtest validate -d data/ohlcv -f "2017-06-01" -t "2017-06-02"
//! ```

use anyhow::{anyhow, Result};
use std::path::Path;

use backtest_core::parse_utc_date;
use backtest_exchange::{load_series_dir, Column, PriceSeries};

/// validate 명령어 설정.
#[derive(Debug, Clone)]
pub struct ValidateCliConfig {
    /// 시작 일시
    pub from: String,
    /// 종료 일시
    pub to: String,
    /// 심볼 목록 (비우면 디렉토리 전체)
    pub symbols: Vec<String>,
    /// OHLCV CSV 디렉토리
    pub data_dir: String,
}

/// 데이터 검증 실행.
pub fn execute_validate(cli: ValidateCliConfig) -> Result<()> {
    let start = parse_utc_date(&cli.from).ok_or_else(|| anyhow!("start date is not valid"))?;
    let end = parse_utc_date(&cli.to).ok_or_else(|| anyhow!("end date is not valid"))?;
    if end < start {
        return Err(anyhow!("end date is smaller than start date"));
    }

    let ohlcv = load_series_dir(Path::new(&cli.data_dir), &cli.symbols)?;
    if ohlcv.is_empty() {
        return Err(anyhow!("no ohlcv data found in {}", cli.data_dir));
    }

    println!("\n📋 OHLCV 검증: {} ~ {}", start, end);

    let mut symbols: Vec<String> = ohlcv.keys().cloned().collect();
    symbols.sort();

    let mut failures = 0;
    for symbol in &symbols {
        match PriceSeries::validate(&ohlcv[symbol], start, end, &Column::ALL) {
            Ok(series) => println!("  ✅ {}: {}개 바", symbol, series.len()),
            Err(err) => {
                failures += 1;
                println!("  ❌ {}: {}", symbol, err);
            }
        }
    }

    if failures > 0 {
        return Err(anyhow!("{} symbol(s) failed validation", failures));
    }
    println!("\n✅ 모든 심볼 검증 통과");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn write_lines(dir: &Path, rel: &str, lines: &[String]) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = fs::File::create(path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
    }

    fn minute_lines(start_ms: i64, count: usize, gap_at: Option<usize>) -> Vec<String> {
        (0..count)
            .filter(|i| gap_at != Some(*i))
            .map(|i| format!("{},4,6,4,5,10", start_ms + i as i64 * 60_000))
            .collect()
    }

    fn cli(dir: &Path) -> ValidateCliConfig {
        ValidateCliConfig {
            from: "2017-06-01 10:00".to_string(),
            to: "2017-06-01 10:05".to_string(),
            symbols: vec![],
            data_dir: dir.to_string_lossy().to_string(),
        }
    }

    #[test]
    fn test_validate_passes_for_clean_data() {
        let dir = tempfile::tempdir().unwrap();
        write_lines(
            dir.path(),
            "ETH/BTC.csv",
            &minute_lines(1496311200000, 6, None),
        );

        execute_validate(cli(dir.path())).unwrap();
    }

    #[test]
    fn test_validate_fails_on_gap() {
        let dir = tempfile::tempdir().unwrap();
        write_lines(
            dir.path(),
            "ETH/BTC.csv",
            &minute_lines(1496311200000, 7, Some(3)),
        );

        let err = execute_validate(cli(dir.path())).unwrap_err();
        assert_eq!(err.to_string(), "1 symbol(s) failed validation");
    }

    #[test]
    fn test_validate_rejects_reversed_window() {
        let dir = tempfile::tempdir().unwrap();
        write_lines(
            dir.path(),
            "ETH/BTC.csv",
            &minute_lines(1496311200000, 6, None),
        );

        let mut config = cli(dir.path());
        config.from = "2017-06-02".to_string();
        config.to = "2017-06-01".to_string();
        let err = execute_validate(config).unwrap_err();
        assert_eq!(err.to_string(), "end date is smaller than start date");
    }
}
