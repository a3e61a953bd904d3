//! 백테스트 실행 명령어.
//!
//! CSV 디렉토리에서 시계열을 읽어 데모 전략(첫 틱 시장가 매수 후 보유)을
//! 실행하고 체결 내역과 최종 잔고를 출력합니다.
//!
//! # 사용 예시
//!
//! ```bash
//! backtest run -d data/ohlcv -f "2017-06-01" -t "2017-06-02" \
//!     --balances '{"BTC": "3"}' --buy-symbol ETH/BTC --amount 1
//! ```

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use backtest_core::{
    parse_decimal_param, BacktestConfig, BacktestResult, Market, OrderKind, Side,
    SimulationClock, SimulationConfig,
};
use backtest_exchange::{
    load_series_dir, run_backtest, BacktestContext, BacktestExchange, BalanceCheck, SharedClock,
    Strategy, StrategyControl,
};

/// run 명령어 설정.
#[derive(Debug, Clone)]
pub struct RunCliConfig {
    /// 설정 파일 경로 (옵션)
    pub config_path: Option<String>,
    /// 시작 일시 (설정 파일보다 우선)
    pub from: Option<String>,
    /// 종료 일시 (설정 파일보다 우선)
    pub to: Option<String>,
    /// 틱 간격 (설정 파일 없이 실행할 때 사용)
    pub interval: String,
    /// 심볼 목록 (비우면 디렉토리 전체)
    pub symbols: Vec<String>,
    /// OHLCV CSV 디렉토리
    pub data_dir: Option<String>,
    /// 자산별 시작 잔고 (JSON)
    pub balances_json: Option<String>,
    /// 데모 전략이 매수할 심볼
    pub buy_symbol: Option<String>,
    /// 데모 전략의 매수 수량
    pub amount: String,
}

/// 첫 틱에 시장가 매수 후 보유하는 데모 전략.
struct BuyOnceStrategy {
    symbol: String,
    amount: Decimal,
    order_id: Option<u64>,
}

impl Strategy for BuyOnceStrategy {
    fn next_iteration(&mut self, ctx: &mut BacktestContext) -> BacktestResult<StrategyControl> {
        if self.order_id.is_none() {
            let order_id = ctx.exchange("sim")?.create_order(
                &self.symbol,
                Side::Buy,
                OrderKind::Market,
                self.amount,
                None,
            )?;
            tracing::info!(order_id, symbol = %self.symbol, "demo strategy bought");
            self.order_id = Some(order_id);
        }
        Ok(StrategyControl::Continue)
    }
}

/// 백테스트 실행.
pub fn execute_run(cli: RunCliConfig) -> Result<()> {
    let mut config = resolve_config(&cli)?;
    if let Some(from) = &cli.from {
        config.simulation.start_date = from.clone();
    }
    if let Some(to) = &cli.to {
        config.simulation.end_date = to.clone();
    }

    let (start, end, interval) = config.simulation.window()?;
    let clock: SharedClock = Rc::new(RefCell::new(SimulationClock::new(start, end, interval)?));

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| config.data.ohlcv_dir.clone());
    let ohlcv = load_series_dir(Path::new(&data_dir), &cli.symbols)?;
    if ohlcv.is_empty() {
        return Err(anyhow!("no ohlcv data found in {}", data_dir));
    }

    let balances = resolve_balances(&cli, &config)?;

    // 설정에 없는 심볼은 BASE/QUOTE에서 시장 메타데이터를 유도
    let mut markets = config.parsed_markets()?;
    for symbol in ohlcv.keys() {
        if !markets.contains_key(symbol) {
            let (base, quote) = symbol.split_once('/').ok_or_else(|| {
                anyhow!("symbol {} is not of the form BASE/QUOTE", symbol)
            })?;
            markets.insert(symbol.clone(), Market::new(base, quote));
        }
    }

    let mut symbols: Vec<String> = ohlcv.keys().cloned().collect();
    symbols.sort();
    let buy_symbol = match cli.buy_symbol.clone() {
        Some(symbol) => symbol,
        None => symbols[0].clone(),
    };
    let amount = parse_decimal_param(&cli.amount, "amount")?;

    let exchange =
        BacktestExchange::new(clock.clone(), &balances, &ohlcv, markets, BalanceCheck::Enforced)?;
    let mut ctx = BacktestContext::new(clock);
    ctx.insert_exchange("sim", exchange);

    println!("\n📊 백테스트 실행 중...");
    println!("기간: {} ~ {}", start, end);
    println!("심볼: {}", symbols.join(", "));
    println!("데모 전략: {} {} 시장가 매수 후 보유", buy_symbol, amount);

    let mut strategy = BuyOnceStrategy {
        symbol: buy_symbol,
        amount,
        order_id: None,
    };
    let reason = run_backtest(&mut ctx, &mut strategy)?;

    let exchange = ctx.exchange("sim")?;
    let closed = exchange.fetch_closed_orders(None, None, None)?;
    let balances = exchange.fetch_balance()?;

    println!("\n✅ 백테스트 완료 ({:?})", reason);
    println!("체결 주문: {}건", closed.len());
    for order in &closed {
        println!(
            "  #{} {} {} {} @ {}",
            order.id,
            order.side,
            order.amount,
            order.symbol,
            order.average_price.unwrap_or_default()
        );
    }
    println!("\n최종 잔고:");
    println!("{}", serde_json::to_string_pretty(&balances)?);

    Ok(())
}

/// 설정 파일 또는 CLI 인자에서 기본 설정을 만듭니다.
fn resolve_config(cli: &RunCliConfig) -> Result<BacktestConfig> {
    match &cli.config_path {
        Some(path) => Ok(BacktestConfig::load(path)?),
        None => Ok(BacktestConfig {
            simulation: SimulationConfig {
                start_date: cli
                    .from
                    .clone()
                    .ok_or_else(|| anyhow!("--from is required without a config file"))?,
                end_date: cli
                    .to
                    .clone()
                    .ok_or_else(|| anyhow!("--to is required without a config file"))?,
                interval: cli.interval.clone(),
            },
            logging: Default::default(),
            data: Default::default(),
            balances: HashMap::new(),
            markets: HashMap::new(),
        }),
    }
}

/// 시작 잔고를 CLI JSON 또는 설정 파일에서 파싱합니다.
fn resolve_balances(
    cli: &RunCliConfig,
    config: &BacktestConfig,
) -> Result<HashMap<String, Decimal>> {
    match &cli.balances_json {
        Some(json) => {
            let raw: HashMap<String, String> = serde_json::from_str(json)?;
            let mut balances = HashMap::with_capacity(raw.len());
            for (asset, value) in &raw {
                let amount = parse_decimal_param(value, &format!("balance {}", asset))?;
                balances.insert(asset.clone(), amount);
            }
            Ok(balances)
        }
        None => Ok(config.parsed_balances()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    fn write_series(dir: &Path, rel: &str, start_ms: i64, count: usize) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = fs::File::create(path).unwrap();
        writeln!(file, "timestamp,open,high,low,close,volume").unwrap();
        for i in 0..count {
            let ts = start_ms + i as i64 * 60_000;
            writeln!(file, "{},4,6,4,5,10", ts).unwrap();
        }
    }

    fn cli(dir: &Path) -> RunCliConfig {
        RunCliConfig {
            config_path: None,
            from: Some("2017-06-01 10:00".to_string()),
            to: Some("2017-06-01 10:05".to_string()),
            interval: "1m".to_string(),
            symbols: vec![],
            data_dir: Some(dir.to_string_lossy().to_string()),
            balances_json: Some(r#"{"BTC": "7"}"#.to_string()),
            buy_symbol: None,
            amount: "1".to_string(),
        }
    }

    #[test]
    fn test_run_demo_strategy() {
        let dir = tempfile::tempdir().unwrap();
        // 2017-06-01 10:00 UTC
        write_series(dir.path(), "ETH/BTC.csv", 1496311200000, 6);

        execute_run(cli(dir.path())).unwrap();
    }

    #[test]
    fn test_run_requires_window_without_config() {
        let dir = tempfile::tempdir().unwrap();
        write_series(dir.path(), "ETH/BTC.csv", 1496311200000, 6);

        let mut config = cli(dir.path());
        config.from = None;
        let err = execute_run(config).unwrap_err();
        assert!(err.to_string().contains("--from is required"));
    }

    #[test]
    fn test_run_rejects_bad_amount() {
        let dir = tempfile::tempdir().unwrap();
        write_series(dir.path(), "ETH/BTC.csv", 1496311200000, 6);

        let mut config = cli(dir.path());
        config.amount = "abc".to_string();
        let err = execute_run(config).unwrap_err();
        assert_eq!(err.to_string(), "bad request: amount needs to be a number");
    }

    #[test]
    fn test_run_fails_on_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = execute_run(cli(dir.path())).unwrap_err();
        assert!(err.to_string().contains("no ohlcv data found"));
    }
}
