//! 백테스트 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 데이터 디렉토리 검증
//! backtest validate -d data/ohlcv -f "2017-06-01" -t "2017-06-02"
//!
//! # 특정 심볼만 검증
//! backtest validate -d data/ohlcv -f "2017-06-01" -t "2017-06-02" --symbols ETH/BTC,XRP/BTC
//!
//! # 데모 전략으로 백테스트 실행
//! backtest run -d data/ohlcv -f "2017-06-01" -t "2017-06-02" \
//!     --balances '{"BTC": "3"}' --buy-symbol ETH/BTC --amount 1
//!
//! # 설정 파일로 실행
//! backtest run -c backtest.toml
//! ```

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tracing::error;

use backtest_core::{init_logging, LogConfig};

mod commands;

use commands::run::{execute_run, RunCliConfig};
use commands::validate::{execute_validate, ValidateCliConfig};

#[derive(Parser)]
#[command(name = "backtest")]
#[command(about = "Deterministic backtest exchange - 시뮬레이션 거래소 백테스트 도구", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 데모 전략으로 백테스트 실행
    Run {
        /// 설정 파일 (TOML, 옵션)
        #[arg(short, long)]
        config: Option<String>,

        /// 시작 일시 (예: "2017-06-01" 또는 "2017-06-01 10:00")
        #[arg(short = 'f', long)]
        from: Option<String>,

        /// 종료 일시
        #[arg(short, long)]
        to: Option<String>,

        /// 틱 간격 (1m, 5m, 15m, 30m, 1h, 4h, 1d)
        #[arg(short, long, default_value = "1m")]
        interval: String,

        /// 심볼 목록 (쉼표로 구분, 예: ETH/BTC,XRP/BTC. 비우면 디렉토리 전체)
        #[arg(short, long)]
        symbols: Option<String>,

        /// OHLCV CSV 디렉토리 (<dir>/<BASE>/<QUOTE>.csv)
        #[arg(short, long)]
        data_dir: Option<String>,

        /// 자산별 시작 잔고 (JSON, 예: '{"BTC": "3"}')
        #[arg(short, long)]
        balances: Option<String>,

        /// 데모 전략이 매수할 심볼 (기본: 첫 번째 심볼)
        #[arg(long)]
        buy_symbol: Option<String>,

        /// 데모 전략의 매수 수량
        #[arg(long, default_value = "1")]
        amount: String,
    },

    /// OHLCV 데이터 검증
    Validate {
        /// 시작 일시
        #[arg(short = 'f', long)]
        from: String,

        /// 종료 일시
        #[arg(short, long)]
        to: String,

        /// 심볼 목록 (쉼표로 구분. 비우면 디렉토리 전체)
        #[arg(short, long)]
        symbols: Option<String>,

        /// OHLCV CSV 디렉토리
        #[arg(short, long, default_value = "data/ohlcv")]
        data_dir: String,
    },
}

fn split_symbols(symbols: Option<String>) -> Vec<String> {
    symbols
        .map(|list| {
            list.split(',')
                .map(|symbol| symbol.trim().to_string())
                .filter(|symbol| !symbol.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn main() -> anyhow::Result<()> {
    init_logging(LogConfig::from_env()).map_err(|err| anyhow!("logging init failed: {}", err))?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            from,
            to,
            interval,
            symbols,
            data_dir,
            balances,
            buy_symbol,
            amount,
        } => {
            let run_config = RunCliConfig {
                config_path: config,
                from,
                to,
                interval,
                symbols: split_symbols(symbols),
                data_dir,
                balances_json: balances,
                buy_symbol,
                amount,
            };

            if let Err(err) = execute_run(run_config) {
                error!(error = %err, "backtest run failed");
                return Err(err);
            }
        }

        Commands::Validate {
            from,
            to,
            symbols,
            data_dir,
        } => {
            let validate_config = ValidateCliConfig {
                from,
                to,
                symbols: split_symbols(symbols),
                data_dir,
            };

            if let Err(err) = execute_validate(validate_config) {
                error!(error = %err, "validation failed");
                return Err(err);
            }
        }
    }

    Ok(())
}
