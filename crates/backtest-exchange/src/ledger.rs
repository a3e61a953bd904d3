//! 자산별 잔고 원장.
//!
//! 원장은 자산마다 총액과 예약액 두 값만 추적합니다. 미체결 매수 주문은
//! 호가 자산을, 미체결 매도 주문은 기준 자산을 예약합니다. 모든 변경은
//! 원자적입니다: 불변식을 위반하는 변경은 적용되지 않고 에러를 반환합니다.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use backtest_core::{BacktestError, BacktestResult};

/// 잔고 불변식 검사 방식.
///
/// `Disabled`는 공매도/차입을 흉내내는 시나리오에서 음수 잔고를 허용합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceCheck {
    /// `0 <= reserved <= total` 불변식을 강제
    #[default]
    Enforced,
    /// 검사 없이 모든 변경을 허용
    Disabled,
}

/// 자산 하나의 잔고.
///
/// 불변식 (검사 활성 시): `0 <= reserved <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetBalance {
    total: Decimal,
    reserved: Decimal,
}

impl AssetBalance {
    /// 총 보유량을 반환합니다.
    pub fn total(&self) -> Decimal {
        self.total
    }

    /// 미체결 주문에 묶인 예약량을 반환합니다.
    pub fn reserved(&self) -> Decimal {
        self.reserved
    }

    /// 새 주문에 사용할 수 있는 가용량을 반환합니다.
    pub fn available(&self) -> Decimal {
        self.total - self.reserved
    }

    /// 조회용 스냅샷으로 변환합니다.
    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            free: self.available(),
            used: self.reserved,
            total: self.total,
        }
    }
}

/// `fetch_balance`가 반환하는 잔고 스냅샷.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceSnapshot {
    /// 가용량 (총액 - 예약액)
    pub free: Decimal,
    /// 예약액
    pub used: Decimal,
    /// 총액
    pub total: Decimal,
}

/// 자산별 잔고 원장.
#[derive(Debug, Clone)]
pub struct Ledger {
    balances: BTreeMap<String, AssetBalance>,
    check: BalanceCheck,
}

impl Ledger {
    /// 빈 원장을 생성합니다.
    pub fn new(check: BalanceCheck) -> Self {
        Self {
            balances: BTreeMap::new(),
            check,
        }
    }

    /// 시작 잔고를 넣은 원장을 생성합니다. 음수 시작 잔고는 거부합니다.
    pub fn with_balances(
        seed: &HashMap<String, Decimal>,
        check: BalanceCheck,
    ) -> BacktestResult<Self> {
        let mut ledger = Self::new(check);
        for (asset, amount) in seed {
            if *amount < Decimal::ZERO {
                return Err(BacktestError::Config(format!(
                    "initial balance for {} cannot be negative",
                    asset
                )));
            }
            ledger.balances.insert(
                asset.clone(),
                AssetBalance {
                    total: *amount,
                    reserved: Decimal::ZERO,
                },
            );
        }
        Ok(ledger)
    }

    /// 자산의 잔고를 반환합니다. 모르는 자산은 0입니다.
    pub fn get(&self, asset: &str) -> AssetBalance {
        self.balances.get(asset).copied().unwrap_or_default()
    }

    /// 총액을 `delta`만큼 변경합니다 (음수는 차감).
    ///
    /// 검사 활성 시 총액이 예약액 아래로 내려가면 변경 없이 실패합니다.
    pub fn deposit_total(&mut self, asset: &str, delta: Decimal) -> BacktestResult<()> {
        let balance = self.balances.entry(asset.to_string()).or_default();
        let new_total = balance.total + delta;
        if self.check == BalanceCheck::Enforced && new_total < balance.reserved {
            return Err(BacktestError::InsufficientFunds(
                "balance too little".to_string(),
            ));
        }
        balance.total = new_total;
        Ok(())
    }

    /// 예약액을 `delta`만큼 변경합니다 (음수는 예약 해제).
    ///
    /// 검사 활성 시 예약액이 총액을 넘거나 0 아래로 내려가면 변경 없이
    /// 실패합니다.
    pub fn reserve(&mut self, asset: &str, delta: Decimal) -> BacktestResult<()> {
        let balance = self.balances.entry(asset.to_string()).or_default();
        let new_reserved = balance.reserved + delta;
        if self.check == BalanceCheck::Enforced
            && (new_reserved > balance.total || new_reserved < Decimal::ZERO)
        {
            return Err(BacktestError::InsufficientFunds(
                "balance too little".to_string(),
            ));
        }
        balance.reserved = new_reserved;
        Ok(())
    }

    /// 모든 자산의 잔고 스냅샷을 자산 이름 순으로 반환합니다.
    pub fn snapshot_all(&self) -> BTreeMap<String, BalanceSnapshot> {
        self.balances
            .iter()
            .map(|(asset, balance)| (asset.clone(), balance.snapshot()))
            .collect()
    }
}
