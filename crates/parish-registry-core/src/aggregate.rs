//! Report computations over record snapshots.
//!
//! Every function here is pure: it takes the records returned by a store read
//! and derives chart-ready tables without touching storage.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Serialize, Serializer};
use time::Date;

use crate::{AgeBracket, Direction, Member, Transaction};

/// Calendar month used to group transactions, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u8,
}

impl YearMonth {
    #[must_use]
    pub fn of(date: Date) -> Self {
        Self {
            year: date.year(),
            month: u8::from(date.month()),
        }
    }
}

impl Display for YearMonth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BracketShare {
    pub bracket: AgeBracket,
    pub count: usize,
    pub proportion: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BracketDistribution {
    pub total: usize,
    pub shares: Vec<BracketShare>,
}

impl BracketDistribution {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthlyFlow {
    pub month: YearMonth,
    pub income: f64,
    pub expense: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct RunningTotals {
    pub income: f64,
    pub expense: f64,
    pub balance: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FinanceReport {
    pub totals: RunningTotals,
    pub monthly: Vec<MonthlyFlow>,
    pub income_by_category: Vec<CategoryTotal>,
}

/// Counts members per bracket. Only observed brackets appear, youngest first.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bracket_distribution(members: &[Member]) -> BracketDistribution {
    let mut counts: BTreeMap<AgeBracket, usize> = BTreeMap::new();
    for member in members {
        *counts.entry(member.bracket).or_default() += 1;
    }

    let total = members.len();
    let shares = counts
        .into_iter()
        .map(|(bracket, count)| BracketShare {
            bracket,
            count,
            proportion: count as f64 / total as f64,
        })
        .collect();

    BracketDistribution { total, shares }
}

/// Sums income and expense per month. Every observed month carries both
/// directions, zero when absent.
#[must_use]
pub fn monthly_flow(transactions: &[Transaction]) -> Vec<MonthlyFlow> {
    let mut months: BTreeMap<YearMonth, (f64, f64)> = BTreeMap::new();
    for transaction in transactions {
        let entry = months.entry(YearMonth::of(transaction.date)).or_default();
        match transaction.direction {
            Direction::Income => entry.0 += transaction.amount,
            Direction::Expense => entry.1 += transaction.amount,
        }
    }

    months
        .into_iter()
        .map(|(month, (income, expense))| MonthlyFlow {
            month,
            income,
            expense,
        })
        .collect()
}

/// Sums income per category, ordered by category name.
#[must_use]
pub fn category_distribution(transactions: &[Transaction]) -> Vec<CategoryTotal> {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for transaction in transactions
        .iter()
        .filter(|item| item.direction == Direction::Income)
    {
        *totals.entry(transaction.category.as_str()).or_default() += transaction.amount;
    }

    totals
        .into_iter()
        .filter(|(_, total)| *total > 0.0)
        .map(|(category, total)| CategoryTotal {
            category: category.to_string(),
            total,
        })
        .collect()
}

#[must_use]
pub fn running_totals(transactions: &[Transaction]) -> RunningTotals {
    let (income, expense) = transactions
        .iter()
        .fold((0.0, 0.0), |(income, expense), item| match item.direction {
            Direction::Income => (income + item.amount, expense),
            Direction::Expense => (income, expense + item.amount),
        });

    RunningTotals {
        income,
        expense,
        balance: income - expense,
    }
}

#[must_use]
pub fn finance_report(transactions: &[Transaction]) -> FinanceReport {
    FinanceReport {
        totals: running_totals(transactions),
        monthly: monthly_flow(transactions),
        income_by_category: category_distribution(transactions),
    }
}
