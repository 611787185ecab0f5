use chrono::NaiveDate;
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;

/// Which benchmark series a calculation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateColumn {
    Sofr,
    Hibor,
}

impl RateColumn {
    /// Column header in the persisted table.
    pub fn header(&self) -> &'static str {
        match self {
            RateColumn::Sofr => "SOFR",
            RateColumn::Hibor => "Daily Calculated Blended HIBOR",
        }
    }
}

impl fmt::Display for RateColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// One day of benchmark rates, in % p.a.
///
/// A blank cell in the source sheet is kept as `None` so that it is skipped
/// by range sums instead of silently counting as a zero observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub calculation_date: NaiveDate,
    pub sofr_rate: Option<Decimal>,
    pub hibor_rate: Option<Decimal>,
    pub sofr_date: Option<NaiveDate>,
    pub effective_hibor_sme: Option<Decimal>,
}

impl RateRecord {
    pub fn new(calculation_date: NaiveDate, sofr_rate: Decimal, hibor_rate: Decimal) -> Self {
        Self {
            calculation_date,
            sofr_rate: Some(sofr_rate),
            hibor_rate: Some(hibor_rate),
            sofr_date: None,
            effective_hibor_sme: None,
        }
    }

    pub fn rate(&self, column: RateColumn) -> Option<Decimal> {
        match column {
            RateColumn::Sofr => self.sofr_rate,
            RateColumn::Hibor => self.hibor_rate,
        }
    }
}

/// Ordered daily benchmark series, unique by calculation date.
///
/// The table is never mutated in place: [`RateTable::merge`] returns a new
/// table, which the caller swaps in once it has been persisted.
///
/// # Examples
///
/// ```
/// use repayment_engine::core::dates::ymd;
/// use repayment_engine::rates::table::{RateColumn, RateRecord, RateTable};
/// use rust_decimal_macros::dec;
///
/// let table = RateTable::from_records(vec![
///     RateRecord::new(ymd(2024, 1, 1), dec!(5.30), dec!(4.10)),
///     RateRecord::new(ymd(2024, 1, 2), dec!(5.31), dec!(4.12)),
///     RateRecord::new(ymd(2024, 1, 3), dec!(5.32), dec!(4.15)),
/// ]);
///
/// // (2024-01-01, 2024-01-03]
/// let sum = table.range_sum(RateColumn::Sofr, ymd(2024, 1, 1), ymd(2024, 1, 3));
/// assert_eq!(sum, dec!(10.63));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateTable {
    records: BTreeMap<NaiveDate, RateRecord>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from rows in supply order. A later row for the same date
    /// replaces an earlier one.
    pub fn from_records(records: impl IntoIterator<Item = RateRecord>) -> Self {
        let mut map = BTreeMap::new();
        for record in records {
            map.insert(record.calculation_date, record);
        }
        Self { records: map }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.records.keys().next_back().copied()
    }

    pub fn min_date(&self) -> Option<NaiveDate> {
        self.records.keys().next().copied()
    }

    /// Rows in ascending date order.
    pub fn records(&self) -> impl Iterator<Item = &RateRecord> {
        self.records.values()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&RateRecord> {
        self.records.get(&date)
    }

    /// Rate observed exactly on `date`, if that day is in the table and the
    /// cell is filled.
    pub fn rate_on(&self, column: RateColumn, date: NaiveDate) -> Option<Decimal> {
        self.records.get(&date).and_then(|r| r.rate(column))
    }

    /// Sum of `column` over calculation dates in `(from_exclusive, to_inclusive]`.
    ///
    /// An empty or inverted range sums to zero. Callers must not assume the
    /// result is nonzero: dates the table does not cover contribute nothing.
    pub fn range_sum(
        &self,
        column: RateColumn,
        from_exclusive: NaiveDate,
        to_inclusive: NaiveDate,
    ) -> Decimal {
        if to_inclusive <= from_exclusive {
            return Decimal::ZERO;
        }
        let mut covered = 0usize;
        let sum: Decimal = self
            .records
            .range((Bound::Excluded(from_exclusive), Bound::Included(to_inclusive)))
            .filter_map(|(_, r)| r.rate(column))
            .inspect(|_| covered += 1)
            .sum();
        if covered == 0 {
            warn!(
                "no {} rows cover ({}, {}]; range sum is zero",
                column, from_exclusive, to_inclusive
            );
        } else {
            debug!(
                "{} range ({}, {}]: {} rows, sum {}",
                column, from_exclusive, to_inclusive, covered, sum
            );
        }
        sum
    }

    /// Merge an uploaded sheet into a new table.
    ///
    /// Only rows dated after the current maximum are taken; duplicates within
    /// the upload collapse to the last supplied row. An empty table accepts
    /// every row.
    pub fn merge(&self, update: impl IntoIterator<Item = RateRecord>) -> MergeOutcome {
        let cutoff = self.max_date();
        let mut merged = self.records.clone();
        let mut appended = BTreeMap::new();
        let mut skipped = 0usize;

        for record in update {
            match cutoff {
                Some(max) if record.calculation_date <= max => skipped += 1,
                _ => {
                    appended.insert(record.calculation_date, record);
                }
            }
        }

        let added = appended.len();
        merged.extend(appended);

        MergeOutcome {
            table: RateTable { records: merged },
            added,
            skipped,
        }
    }
}

/// Result of [`RateTable::merge`].
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub table: RateTable,
    /// Distinct new dates appended.
    pub added: usize,
    /// Uploaded rows at or before the previous maximum date.
    pub skipped: usize,
}
