//! The LMS field schema and the normalizer that turns a report into a [`TradeRecord`].
//!
//! Each field the engine reads is declared once in [`SCHEMA`] with its
//! section, exact field name, type and whether the calculation can run
//! without it. Required fields that are absent or unreadable are reported
//! together as [`NormalizeError::Fields`]; optional ones fall back to their
//! defaults (0 for amounts, the sentinel for the submission date).

use crate::core::currency::CurrencyCode;
use crate::core::dates::ymd;
use crate::core::funder::FunderId;
use crate::core::money::parse_accounting_amount;
use crate::core::trade::TradeRecord;
use crate::input::lms::{FieldValue, LmsDocument, LmsEntry};
use chrono::NaiveDate;
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub const PAYMENT_DETAILS: &str = "Payment Details";
pub const SME_INFORMATION: &str = "SME Information";
pub const SME_TRANSACTION: &str = "SME Transaction";
pub const FUNDER_INFORMATION: &str = "Funder Information";
pub const FUNDER_TRANSACTION: &str = "Funder Transaction";
pub const WAIVE_ITEMS: &str = "Waive Items";
pub const SURCHARGE_ITEMS: &str = "Surcharge Items";
pub const FUNDPARK_TRANSACTION: &str = "FundPark Transaction";

/// Every field the normalizer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FieldKey {
    DrawdownId,
    Currency,
    SmeDrawdown,
    RepaymentDate,
    RepaymentAmount,
    BankCharge,
    TenorDays,
    MitDays,
    SmeRateText,
    OutstandingPrincipal,
    Principal,
    SmeInterest,
    SmeOverdueInterest,
    ReturnToBorrower,
    FunderId,
    FunderDrawdown,
    LastFunderSubmission,
    FunderRate,
    FunderInterest,
    PlatformFee,
    FunderAllocation,
    WaivedBankCharge,
    WaivedSmeInterest,
    WaivedSmeOverdueInterest,
    FundParkSpreading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    Text,
    Date,
    Days,
    Amount,
    /// Stored as `-abs(value)`, 0 when absent.
    Waived,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldSpec {
    pub key: FieldKey,
    pub section: &'static str,
    pub field: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn spec(
    key: FieldKey,
    section: &'static str,
    field: &'static str,
    kind: FieldKind,
    required: bool,
) -> FieldSpec {
    FieldSpec {
        key,
        section,
        field,
        kind,
        required,
    }
}

use FieldKey as K;
use FieldKind::{Amount, Date, Days, Text, Waived};

pub const SCHEMA: &[FieldSpec] = &[
    spec(K::DrawdownId, PAYMENT_DETAILS, "Drawdown ID", Text, true),
    spec(K::Currency, PAYMENT_DETAILS, "Repayment Currency", Text, false),
    spec(K::SmeDrawdown, PAYMENT_DETAILS, "SME Disbursement Date", Date, true),
    spec(K::RepaymentDate, PAYMENT_DETAILS, "Repayment Date", Date, true),
    spec(K::RepaymentAmount, PAYMENT_DETAILS, "Repayment Amount", Amount, false),
    spec(K::BankCharge, PAYMENT_DETAILS, "Bank Charge", Amount, false),
    spec(K::TenorDays, SME_INFORMATION, "Tenor (Days)", Days, true),
    spec(K::MitDays, SME_INFORMATION, "MIT (Days)", Days, true),
    spec(K::SmeRateText, SME_INFORMATION, "Interest Rate (% p.a.)", Text, true),
    spec(K::OutstandingPrincipal, SME_TRANSACTION, "Outstanding Principal", Amount, false),
    spec(K::Principal, SME_TRANSACTION, "Principal", Amount, false),
    spec(K::SmeInterest, SME_TRANSACTION, "Interest", Amount, false),
    spec(K::SmeOverdueInterest, SME_TRANSACTION, "Overdue Interest", Amount, false),
    spec(K::ReturnToBorrower, SME_TRANSACTION, "Return to borrower", Amount, false),
    spec(K::FunderId, FUNDER_INFORMATION, "Funder ID", Text, true),
    spec(K::FunderDrawdown, FUNDER_INFORMATION, "Funder Disbursement Date", Date, false),
    spec(K::LastFunderSubmission, FUNDER_INFORMATION, "Last Funder Submission Date", Date, false),
    spec(K::FunderRate, FUNDER_INFORMATION, "Interest Rate (% p.a.)", Amount, false),
    spec(K::FunderInterest, FUNDER_TRANSACTION, "Interest (I + OI)", Amount, false),
    spec(K::PlatformFee, FUNDER_TRANSACTION, "Platform Fee", Waived, false),
    spec(K::FunderAllocation, FUNDER_TRANSACTION, "Total Allocation", Amount, false),
    spec(K::WaivedBankCharge, WAIVE_ITEMS, "Bank Charge", Waived, false),
    spec(K::WaivedSmeInterest, WAIVE_ITEMS, "Interest", Waived, false),
    spec(K::WaivedSmeOverdueInterest, WAIVE_ITEMS, "Overdue Interest", Waived, false),
    spec(K::FundParkSpreading, FUNDPARK_TRANSACTION, "FundPark Spreading", Amount, false),
];

pub fn field_spec(key: FieldKey) -> &'static FieldSpec {
    SCHEMA
        .iter()
        .find(|s| s.key == key)
        .unwrap_or_else(|| panic!("{key:?} has no schema entry"))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldProblem {
    Missing,
    Unparseable { raw: String },
}

/// A required field the report did not supply in usable form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub section: &'static str,
    pub field: &'static str,
    pub problem: FieldProblem,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.problem {
            FieldProblem::Missing => write!(f, "{} / {}: missing", self.section, self.field),
            FieldProblem::Unparseable { raw } => {
                write!(f, "{} / {}: cannot read '{}'", self.section, self.field, raw)
            }
        }
    }
}

fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("report is empty")]
    Empty,

    #[error("cannot calculate, required fields unusable: {}", describe(.0))]
    Fields(Vec<FieldError>),
}

/// Reads typed values per [`SCHEMA`], collecting errors for required fields.
struct FieldReader<'a> {
    doc: &'a LmsDocument,
    errors: Vec<FieldError>,
}

impl<'a> FieldReader<'a> {
    fn entry(&self, spec: &FieldSpec) -> Option<&'a LmsEntry> {
        self.doc
            .pick(spec.section, spec.field)
            .filter(|e| !e.raw.is_empty())
    }

    fn absent(&mut self, spec: &FieldSpec) {
        if spec.required {
            self.errors.push(FieldError {
                section: spec.section,
                field: spec.field,
                problem: FieldProblem::Missing,
            });
        }
    }

    fn unreadable(&mut self, spec: &FieldSpec, raw: &str) {
        if spec.required {
            self.errors.push(FieldError {
                section: spec.section,
                field: spec.field,
                problem: FieldProblem::Unparseable {
                    raw: raw.to_string(),
                },
            });
        } else {
            warn!(
                "{} / {}: cannot read '{}', using default",
                spec.section, spec.field, raw
            );
        }
    }

    fn text(&mut self, key: FieldKey) -> Option<String> {
        let spec = field_spec(key);
        match self.entry(spec) {
            Some(e) => Some(e.raw.clone()),
            None => {
                self.absent(spec);
                None
            }
        }
    }

    fn date(&mut self, key: FieldKey) -> Option<NaiveDate> {
        let spec = field_spec(key);
        let entry = match self.entry(spec) {
            Some(e) => e,
            None => {
                self.absent(spec);
                return None;
            }
        };
        match entry.value {
            Some(FieldValue::Date(d)) => Some(d),
            _ => {
                self.unreadable(spec, &entry.raw);
                None
            }
        }
    }

    fn days(&mut self, key: FieldKey) -> Option<i64> {
        let spec = field_spec(key);
        let entry = match self.entry(spec) {
            Some(e) => e,
            None => {
                self.absent(spec);
                return None;
            }
        };
        match entry.value {
            Some(FieldValue::Days(d)) => Some(d),
            _ => {
                self.unreadable(spec, &entry.raw);
                None
            }
        }
    }

    /// Amount or zero. A trailing `%` is tolerated for rates.
    fn amount(&mut self, key: FieldKey) -> Decimal {
        let spec = field_spec(key);
        let entry = match self.entry(spec) {
            Some(e) => e,
            None => {
                self.absent(spec);
                return Decimal::ZERO;
            }
        };
        let value = entry
            .value
            .as_ref()
            .and_then(FieldValue::as_number)
            .or_else(|| parse_accounting_amount(entry.raw.trim_end_matches('%')));
        match value {
            Some(v) => v,
            None => {
                self.unreadable(spec, &entry.raw);
                Decimal::ZERO
            }
        }
    }

    /// Waived items are costs: always `-abs(value)`.
    fn waived(&mut self, key: FieldKey) -> Decimal {
        debug_assert_eq!(field_spec(key).kind, FieldKind::Waived);
        -self.amount(key).abs()
    }

    /// Sum of every numeric surcharge entry; anything else is skipped.
    fn surcharge_total(&self) -> Decimal {
        let mut total = Decimal::ZERO;
        for entry in self.doc.section(SURCHARGE_ITEMS) {
            match entry.value.as_ref().and_then(FieldValue::as_number) {
                Some(v) => total += v,
                None => warn!(
                    "surcharge item '{}' = '{}' is not numeric, skipped",
                    entry.field, entry.raw
                ),
            }
        }
        total
    }
}

/// Turns LMS report text into a typed [`TradeRecord`].
#[derive(Debug, Clone)]
pub struct Normalizer {
    submission_sentinel: NaiveDate,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(ymd(1999, 1, 1))
    }
}

impl Normalizer {
    pub fn new(submission_sentinel: NaiveDate) -> Self {
        Self {
            submission_sentinel,
        }
    }

    pub fn normalize_text(&self, text: &str) -> Result<TradeRecord, NormalizeError> {
        self.normalize(&LmsDocument::parse(text))
    }

    pub fn normalize(&self, doc: &LmsDocument) -> Result<TradeRecord, NormalizeError> {
        if doc.is_empty() {
            return Err(NormalizeError::Empty);
        }
        let mut r = FieldReader {
            doc,
            errors: Vec::new(),
        };

        let drawdown_id = r.text(K::DrawdownId);
        let funder_id = r.text(K::FunderId);
        let rate_description = r.text(K::SmeRateText);
        let sme_drawdown = r.date(K::SmeDrawdown);
        let repayment_date = r.date(K::RepaymentDate);
        let tenor_days = r.days(K::TenorDays);
        let mit_days = r.days(K::MitDays);
        let currency = r.text(K::Currency).unwrap_or_default();
        let funder_drawdown = r.date(K::FunderDrawdown);
        let last_funder_submission = r.date(K::LastFunderSubmission);

        let repayment_amount = r.amount(K::RepaymentAmount);
        let outstanding_principal = r.amount(K::OutstandingPrincipal);
        let principal = r.amount(K::Principal);
        let bank_charge = r.amount(K::BankCharge);
        let sme_recorded_interest = r.amount(K::SmeInterest);
        let sme_recorded_overdue_interest = r.amount(K::SmeOverdueInterest);
        let return_to_borrower = r.amount(K::ReturnToBorrower);
        let funder_recorded_interest = r.amount(K::FunderInterest);
        let funder_interest_rate = r.amount(K::FunderRate);
        let funder_allocation = r.amount(K::FunderAllocation);
        let spreading_recorded = r.amount(K::FundParkSpreading);
        let platform_fee = r.waived(K::PlatformFee);
        let waived_bank_charge = r.waived(K::WaivedBankCharge);
        let waived_sme_interest = r.waived(K::WaivedSmeInterest);
        let waived_sme_overdue_interest = r.waived(K::WaivedSmeOverdueInterest);
        let surcharge_total = r.surcharge_total();

        let (
            Some(drawdown_id),
            Some(funder_id),
            Some(rate_description),
            Some(sme_drawdown),
            Some(repayment_date),
            Some(tenor_days),
            Some(mit_days),
        ) = (
            drawdown_id,
            funder_id,
            rate_description,
            sme_drawdown,
            repayment_date,
            tenor_days,
            mit_days,
        )
        else {
            return Err(NormalizeError::Fields(r.errors));
        };

        let trade = TradeRecord {
            drawdown_id,
            funder_id: FunderId::new(funder_id),
            currency: CurrencyCode::new(currency),
            rate_description,
            sme_drawdown,
            funder_drawdown: funder_drawdown.unwrap_or(sme_drawdown),
            last_funder_submission: last_funder_submission.unwrap_or(self.submission_sentinel),
            repayment_date,
            tenor_days,
            mit_days,
            repayment_amount,
            outstanding_principal,
            principal,
            bank_charge,
            sme_recorded_interest,
            sme_recorded_overdue_interest,
            return_to_borrower,
            waived_bank_charge,
            waived_sme_interest,
            waived_sme_overdue_interest,
            surcharge_total,
            funder_recorded_interest,
            funder_interest_rate,
            platform_fee,
            funder_allocation,
            spreading_recorded,
        };
        debug!("normalized trade {}", trade.drawdown_id);
        Ok(trade)
    }
}
