// 🏦 Parser Framework
// Reads bank exports into raw source records

use crate::error::{ConvertError, Result};
use csv::{ReaderBuilder, StringRecord};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Column layout of a DKB account export, in file order.
pub const DKB_COLUMNS: [&str; 12] = [
    "Buchungsdatum",
    "Wertstellung",
    "Status",
    "Zahlungspflichtige*r",
    "Zahlungsempfänger*in",
    "Verwendungszweck",
    "Umsatztyp",
    "IBAN",
    "Betrag (€)",
    "Gläubiger-ID",
    "Mandatsreferenz",
    "Kundenreferenz",
];

/// Columns up to and including the amount must be present.
const REQUIRED_COLUMNS: usize = 9;

/// SourceType - which bank produced the export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    Dkb,
}

impl SourceType {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            SourceType::Dkb => "Deutsche Kreditbank",
        }
    }

    /// Short code for internal use
    pub fn code(&self) -> &str {
        match self {
            SourceType::Dkb => "DKB",
        }
    }
}

/// Account the export belongs to, taken from its first line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
    pub iban: String,
}

fn iban_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^DE\d{20}$").expect("static IBAN pattern"))
}

impl Account {
    /// Build an account, rejecting anything that is not a German IBAN.
    pub fn new(name: impl Into<String>, iban: impl Into<String>) -> Result<Self> {
        let iban = iban.into();
        if !iban_pattern().is_match(&iban) {
            return Err(ConvertError::InvalidIban(iban));
        }
        Ok(Account {
            name: name.into(),
            iban,
        })
    }
}

/// Direction of a DKB booking ("Umsatztyp")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Incoming,
    Outgoing,
}

impl TransactionKind {
    /// Anything but "Eingang" counts as outgoing.
    pub fn from_dkb(raw: &str) -> Self {
        if raw.trim() == "Eingang" {
            TransactionKind::Incoming
        } else {
            TransactionKind::Outgoing
        }
    }
}

/// SourceRecord - one row of the export, before any normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub booking_date: String,
    pub value_date: String,
    pub status: String,
    pub payer: String,
    pub payee: String,
    pub purpose: String,
    pub kind: String,
    pub iban: String,
    pub amount: String,
    pub creditor_id: String,
    pub mandate_reference: String,
    pub customer_reference: String,

    // Provenance
    pub line: u64,
}

impl SourceRecord {
    /// Build a record from one CSV row. Missing reference columns are empty.
    pub fn from_row(row: &StringRecord, line: u64) -> Result<Self> {
        if row.len() < REQUIRED_COLUMNS {
            return Err(ConvertError::format(
                line,
                format!(
                    "expected at least {} columns, found {}",
                    REQUIRED_COLUMNS,
                    row.len()
                ),
            ));
        }

        let field = |idx: usize| row.get(idx).unwrap_or("").to_string();

        Ok(SourceRecord {
            booking_date: field(0),
            value_date: field(1),
            status: field(2),
            payer: field(3),
            payee: field(4),
            purpose: field(5),
            kind: field(6),
            iban: field(7),
            amount: field(8),
            creditor_id: field(9),
            mandate_reference: field(10),
            customer_reference: field(11),
            line,
        })
    }

    pub fn transaction_kind(&self) -> TransactionKind {
        TransactionKind::from_dkb(&self.kind)
    }

    /// The other side of the booking: who paid us, or who we paid.
    pub fn counterparty(&self) -> &str {
        match self.transaction_kind() {
            TransactionKind::Incoming => &self.payer,
            TransactionKind::Outgoing => &self.payee,
        }
    }

    /// DKB appends a closing-balance entry that is not a real transaction.
    pub fn is_balance_summary(&self) -> bool {
        self.payer.trim() == "DKB AG" && self.purpose.contains("Kontostand/Rechnungsabschluss")
    }
}

/// Everything read from one export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankExport {
    pub source_type: SourceType,
    pub account: Account,
    pub records: Vec<SourceRecord>,
}

// ============================================================================
// COMPOSABLE TRAITS
// ============================================================================

/// BankParser - core trait every bank format implements
pub trait BankParser: Send + Sync {
    /// Parse an export from any reader
    fn parse_reader(&self, reader: &mut dyn Read) -> Result<BankExport>;

    /// Get the source type this parser handles
    fn source_type(&self) -> SourceType;

    /// Parse a file on disk
    fn parse(&self, file_path: &Path) -> Result<BankExport> {
        let mut file = File::open(file_path).map_err(|e| ConvertError::io(file_path, e))?;
        self.parse_reader(&mut file)
    }

    /// Get parser version (for provenance tracking)
    fn version(&self) -> &str {
        "1.0.0"
    }
}

/// FileValidator - optional capability: cheap check before a full parse
pub trait FileValidator {
    fn can_parse(&self, file_path: &Path) -> bool;
}

// ============================================================================
// DKB
// ============================================================================

/// Strip BOM, stray quotes and whitespace from a preamble field.
fn clean_field(raw: &str) -> &str {
    raw.trim_start_matches('\u{feff}').trim().trim_matches('"').trim()
}

/// Streaming reader over a DKB export.
///
/// Construction consumes the account line and the preamble up to the
/// column header; iteration then yields one record per transaction row.
pub struct DkbReader<R: Read> {
    reader: csv::Reader<R>,
    account: Account,
    row: StringRecord,
    done: bool,
}

impl<R: Read> DkbReader<R> {
    pub fn new(input: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b';')
            .quote(b'"')
            .has_headers(false)
            .flexible(true)
            .from_reader(input);

        let mut row = StringRecord::new();
        if !reader.read_record(&mut row)? {
            return Err(ConvertError::EmptyInput);
        }

        let name = clean_field(row.get(0).unwrap_or(""));
        let iban = clean_field(row.get(1).unwrap_or(""));
        let account = Account::new(name, iban)?;
        debug!(account = %account.name, iban = %account.iban, "read account header");

        // Skip balance lines and blank markers until the column header
        loop {
            if !reader.read_record(&mut row)? {
                return Err(ConvertError::MissingHeader);
            }
            if clean_field(row.get(0).unwrap_or("")) == DKB_COLUMNS[0] {
                break;
            }
        }

        Ok(DkbReader {
            reader,
            account,
            row,
            done: false,
        })
    }

    pub fn account(&self) -> &Account {
        &self.account
    }
}

impl<R: Read> Iterator for DkbReader<R> {
    type Item = Result<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.reader.read_record(&mut self.row) {
                Ok(false) => self.done = true,
                Ok(true) => {
                    let line = self.row.position().map(|p| p.line()).unwrap_or(0);
                    // Trailing blank marker rows carry no data
                    if self.row.iter().all(|f| f.trim().is_empty()) {
                        continue;
                    }
                    return Some(SourceRecord::from_row(&self.row, line));
                }
                Err(err) if err.is_io_error() => {
                    self.done = true;
                    return Some(Err(ConvertError::Csv(err)));
                }
                Err(err) => {
                    let line = err.position().map(|p| p.line()).unwrap_or(0);
                    return Some(Err(ConvertError::format(line, err.to_string())));
                }
            }
        }
        None
    }
}

/// DKB account export parser
#[derive(Debug, Default, Clone, Copy)]
pub struct DkbParser;

impl DkbParser {
    pub fn new() -> Self {
        DkbParser
    }
}

impl BankParser for DkbParser {
    fn parse_reader(&self, reader: &mut dyn Read) -> Result<BankExport> {
        let dkb = DkbReader::new(reader)?;
        let account = dkb.account().clone();
        let records = dkb.collect::<Result<Vec<_>>>()?;

        Ok(BankExport {
            source_type: SourceType::Dkb,
            account,
            records,
        })
    }

    fn source_type(&self) -> SourceType {
        SourceType::Dkb
    }
}

impl FileValidator for DkbParser {
    /// Only the account line is inspected.
    fn can_parse(&self, file_path: &Path) -> bool {
        let Ok(file) = File::open(file_path) else {
            return false;
        };

        let mut first = String::new();
        if BufReader::new(file).read_line(&mut first).is_err() {
            return false;
        }

        let mut fields = first.trim_end().split(';');
        let _name = fields.next();
        fields
            .next()
            .map(|iban| iban_pattern().is_match(clean_field(iban)))
            .unwrap_or(false)
    }
}
