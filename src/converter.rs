// 🔁 Converter - DKB source records → YNAB target records
//
// Pure per-row mapping plus the read-then-write drivers for streams and files.

use crate::error::{ConvertError, Result};
use crate::fields::{parse_amount, parse_booking_date};
use crate::parser::{Account, DkbReader, SourceRecord, SourceType};
use crate::range::DateRange;
use crate::ynab::{TargetRecord, YnabWriter};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ============================================================================
// OPTIONS & REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOptions {
    /// Only keep rows booked inside this window
    pub range: Option<DateRange>,
    /// Log and skip malformed rows instead of aborting the file
    pub skip_invalid: bool,
    /// Prefix the output with a UTF-8 byte order mark
    pub bom: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        ConversionOptions {
            range: None,
            skip_invalid: false,
            bom: true,
        }
    }
}

/// Where a file conversion writes its result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLocation {
    /// Directory; the file name is derived from the account
    Dir(PathBuf),
    /// Exact output path
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub source_type: SourceType,
    pub account: Account,
    pub range: Option<DateRange>,
    pub read: usize,
    pub written: usize,
    pub skipped_summary: usize,
    pub skipped_out_of_range: usize,
    pub skipped_invalid: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl ConversionReport {
    fn new(account: Account, range: Option<DateRange>) -> Self {
        ConversionReport {
            source_type: SourceType::Dkb,
            account,
            range,
            read: 0,
            written: 0,
            skipped_summary: 0,
            skipped_out_of_range: 0,
            skipped_invalid: 0,
            output: None,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows read, {} written, {} summary, {} out of range, {} invalid",
            self.read,
            self.written,
            self.skipped_summary,
            self.skipped_out_of_range,
            self.skipped_invalid
        )
    }
}

/// Outcome of mapping a single source record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapped {
    Record(TargetRecord),
    /// DKB closing-balance entry
    Summary,
    OutOfRange,
}

// ============================================================================
// FILE NAMES
// ============================================================================

/// `{today}-{account}-{iban}[_{start}_{end}].csv`
pub fn output_file_name(account: &Account, range: Option<&DateRange>, today: NaiveDate) -> String {
    let name: String = account
        .name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    let suffix = range.map(|r| r.file_suffix()).unwrap_or_default();

    format!(
        "{}-{}-{}{}.csv",
        today.format("%Y%m%d"),
        name,
        account.iban,
        suffix
    )
}

// ============================================================================
// CONVERTER
// ============================================================================

#[derive(Debug, Clone)]
pub struct Converter {
    options: ConversionOptions,
    today: NaiveDate,
}

impl Converter {
    pub fn new(options: ConversionOptions) -> Self {
        Converter {
            options,
            today: Local::now().date_naive(),
        }
    }

    /// Pin the date used in generated file names
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    /// Map one source record. Pure: no I/O, no state.
    pub fn map_record(&self, record: &SourceRecord) -> Result<Mapped> {
        let date = parse_booking_date(&record.booking_date)
            .map_err(|e| ConvertError::format(record.line, e.to_string()))?;

        if let Some(range) = &self.options.range {
            if !range.contains(date) {
                return Ok(Mapped::OutOfRange);
            }
        }

        let amount = parse_amount(&record.amount)
            .map_err(|e| ConvertError::format(record.line, e.to_string()))?;

        if record.is_balance_summary() {
            return Ok(Mapped::Summary);
        }

        Ok(Mapped::Record(TargetRecord {
            date,
            payee: record.counterparty().to_string(),
            memo: record.purpose.clone(),
            amount,
        }))
    }

    /// Convert a DKB export stream into a YNAB stream.
    pub fn convert<R: Read, W: Write>(&self, input: R, output: W) -> Result<ConversionReport> {
        let reader = DkbReader::new(input)?;
        self.convert_records(reader, output)
    }

    /// Drain an already opened reader into `output`, preserving order.
    pub fn convert_records<R: Read, W: Write>(
        &self,
        mut reader: DkbReader<R>,
        output: W,
    ) -> Result<ConversionReport> {
        let mut report = ConversionReport::new(reader.account().clone(), self.options.range);
        let mut writer = YnabWriter::new(output, self.options.bom)?;

        for item in &mut reader {
            // Rows the tokenizer rejects still count as read
            report.read += 1;
            let mapped = item.and_then(|record| {
                debug!(line = record.line, ?record, "source row");
                self.map_record(&record)
            });

            match mapped {
                Ok(Mapped::Record(target)) => {
                    writer.write(&target)?;
                }
                Ok(Mapped::Summary) => report.skipped_summary += 1,
                Ok(Mapped::OutOfRange) => report.skipped_out_of_range += 1,
                Err(err) if err.is_row_error() && self.options.skip_invalid => {
                    warn!(error = %err, "skipping invalid row");
                    report.skipped_invalid += 1;
                }
                Err(err) => return Err(err),
            }
        }

        report.written = writer.finish()?;
        Ok(report)
    }

    /// Convert any DKB stream into the file at `output`.
    ///
    /// Nothing is created when the account header is unusable, and a
    /// partially written output is removed when a later row fails.
    pub fn convert_to_file<R: Read>(&self, input: R, output: &Path) -> Result<ConversionReport> {
        let reader = DkbReader::new(input)?;
        let out = File::create(output).map_err(|e| ConvertError::io(output, e))?;
        self.write_output(reader, out, output.to_path_buf())
    }

    /// Convert a file on disk.
    ///
    /// Without an explicit range, a `YYYYMMDD-YYYYMMDD.csv` input name
    /// restricts the output to that window. In directory mode an existing
    /// file is never overwritten: a `-1`, `-2`, ... suffix is added instead.
    pub fn convert_file(&self, input: &Path, output: &OutputLocation) -> Result<ConversionReport> {
        info!(input = %input.display(), "converting file");

        let range = match self.options.range {
            Some(range) => Some(range),
            None => range_from_path(input)?,
        };
        if let Some(range) = &range {
            info!(%range, "restricting to date range");
        }

        let converter = Converter {
            options: ConversionOptions {
                range,
                ..self.options.clone()
            },
            today: self.today,
        };

        let file = File::open(input).map_err(|e| ConvertError::io(input, e))?;
        let reader = DkbReader::new(BufReader::new(file))?;
        info!(account = %reader.account().name, iban = %reader.account().iban, "account");

        let (out, output_path) = match output {
            OutputLocation::File(path) => {
                let out = File::create(path).map_err(|e| ConvertError::io(path, e))?;
                (out, path.clone())
            }
            OutputLocation::Dir(dir) => {
                let name = output_file_name(reader.account(), range.as_ref(), self.today);
                create_unique(dir, &name)?
            }
        };

        converter.write_output(reader, out, output_path)
    }

    fn write_output<R: Read>(
        &self,
        reader: DkbReader<R>,
        out: File,
        output_path: PathBuf,
    ) -> Result<ConversionReport> {
        match self.convert_records(reader, BufWriter::new(out)) {
            Ok(mut report) => {
                info!(output = %output_path.display(), "{}", report.summary());
                report.output = Some(output_path);
                Ok(report)
            }
            Err(err) => {
                if let Err(e) = std::fs::remove_file(&output_path) {
                    warn!(output = %output_path.display(), error = %e, "could not remove partial output");
                }
                Err(err)
            }
        }
    }
}

/// Range encoded in the input's file name, if any.
pub fn range_from_path(input: &Path) -> Result<Option<DateRange>> {
    let name = input.file_name().and_then(|n| n.to_str()).unwrap_or("");
    DateRange::from_file_name(name)
}

/// Create `dir/name`, or `dir/{stem}-{n}.csv` when that name is taken.
fn create_unique(dir: &Path, name: &str) -> Result<(File, PathBuf)> {
    let stem = name.strip_suffix(".csv").unwrap_or(name);

    for n in 0u32.. {
        let candidate = if n == 0 {
            dir.join(name)
        } else {
            dir.join(format!("{}-{}.csv", stem, n))
        };

        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((file, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(path = %candidate.display(), "output name taken");
            }
            Err(e) => return Err(ConvertError::io(&candidate, e)),
        }
    }
    unreachable!("u32 range exhausted while picking an output name")
}

impl Default for Converter {
    fn default() -> Self {
        Converter::new(ConversionOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ynab::read_records;
    use csv::StringRecord;

    const PREAMBLE: &str = "\"Girokonto\";\"DE12345678901234567890\"\n\"\"\n\"Kontostand vom 31.10.2023:\";\"1.234,56 €\"\n\"\"\n\"Buchungsdatum\";\"Wertstellung\";\"Status\";\"Zahlungspflichtige*r\";\"Zahlungsempfänger*in\";\"Verwendungszweck\";\"Umsatztyp\";\"IBAN\";\"Betrag (€)\";\"Gläubiger-ID\";\"Mandatsreferenz\";\"Kundenreferenz\"\n";

    fn row(date: &str, payer: &str, payee: &str, purpose: &str, kind: &str, amount: &str) -> String {
        format!(
            "\"{}\";\"{}\";\"Gebucht\";\"{}\";\"{}\";\"{}\";\"{}\";\"DE00000000000000000001\";\"{}\";\"\";\"\";\"\"\n",
            date, date, payer, payee, purpose, kind, amount
        )
    }

    fn source(date: &str, kind: &str, amount: &str) -> SourceRecord {
        let fields = vec![date, date, "Gebucht", "Payer", "Payee", "Memo", kind, "", amount];
        SourceRecord::from_row(&StringRecord::from(fields), 6).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_map_record_outgoing() {
        let converter = Converter::default();
        let mapped = converter.map_record(&source("30.10.23", "Ausgang", "-1.234,56")).unwrap();
        assert_eq!(
            mapped,
            Mapped::Record(TargetRecord {
                date: date(2023, 10, 30),
                payee: "Payee".to_string(),
                memo: "Memo".to_string(),
                amount: crate::fields::Amount::from_cents(-123456),
            })
        );
    }

    #[test]
    fn test_map_record_incoming_uses_payer() {
        let converter = Converter::default();
        match converter.map_record(&source("30.10.23", "Eingang", "10,00")).unwrap() {
            Mapped::Record(target) => assert_eq!(target.payee, "Payer"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_map_record_bad_date_carries_line() {
        let converter = Converter::default();
        let err = converter.map_record(&source("32.13.23", "Ausgang", "1,00")).unwrap_err();
        assert!(matches!(err, ConvertError::Format { line: 6, .. }));
    }

    #[test]
    fn test_map_record_out_of_range() {
        let range = DateRange::new(date(2023, 11, 1), date(2023, 11, 30)).unwrap();
        let converter = Converter::new(ConversionOptions {
            range: Some(range),
            ..Default::default()
        });
        assert_eq!(
            converter.map_record(&source("30.10.23", "Ausgang", "1,00")).unwrap(),
            Mapped::OutOfRange
        );
    }

    #[test]
    fn test_convert_preserves_count_and_order() {
        let mut input = PREAMBLE.to_string();
        input.push_str(&row("30.10.23", "Me", "REWE", "Einkauf", "Ausgang", "-12,34"));
        input.push_str(&row("29.10.23", "Employer", "Me", "Gehalt", "Eingang", "2.500,00"));
        input.push_str(&row("28.10.23", "Me", "Bakery", "Brot", "Ausgang", "-3,50"));

        let mut out = Vec::new();
        let report = Converter::default().convert(input.as_bytes(), &mut out).unwrap();
        assert_eq!(report.read, 3);
        assert_eq!(report.written, 3);

        let records = read_records(out.as_slice()).unwrap();
        let payees: Vec<_> = records.iter().map(|r| r.payee.as_str()).collect();
        assert_eq!(payees, vec!["REWE", "Employer", "Bakery"]);
        assert_eq!(records[1].amount.to_string(), "2500.00");
    }

    #[test]
    fn test_convert_skips_balance_summary() {
        let mut input = PREAMBLE.to_string();
        input.push_str(&row("31.10.23", "DKB AG", "Me", "Kontostand/Rechnungsabschluss", "Eingang", "0,00"));
        input.push_str(&row("30.10.23", "Me", "REWE", "Einkauf", "Ausgang", "-12,34"));

        let mut out = Vec::new();
        let report = Converter::default().convert(input.as_bytes(), &mut out).unwrap();
        assert_eq!(report.skipped_summary, 1);
        assert_eq!(report.written, 1);
    }

    #[test]
    fn test_convert_header_only() {
        let mut out = Vec::new();
        let report = Converter::default().convert(PREAMBLE.as_bytes(), &mut out).unwrap();
        assert_eq!(report.read, 0);
        assert_eq!(report.written, 0);
        assert!(read_records(out.as_slice()).unwrap().is_empty());
    }

    #[test]
    fn test_convert_aborts_on_invalid_row_by_default() {
        let mut input = PREAMBLE.to_string();
        input.push_str(&row("30.10.23", "Me", "REWE", "Einkauf", "Ausgang", "-12,34"));
        input.push_str(&row("30.10.23", "Me", "REWE", "Einkauf", "Ausgang", "zwölf"));

        let err = Converter::default().convert(input.as_bytes(), Vec::new()).unwrap_err();
        assert!(matches!(err, ConvertError::Format { line: 7, .. }));
    }

    #[test]
    fn test_convert_skip_invalid_keeps_going() {
        let mut input = PREAMBLE.to_string();
        input.push_str(&row("garbage", "Me", "REWE", "Einkauf", "Ausgang", "-12,34"));
        input.push_str(&row("30.10.23", "Me", "REWE", "Einkauf", "Ausgang", "-1,00"));

        let converter = Converter::new(ConversionOptions {
            skip_invalid: true,
            ..Default::default()
        });
        let mut out = Vec::new();
        let report = converter.convert(input.as_bytes(), &mut out).unwrap();
        assert_eq!(report.read, 2);
        assert_eq!(report.skipped_invalid, 1);
        assert_eq!(report.written, 1);
    }

    #[test]
    fn test_output_file_name() {
        let account = Account::new("Giro/konto", "DE12345678901234567890").unwrap();
        let today = date(2024, 2, 1);
        assert_eq!(
            output_file_name(&account, None, today),
            "20240201-Giro_konto-DE12345678901234567890.csv"
        );

        let range = DateRange::new(date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        assert_eq!(
            output_file_name(&account, Some(&range), today),
            "20240201-Giro_konto-DE12345678901234567890_20240101_20240131.csv"
        );
    }

    #[test]
    fn test_convert_file_range_from_name() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("20231029-20231030.csv");
        let mut data = PREAMBLE.to_string();
        data.push_str(&row("31.10.23", "Me", "A", "x", "Ausgang", "-1,00"));
        data.push_str(&row("30.10.23", "Me", "B", "x", "Ausgang", "-2,00"));
        data.push_str(&row("28.10.23", "Me", "C", "x", "Ausgang", "-3,00"));
        std::fs::write(&input, data).unwrap();

        let converter = Converter::default().with_today(date(2024, 1, 1));
        let report = converter
            .convert_file(&input, &OutputLocation::Dir(dir.path().to_path_buf()))
            .unwrap();

        let output = report.output.clone().unwrap();
        assert_eq!(
            output.file_name().unwrap().to_str().unwrap(),
            "20240101-Girokonto-DE12345678901234567890_20231029_20231030.csv"
        );
        assert_eq!(report.skipped_out_of_range, 2);

        let records = read_records(File::open(output).unwrap()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payee, "B");
    }

    #[test]
    fn test_convert_file_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("export.csv");
        let mut data = PREAMBLE.to_string();
        data.push_str(&row("not a date", "Me", "A", "x", "Ausgang", "-1,00"));
        std::fs::write(&input, data).unwrap();

        let output = dir.path().join("out.csv");
        let result = Converter::default().convert_file(&input, &OutputLocation::File(output.clone()));
        assert!(result.is_err());
        assert!(!output.exists());
    }

    #[test]
    fn test_convert_counts_rows_the_tokenizer_rejects() {
        let mut input = PREAMBLE.to_string();
        input.push_str("\"30.10.23\";\"30.10.23\";\"Gebucht\"\n");
        input.push_str(&row("30.10.23", "Me", "REWE", "Einkauf", "Ausgang", "-1,00"));

        let converter = Converter::new(ConversionOptions {
            skip_invalid: true,
            ..Default::default()
        });
        let report = converter.convert(input.as_bytes(), Vec::new()).unwrap();
        assert_eq!(report.read, 2);
        assert_eq!(report.skipped_invalid, 1);
        assert_eq!(report.written, 1);
    }

    #[test]
    fn test_convert_file_dir_mode_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        let mut data = PREAMBLE.to_string();
        data.push_str(&row("30.10.23", "Me", "A", "x", "Ausgang", "-1,00"));
        std::fs::write(&first, &data).unwrap();
        data.push_str(&row("29.10.23", "Me", "B", "x", "Ausgang", "-2,00"));
        std::fs::write(&second, &data).unwrap();

        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();
        let location = OutputLocation::Dir(out.clone());
        let converter = Converter::default().with_today(date(2024, 1, 1));

        let a = converter.convert_file(&first, &location).unwrap().output.unwrap();
        let b = converter.convert_file(&second, &location).unwrap().output.unwrap();

        assert_eq!(
            b.file_name().unwrap().to_str().unwrap(),
            "20240101-Girokonto-DE12345678901234567890-1.csv"
        );
        assert_eq!(read_records(File::open(&a).unwrap()).unwrap().len(), 1);
        assert_eq!(read_records(File::open(&b).unwrap()).unwrap().len(), 2);
    }

    #[test]
    fn test_convert_to_file_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("stream.csv");
        let mut data = PREAMBLE.to_string();
        data.push_str(&row("30.10.23", "Me", "A", "x", "Ausgang", "-1,00"));
        data.push_str(&row("gestern", "Me", "B", "x", "Ausgang", "-2,00"));

        let err = Converter::default()
            .convert_to_file(data.as_bytes(), &output)
            .unwrap_err();
        assert!(matches!(err, ConvertError::Format { line: 7, .. }));
        assert!(!output.exists());
    }
}
