// YNAB import file: Date,Payee,Memo,Amount

use crate::error::{ConvertError, Result};
use crate::fields::Amount;
use chrono::NaiveDate;
use csv::{ReaderBuilder, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read, Write};

/// Header row of a YNAB CSV import, in order.
pub const YNAB_COLUMNS: [&str; 4] = ["Date", "Payee", "Memo", "Amount"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One row of a YNAB import file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    #[serde(rename = "Date")]
    pub date: NaiveDate,

    #[serde(rename = "Payee")]
    pub payee: String,

    #[serde(rename = "Memo")]
    pub memo: String,

    /// Signed: negative is an outflow
    #[serde(rename = "Amount")]
    pub amount: Amount,
}

/// Writes YNAB rows; the header goes out even when no row follows.
pub struct YnabWriter<W: Write> {
    writer: csv::Writer<W>,
    written: usize,
}

impl<W: Write> YnabWriter<W> {
    pub fn new(mut output: W, bom: bool) -> Result<Self> {
        if bom {
            output.write_all(UTF8_BOM)?;
        }

        let mut writer = WriterBuilder::new()
            .delimiter(b',')
            .has_headers(false)
            .terminator(Terminator::CRLF)
            .from_writer(output);
        writer.write_record(YNAB_COLUMNS)?;

        Ok(YnabWriter { writer, written: 0 })
    }

    pub fn write(&mut self, record: &TargetRecord) -> Result<()> {
        self.writer.serialize(record)?;
        self.written += 1;
        Ok(())
    }

    /// Flush and return the number of data rows written.
    pub fn finish(mut self) -> Result<usize> {
        self.writer.flush()?;
        Ok(self.written)
    }
}

/// Read a YNAB import file back into typed rows.
pub fn read_records<R: Read>(input: R) -> Result<Vec<TargetRecord>> {
    let mut input = BufReader::new(input);
    let has_bom = input.fill_buf()?.starts_with(UTF8_BOM);
    if has_bom {
        input.consume(UTF8_BOM.len());
    }

    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(input);

    let headers = reader.headers()?.clone();
    if headers.iter().ne(YNAB_COLUMNS.iter().copied()) {
        return Err(ConvertError::format(
            1,
            format!("unexpected YNAB header {:?}", headers),
        ));
    }

    reader
        .deserialize::<TargetRecord>()
        .map(|row| row.map_err(ConvertError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(day: u32, payee: &str, memo: &str, cents: i64) -> TargetRecord {
        TargetRecord {
            date: NaiveDate::from_ymd_opt(2023, 10, day).unwrap(),
            payee: payee.to_string(),
            memo: memo.to_string(),
            amount: Amount::from_cents(cents),
        }
    }

    #[test]
    fn test_writer_header_only() {
        let mut buf = Vec::new();
        let writer = YnabWriter::new(&mut buf, false).unwrap();
        assert_eq!(writer.finish().unwrap(), 0);
        assert_eq!(String::from_utf8(buf).unwrap(), "Date,Payee,Memo,Amount\r\n");
    }

    #[test]
    fn test_writer_row_format() {
        let mut buf = Vec::new();
        let mut writer = YnabWriter::new(&mut buf, false).unwrap();
        writer
            .write(&record(30, "REWE, Berlin", "Einkauf", -1234))
            .unwrap();
        writer.finish().unwrap();

        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "Date,Payee,Memo,Amount\r\n2023-10-30,\"REWE, Berlin\",Einkauf,-12.34\r\n"
        );
    }

    #[test]
    fn test_writer_bom_prefix() {
        let mut buf = Vec::new();
        YnabWriter::new(&mut buf, true).unwrap().finish().unwrap();
        assert!(buf.starts_with(UTF8_BOM));
    }

    #[test]
    fn test_read_records_back() {
        let rows = vec![
            record(1, "A", "first", 100),
            record(2, "B", "second; with \"quotes\"", -250_075),
        ];

        let mut buf = Vec::new();
        let mut writer = YnabWriter::new(&mut buf, true).unwrap();
        for row in &rows {
            writer.write(row).unwrap();
        }
        writer.finish().unwrap();

        let parsed = read_records(buf.as_slice()).unwrap();
        assert_eq!(parsed, rows);
    }

    #[test]
    fn test_read_records_rejects_foreign_header() {
        let data = "Date,Description,Amount\r\n2023-10-01,x,1.00\r\n";
        assert!(read_records(data.as_bytes()).is_err());
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writer_reports_stream_errors() {
        let err = YnabWriter::new(ClosedPipe, true).err().unwrap();
        assert!(matches!(err, ConvertError::Stream(_)), "{:?}", err);
    }
}
