// dkb2ynab - Core Library
// Converts DKB account exports into YNAB import files; used by the CLI,
// the sync daemon and tests

pub mod config;
pub mod converter;
pub mod error;
pub mod fields;
pub mod logging;
pub mod parser;
pub mod range;
pub mod ynab;

#[cfg(feature = "webdav")]
pub mod daemon;
#[cfg(feature = "webdav")]
pub mod webdav;

// Re-export commonly used types
pub use config::{DaemonConfig, WebDavConfig};
pub use converter::{
    output_file_name, range_from_path, ConversionOptions, ConversionReport, Converter, Mapped,
    OutputLocation,
};
pub use error::{ConfigError, ConvertError};
pub use fields::{parse_amount, parse_booking_date, Amount, FieldError};
pub use parser::{
    Account, BankExport, BankParser, DkbParser, DkbReader, FileValidator, SourceRecord,
    SourceType, TransactionKind, DKB_COLUMNS,
};
pub use range::DateRange;
pub use ynab::{read_records, TargetRecord, YnabWriter, YNAB_COLUMNS};

#[cfg(feature = "webdav")]
pub use daemon::{Daemon, IterationStats};
#[cfg(feature = "webdav")]
pub use webdav::{WebDavClient, WebDavError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
