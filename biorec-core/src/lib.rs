//! Ядро формата EDF/BDF
//!
//! Кодек заголовка, чтение и запись записей данных, конвейер преобразования
//! записей (склейка, понижение частоты, удаление сигналов, цифровые фильтры).
//!
//! # Быстрый старт
//!
//! ```no_run
//! use biorec_core::{RecordReader, RecordWriter};
//! use biorec_types::{DataHeader, FormatVersion};
//!
//! let mut header = DataHeader::new(FormatVersion::Bdf24Bit, 2);
//! header.set_samples_per_record(0, 250)?;
//! header.set_samples_per_record(1, 50)?;
//!
//! let writer = RecordWriter::create("signal.bdf", header)?;
//! writer.write_data_record(&vec![0; 300])?;
//! writer.close()?;
//!
//! let mut reader = RecordReader::open("signal.bdf")?;
//! let mut buf = vec![0; 250];
//! reader.read_samples(0, &mut buf)?;
//! # Ok::<(), biorec_types::BiorecError>(())
//! ```

pub mod binary;
pub mod buffer;
pub mod filter;
pub mod header;
pub mod reader;
pub mod stream;
pub mod timing;
pub mod writer;

pub use binary::*;
pub use buffer::*;
pub use filter::*;
pub use header::*;
pub use reader::*;
pub use stream::*;
pub use timing::*;
pub use writer::*;

/// Версия библиотеки.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
