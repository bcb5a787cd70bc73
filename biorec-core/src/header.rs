//! Заголовок файла EDF/BDF
//!
//! Заголовок состоит из общего блока в 256 байт и 256 байт на каждый сигнал.
//! Все поля: ASCII-текст фиксированной ширины, добитый пробелами. Поля
//! сигналов хранятся по столбцам: сначала метки всех сигналов, затем все
//! датчики и т.д.
//!
//! | Поле                        | Байт |
//! |-----------------------------|------|
//! | версия                      | 8    |
//! | пациент                     | 80   |
//! | запись                      | 80   |
//! | дата `dd.mm.yy`             | 8    |
//! | время `hh.mm.ss`            | 8    |
//! | размер заголовка            | 8    |
//! | резерв                      | 44   |
//! | число записей (-1)          | 8    |
//! | длительность записи, с      | 8    |
//! | число сигналов              | 4    |
//!
//! Диалект определяется первым байтом (`'0'` или `0xFF`), текстом версии и
//! содержимым резерва (`24BIT`). Любое расхождение считается ошибкой формата.

use std::io::{ErrorKind, Read};

use biorec_types::{
    BiorecError, BiorecResult, DataHeader, FormatVersion, HeaderError, HeaderErrorKind,
    UsageError,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::binary::{format_double, read_ascii_field, write_ascii_field};

/// Размер общего блока и блока одного сигнала
pub const HEADER_BLOCK_SIZE: usize = 256;

/// Смещение поля "число записей" от начала файла
pub const NUMBER_OF_RECORDS_OFFSET: usize = 236;

/// Наибольшее число записей, помещающееся в 8-символьное поле
pub const MAX_NUMBER_OF_RECORDS: i64 = 99_999_999;

const VERSION_LEN: usize = 8;
const PATIENT_LEN: usize = 80;
const RECORDING_LEN: usize = 80;
const DATE_LEN: usize = 8;
const TIME_LEN: usize = 8;
const HEADER_BYTES_LEN: usize = 8;
const RESERVED_LEN: usize = 44;
const NUMBER_OF_RECORDS_LEN: usize = 8;
const DURATION_LEN: usize = 8;
const NUMBER_OF_SIGNALS_LEN: usize = 4;

const LABEL_LEN: usize = 16;
const TRANSDUCER_LEN: usize = 80;
const DIMENSION_LEN: usize = 8;
const PHYSICAL_MIN_LEN: usize = 8;
const PHYSICAL_MAX_LEN: usize = 8;
const DIGITAL_MIN_LEN: usize = 8;
const DIGITAL_MAX_LEN: usize = 8;
const PREFILTERING_LEN: usize = 80;
const SAMPLES_LEN: usize = 8;
const SIGNAL_RESERVED_LEN: usize = 32;

const EDF_MARKER: u8 = b'0';
const BDF_MARKER: u8 = 0xFF;
const BDF_VERSION: &str = "BIOSEMI";
const BDF_RESERVED: &str = "24BIT";

/// Кодек заголовка EDF/BDF.
pub struct HeaderCodec;

impl HeaderCodec {
    /// Полный размер заголовка в байтах
    pub fn header_len(number_of_signals: usize) -> usize {
        HEADER_BLOCK_SIZE + HEADER_BLOCK_SIZE * number_of_signals
    }

    /// Кодирует заголовок. 32-битный формат файлового диалекта не имеет.
    pub fn encode(header: &DataHeader) -> BiorecResult<Vec<u8>> {
        let format = header.format_version();
        if format == FormatVersion::Int32Bit {
            return Err(UsageError::UnsupportedFileFormat(format).into());
        }

        let ns = header.number_of_signals();
        let mut buf = vec![b' '; Self::header_len(ns)];
        let mut off = 0;

        match format {
            FormatVersion::Bdf24Bit => {
                buf[0] = BDF_MARKER;
                off = 1;
                write_ascii_field(&mut buf, &mut off, VERSION_LEN - 1, BDF_VERSION);
            }
            _ => {
                buf[0] = EDF_MARKER;
                off += VERSION_LEN;
            }
        }

        write_ascii_field(&mut buf, &mut off, PATIENT_LEN, header.patient_id());
        write_ascii_field(&mut buf, &mut off, RECORDING_LEN, header.recording_id());

        let start = DateTime::<Utc>::from_timestamp_millis(header.recording_start_time_ms())
            .unwrap_or_default();
        write_ascii_field(&mut buf, &mut off, DATE_LEN, &start.format("%d.%m.%y").to_string());
        write_ascii_field(&mut buf, &mut off, TIME_LEN, &start.format("%H.%M.%S").to_string());

        write_ascii_field(
            &mut buf,
            &mut off,
            HEADER_BYTES_LEN,
            &Self::header_len(ns).to_string(),
        );

        let reserved = if format == FormatVersion::Bdf24Bit {
            BDF_RESERVED
        } else {
            ""
        };
        write_ascii_field(&mut buf, &mut off, RESERVED_LEN, reserved);

        let records = header.number_of_records();
        let records = if records > MAX_NUMBER_OF_RECORDS {
            -1
        } else {
            records
        };
        write_ascii_field(&mut buf, &mut off, NUMBER_OF_RECORDS_LEN, &records.to_string());
        write_ascii_field(
            &mut buf,
            &mut off,
            DURATION_LEN,
            &format_double(header.duration_of_record()),
        );
        write_ascii_field(&mut buf, &mut off, NUMBER_OF_SIGNALS_LEN, &ns.to_string());

        let signals = header.signals();
        for s in signals {
            write_ascii_field(&mut buf, &mut off, LABEL_LEN, s.label());
        }
        for s in signals {
            write_ascii_field(&mut buf, &mut off, TRANSDUCER_LEN, s.transducer());
        }
        for s in signals {
            write_ascii_field(&mut buf, &mut off, DIMENSION_LEN, s.physical_dimension());
        }
        for s in signals {
            write_ascii_field(
                &mut buf,
                &mut off,
                PHYSICAL_MIN_LEN,
                &format_double(s.physical_min()),
            );
        }
        for s in signals {
            write_ascii_field(
                &mut buf,
                &mut off,
                PHYSICAL_MAX_LEN,
                &format_double(s.physical_max()),
            );
        }
        for s in signals {
            write_ascii_field(&mut buf, &mut off, DIGITAL_MIN_LEN, &s.digital_min().to_string());
        }
        for s in signals {
            write_ascii_field(&mut buf, &mut off, DIGITAL_MAX_LEN, &s.digital_max().to_string());
        }
        for s in signals {
            write_ascii_field(&mut buf, &mut off, PREFILTERING_LEN, s.prefiltering());
        }
        for s in signals {
            write_ascii_field(
                &mut buf,
                &mut off,
                SAMPLES_LEN,
                &s.samples_per_record().to_string(),
            );
        }
        off += SIGNAL_RESERVED_LEN * ns;

        debug_assert_eq!(off, buf.len());
        Ok(buf)
    }

    /// Декодирует заголовок из буфера, содержащего как минимум полный заголовок.
    pub fn decode(buf: &[u8]) -> BiorecResult<DataHeader> {
        if buf.len() < HEADER_BLOCK_SIZE {
            return Err(header_err(HeaderErrorKind::HeaderNotComplete)
                .with_value(format!("{} bytes", buf.len()))
                .into());
        }

        let format = decode_dialect(buf)?;

        let mut off = VERSION_LEN;
        let patient = read_ascii_field(buf, &mut off, PATIENT_LEN);
        let recording = read_ascii_field(buf, &mut off, RECORDING_LEN);

        let date_text = read_ascii_field(buf, &mut off, DATE_LEN);
        let time_text = read_ascii_field(buf, &mut off, TIME_LEN);
        let start_ms = decode_start_time(&date_text, &time_text)?;

        let bytes_text = read_ascii_field(buf, &mut off, HEADER_BYTES_LEN);
        off += RESERVED_LEN;
        let records_text = read_ascii_field(buf, &mut off, NUMBER_OF_RECORDS_LEN);
        let duration_text = read_ascii_field(buf, &mut off, DURATION_LEN);
        let ns_text = read_ascii_field(buf, &mut off, NUMBER_OF_SIGNALS_LEN);

        let ns = parse_signal_count(&ns_text)?;

        let header_bytes: usize = bytes_text
            .parse()
            .ok()
            .filter(|&n| n == Self::header_len(ns))
            .ok_or_else(|| header_err(HeaderErrorKind::NumberOfBytesInvalid).with_value(&bytes_text))?;

        let records: i64 = records_text
            .parse()
            .ok()
            .filter(|&n| n >= -1)
            .ok_or_else(|| {
                header_err(HeaderErrorKind::NumberOfRecordsInvalid).with_value(&records_text)
            })?;

        let duration: f64 = duration_text
            .parse()
            .ok()
            .filter(|d: &f64| *d > 0.0 && d.is_finite())
            .ok_or_else(|| {
                header_err(HeaderErrorKind::RecordDurationInvalid).with_value(&duration_text)
            })?;

        if buf.len() < header_bytes {
            return Err(header_err(HeaderErrorKind::HeaderNotComplete)
                .with_value(format!("{} of {header_bytes} bytes", buf.len()))
                .into());
        }

        let mut header = DataHeader::new(format, ns);
        header.set_patient_id(patient);
        header.set_recording_id(recording);
        header.set_recording_start_time_ms(start_ms)?;
        header.set_number_of_records(records)?;
        header.set_duration_of_record(duration)?;

        let column = |off: &mut usize, len: usize| -> Vec<String> {
            (0..ns).map(|_| read_ascii_field(buf, off, len)).collect()
        };

        let labels = column(&mut off, LABEL_LEN);
        let transducers = column(&mut off, TRANSDUCER_LEN);
        let dimensions = column(&mut off, DIMENSION_LEN);
        let physical_mins = column(&mut off, PHYSICAL_MIN_LEN);
        let physical_maxs = column(&mut off, PHYSICAL_MAX_LEN);
        let digital_mins = column(&mut off, DIGITAL_MIN_LEN);
        let digital_maxs = column(&mut off, DIGITAL_MAX_LEN);
        let prefilterings = column(&mut off, PREFILTERING_LEN);
        let samples = column(&mut off, SAMPLES_LEN);

        for i in 0..ns {
            let pmin: f64 = parse_field(&physical_mins[i], HeaderErrorKind::PhysicalMinInvalid, i)?;
            let pmax: f64 = parse_field(&physical_maxs[i], HeaderErrorKind::PhysicalMaxInvalid, i)?;
            if !(pmax > pmin) {
                return Err(header_err(HeaderErrorKind::PhysicalMaxLowerOrEqualMin)
                    .with_value(format!("{}/{}", physical_mins[i], physical_maxs[i]))
                    .with_signal(i)
                    .into());
            }

            let dmin: i32 = parse_field(&digital_mins[i], HeaderErrorKind::DigitalMinInvalid, i)?;
            let dmax: i32 = parse_field(&digital_maxs[i], HeaderErrorKind::DigitalMaxInvalid, i)?;
            if dmax <= dmin {
                return Err(header_err(HeaderErrorKind::DigitalMaxLowerOrEqualMin)
                    .with_value(format!("{}/{}", digital_mins[i], digital_maxs[i]))
                    .with_signal(i)
                    .into());
            }
            if dmin < format.digital_min() || dmax > format.digital_max() {
                return Err(header_err(HeaderErrorKind::DigitalRangeOutOfFormat)
                    .with_value(format!("{}/{}", digital_mins[i], digital_maxs[i]))
                    .with_signal(i)
                    .into());
            }

            let spr: usize = samples[i]
                .parse()
                .ok()
                .filter(|&n| n > 0)
                .ok_or_else(|| {
                    header_err(HeaderErrorKind::NumberOfSamplesInvalid)
                        .with_value(&samples[i])
                        .with_signal(i)
                })?;

            header.set_physical_range(i, pmin, pmax)?;
            header.set_digital_range(i, dmin, dmax)?;
            header.set_samples_per_record(i, spr)?;

            let signal = header.signal_mut(i)?;
            signal.set_label(labels[i].as_str());
            signal.set_transducer(transducers[i].as_str());
            signal.set_physical_dimension(dimensions[i].as_str());
            signal.set_prefiltering(prefilterings[i].as_str());
        }

        Ok(header)
    }

    /// Читает заголовок из потока: сначала общий блок (из него берётся число
    /// сигналов), затем блоки сигналов. Возвращает заголовок и его размер.
    pub fn read_header<R: Read>(reader: &mut R) -> BiorecResult<(DataHeader, usize)> {
        let mut buf = vec![0u8; HEADER_BLOCK_SIZE];
        read_exact_header(reader, &mut buf)?;

        let mut off = HEADER_BLOCK_SIZE - NUMBER_OF_SIGNALS_LEN;
        let ns = parse_signal_count(&read_ascii_field(&buf, &mut off, NUMBER_OF_SIGNALS_LEN))?;

        let header_len = Self::header_len(ns);
        buf.resize(header_len, 0);
        read_exact_header(reader, &mut buf[HEADER_BLOCK_SIZE..])?;

        let header = Self::decode(&buf)?;
        Ok((header, header_len))
    }
}

/// Расширение [`DataHeader`] методами кодека.
pub trait DataHeaderExt: Sized {
    fn serialize(&self) -> BiorecResult<Vec<u8>>;
    fn deserialize(buf: &[u8]) -> BiorecResult<Self>;
}

impl DataHeaderExt for DataHeader {
    fn serialize(&self) -> BiorecResult<Vec<u8>> {
        HeaderCodec::encode(self)
    }

    fn deserialize(buf: &[u8]) -> BiorecResult<Self> {
        HeaderCodec::decode(buf)
    }
}

fn header_err(kind: HeaderErrorKind) -> HeaderError {
    HeaderError::new(kind)
}

fn read_exact_header<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
) -> BiorecResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            BiorecError::Header(header_err(HeaderErrorKind::HeaderNotComplete))
        } else {
            BiorecError::Io(e)
        }
    })
}

fn decode_dialect(buf: &[u8]) -> BiorecResult<FormatVersion> {
    let version_text = String::from_utf8_lossy(&buf[1..VERSION_LEN]).to_string();
    let mut off = VERSION_LEN + PATIENT_LEN + RECORDING_LEN + DATE_LEN + TIME_LEN + HEADER_BYTES_LEN;
    let reserved = read_ascii_field(buf, &mut off, RESERVED_LEN);

    let mismatch = || {
        BiorecError::Header(
            header_err(HeaderErrorKind::VersionFormatInvalid)
                .with_value(format!("{:#04x}{version_text} / {reserved}", buf[0])),
        )
    };

    match buf[0] {
        EDF_MARKER if version_text.trim().is_empty() && reserved.is_empty() => {
            Ok(FormatVersion::Edf16Bit)
        }
        BDF_MARKER if version_text == BDF_VERSION && reserved == BDF_RESERVED => {
            Ok(FormatVersion::Bdf24Bit)
        }
        _ => Err(mismatch()),
    }
}

/// Год `yy`: 70..99 означает 1970..1999, 00..69 означает 2000..2069.
fn decode_start_time(
    date_text: &str,
    time_text: &str,
) -> BiorecResult<i64> {
    let [dd, mm, yy] = split_triplet(date_text)
        .ok_or_else(|| header_err(HeaderErrorKind::DateFormatInvalid).with_value(date_text))?;
    let year = if yy >= 70 { 1900 + yy } else { 2000 + yy };
    let date = NaiveDate::from_ymd_opt(year as i32, mm, dd)
        .ok_or_else(|| header_err(HeaderErrorKind::DateFormatInvalid).with_value(date_text))?;

    let [hh, mi, ss] = split_triplet(time_text)
        .ok_or_else(|| header_err(HeaderErrorKind::TimeFormatInvalid).with_value(time_text))?;
    let time = NaiveTime::from_hms_opt(hh, mi, ss)
        .ok_or_else(|| header_err(HeaderErrorKind::TimeFormatInvalid).with_value(time_text))?;

    Ok(date.and_time(time).and_utc().timestamp_millis())
}

/// Строго `NN.NN.NN`
fn split_triplet(text: &str) -> Option<[u32; 3]> {
    let b = text.as_bytes();
    if b.len() != 8 || b[2] != b'.' || b[5] != b'.' {
        return None;
    }
    let pair = |i: usize| -> Option<u32> {
        let (h, l) = (b[i], b[i + 1]);
        if h.is_ascii_digit() && l.is_ascii_digit() {
            Some(((h - b'0') * 10 + (l - b'0')) as u32)
        } else {
            None
        }
    };
    Some([pair(0)?, pair(3)?, pair(6)?])
}

fn parse_signal_count(text: &str) -> BiorecResult<usize> {
    text.parse::<usize>()
        .map_err(|_| header_err(HeaderErrorKind::NumberOfSignalsInvalid).with_value(text).into())
}

fn parse_field<T: std::str::FromStr>(
    text: &str,
    kind: HeaderErrorKind,
    signal: usize,
) -> BiorecResult<T> {
    text.parse::<T>()
        .map_err(|_| header_err(kind).with_value(text).with_signal(signal).into())
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
