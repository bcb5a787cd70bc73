use std::{
    fs,
    io::Cursor,
    sync::Arc,
    thread,
    time::Duration,
};

use biorec_core::{
    DataHeaderExt, HeaderCodec, RecordReader, RecordWriter, SignalFrequencyReducer,
    SignalRemover, TransformConfig, NUMBER_OF_RECORDS_OFFSET,
};
use biorec_types::{BiorecError, DataHeader, FormatVersion, UsageError};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::NamedTempFile;

// ===========================================================================
// Helpers: детерминированные тест-данные
// ===========================================================================

/// Заголовок с фиксированным временем начала (не Now).
fn deterministic_header(format: FormatVersion) -> DataHeader {
    let mut h = DataHeader::new(format, 3);
    h.set_patient_id("P-001 M 01-JAN-1980 Test");
    h.set_recording_id("Startdate 01-JAN-2024 R-01");
    h.set_recording_start_date_time(2024, 1, 1, 12, 30, 0).unwrap();

    h.set_samples_per_record(0, 8).unwrap();
    h.set_samples_per_record(1, 4).unwrap();
    h.set_samples_per_record(2, 1).unwrap();

    h.set_digital_range(0, -2048, 2047).unwrap();
    h.set_physical_range(0, -500.0, 500.0).unwrap();
    let s = h.signal_mut(0).unwrap();
    s.set_label("EEG Fp1");
    s.set_physical_dimension("uV");
    s.set_transducer("AgAgCl electrode");

    h.signal_mut(2).unwrap().set_label("Battery");
    h
}

/// Запись с пилообразным сигналом, сдвинутым на номер записи.
fn deterministic_record(
    header: &DataHeader,
    n: usize,
) -> Vec<i32> {
    let mut record = Vec::with_capacity(header.record_size());
    for (i, signal) in header.signals().iter().enumerate() {
        for k in 0..signal.samples_per_record() {
            let v = ((n * 7 + k * 3 + i) % 200) as i32 - 100;
            record.push(v);
        }
    }
    record
}

// ===========================================================================
// Writer → файл → Reader
// ===========================================================================

#[test]
fn test_write_n_records_then_read_back() {
    let tmp = NamedTempFile::new().unwrap();
    let header = deterministic_header(FormatVersion::Bdf24Bit);
    let n = 25;

    let writer = RecordWriter::create(tmp.path(), header.clone()).unwrap();
    for i in 0..n {
        writer
            .write_data_record(&deterministic_record(&header, i))
            .unwrap();
    }
    assert_eq!(writer.number_of_received_records(), n as u64);
    writer.close().unwrap();

    let header_len = HeaderCodec::header_len(3);
    let len = fs::metadata(tmp.path()).unwrap().len() as usize;
    assert_eq!(len, header_len + n * header.record_size() * 3);

    let raw = fs::read(tmp.path()).unwrap();
    assert_eq!(
        &raw[NUMBER_OF_RECORDS_OFFSET..NUMBER_OF_RECORDS_OFFSET + 8],
        b"25      "
    );

    let mut reader = RecordReader::open(tmp.path()).unwrap();
    assert_eq!(reader.header().number_of_records(), n as i64);
    assert_eq!(reader.header().signal(0).label(), "EEG Fp1");
    assert_eq!(reader.header().recording_start_time_ms(), header.recording_start_time_ms());
    assert_eq!(reader.number_of_records().unwrap(), n as u64);

    for (i, record) in (&mut reader).enumerate() {
        assert_eq!(record.unwrap(), deterministic_record(&header, i));
    }
}

#[test]
fn test_read_signal_across_records() {
    let tmp = NamedTempFile::new().unwrap();
    let header = deterministic_header(FormatVersion::Edf16Bit);

    let writer = RecordWriter::create(tmp.path(), header.clone()).unwrap();
    for i in 0..4 {
        writer
            .write_data_record(&deterministic_record(&header, i))
            .unwrap();
    }
    writer.close().unwrap();

    let expected: Vec<i32> = (0..4)
        .flat_map(|i| deterministic_record(&header, i)[8..12].to_vec())
        .collect();

    let mut reader = RecordReader::open(tmp.path()).unwrap();
    reader.set_sample_position(1, 2).unwrap();
    let mut buf = vec![0; 20];
    let got = reader.read_samples(1, &mut buf).unwrap();

    // 16 выборок в файле, курсор на 2
    assert_eq!(got, 14);
    assert_eq!(&buf[..14], &expected[2..]);
    assert_eq!(reader.available_samples(1).unwrap(), 0);
    assert_eq!(reader.read_samples(1, &mut buf).unwrap(), 0);
}

#[test]
fn test_copy_sample_by_sample_gives_identical_file() {
    let src = NamedTempFile::new().unwrap();
    let dst = NamedTempFile::new().unwrap();
    let header = deterministic_header(FormatVersion::Bdf24Bit);

    let mut rng = StdRng::seed_from_u64(7);
    let writer = RecordWriter::create(src.path(), header.clone()).unwrap();
    for _ in 0..10 {
        let record: Vec<i32> = (0..header.record_size())
            .map(|_| rng.gen_range(-8_388_608..=8_388_607))
            .collect();
        writer.write_data_record(&record).unwrap();
    }
    writer.close().unwrap();

    let mut reader = RecordReader::open(src.path()).unwrap();
    let copy_header = reader.header().clone();
    let writer = RecordWriter::create(dst.path(), copy_header.clone()).unwrap();

    let records = reader.number_of_records().unwrap();
    for _ in 0..records {
        for (i, signal) in copy_header.signals().iter().enumerate() {
            let mut buf = vec![0; signal.samples_per_record()];
            assert_eq!(reader.read_samples(i, &mut buf).unwrap(), buf.len());
            writer.write_samples(i, &buf).unwrap();
        }
    }
    writer.close().unwrap();

    assert_eq!(fs::read(src.path()).unwrap(), fs::read(dst.path()).unwrap());
}

#[test]
fn test_physical_values_within_one_lsb() {
    let header = deterministic_header(FormatVersion::Edf16Bit);
    let writer = RecordWriter::new(Cursor::new(Vec::new()), header.clone()).unwrap();

    let physical: Vec<f64> = (0..8).map(|k| -400.0 + k as f64 * 111.1).collect();
    writer.write_physical_samples(0, &physical).unwrap();
    writer.write_samples(1, &[0; 4]).unwrap();
    writer.write_samples(2, &[0]).unwrap();
    writer.close().unwrap();

    let bytes = writer.into_inner().unwrap().into_inner();
    let mut reader = RecordReader::new(Cursor::new(bytes)).unwrap();
    let mut back = vec![0.0; 8];
    assert_eq!(reader.read_physical_samples(0, &mut back).unwrap(), 8);

    let lsb = header.signal(0).gain();
    for (a, b) in physical.iter().zip(&back) {
        assert!((a - b).abs() <= lsb, "{a} vs {b}, lsb {lsb}");
    }
}

// ===========================================================================
// Закрытие из другого потока
// ===========================================================================

#[test]
fn test_close_from_other_thread_during_writes() {
    let tmp = NamedTempFile::new().unwrap();
    let header = deterministic_header(FormatVersion::Bdf24Bit);
    let record = deterministic_record(&header, 0);

    let writer = Arc::new(RecordWriter::create(tmp.path(), header.clone()).unwrap());

    let producer = {
        let writer = Arc::clone(&writer);
        thread::spawn(move || {
            let mut written = 0u64;
            loop {
                match writer.write_data_record(&record) {
                    Ok(()) => written += 1,
                    Err(BiorecError::Usage(UsageError::WriterClosed)) => return written,
                    Err(e) => panic!("unexpected error: {e}"),
                }
                thread::sleep(Duration::from_micros(200));
            }
        })
    };

    thread::sleep(Duration::from_millis(50));
    writer.close().unwrap();
    let written = producer.join().unwrap();
    assert!(written > 0);
    assert_eq!(writer.number_of_received_records(), written);

    // заголовок согласован с телом файла
    let mut reader = RecordReader::open(tmp.path()).unwrap();
    assert_eq!(reader.header().number_of_records(), written as i64);
    assert_eq!(reader.number_of_records().unwrap(), written);
}

#[test]
fn test_close_mid_record_patches_header_and_reports() {
    let header = deterministic_header(FormatVersion::Edf16Bit);
    let writer = RecordWriter::new(Cursor::new(Vec::new()), header.clone()).unwrap();

    writer.write_data_record(&deterministic_record(&header, 0)).unwrap();
    writer.write_samples(0, &[1; 8]).unwrap();

    assert!(matches!(
        writer.close(),
        Err(BiorecError::Usage(UsageError::RecordIncomplete))
    ));

    let bytes = writer.into_inner().unwrap().into_inner();
    let decoded = DataHeader::deserialize(&bytes).unwrap();
    assert_eq!(decoded.number_of_records(), 1);
}

// ===========================================================================
// Конвейер → файл
// ===========================================================================

#[test]
fn test_transform_chain_into_writer() {
    // в области видимости только здесь: у Arc<RecordWriter> свои методы с теми же именами
    use biorec_core::DataRecordStream;

    let tmp = NamedTempFile::new().unwrap();
    let header = deterministic_header(FormatVersion::Bdf24Bit);

    let writer = Arc::new(RecordWriter::<fs::File>::without_header(
        fs::File::create(tmp.path()).unwrap(),
    ));
    let config = TransformConfig {
        moving_average: vec![],
        dividers: vec![(0, 4)],
        removed_signals: vec![2],
        join: 2,
    };
    let mut chain = config.build(Arc::clone(&writer)).unwrap();

    chain.set_header(header.clone()).unwrap();
    for i in 0..6 {
        chain
            .write_data_record(&deterministic_record(&header, i))
            .unwrap();
    }
    chain.close().unwrap();
    assert!(writer.is_closed());

    let mut reader = RecordReader::open(tmp.path()).unwrap();
    let out = reader.header().clone();
    assert_eq!(out.number_of_signals(), 2);
    assert_eq!(out.signal(0).samples_per_record(), 4);
    assert_eq!(out.signal(1).samples_per_record(), 8);
    assert_eq!(out.duration_of_record(), 2.0);
    assert_eq!(out.number_of_records(), 3);
    assert_eq!(reader.number_of_records().unwrap(), 3);

    let first = reader.next_record().unwrap().unwrap();
    assert_eq!(first.len(), out.record_size());

    let r0 = deterministic_record(&header, 0);
    let r1 = deterministic_record(&header, 1);
    let avg = |block: &[i32]| (block.iter().map(|&v| v as i64).sum::<i64>() / 4) as i32;
    assert_eq!(first[0], avg(&r0[0..4]));
    assert_eq!(first[1], avg(&r0[4..8]));
    assert_eq!(first[2], avg(&r1[0..4]));
    assert_eq!(&first[4..8], &r0[8..12]);
    assert_eq!(&first[8..12], &r1[8..12]);
}

/// Два сигнала по одной выборке в записи
fn header_two_signals() -> DataHeader {
    let mut h = DataHeader::new(FormatVersion::Edf16Bit, 2);
    h.set_recording_start_date_time(2024, 1, 1, 0, 0, 0).unwrap();
    h
}

fn read_back(writer: Arc<RecordWriter<Cursor<Vec<u8>>>>) -> (DataHeader, Vec<Vec<i32>>) {
    let writer = Arc::try_unwrap(writer).ok().unwrap();
    let bytes = writer.into_inner().unwrap().into_inner();
    let mut reader = RecordReader::new(Cursor::new(bytes)).unwrap();
    let header = reader.header().clone();
    let records = std::iter::from_fn(|| reader.next_record().unwrap()).collect();
    (header, records)
}

#[test]
fn test_late_remove_rejected_by_writer_keeps_layout() {
    use biorec_core::DataRecordStream;

    let writer = Arc::new(RecordWriter::without_header(Cursor::new(Vec::new())));
    let mut remover = SignalRemover::new(Arc::clone(&writer));
    remover.set_header(header_two_signals()).unwrap();
    remover.write_data_record(&[1, 2]).unwrap();

    let err = remover.remove_signal(1).unwrap_err();
    assert!(matches!(err, BiorecError::Usage(UsageError::IncompatibleHeader(_))));
    assert!(!remover.is_removed(1));
    assert_eq!(remover.out_header().unwrap().number_of_signals(), 2);

    remover.write_data_record(&[3, 4]).unwrap();
    remover.close().unwrap();
    drop(remover);

    let (header, records) = read_back(writer);
    assert_eq!(header.number_of_signals(), 2);
    assert_eq!(records, vec![vec![1, 2], vec![3, 4]]);
}

#[test]
fn test_late_divider_rejected_by_writer_keeps_layout() {
    use biorec_core::DataRecordStream;

    let mut header = DataHeader::new(FormatVersion::Bdf24Bit, 1);
    header.set_samples_per_record(0, 2).unwrap();

    let writer = Arc::new(RecordWriter::without_header(Cursor::new(Vec::new())));
    let mut reducer = SignalFrequencyReducer::new(Arc::clone(&writer));
    reducer.set_header(header).unwrap();
    reducer.write_data_record(&[1, 2]).unwrap();

    assert!(reducer.add_divider(0, 2).is_err());
    assert_eq!(reducer.divider(0), 1);

    reducer.write_data_record(&[3, 4]).unwrap();
    reducer.close().unwrap();
    drop(reducer);

    let (header, records) = read_back(writer);
    assert_eq!(header.signal(0).samples_per_record(), 2);
    assert_eq!(records, vec![vec![1, 2], vec![3, 4]]);
}
