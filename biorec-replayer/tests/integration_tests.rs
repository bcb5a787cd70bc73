use std::{
    io::{self, Cursor, Read, Seek, SeekFrom, Write},
    path::Path,
    sync::{atomic::Ordering, Arc, Mutex},
    time::Instant,
};

use biorec_core::{HeaderCodec, RecordReader, RecordWriter, TransformConfig};
use biorec_replayer::{ReplayConfig, ReplayError, ReplaySession};
use biorec_types::{BiorecError, DataHeader, FormatVersion};
use tempfile::TempDir;

/// Пишет файл из `n` записей: сигнал 0 по 4 выборки, сигнал 1 по 2.
fn make_file(
    path: &Path,
    format: FormatVersion,
    n: usize,
) -> DataHeader {
    let mut header = DataHeader::new(format, 2);
    header.set_recording_start_date_time(2024, 3, 1, 8, 0, 0).unwrap();
    header.set_duration_of_record(0.02).unwrap();
    header.set_samples_per_record(0, 4).unwrap();
    header.set_samples_per_record(1, 2).unwrap();
    header.set_physical_range(0, -250.0, 250.0).unwrap();
    header.signal_mut(0).unwrap().set_label("EEG O1");
    header.signal_mut(1).unwrap().set_label("Resp");

    let writer = RecordWriter::create(path, header.clone()).unwrap();
    for i in 0..n as i32 {
        let record = [i, i + 1, i + 2, i + 3, -i, 100 * i];
        writer.write_data_record(&record).unwrap();
    }
    writer.close().unwrap();

    header
}

fn read_all(path: &Path) -> (DataHeader, Vec<Vec<i32>>) {
    let mut reader = RecordReader::open(path).unwrap();
    let header = reader.header().clone();
    let records = std::iter::from_fn(|| reader.next_record().unwrap()).collect();
    (header, records)
}

#[test]
fn test_replay_copies_file_exactly() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.bdf");
    let output = dir.path().join("out.bdf");
    make_file(&input, FormatVersion::Bdf24Bit, 10);

    let config = ReplayConfig {
        input_path: input.clone(),
        output_path: Some(output.clone()),
        ..ReplayConfig::default()
    };
    let session = ReplaySession::new(config).unwrap();
    let metrics = session.metrics();
    session.run().unwrap();

    assert_eq!(metrics.records_read.load(Ordering::Relaxed), 10);
    assert_eq!(metrics.records_written.load(Ordering::Relaxed), 10);
    assert_eq!(std::fs::read(&input).unwrap(), std::fs::read(&output).unwrap());
}

#[test]
fn test_replay_with_transform() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.edf");
    let output = dir.path().join("joined.edf");
    make_file(&input, FormatVersion::Edf16Bit, 6);

    let config = ReplayConfig {
        input_path: input,
        output_path: Some(output.clone()),
        transform: TransformConfig {
            removed_signals: vec![1],
            join: 3,
            ..TransformConfig::default()
        },
        ..ReplayConfig::default()
    };
    ReplaySession::new(config).unwrap().run().unwrap();

    let (header, records) = read_all(&output);
    assert_eq!(header.number_of_signals(), 1);
    assert_eq!(header.signal(0).label(), "EEG O1");
    assert_eq!(header.signal(0).samples_per_record(), 12);
    assert_eq!(header.number_of_records(), 2);
    assert!((header.duration_of_record() - 0.06).abs() < 1e-9);
    assert_eq!(records[0], vec![0, 1, 2, 3, 1, 2, 3, 4, 2, 3, 4, 5]);
    assert_eq!(records[1][..4], [3, 4, 5, 6]);
}

#[test]
fn test_replay_converts_edf_to_bdf() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.edf");
    let output = dir.path().join("out.bdf");
    let in_header = make_file(&input, FormatVersion::Edf16Bit, 4);

    let config = ReplayConfig {
        input_path: input.clone(),
        output_path: Some(output.clone()),
        format: Some(FormatVersion::Bdf24Bit),
        ..ReplayConfig::default()
    };
    ReplaySession::new(config).unwrap().run().unwrap();

    let mut reader = RecordReader::open(&output).unwrap();
    let out_header = reader.header().clone();
    assert_eq!(out_header.format_version(), FormatVersion::Bdf24Bit);
    assert_eq!(out_header.recording_start_time_ms(), in_header.recording_start_time_ms());

    let mut expected = [0f64; 16];
    let mut actual = [0f64; 16];
    let mut in_reader = RecordReader::open(&input).unwrap();
    assert_eq!(in_reader.read_physical_samples(0, &mut expected).unwrap(), 16);
    assert_eq!(reader.read_physical_samples(0, &mut actual).unwrap(), 16);

    let lsb = in_header.signal(0).gain();
    for (e, a) in expected.iter().zip(&actual) {
        assert!((e - a).abs() <= lsb, "{e} vs {a}");
    }
}

#[test]
fn test_replay_paced_by_speed() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.bdf");
    let output = dir.path().join("paced.bdf");
    // 10 записей по 20 мс = 200 мс реального времени
    make_file(&input, FormatVersion::Bdf24Bit, 10);

    let config = ReplayConfig {
        input_path: input,
        output_path: Some(output),
        speed: Some(2.0),
        ..ReplayConfig::default()
    };
    let start = Instant::now();
    ReplaySession::new(config).unwrap().run().unwrap();
    let elapsed = start.elapsed().as_secs_f64();

    // последняя запись выдаётся через 9 * 20 мс / 2 = 90 мс
    assert!(elapsed >= 0.085, "elapsed = {elapsed}");
    assert!(elapsed < 1.0, "elapsed = {elapsed}");
}

#[test]
fn test_replay_pause_holds_records() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.bdf");
    let output = dir.path().join("paused.bdf");
    make_file(&input, FormatVersion::Bdf24Bit, 3);

    let session = ReplaySession::new(ReplayConfig {
        input_path: input,
        output_path: Some(output.clone()),
        speed: Some(1.0),
        ..ReplayConfig::default()
    })
    .unwrap();
    let pause = session.pause_flag();
    pause.store(true, Ordering::Relaxed);
    let resume = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(150));
        pause.store(false, Ordering::Relaxed);
    });

    let start = Instant::now();
    let metrics = session.metrics();
    session.run().unwrap();
    resume.join().unwrap();

    // без паузы 3 записи по 20 мс заняли бы около 40 мс
    assert!(start.elapsed().as_millis() >= 140);
    assert_eq!(metrics.records_read.load(Ordering::Relaxed), 3);
    assert_eq!(read_all(&output).1.len(), 3);
}

#[test]
fn test_replay_stop_flag_finalizes_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.bdf");
    let output = dir.path().join("stopped.bdf");
    make_file(&input, FormatVersion::Bdf24Bit, 5);

    let config = ReplayConfig {
        input_path: input,
        output_path: Some(output.clone()),
        ..ReplayConfig::default()
    };
    let session = ReplaySession::new(config).unwrap();
    session.stop_flag().store(true, Ordering::Relaxed);
    session.run().unwrap();

    let (header, records) = read_all(&output);
    assert!(records.is_empty());
    assert_eq!(header.number_of_signals(), 2);
}

#[test]
fn test_inspect_text_and_json() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.edf");
    make_file(&input, FormatVersion::Edf16Bit, 3);

    let text = ReplaySession::new(ReplayConfig {
        input_path: input.clone(),
        inspect: true,
        ..ReplayConfig::default()
    })
    .unwrap()
    .inspect()
    .unwrap();
    assert!(text.contains("EEG O1"));
    assert!(text.contains("Number of records : 3"));

    let json = ReplaySession::new(ReplayConfig {
        input_path: input,
        inspect: true,
        json: true,
        ..ReplayConfig::default()
    })
    .unwrap()
    .inspect()
    .unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["number_of_records"], 3);
    assert_eq!(value["signals"][1]["label"], "Resp");
}

/// Носитель, с которого нельзя прочитать байты начиная с `bad_from`.
struct DamagedInput {
    inner: Cursor<Vec<u8>>,
    bad_from: u64,
}

impl Read for DamagedInput {
    fn read(
        &mut self,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        let pos = self.inner.position();
        if pos >= self.bad_from {
            return Err(io::Error::other("bad sector"));
        }
        let n = buf.len().min((self.bad_from - pos) as usize);
        self.inner.read(&mut buf[..n])
    }
}

impl Seek for DamagedInput {
    fn seek(
        &mut self,
        pos: SeekFrom,
    ) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

/// Вывод в память, доступный после окончания сессии.
#[derive(Clone, Default)]
struct SharedOutput(Arc<Mutex<Cursor<Vec<u8>>>>);

impl Write for SharedOutput {
    fn write(
        &mut self,
        buf: &[u8],
    ) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SharedOutput {
    fn seek(
        &mut self,
        pos: SeekFrom,
    ) -> io::Result<u64> {
        self.0.lock().unwrap().seek(pos)
    }
}

#[test]
fn test_replay_read_error_still_finalizes_output() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.bdf");
    make_file(&input, FormatVersion::Bdf24Bit, 8);

    // заголовок + 3 целые записи по 18 байт, дальше сбой чтения
    let header_len = HeaderCodec::header_len(2) as u64;
    let damaged = DamagedInput {
        inner: Cursor::new(std::fs::read(&input).unwrap()),
        bad_from: header_len + 3 * 18 + 5,
    };
    let output = SharedOutput::default();

    let session = ReplaySession::new(ReplayConfig {
        input_path: input,
        output_path: Some(dir.path().join("out.bdf")),
        ..ReplayConfig::default()
    })
    .unwrap();
    let metrics = session.metrics();
    let err = session.run_with_io(damaged, output.clone()).unwrap_err();

    assert!(matches!(err, ReplayError::Biorec(BiorecError::Io(_))), "{err:?}");
    assert_eq!(metrics.records_read.load(Ordering::Relaxed), 3);
    assert_eq!(metrics.records_written.load(Ordering::Relaxed), 3);

    let bytes = output.0.lock().unwrap().get_ref().clone();
    let mut reader = RecordReader::new(Cursor::new(bytes)).unwrap();
    // число записей в заголовке исправлено при закрытии
    assert_eq!(reader.header().number_of_records(), 3);
    assert_eq!(reader.next_record().unwrap().unwrap(), vec![0, 1, 2, 3, 0, 0]);
}
