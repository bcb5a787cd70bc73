use std::{hint::black_box, io::Cursor};

use biorec_core::{
    CircularFifoBuffer, DataRecordStream, DigitalFilter, HeaderCodec, MovingAverageFilter,
    RecordReader, RecordWriter, TransformConfig,
};
use biorec_types::{BiorecResult, DataHeader, FormatVersion};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const RECORDS: usize = 100;

/// Приёмник без сохранения данных
struct NullSink {
    header: Option<DataHeader>,
    records: u64,
}

impl DataRecordStream for NullSink {
    fn set_header(
        &mut self,
        header: DataHeader,
    ) -> BiorecResult<()> {
        self.header = Some(header);
        Ok(())
    }

    fn write_data_record(
        &mut self,
        record: &[i32],
    ) -> BiorecResult<()> {
        black_box(record);
        self.records += 1;
        Ok(())
    }

    fn close(&mut self) -> BiorecResult<()> {
        Ok(())
    }

    fn resultant_header(&self) -> Option<DataHeader> {
        self.header.clone()
    }
}

/// 8 каналов по 250 выборок + 1 медленный канал
fn eeg_header(format: FormatVersion) -> DataHeader {
    let mut header = DataHeader::new(format, 9);
    for i in 0..8 {
        header.set_samples_per_record(i, 250).unwrap();
        header.set_physical_range(i, -3200.0, 3200.0).unwrap();
    }
    header.set_samples_per_record(8, 10).unwrap();
    header
}

fn records(header: &DataHeader) -> Vec<Vec<i32>> {
    (0..RECORDS)
        .map(|n| {
            (0..header.record_size())
                .map(|k| ((n * 31 + k * 7) % 4000) as i32 - 2000)
                .collect()
        })
        .collect()
}

fn bench_writer(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_writer");

    for format in [FormatVersion::Edf16Bit, FormatVersion::Bdf24Bit] {
        let header = eeg_header(format);
        let data = records(&header);
        group.throughput(Throughput::Elements((RECORDS * header.record_size()) as u64));

        group.bench_with_input(BenchmarkId::from_parameter(format), &data, |b, data| {
            b.iter(|| {
                let writer = RecordWriter::new(Cursor::new(Vec::new()), header.clone()).unwrap();
                for record in data {
                    writer.write_data_record(black_box(record)).unwrap();
                }
                writer.close().unwrap();
                black_box(writer.into_inner().unwrap());
            });
        });
    }

    group.finish();
}

fn bench_reader(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_reader");

    for format in [FormatVersion::Edf16Bit, FormatVersion::Bdf24Bit] {
        let header = eeg_header(format);
        let writer = RecordWriter::new(Cursor::new(Vec::new()), header.clone()).unwrap();
        for record in records(&header) {
            writer.write_data_record(&record).unwrap();
        }
        writer.close().unwrap();
        let bytes = writer.into_inner().unwrap().into_inner();

        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("records", format),
            &bytes,
            |b, bytes| {
                let mut buf = vec![0i32; RECORDS * header.record_size()];
                b.iter(|| {
                    let mut reader = RecordReader::new(Cursor::new(bytes.as_slice())).unwrap();
                    black_box(reader.read_data_records(RECORDS, &mut buf).unwrap());
                });
            },
        );
        group.bench_with_input(
            BenchmarkId::new("signal", format),
            &bytes,
            |b, bytes| {
                let mut buf = vec![0f64; RECORDS * 250];
                b.iter(|| {
                    let mut reader = RecordReader::new(Cursor::new(bytes.as_slice())).unwrap();
                    black_box(reader.read_physical_samples(3, &mut buf).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn bench_header_codec(c: &mut Criterion) {
    let header = eeg_header(FormatVersion::Bdf24Bit);
    let bytes = HeaderCodec::encode(&header).unwrap();

    c.bench_function("header_encode", |b| {
        b.iter(|| black_box(HeaderCodec::encode(black_box(&header)).unwrap()))
    });
    c.bench_function("header_decode", |b| {
        b.iter(|| black_box(HeaderCodec::decode(black_box(&bytes)).unwrap()))
    });
}

fn bench_stages(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_stages");
    let header = eeg_header(FormatVersion::Bdf24Bit);
    let data = records(&header);
    group.throughput(Throughput::Elements((RECORDS * header.record_size()) as u64));

    let configs = [
        ("identity", TransformConfig::default()),
        (
            "moving_average",
            TransformConfig {
                moving_average: (0..8).map(|i| (i, 10)).collect(),
                ..TransformConfig::default()
            },
        ),
        (
            "divider",
            TransformConfig {
                dividers: (0..8).map(|i| (i, 5)).collect(),
                ..TransformConfig::default()
            },
        ),
        (
            "full_chain",
            TransformConfig {
                moving_average: vec![(0, 10), (1, 10)],
                dividers: vec![(0, 5), (1, 5)],
                removed_signals: vec![8],
                join: 4,
            },
        ),
    ];

    for (name, config) in configs {
        group.bench_with_input(BenchmarkId::from_parameter(name), &config, |b, config| {
            b.iter(|| {
                let sink = NullSink {
                    header: None,
                    records: 0,
                };
                let mut chain = config.build(sink).unwrap();
                chain.set_header(header.clone()).unwrap();
                for record in &data {
                    chain.write_data_record(black_box(record)).unwrap();
                }
                chain.close().unwrap();
            });
        });
    }

    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filters");

    for window in [4usize, 32, 256] {
        group.bench_with_input(
            BenchmarkId::new("moving_average", window),
            &window,
            |b, &window| {
                let mut filter = MovingAverageFilter::new(window).unwrap();
                let mut x = 0.0;
                b.iter(|| {
                    x += 1.0;
                    black_box(filter.filtered_value(black_box(x)))
                });
            },
        );
    }

    group.bench_function("fifo_add_remove", |b| {
        let mut buffer = CircularFifoBuffer::new(1024).unwrap();
        b.iter(|| {
            buffer.add(black_box(1.0));
            black_box(buffer.remove().unwrap())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_writer,
    bench_reader,
    bench_header_codec,
    bench_stages,
    bench_filter
);
criterion_main!(benches);
