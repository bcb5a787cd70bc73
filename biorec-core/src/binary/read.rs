use biorec_types::FormatVersion;
use byteorder::{ByteOrder, LittleEndian};

/// Декодирует одну выборку little-endian в разрядности `format`.
///
/// # Panics
/// Если `buf` короче одной выборки формата.
pub fn read_sample_le(
    buf: &[u8],
    format: FormatVersion,
) -> i32 {
    match format {
        FormatVersion::Edf16Bit => LittleEndian::read_i16(buf) as i32,
        FormatVersion::Bdf24Bit => LittleEndian::read_i24(buf),
        FormatVersion::Int32Bit => LittleEndian::read_i32(buf),
    }
}

/// Декодирует целые выборки из `bytes` в `out`, возвращает их число.
/// Хвост короче одной выборки игнорируется.
pub fn read_samples_le(
    bytes: &[u8],
    format: FormatVersion,
    out: &mut [i32],
) -> usize {
    let mut n = 0;
    for (chunk, dst) in bytes
        .chunks_exact(format.bytes_per_sample())
        .zip(out.iter_mut())
    {
        *dst = read_sample_le(chunk, format);
        n += 1;
    }
    n
}

/// Читает текстовое поле фиксированной ширины и сдвигает курсор.
/// Пробелы по краям отбрасываются.
pub fn read_ascii_field(
    buf: &[u8],
    off: &mut usize,
    len: usize,
) -> String {
    let field = &buf[*off..*off + len];
    *off += len;
    String::from_utf8_lossy(field).trim().to_string()
}
