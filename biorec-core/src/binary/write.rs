use biorec_types::FormatVersion;
use byteorder::{ByteOrder, LittleEndian};

/// Кодирует одну выборку little-endian в разрядности `format`.
/// Значение должно быть заранее ограничено диапазоном формата.
pub fn write_sample_le(
    buf: &mut [u8],
    value: i32,
    format: FormatVersion,
) {
    match format {
        FormatVersion::Edf16Bit => LittleEndian::write_i16(buf, value as i16),
        FormatVersion::Bdf24Bit => LittleEndian::write_i24(buf, value),
        FormatVersion::Int32Bit => LittleEndian::write_i32(buf, value),
    }
}

/// Дописывает выборки в `out`.
pub fn write_samples_le(
    out: &mut Vec<u8>,
    samples: &[i32],
    format: FormatVersion,
) {
    let width = format.bytes_per_sample();
    let start = out.len();
    out.resize(start + samples.len() * width, 0);
    for (chunk, &v) in out[start..].chunks_exact_mut(width).zip(samples) {
        write_sample_le(chunk, v, format);
    }
}

/// Пишет текст в поле фиксированной ширины: лишнее обрезается,
/// недостающее добивается пробелами. Курсор сдвигается на `len`.
///
/// В заголовке допустимы только печатные символы ASCII (0x20..=0x7E),
/// остальные заменяются на `?`. Ширина считается в символах.
pub fn write_ascii_field(
    buf: &mut [u8],
    off: &mut usize,
    len: usize,
    text: &str,
) {
    let field = &mut buf[*off..*off + len];
    field.fill(b' ');
    for (dst, c) in field.iter_mut().zip(text.chars()) {
        *dst = if (' '..='~').contains(&c) { c as u8 } else { b'?' };
    }
    *off += len;
}

/// Число с плавающей точкой: 6 знаков после точки, независимо от локали.
pub fn format_double(v: f64) -> String {
    format!("{v:.6}")
}
