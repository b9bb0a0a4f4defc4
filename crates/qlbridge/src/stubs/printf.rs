//! Rendering of the engine's printf-style calls.
//!
//! `Com_Printf` and `SV_SendServerCommand` are variadic. When a handler is
//! listening, their entry shims capture the argument registers and the
//! caller's stack arguments, and the line is rendered here so handlers see
//! finished text. Integer, character, string, pointer and floating point
//! conversions are supported, including `*` widths and precisions. `%n`,
//! `long double` and any conversion past the available arguments are copied
//! to the output verbatim.
//!
//! Rendering only feeds the dispatch. An engine call nobody listens to is
//! forwarded with its registers untouched and never goes through here.

use std::mem;
use std::ptr;

/// Upper bound on how far past the stack pointer overflow arguments are read.
pub const OVERFLOW_LIMIT: usize = 32 * mem::size_of::<usize>();

/// The variable arguments of one call, consumed in `va_arg` order.
///
/// Integer and floating point arguments come from their own register files
/// first; once a file is exhausted, arguments of that class continue in the
/// shared stack overflow area.
pub struct VaArgs<'a> {
    gp: std::slice::Iter<'a, usize>,
    fp: std::slice::Iter<'a, f64>,
    overflow: Option<Overflow>,
}

struct Overflow {
    cursor: *const u8,
    remaining: usize,
}

impl<'a> VaArgs<'a> {
    /// Arguments held in registers only.
    pub fn new(gp: &'a [usize], fp: &'a [f64]) -> Self {
        Self {
            gp: gp.iter(),
            fp: fp.iter(),
            overflow: None,
        }
    }

    /// Continues with stack arguments at `stack` once the registers run out.
    ///
    /// # Safety
    ///
    /// `stack` must point at the caller's first stack argument and the
    /// following [`OVERFLOW_LIMIT`] bytes must be readable.
    pub unsafe fn with_overflow(mut self, stack: *const u8) -> Self {
        self.overflow = (!stack.is_null()).then_some(Overflow {
            cursor: stack,
            remaining: OVERFLOW_LIMIT,
        });
        self
    }

    pub fn next_int(&mut self) -> Option<usize> {
        match self.gp.next() {
            Some(&value) => Some(value),
            None => self.read_overflow::<usize>(),
        }
    }

    pub fn next_float(&mut self) -> Option<f64> {
        match self.fp.next() {
            Some(&value) => Some(value),
            None => self.read_overflow::<f64>(),
        }
    }

    fn read_overflow<T: Copy>(&mut self) -> Option<T> {
        let overflow = self.overflow.as_mut()?;
        let size = mem::size_of::<T>();
        if overflow.remaining < size {
            return None;
        }
        // SAFETY: `with_overflow` guarantees `remaining` readable bytes at
        // `cursor`.
        let value = unsafe { ptr::read_unaligned(overflow.cursor.cast::<T>()) };
        // SAFETY: stays within the readable window checked above.
        overflow.cursor = unsafe { overflow.cursor.add(size) };
        overflow.remaining -= size;
        Some(value)
    }
}

/// Renders `fmt` against `args`. `read_str` dereferences a `%s` pointer,
/// returning `None` for null.
///
/// # Examples
///
/// ```
/// use qlbridge::stubs::printf::{render, VaArgs};
///
/// let mut args = VaArgs::new(&[3], &[1.5]);
/// let line = render(b"slot %d took %.2f s\n", &mut args, |_| None);
/// assert_eq!(line, b"slot 3 took 1.50 s\n");
/// ```
pub fn render(fmt: &[u8], args: &mut VaArgs<'_>, read_str: impl Fn(usize) -> Option<Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::with_capacity(fmt.len() + 32);
    let mut i = 0;

    while i < fmt.len() {
        if fmt[i] != b'%' {
            out.push(fmt[i]);
            i += 1;
            continue;
        }

        let mut spec = match Spec::parse(&fmt[i + 1..]) {
            Some(spec) => spec,
            None => {
                out.extend_from_slice(&fmt[i..]);
                break;
            }
        };
        let literal = &fmt[i..i + 1 + spec.len];
        i += 1 + spec.len;

        if spec.conversion == b'%' {
            out.push(b'%');
            continue;
        }
        if !spec.is_supported() {
            out.extend_from_slice(literal);
            continue;
        }
        if spec.resolve_stars(args).is_none() {
            out.extend_from_slice(literal);
            continue;
        }

        let body = if spec.is_float() {
            match args.next_float() {
                Some(value) => spec.float_body(value),
                None => {
                    out.extend_from_slice(literal);
                    continue;
                }
            }
        } else {
            let Some(arg) = args.next_int() else {
                out.extend_from_slice(literal);
                continue;
            };
            match spec.conversion {
                b's' => {
                    let mut s = read_str(arg).unwrap_or_else(|| b"(null)".to_vec());
                    if let Some(precision) = spec.precision {
                        s.truncate(precision);
                    }
                    s
                }
                b'c' => vec![arg as u8],
                b'd' | b'i' => spec.signed_body(spec.signed(arg)),
                b'u' => spec.unsigned(arg).to_string().into_bytes(),
                b'x' => spec.hex_body(format!("{:x}", spec.unsigned(arg)), "0x", arg),
                b'X' => spec.hex_body(format!("{:X}", spec.unsigned(arg)), "0X", arg),
                b'p' => format!("{:#x}", arg).into_bytes(),
                _ => literal.to_vec(),
            }
        };
        spec.pad_into(&mut out, body);
    }

    out
}

#[derive(Debug, Default)]
struct Spec {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alt: bool,
    width: usize,
    width_star: bool,
    precision: Option<usize>,
    precision_star: bool,
    long: bool,
    long_double: bool,
    conversion: u8,
    /// Bytes after the `%`.
    len: usize,
}

impl Spec {
    fn parse(s: &[u8]) -> Option<Self> {
        let mut spec = Spec::default();
        let mut i = 0;

        while let Some(&c) = s.get(i) {
            match c {
                b'-' => spec.left = true,
                b'0' => spec.zero = true,
                b'+' => spec.plus = true,
                b' ' => spec.space = true,
                b'#' => spec.alt = true,
                _ => break,
            }
            i += 1;
        }
        if s.get(i) == Some(&b'*') {
            spec.width_star = true;
            i += 1;
        } else {
            while let Some(c) = s.get(i).copied().filter(u8::is_ascii_digit) {
                spec.width = spec.width * 10 + usize::from(c - b'0');
                i += 1;
            }
        }
        if s.get(i) == Some(&b'.') {
            i += 1;
            if s.get(i) == Some(&b'*') {
                spec.precision_star = true;
                i += 1;
            } else {
                let mut precision = 0;
                while let Some(c) = s.get(i).copied().filter(u8::is_ascii_digit) {
                    precision = precision * 10 + usize::from(c - b'0');
                    i += 1;
                }
                spec.precision = Some(precision);
            }
        }
        while let Some(&c) = s.get(i) {
            match c {
                b'l' | b'z' | b'j' | b't' | b'q' => spec.long = true,
                b'L' => spec.long_double = true,
                b'h' => {}
                _ => break,
            }
            i += 1;
        }

        spec.conversion = *s.get(i)?;
        spec.len = i + 1;
        Some(spec)
    }

    fn is_supported(&self) -> bool {
        match self.conversion {
            b's' | b'c' | b'd' | b'i' | b'u' | b'x' | b'X' | b'p' => true,
            b'f' | b'F' | b'e' | b'E' | b'g' | b'G' => !self.long_double,
            _ => false,
        }
    }

    fn is_float(&self) -> bool {
        matches!(self.conversion, b'f' | b'F' | b'e' | b'E' | b'g' | b'G')
    }

    /// Takes `*` width and precision from the arguments, C style: a negative
    /// width means left-justify, a negative precision means none.
    fn resolve_stars(&mut self, args: &mut VaArgs<'_>) -> Option<()> {
        if self.width_star {
            let width = args.next_int()? as u32 as i32;
            if width < 0 {
                self.left = true;
            }
            self.width = width.unsigned_abs() as usize;
        }
        if self.precision_star {
            let precision = args.next_int()? as u32 as i32;
            self.precision = usize::try_from(precision).ok();
        }
        Some(())
    }

    fn signed(&self, arg: usize) -> i64 {
        if self.long {
            arg as i64
        } else {
            arg as u32 as i32 as i64
        }
    }

    fn unsigned(&self, arg: usize) -> u64 {
        if self.long {
            arg as u64
        } else {
            arg as u32 as u64
        }
    }

    fn sign_prefix(&self, negative: bool) -> &'static str {
        match (negative, self.plus, self.space) {
            (true, _, _) => "",
            (false, true, _) => "+",
            (false, false, true) => " ",
            _ => "",
        }
    }

    fn signed_body(&self, value: i64) -> Vec<u8> {
        format!("{}{}", self.sign_prefix(value < 0), value).into_bytes()
    }

    fn hex_body(&self, digits: String, prefix: &str, arg: usize) -> Vec<u8> {
        if self.alt && self.unsigned(arg) != 0 {
            format!("{prefix}{digits}").into_bytes()
        } else {
            digits.into_bytes()
        }
    }

    fn float_body(&self, value: f64) -> Vec<u8> {
        let text = if !value.is_finite() {
            let word = if value.is_nan() { "nan" } else { "inf" };
            let negative = value.is_sign_negative() && !value.is_nan();
            format!("{}{}{}", if negative { "-" } else { "" }, self.sign_prefix(negative), word)
        } else {
            let precision = self.precision.unwrap_or(6);
            let body = match self.conversion.to_ascii_lowercase() {
                b'f' => format!("{:.*}", precision, value),
                b'e' => exponent_form(value, precision),
                _ => general_form(value, precision, self.alt),
            };
            format!("{}{}", self.sign_prefix(value.is_sign_negative() && value != 0.0), body)
        };
        if self.conversion.is_ascii_uppercase() {
            text.to_ascii_uppercase().into_bytes()
        } else {
            text.into_bytes()
        }
    }

    fn pad_into(&self, out: &mut Vec<u8>, body: Vec<u8>) {
        let pad = self.width.saturating_sub(body.len());
        let numeric = !matches!(self.conversion, b's' | b'c');
        // inf and nan are the only float bodies with an 'i' or 'n'.
        let non_finite = self.is_float() && body.iter().any(|b| matches!(b.to_ascii_lowercase(), b'i' | b'n'));
        if self.left {
            out.extend_from_slice(&body);
            out.extend(std::iter::repeat(b' ').take(pad));
        } else if self.zero && numeric && !non_finite {
            let (sign, digits) = match body.split_first() {
                Some((&c, rest)) if matches!(c, b'-' | b'+' | b' ') => (Some(c), rest),
                _ => (None, &body[..]),
            };
            out.extend(sign);
            out.extend(std::iter::repeat(b'0').take(pad));
            out.extend_from_slice(digits);
        } else {
            out.extend(std::iter::repeat(b' ').take(pad));
            out.extend_from_slice(&body);
        }
    }
}

/// `%e` layout: a signed exponent of at least two digits.
fn exponent_form(value: f64, precision: usize) -> String {
    let text = format!("{:.*e}", precision, value);
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
        }
        None => text,
    }
}

/// `%g` layout: `%e` or `%f` depending on the exponent, trailing zeros
/// removed unless `#` was given.
fn general_form(value: f64, precision: usize, alt: bool) -> String {
    let significant = precision.max(1);
    let exponent = format!("{:.*e}", significant - 1, value)
        .split_once('e')
        .and_then(|(_, exponent)| exponent.parse::<i32>().ok())
        .unwrap_or(0);

    let text = if exponent < -4 || exponent >= significant as i32 {
        exponent_form(value, significant - 1)
    } else {
        format!("{:.*}", (significant as i32 - 1 - exponent) as usize, value)
    };
    if alt {
        text
    } else {
        strip_fraction_zeros(text)
    }
}

fn strip_fraction_zeros(text: String) -> String {
    let (mantissa, exponent) = match text.find('e') {
        Some(at) => text.split_at(at),
        None => (text.as_str(), ""),
    };
    if !mantissa.contains('.') {
        return text;
    }
    let trimmed = mantissa.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed}{exponent}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn strings(table: &[(usize, &str)]) -> impl Fn(usize) -> Option<Vec<u8>> {
        let map: HashMap<usize, Vec<u8>> = table.iter().map(|(k, v)| (*k, v.as_bytes().to_vec())).collect();
        move |ptr| map.get(&ptr).cloned()
    }

    fn text(fmt: &str, args: &[usize], table: &[(usize, &str)]) -> String {
        floats(fmt, args, &[], table)
    }

    fn floats(fmt: &str, args: &[usize], fp: &[f64], table: &[(usize, &str)]) -> String {
        let mut args = VaArgs::new(args, fp);
        String::from_utf8(render(fmt.as_bytes(), &mut args, strings(table))).unwrap()
    }

    #[test]
    fn plain_text_is_copied() {
        assert_eq!(text("no conversions\n", &[], &[]), "no conversions\n");
        assert_eq!(text("100%%\n", &[], &[]), "100%\n");
    }

    #[test]
    fn strings_and_integers() {
        let line = text("%s connected on slot %d\n", &[0x10, 4], &[(0x10, "Klesk")]);
        assert_eq!(line, "Klesk connected on slot 4\n");

        assert_eq!(text("%i %u", &[(-3i32) as u32 as usize, 7], &[]), "-3 7");
        assert_eq!(text("%x %X %c", &[255, 255, b'q' as usize], &[]), "ff FF q");
        assert_eq!(text("%+d %#x %08x", &[5, 255, 0xbeef], &[]), "+5 0xff 0000beef");
    }

    #[test]
    fn null_string_is_marked() {
        assert_eq!(text("[%s]", &[0], &[]), "[(null)]");
    }

    #[test]
    fn width_precision_and_padding() {
        assert_eq!(text("%5d|%-5d|%05d", &[42, 42, (-42i32) as u32 as usize], &[]), "   42|42   |-0042");
        assert_eq!(text("%.3s", &[1], &[(1, "abcdef")]), "abc");
        assert_eq!(text("%8s", &[1], &[(1, "abc")]), "     abc");
    }

    #[test]
    fn star_width_and_precision_come_from_the_arguments() {
        assert_eq!(text("[%*d]", &[4, 7], &[]), "[   7]");
        assert_eq!(text("[%*d]", &[(-4i32) as u32 as usize, 7], &[]), "[7   ]");
        assert_eq!(text("[%.*s]", &[2, 1], &[(1, "Sarge")]), "[Sa]");
    }

    #[test]
    fn long_modifier_keeps_all_bits() {
        let big = 0x1_0000_0001usize;
        assert_eq!(text("%lu", &[big], &[]), big.to_string());
        assert_eq!(text("%u", &[big], &[]), "1");
    }

    #[test]
    fn floats_render_like_c() {
        assert_eq!(
            floats("Map loaded in %.2f seconds\n", &[], &[1.234], &[]),
            "Map loaded in 1.23 seconds\n"
        );
        assert_eq!(floats("%f", &[], &[0.5], &[]), "0.500000");
        assert_eq!(floats("%e|%E", &[], &[1500.0, -0.00025], &[]), "1.500000e+03|-2.500000E-04");
        assert_eq!(floats("%g|%g|%g", &[], &[100000.0, 1e-5, 0.0001], &[]), "100000|1e-05|0.0001");
        assert_eq!(floats("%g|%#g", &[], &[2.5, 2.5], &[]), "2.5|2.50000");
        assert_eq!(floats("%08.3f|%-7.1f|", &[], &[-3.14159, 2.0], &[]), "-003.142|2.0    |");
        assert_eq!(floats("%f %F", &[], &[f64::INFINITY, f64::NAN], &[]), "inf NAN");
    }

    #[test]
    fn integer_and_float_registers_are_consumed_independently() {
        let line = floats("%s scored %d in %.1f min (%d%%)", &[1, 12, 40], &[2.5], &[(1, "Doom")]);
        assert_eq!(line, "Doom scored 12 in 2.5 min (40%)");
    }

    #[test]
    fn stack_arguments_follow_the_registers() {
        let mut stack = [0usize; OVERFLOW_LIMIT / mem::size_of::<usize>()];
        stack[..3].copy_from_slice(&[3, 4, 2.75f64.to_bits() as usize]);
        let mut args = unsafe { VaArgs::new(&[1, 2], &[]).with_overflow(stack.as_ptr().cast()) };
        let line = render(b"%d %d %d %d", &mut args, |_| None);
        assert_eq!(line, b"1 2 3 4");

        if cfg!(target_pointer_width = "64") {
            assert_eq!(args.next_float(), Some(2.75));
        }
    }

    #[test]
    fn unsupported_or_missing_arguments_stay_literal() {
        assert_eq!(floats("%Lf then %d", &[9], &[1.0], &[]), "%Lf then 9");
        assert_eq!(text("%n %d", &[1], &[]), "%n 1");
        assert_eq!(text("%d %d", &[1], &[]), "1 %d");
        assert_eq!(text("%.1f", &[], &[]), "%.1f");
        assert_eq!(text("trailing %", &[], &[]), "trailing %");
    }
}
