// Bit-exact value encoders
//
// Every scalar ends up as a little-endian sequence of 32-bit words. Floats use a
// generic sign/exponent/mantissa encoder so the narrow formats round the same way
// the wide ones do; fixed-point values are two's complement Qn.n.

use crate::backend::error::{BackendError, SourcePos};
use crate::backend::types::{ScalarKind, Type, Width};

/// Sign/exponent/mantissa split of a binary floating format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatFormat {
    pub exp_bits: u32,
    pub mant_bits: u32,
}

impl FloatFormat {
    pub fn for_width(width: Width) -> FloatFormat {
        let (exp_bits, mant_bits) = match width {
            Width::W8 => (3, 4),
            Width::W16 => (5, 10),
            Width::W32 => (8, 23),
            Width::W64 => (11, 52),
            Width::W128 => (15, 112),
        };
        FloatFormat {
            exp_bits,
            mant_bits,
        }
    }

    fn bias(self) -> i32 {
        (1 << (self.exp_bits - 1)) - 1
    }

    fn exp_max_field(self) -> u128 {
        (1u128 << self.exp_bits) - 1
    }

    fn sign_bit(self) -> u128 {
        1u128 << (self.exp_bits + self.mant_bits)
    }

    fn mant_mask(self) -> u128 {
        (1u128 << self.mant_bits) - 1
    }

    /// Largest finite value: exponent field all ones minus one, mantissa all ones
    fn max_finite(self) -> u128 {
        ((self.exp_max_field() - 1) << self.mant_bits) | self.mant_mask()
    }
}

/// Shift right rounding to nearest, ties to even
fn round_shr(value: u128, shift: u32) -> u128 {
    if shift == 0 {
        return value;
    }
    if shift >= 128 {
        return 0;
    }
    let quotient = value >> shift;
    let remainder = value & ((1u128 << shift) - 1);
    let half = 1u128 << (shift - 1);
    if remainder > half || (remainder == half && quotient & 1 == 1) {
        quotient + 1
    } else {
        quotient
    }
}

/// Encode `value` into the bit layout of `fmt`
///
/// Finite values beyond the largest representable magnitude saturate to it, values
/// below the smallest subnormal flush to a signed zero.
pub fn encode_float(value: f64, fmt: FloatFormat) -> u128 {
    let sign = if value.is_sign_negative() {
        fmt.sign_bit()
    } else {
        0
    };

    if value.is_nan() {
        return (fmt.exp_max_field() << fmt.mant_bits) | (1u128 << (fmt.mant_bits - 1));
    }
    if value.is_infinite() {
        return sign | (fmt.exp_max_field() << fmt.mant_bits);
    }
    if value == 0.0 {
        return sign;
    }

    // value = sig * 2^exp exactly
    let bits = value.abs().to_bits();
    let raw_exp = ((bits >> 52) & 0x7FF) as i32;
    let raw_mant = (bits & ((1u64 << 52) - 1)) as u128;
    let (sig, exp) = if raw_exp == 0 {
        (raw_mant, -1074)
    } else {
        (raw_mant | (1u128 << 52), raw_exp - 1075)
    };

    let sig_len = 128 - sig.leading_zeros() as i32;
    let mut e = exp + sig_len - 1;
    let bias = fmt.bias();
    let emax = bias;
    let emin = 1 - bias;
    let m = fmt.mant_bits as i32;

    if e > emax {
        return sign | fmt.max_finite();
    }

    if e >= emin {
        let shift = exp - e + m;
        let mut q = if shift >= 0 {
            sig << shift
        } else {
            round_shr(sig, (-shift) as u32)
        };
        if q >> (m + 1) != 0 {
            q >>= 1;
            e += 1;
        }
        if e > emax {
            return sign | fmt.max_finite();
        }
        let field = (e + bias) as u128;
        return sign | (field << fmt.mant_bits) | (q & fmt.mant_mask());
    }

    // Subnormal range; a carry into bit `m` produces the smallest normal
    let shift = exp - emin + m;
    let q = if shift >= 0 {
        sig << shift
    } else {
        round_shr(sig, (-shift) as u32)
    };
    sign | q
}

pub fn decode_float(bits: u128, fmt: FloatFormat) -> f64 {
    let negative = bits & fmt.sign_bit() != 0;
    let field = (bits >> fmt.mant_bits) & fmt.exp_max_field();
    let mant = bits & fmt.mant_mask();
    let m = fmt.mant_bits as i32;

    let magnitude = if field == fmt.exp_max_field() {
        if mant == 0 {
            f64::INFINITY
        } else {
            f64::NAN
        }
    } else if field == 0 {
        mant as f64 * 2f64.powi(1 - fmt.bias() - m)
    } else {
        let e = field as i32 - fmt.bias();
        ((1u128 << fmt.mant_bits) + mant) as f64 * 2f64.powi(e - m)
    };

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

fn fixed_frac_bits(width: Width) -> u32 {
    width.bits() / 2
}

/// Encode a real number as two's complement fixed point with half the bits fractional
pub fn encode_fixed(value: f64, width: Width) -> u128 {
    let frac = fixed_frac_bits(width);
    let scaled = (value * 2f64.powi(frac as i32)).round();
    let raw = if width == Width::W128 {
        scaled as i128
    } else {
        let max = (1i128 << (width.bits() - 1)) - 1;
        let min = -(1i128 << (width.bits() - 1));
        (scaled as i128).clamp(min, max)
    };
    (raw as u128) & width.mask()
}

pub fn decode_fixed(bits: u128, width: Width) -> f64 {
    sign_extend(bits, width) as f64 / 2f64.powi(fixed_frac_bits(width) as i32)
}

/// Raw fixed-point integer for bitwise operators
pub fn fixed_to_raw(value: f64, width: Width) -> i128 {
    sign_extend(encode_fixed(value, width), width)
}

pub fn raw_to_fixed(raw: i128, width: Width) -> f64 {
    decode_fixed(raw as u128 & width.mask(), width)
}

/// Reinterpret the low bits of `bits` as a signed value of `width`
pub fn sign_extend(bits: u128, width: Width) -> i128 {
    let bits = bits & width.mask();
    if width == Width::W128 {
        return bits as i128;
    }
    let shift = 128 - width.bits();
    ((bits << shift) as i128) >> shift
}

pub fn wrap_int(value: i128, width: Width) -> i128 {
    sign_extend(value as u128, width)
}

pub fn wrap_uns(value: u128, width: Width) -> u128 {
    value & width.mask()
}

/// Select 32-bit word `part` (0 = least significant) of a value of `ty`
pub fn word(bits: u128, ty: Type, part: u32) -> Result<u32, BackendError> {
    let words = ty
        .scalar_words()
        .ok_or(BackendError::CannotResolve("binary", ty, SourcePos::default()))?;
    if part as usize >= words {
        return Err(BackendError::CannotResolve(
            "binary word beyond width",
            ty,
            SourcePos::default(),
        ));
    }
    Ok((bits >> (32 * part)) as u32)
}

/// Full bit pattern of a scalar in its declared kind and width
pub fn scalar_bits(kind: ScalarKind, width: Width, value: &crate::backend::resolve::Scalar) -> u128 {
    use crate::backend::resolve::Scalar;
    match (kind, value) {
        (ScalarKind::Float, Scalar::Float(v)) => encode_float(*v, FloatFormat::for_width(width)),
        (ScalarKind::Fixed, Scalar::Fixed(v)) => encode_fixed(*v, width),
        (_, Scalar::Int(v)) => (*v as u128) & width.mask(),
        (_, Scalar::Uns(v)) => *v & width.mask(),
        (_, Scalar::Float(v)) => encode_float(*v, FloatFormat::for_width(width)),
        (_, Scalar::Fixed(v)) => encode_fixed(*v, width),
    }
}

/// Little-endian byte image of `words`
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Pack bytes into NUL-padded little-endian words
pub fn pack_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut buf = [0u8; 4];
            buf[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(buf)
        })
        .collect()
}

#[cfg(test)]
#[path = "encode_tests.rs"]
mod tests;
