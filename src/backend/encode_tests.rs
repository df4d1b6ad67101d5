//! Bit patterns produced by the fixed and float encoders

use super::*;
use test_log::test;

#[cfg(test)]
mod fixed_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_fixed_32_one_and_a_half() {
        assert_eq!(encode_fixed(1.5, Width::W32), 0x0001_8000);
    }

    #[test]
    fn test_fixed_32_negative() {
        assert_eq!(encode_fixed(-1.0, Width::W32), 0xFFFF_0000);
        assert_eq!(decode_fixed(0xFFFF_0000, Width::W32), -1.0);
    }

    #[test]
    fn test_fixed_saturates_at_signed_range() {
        assert_eq!(encode_fixed(40000.0, Width::W32), 0x7FFF_FFFF);
        assert_eq!(encode_fixed(-40000.0, Width::W32), 0x8000_0000);
        assert_eq!(encode_fixed(100.0, Width::W8), 0x7F);
    }

    #[test]
    fn test_fixed_64_spans_two_words() {
        let bits = encode_fixed(1.5, Width::W64);
        let ty = Type::Scalar(ScalarKind::Fixed, Width::W64);
        assert_eq!(word(bits, ty, 0).unwrap(), 0x8000_0000);
        assert_eq!(word(bits, ty, 1).unwrap(), 0x0000_0001);
        assert!(word(bits, ty, 2).is_err());
    }

    #[test]
    fn test_fixed_raw_conversion() {
        assert_eq!(fixed_to_raw(1.0, Width::W32), 0x10000);
        assert_eq!(raw_to_fixed(0x8000, Width::W32), 0.5);
    }
}

#[cfg(test)]
mod float_tests {
    use super::*;
    use test_log::test;

    fn f16() -> FloatFormat {
        FloatFormat::for_width(Width::W16)
    }

    #[test]
    fn test_float_32_matches_native() {
        let fmt = FloatFormat::for_width(Width::W32);
        for value in [1.0f64, -2.5, 0.1, 3.4e38, 1e-40] {
            assert_eq!(
                encode_float(value, fmt) as u32,
                (value as f32).to_bits(),
                "value {}",
                value
            );
        }
    }

    #[test]
    fn test_float_64_matches_native() {
        let fmt = FloatFormat::for_width(Width::W64);
        for value in [1.0f64, -0.75, 1e300, 5e-324] {
            assert_eq!(encode_float(value, fmt) as u64, value.to_bits());
        }
    }

    #[test]
    fn test_float_16_known_values() {
        assert_eq!(encode_float(1.0, f16()), 0x3C00);
        assert_eq!(encode_float(-2.0, f16()), 0xC000);
        assert_eq!(encode_float(65504.0, f16()), 0x7BFF);
    }

    #[test]
    fn test_float_16_rounds_ties_to_even() {
        assert_eq!(encode_float(2049.0, f16()), 0x6800);
        assert_eq!(encode_float(2051.0, f16()), 0x6802);
    }

    #[test]
    fn test_float_overflow_saturates() {
        assert_eq!(encode_float(1e10, f16()), 0x7BFF);
        assert_eq!(encode_float(-1e10, f16()), 0xFBFF);
    }

    #[test]
    fn test_float_special_values() {
        assert_eq!(encode_float(f64::INFINITY, f16()), 0x7C00);
        assert_eq!(encode_float(-0.0, f16()), 0x8000);
        let nan = encode_float(f64::NAN, f16());
        assert_eq!(nan & 0x7C00, 0x7C00);
        assert_ne!(nan & 0x03FF, 0);
    }

    #[test]
    fn test_float_16_subnormal_and_flush() {
        // smallest f16 subnormal is 2^-24
        assert_eq!(encode_float(2f64.powi(-24), f16()), 0x0001);
        assert_eq!(encode_float(2f64.powi(-30), f16()), 0x0000);
    }

    #[test]
    fn test_decode_inverts_encode() {
        let fmt = FloatFormat::for_width(Width::W16);
        assert_eq!(decode_float(0x3C00, fmt), 1.0);
        assert_eq!(decode_float(0x7BFF, fmt), 65504.0);
        assert_eq!(decode_float(0x0001, fmt), 2f64.powi(-24));
    }
}

#[cfg(test)]
mod integer_tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_sign_extend_and_wrap() {
        assert_eq!(sign_extend(0xFF, Width::W8), -1);
        assert_eq!(wrap_int(128, Width::W8), -128);
        assert_eq!(wrap_uns(0x1_0000_0001, Width::W32), 1);
    }

    #[test]
    fn test_pack_bytes_little_endian() {
        assert_eq!(pack_bytes(b"AB\0\0"), vec![0x0000_4241]);
        assert_eq!(pack_bytes(b"ABCDE"), vec![0x4443_4241, 0x0000_0045]);
        assert_eq!(words_to_bytes(&[0x0403_0201]), vec![1, 2, 3, 4]);
    }
}
