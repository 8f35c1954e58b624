//! Arithmetic helpers with the IL trap semantics
//!
//! Division traps on a zero divisor and on `MIN / -1`; checked
//! conversions trap when the source value leaves the destination's
//! representable range; float-to-integer conversions additionally trap on
//! NaN. Shift counts are masked to the operand width.
//!
//! The one deliberate non-trap: `conv.u4` from a double yields 0 for
//! non-finite sources, matching the behavior compiled code exhibits on
//! the reference platform.

use crate::error::RuntimeExceptionKind;

type R<T> = Result<T, RuntimeExceptionKind>;

#[inline]
pub fn div_i32(a: i32, b: i32) -> R<i32> {
    if b == 0 {
        return Err(RuntimeExceptionKind::DivideByZero);
    }
    a.checked_div(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn rem_i32(a: i32, b: i32) -> R<i32> {
    if b == 0 {
        return Err(RuntimeExceptionKind::DivideByZero);
    }
    a.checked_rem(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn div_i64(a: i64, b: i64) -> R<i64> {
    if b == 0 {
        return Err(RuntimeExceptionKind::DivideByZero);
    }
    a.checked_div(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn rem_i64(a: i64, b: i64) -> R<i64> {
    if b == 0 {
        return Err(RuntimeExceptionKind::DivideByZero);
    }
    a.checked_rem(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn div_u32(a: u32, b: u32) -> R<u32> {
    if b == 0 {
        return Err(RuntimeExceptionKind::DivideByZero);
    }
    Ok(a / b)
}

#[inline]
pub fn rem_u32(a: u32, b: u32) -> R<u32> {
    if b == 0 {
        return Err(RuntimeExceptionKind::DivideByZero);
    }
    Ok(a % b)
}

#[inline]
pub fn div_u64(a: u64, b: u64) -> R<u64> {
    if b == 0 {
        return Err(RuntimeExceptionKind::DivideByZero);
    }
    Ok(a / b)
}

#[inline]
pub fn rem_u64(a: u64, b: u64) -> R<u64> {
    if b == 0 {
        return Err(RuntimeExceptionKind::DivideByZero);
    }
    Ok(a % b)
}

#[inline]
pub fn add_ovf_i32(a: i32, b: i32) -> R<i32> {
    a.checked_add(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn sub_ovf_i32(a: i32, b: i32) -> R<i32> {
    a.checked_sub(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn mul_ovf_i32(a: i32, b: i32) -> R<i32> {
    a.checked_mul(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn add_ovf_u32(a: u32, b: u32) -> R<u32> {
    a.checked_add(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn sub_ovf_u32(a: u32, b: u32) -> R<u32> {
    a.checked_sub(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn mul_ovf_u32(a: u32, b: u32) -> R<u32> {
    a.checked_mul(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn add_ovf_i64(a: i64, b: i64) -> R<i64> {
    a.checked_add(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn sub_ovf_i64(a: i64, b: i64) -> R<i64> {
    a.checked_sub(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn mul_ovf_i64(a: i64, b: i64) -> R<i64> {
    a.checked_mul(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn add_ovf_u64(a: u64, b: u64) -> R<u64> {
    a.checked_add(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn sub_ovf_u64(a: u64, b: u64) -> R<u64> {
    a.checked_sub(b).ok_or(RuntimeExceptionKind::Overflow)
}

#[inline]
pub fn mul_ovf_u64(a: u64, b: u64) -> R<u64> {
    a.checked_mul(b).ok_or(RuntimeExceptionKind::Overflow)
}

/// Shift counts mask to the operand width.
#[inline]
pub fn mask_shift_32(count: i32) -> u32 {
    (count as u32) & 31
}

#[inline]
pub fn mask_shift_64(count: i32) -> u32 {
    (count as u32) & 63
}

/// Checked narrowing of a signed 64-bit value into `[min, max]`.
#[inline]
pub fn chk_i64(v: i64, min: i64, max: i64) -> R<i64> {
    if v < min || v > max {
        Err(RuntimeExceptionKind::Overflow)
    } else {
        Ok(v)
    }
}

/// Checked narrowing of an unsigned 64-bit value into `[0, max]`.
#[inline]
pub fn chk_u64(v: u64, max: u64) -> R<u64> {
    if v > max {
        Err(RuntimeExceptionKind::Overflow)
    } else {
        Ok(v)
    }
}

/// Checked conversion of a double to an integer in `[min, max]`.
/// Truncates toward zero; NaN and out-of-range values trap.
#[inline]
pub fn chk_r8(v: f64, min: f64, max: f64) -> R<i64> {
    if v.is_nan() {
        return Err(RuntimeExceptionKind::Overflow);
    }
    let t = v.trunc();
    if t < min || t > max {
        return Err(RuntimeExceptionKind::Overflow);
    }
    Ok(t as i64)
}

/// Checked conversion of a double to u64.
#[inline]
pub fn chk_r8_u64(v: f64) -> R<u64> {
    if v.is_nan() {
        return Err(RuntimeExceptionKind::Overflow);
    }
    let t = v.trunc();
    if t < 0.0 || t >= 18446744073709551616.0 {
        return Err(RuntimeExceptionKind::Overflow);
    }
    Ok(t as u64)
}

/// Checked conversion of a double to i64.
#[inline]
pub fn chk_r8_i64(v: f64) -> R<i64> {
    if v.is_nan() {
        return Err(RuntimeExceptionKind::Overflow);
    }
    let t = v.trunc();
    if t < -9223372036854775808.0 || t >= 9223372036854775808.0 {
        return Err(RuntimeExceptionKind::Overflow);
    }
    Ok(t as i64)
}

/// Unchecked `conv.u4` from a double: non-finite sources collapse to 0,
/// finite sources truncate through i64 (the compiled-code path).
#[inline]
pub fn conv_u4_r8(v: f64) -> u32 {
    if !v.is_finite() {
        0
    } else {
        (v as i64) as u32
    }
}

/// `ckfinite`: pass finite values through, trap otherwise.
#[inline]
pub fn ckfinite(v: f64) -> R<f64> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(RuntimeExceptionKind::Arithmetic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_traps() {
        assert_eq!(div_i32(7, 2), Ok(3));
        assert_eq!(div_i32(1, 0), Err(RuntimeExceptionKind::DivideByZero));
        assert_eq!(
            div_i32(i32::MIN, -1),
            Err(RuntimeExceptionKind::Overflow)
        );
        assert_eq!(rem_i64(i64::MIN, -1), Err(RuntimeExceptionKind::Overflow));
        assert_eq!(div_u32(u32::MAX, 2), Ok(u32::MAX / 2));
        assert_eq!(div_u64(1, 0), Err(RuntimeExceptionKind::DivideByZero));
    }

    #[test]
    fn checked_narrowing_boundaries() {
        assert_eq!(chk_i64(127, -128, 127), Ok(127));
        assert_eq!(chk_i64(128, -128, 127), Err(RuntimeExceptionKind::Overflow));
        assert_eq!(chk_i64(-128, -128, 127), Ok(-128));
        assert_eq!(chk_i64(-129, -128, 127), Err(RuntimeExceptionKind::Overflow));
        assert_eq!(chk_u64(65535, 65535), Ok(65535));
        assert_eq!(chk_u64(65536, 65535), Err(RuntimeExceptionKind::Overflow));
    }

    #[test]
    fn float_conversions_trap_on_nan_and_range() {
        assert!(chk_r8(f64::NAN, -128.0, 127.0).is_err());
        assert!(chk_r8(f64::INFINITY, -128.0, 127.0).is_err());
        assert_eq!(chk_r8(127.9, -128.0, 127.0), Ok(127));
        assert_eq!(chk_r8(-0.9, -128.0, 127.0), Ok(0));
        assert!(chk_r8_i64(9.3e18).is_err());
        assert_eq!(chk_r8_u64(42.7), Ok(42));
    }

    #[test]
    fn conv_u4_of_infinity_is_zero() {
        assert_eq!(conv_u4_r8(f64::INFINITY), 0);
        assert_eq!(conv_u4_r8(f64::NEG_INFINITY), 0);
        assert_eq!(conv_u4_r8(f64::NAN), 0);
        assert_eq!(conv_u4_r8(4.9), 4);
        assert_eq!(conv_u4_r8(-1.0), u32::MAX);
    }

    #[test]
    fn shift_counts_mask_to_width() {
        assert_eq!(mask_shift_32(33), 1);
        assert_eq!(mask_shift_64(64), 0);
        assert_eq!(1i64 << mask_shift_64(65), 2);
    }

    #[test]
    fn ckfinite_traps_on_nan() {
        assert!(ckfinite(1.5).is_ok());
        assert_eq!(ckfinite(f64::NAN), Err(RuntimeExceptionKind::Arithmetic));
        assert_eq!(
            ckfinite(f64::INFINITY),
            Err(RuntimeExceptionKind::Arithmetic)
        );
    }
}
