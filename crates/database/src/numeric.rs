//! Conversions between `U256` and the `numeric` column type.
//!
//! Postgres has no 256 bit integer so amounts are stored as `numeric`
//! columns, which map to `BigDecimal` in sqlx.

use bigdecimal::BigDecimal;
use bigdecimal::num_bigint::BigInt;
use bigdecimal::num_bigint::Sign;
use bigdecimal::num_bigint::ToBigInt;
use primitive_types::U256;

pub fn u256_to_big_decimal(value: &U256) -> BigDecimal {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    BigDecimal::from(BigInt::from_bytes_be(Sign::Plus, &bytes))
}

/// Returns `None` for fractional or negative values and for values that do
/// not fit into 256 bits.
pub fn big_decimal_to_u256(value: &BigDecimal) -> Option<U256> {
    if !value.is_integer() {
        return None;
    }
    let big_int = value.to_bigint()?;
    let (sign, bytes) = big_int.to_bytes_be();
    if sign == Sign::Minus || bytes.len() > 32 {
        return None;
    }
    Some(U256::from_big_endian(&bytes))
}
