//! Parameter values for third-party types.
//!
//! Each optional feature adds `From` impls into [`Value`](crate::Value) so
//! those types can be bound to placeholders directly:
//!
//! - `with-uuid`: `uuid::Uuid`
//! - `with-chrono`: `NaiveDate`, `NaiveTime`, `NaiveDateTime`, `DateTime<Utc>`
//! - `with-time`: `Date`, `Time`, `PrimitiveDateTime`, `OffsetDateTime`
//! - `with-rust-decimal`: `rust_decimal::Decimal`
//!
//! Temporal values render in the server's literal format:
//! `YYYY-MM-DD`, `HH:MM:SS[.ffffff]`, `YYYY-MM-DD HH:MM:SS[.ffffff]`.

#[cfg(feature = "with-chrono")]
mod chrono;
#[cfg(feature = "with-rust-decimal")]
mod decimal;
#[cfg(feature = "with-time")]
mod time;
#[cfg(feature = "with-uuid")]
mod uuid;

#[cfg(any(feature = "with-chrono", feature = "with-time"))]
use core::fmt::Write;

#[cfg(any(feature = "with-chrono", feature = "with-time"))]
fn write_date(out: &mut String, year: i32, month: u32, day: u32) {
    // Writing into a String cannot fail.
    let _ = write!(out, "{:04}-{:02}-{:02}", year, month, day);
}

/// Fractional seconds are written only when non-zero.
#[cfg(any(feature = "with-chrono", feature = "with-time"))]
fn write_time(out: &mut String, hour: u32, minute: u32, second: u32, micros: u32) {
    let _ = write!(out, "{:02}:{:02}:{:02}", hour, minute, second);
    if micros > 0 {
        let _ = write!(out, ".{:06}", micros.min(999_999));
    }
}
