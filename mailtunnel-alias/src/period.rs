//! Period arithmetic
//!
//! A title is time scoped by an optional postfix naming the period
//! (`FORM13`, `FORM2013`, `FORM1314`) and an optional prefix shifting it by a
//! number of years (`GFORM` is last year's FORM, `K3FORM` the FORM three years
//! on).

use std::sync::LazyLock;

use mailtunnel_common::internal;
use regex::Regex;

use crate::{FactSource, error::PeriodError};

#[allow(clippy::expect_used, reason = "compile-time constant regex should be valid")]
static PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("([KGBOT])([0-9]*)").expect("Invalid prefix regex"));

/// Two-digit years above this are in the 1900s
const CENTURY_PIVOT: i32 = 56;

const fn two_digit_year(year: i32) -> i32 {
    if year > CENTURY_PIVOT {
        1900 + year
    } else {
        2000 + year
    }
}

fn postfix_period(postfix: &str, base: i32) -> Result<i32, PeriodError> {
    let invalid = || PeriodError::InvalidPostfix(postfix.to_string());
    if !postfix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let number = |digits: &str| digits.parse::<i32>().map_err(|_| invalid());
    match postfix.len() {
        0 => Ok(base),
        2 => number(postfix).map(two_digit_year),
        4 => {
            let (first, second) = (number(&postfix[..2])?, number(&postfix[2..])?);
            if (first + 1) % 100 == second {
                Ok(two_digit_year(first))
            } else if first == 19 || first == 20 {
                number(postfix)
            } else {
                Err(invalid())
            }
        }
        _ => Err(invalid()),
    }
}

fn grade(prefix: &str) -> Result<i32, PeriodError> {
    let invalid = || PeriodError::InvalidPrefix(prefix.to_string());

    PREFIX.captures_iter(prefix).try_fold(0_i32, |grade, captures| {
        let multiplier = match &captures[1] {
            "K" => -1_i32,
            "G" | "T" => 1,
            "B" => 2,
            "O" => 3,
            _ => return Err(invalid()),
        };
        let exponent = match &captures[2] {
            "" => 1,
            digits => digits.parse::<i32>().map_err(|_| invalid())?,
        };

        multiplier
            .checked_mul(exponent)
            .and_then(|step| grade.checked_add(step))
            .ok_or_else(invalid)
    })
}

///
/// The period a title with the given prefix and postfix refers to, relative to
/// `base` when there is no postfix.
///
/// A four-digit postfix of two consecutive two-digit years is a single board
/// year named by its first half, so `1415` is 2014 and `1920` is 2019. Other
/// four-digit postfixes are only accepted as literal `19xx`/`20xx` years.
///
/// # Errors
/// If the postfix is not empty, two or four digits, or the prefix overflows
///
/// # Examples
///
/// ```
/// use mailtunnel_alias::period::resolve_period;
///
/// assert_eq!(resolve_period("", "1415", 2000), Ok(2014));
/// assert_eq!(resolve_period("K3", "", 2010), Ok(2013));
/// assert_eq!(resolve_period("G", "14", 2000), Ok(2013));
/// ```
///
pub fn resolve_period(prefix: &str, postfix: &str, base: i32) -> Result<i32, PeriodError> {
    let period = postfix_period(postfix, base)?;
    period
        .checked_sub(grade(prefix)?)
        .ok_or_else(|| PeriodError::InvalidPrefix(prefix.to_string()))
}

/// Read the current period from `facts`, reusing `previous` when the read fails
pub fn refresh_current_period(facts: &dyn FactSource, previous: Option<i32>) -> Option<i32> {
    match facts.current_period() {
        Ok(period) => {
            if let Some(old) = previous
                && old != period
            {
                internal!(level = INFO, "Current period changed from {old} to {period}");
            }
            Some(period)
        }
        Err(err) => {
            internal!(
                level = ERROR,
                "Failed to get current period, reusing cached value {previous:?}: {err}"
            );
            previous
        }
    }
}
