//! Natural ordering for category codes ("H2" before "H10").

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

/// Case-insensitive natural comparison.
///
/// Runs of ASCII digits compare by numeric value, everything else compares
/// by lowercased characters. Equal numbers with different zero padding put the
/// shorter run first. Strings that are equal under these rules fall back to a
/// plain comparison so the order stays total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    primary_cmp(a, b).then_with(|| a.cmp(b))
}

fn primary_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        let (l, r) = match (left.peek(), right.peek()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&l), Some(&r)) => (l, r),
        };

        let ord = if l.is_ascii_digit() && r.is_ascii_digit() {
            let l_digits = take_digits(&mut left);
            let r_digits = take_digits(&mut right);
            digit_run_cmp(&l_digits, &r_digits)
        } else {
            left.next();
            right.next();
            l.to_lowercase().cmp(r.to_lowercase())
        };

        if ord != Ordering::Equal {
            return ord;
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}

fn digit_run_cmp(a: &str, b: &str) -> Ordering {
    let a_value = a.trim_start_matches('0');
    let b_value = b.trim_start_matches('0');
    a_value
        .len()
        .cmp(&b_value.len())
        .then_with(|| a_value.cmp(b_value))
        .then_with(|| a.len().cmp(&b.len()))
}
