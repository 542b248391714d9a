#![allow(clippy::module_name_repetitions)]
//! Pretty formatting of matrices and vectors. Useful for debugging and for
//! the verbose summary of a factorgraph.

use std::fmt::Write;

use crate::{Float, Matrix, Vector};

const PRECISION: usize = 3;
/// Values with more integral digits than this are written in scientific
/// notation
const INTEGRAL_DIGITS_LIMIT: usize = 7;

const BAR: char = '│';
const UPPER_LEFT_CORNER: char = '╭';
const UPPER_RIGHT_CORNER: char = '╮';
const LOWER_LEFT_CORNER: char = '╰';
const LOWER_RIGHT_CORNER: char = '╯';

/// Count the number of integral digits in a floating point number, including
/// the sign. Useful for determining the width of the cell when formatting a
/// matrix.
/// ```
/// use gbp_linalg::pretty_print::num_of_integral_digits;
/// assert_eq!(num_of_integral_digits(0.0), Some(1));
/// assert_eq!(num_of_integral_digits(10.0), Some(2));
/// assert_eq!(num_of_integral_digits(-10.0), Some(3));
/// assert_eq!(num_of_integral_digits(1e5), Some(6));
/// assert_eq!(num_of_integral_digits(1e-5), Some(1));
/// assert_eq!(num_of_integral_digits(f64::NAN), None);
/// assert_eq!(num_of_integral_digits(f64::INFINITY), None);
/// ```
#[must_use]
pub fn num_of_integral_digits(mut f: f64) -> Option<usize> {
    if !f.is_finite() {
        return None;
    }

    let mut count = 0_usize;
    if f.is_sign_negative() {
        f = -f;
        count += 1;
    }
    if f < 1.0 {
        return Some(count + 1);
    }
    while f >= 1.0 {
        f /= 10.0;
        count += 1;
    }

    Some(count)
}

fn cell_width<'a>(values: impl Iterator<Item = &'a Float>) -> usize {
    let widest = values
        .map(|&x| num_of_integral_digits(x).unwrap_or(4))
        .max()
        .unwrap_or(1)
        .min(INTEGRAL_DIGITS_LIMIT);
    // separator + decimal point + decimals
    widest + 2 + PRECISION + 4
}

fn format_cell(out: &mut String, x: Float, width: usize) {
    let too_wide = num_of_integral_digits(x).map_or(false, |digits| digits > INTEGRAL_DIGITS_LIMIT);
    if too_wide {
        let _ = write!(out, "{x:>width$.PRECISION$e}");
    } else {
        let _ = write!(out, "{x:>width$.PRECISION$}");
    }
}

fn format_rows<F>(name: Option<&str>, nrows: usize, ncols: usize, width: usize, at: F) -> String
where
    F: Fn(usize, usize) -> Float,
{
    let dims = format!("{nrows}x{ncols}");
    let inner_width = (ncols * width + 1).max(dims.len() + name.map_or(0, str::len) + 2);
    let mut out = String::new();

    let label = name.map_or_else(String::new, |name| format!("{name} "));
    let fill = inner_width.saturating_sub(label.chars().count() + dims.len());
    let _ = writeln!(
        out,
        "{UPPER_LEFT_CORNER}{label}{}{dims}{UPPER_RIGHT_CORNER}",
        "─".repeat(fill)
    );

    for i in 0..nrows {
        out.push(BAR);
        for j in 0..ncols {
            format_cell(&mut out, at(i, j), width);
        }
        let padding = inner_width.saturating_sub(ncols * width);
        let _ = writeln!(out, "{}{BAR}", " ".repeat(padding));
    }

    let _ = write!(
        out,
        "{LOWER_LEFT_CORNER}{}{LOWER_RIGHT_CORNER}",
        "─".repeat(inner_width)
    );
    out
}

/// Extension trait that adds a [`PrettyFormatVector::pretty_format`] method to
/// vectors. The vector is laid out as a single row.
pub trait PrettyFormatVector {
    fn pretty_format(&self, name: Option<&str>) -> String;
}

impl PrettyFormatVector for Vector<Float> {
    fn pretty_format(&self, name: Option<&str>) -> String {
        let width = cell_width(self.iter());
        format_rows(name, 1, self.len(), width, |_, j| self[j])
    }
}

/// Extension trait that adds a [`PrettyFormatMatrix::pretty_format`] method to
/// matrices.
pub trait PrettyFormatMatrix {
    fn pretty_format(&self, name: Option<&str>) -> String;
}

impl PrettyFormatMatrix for Matrix<Float> {
    fn pretty_format(&self, name: Option<&str>) -> String {
        let width = cell_width(self.iter());
        format_rows(name, self.nrows(), self.ncols(), width, |i, j| self[(i, j)])
    }
}

/// Pretty prints a vector to stderr, together with the location of the call
#[macro_export]
macro_rules! pretty_print_vector {
    ($vector:expr) => {
        eprintln!(
            "{}:{}\n{}",
            file!(),
            line!(),
            $crate::pretty_print::PrettyFormatVector::pretty_format(
                $vector,
                Some(stringify!($vector))
            )
        );
    };
    ($name:literal, $vector:expr) => {
        eprintln!(
            "{}:{}\n{}",
            file!(),
            line!(),
            $crate::pretty_print::PrettyFormatVector::pretty_format($vector, Some($name))
        );
    };
}

/// Pretty prints a matrix to stderr, together with the location of the call
#[macro_export]
macro_rules! pretty_print_matrix {
    ($matrix:expr) => {
        eprintln!(
            "{}:{}\n{}",
            file!(),
            line!(),
            $crate::pretty_print::PrettyFormatMatrix::pretty_format(
                $matrix,
                Some(stringify!($matrix))
            )
        );
    };
    ($name:literal, $matrix:expr) => {
        eprintln!(
            "{}:{}\n{}",
            file!(),
            line!(),
            $crate::pretty_print::PrettyFormatMatrix::pretty_format($matrix, Some($name))
        );
    };
}
