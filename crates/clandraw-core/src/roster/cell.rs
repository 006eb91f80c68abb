// Spreadsheet cell values and the "falsy is absent" policy.

use serde::{Deserialize, Serialize};

/// A single cell as delivered by the spreadsheet parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Whether the cell contributes a value.
    ///
    /// Empty cells, empty text, zero, NaN and `false` are all absent. A
    /// whitespace-only string is present: text is never trimmed.
    pub fn is_present(&self) -> bool {
        match self {
            CellValue::Empty => false,
            CellValue::Bool(b) => *b,
            CellValue::Number(n) => *n != 0.0 && !n.is_nan(),
            CellValue::Text(s) => !s.is_empty(),
        }
    }

    /// Render the cell as the string stored in a roster.
    ///
    /// Integral numbers drop the fractional part (`42.0` renders as "42").
    pub fn render(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", *n as i64)
            }
            CellValue::Number(n) => n.to_string(),
            CellValue::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsy_values_are_absent() {
        assert!(!CellValue::Empty.is_present());
        assert!(!CellValue::Text(String::new()).is_present());
        assert!(!CellValue::Number(0.0).is_present());
        assert!(!CellValue::Number(f64::NAN).is_present());
        assert!(!CellValue::Bool(false).is_present());
    }

    #[test]
    fn truthy_values_are_present() {
        assert!(CellValue::Text("alice".into()).is_present());
        assert!(CellValue::Text(" ".into()).is_present());
        assert!(CellValue::Number(-3.0).is_present());
        assert!(CellValue::Bool(true).is_present());
    }

    #[test]
    fn render_integral_numbers_without_fraction() {
        assert_eq!(CellValue::Number(42.0).render(), "42");
        assert_eq!(CellValue::Number(1.5).render(), "1.5");
        assert_eq!(CellValue::Text("Red".into()).render(), "Red");
        assert_eq!(CellValue::Empty.render(), "");
    }
}
