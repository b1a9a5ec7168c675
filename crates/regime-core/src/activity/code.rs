use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TaxError;
use crate::TaxResult;

/// Number of digits in a CNAE 2.3 subclass code.
pub const CNAE_DIGITS: usize = 7;

/// Coarse activity category, used when no specific rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(alias = "comercio", alias = "commerce")]
    Commerce,
    #[serde(alias = "industria", alias = "industry")]
    Industry,
    #[serde(alias = "servico", alias = "service")]
    Service,
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::Commerce => "Commerce",
            Category::Industry => "Industry",
            Category::Service => "Service",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "commerce" | "comercio" | "comércio" => Ok(Category::Commerce),
            "industry" | "industria" | "indústria" => Ok(Category::Industry),
            "service" | "servico" | "serviço" | "services" => Ok(Category::Service),
            other => Err(format!(
                "unknown category '{other}' (expected commerce, industry or service)"
            )),
        }
    }
}

/// Strip separators and whitespace, keeping every other character.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '/' | '.' | '_'))
        .collect()
}

pub fn digits_only(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// `4930201` -> `4930-2/01`. Inputs that are not seven digits are returned as is.
pub fn format_canonical(digits: &str) -> String {
    if digits.len() != CNAE_DIGITS || !digits.chars().all(|c| c.is_ascii_digit()) {
        return digits.to_string();
    }
    format!("{}-{}/{}", &digits[..4], &digits[4..5], &digits[5..])
}

/// A validated CNAE subclass code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityCode {
    canonical: String,
    digits: String,
    category: Category,
}

impl ActivityCode {
    pub fn parse(raw: &str, category: Category) -> TaxResult<Self> {
        let digits = digits_only(raw);
        if digits.len() != CNAE_DIGITS || normalize(raw) != digits {
            return Err(TaxError::invalid(
                "activity_code",
                format!("'{raw}' is not a CNAE subclass (expected DDDD-D/DD)"),
            ));
        }
        Ok(ActivityCode {
            canonical: format_canonical(&digits),
            digits,
            category,
        })
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn category(&self) -> Category {
        self.category
    }
}

impl fmt::Display for ActivityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize(" 4930-2/01 "), "4930201");
        assert_eq!(normalize("49.30-2/01"), "4930201");
    }

    #[test]
    fn test_parse_accepts_dashed_and_plain_forms() {
        let a = ActivityCode::parse("4930-2/01", Category::Service).unwrap();
        let b = ActivityCode::parse("4930201", Category::Service).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.canonical(), "4930-2/01");
        assert_eq!(a.digits(), "4930201");
    }

    #[test]
    fn test_parse_rejects_wrong_length_and_letters() {
        assert!(ActivityCode::parse("4930-2", Category::Service).is_err());
        assert!(ActivityCode::parse("4930-2/0A1", Category::Service).is_err());
        assert!(ActivityCode::parse("", Category::Commerce).is_err());
    }

    #[test]
    fn test_category_from_str_accepts_portuguese() {
        assert_eq!("comércio".parse::<Category>().unwrap(), Category::Commerce);
        assert_eq!("Servico".parse::<Category>().unwrap(), Category::Service);
    }
}
