use serde_json::Value;
use std::io::{self, Read};

/// Read a piped request from stdin, JSON first and YAML otherwise.
/// Returns None if stdin is a TTY (interactive) or empty.
pub fn read_stdin() -> Result<Option<Value>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    parse(&buffer)
}

fn parse(buffer: &str) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(Some(value)),
        Err(json_err) => match serde_yaml::from_str::<Value>(trimmed) {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(format!("stdin is neither JSON nor YAML: {}", json_err).into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_none() {
        assert!(parse("  \n").unwrap().is_none());
    }

    #[test]
    fn test_yaml_input() {
        let v = parse("activity_code: 7112-0/00\nannual_revenue: '600000'\n")
            .unwrap()
            .unwrap();
        assert_eq!(v["activity_code"], "7112-0/00");
    }
}
