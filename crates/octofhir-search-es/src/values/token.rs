//! Token search values: `[system]|[code]`.

use crate::error::{Result, SearchError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenValue {
    pub system: Option<String>,
    pub code: Option<String>,
    /// `|code` was used: the resource value must carry no system at all
    pub explicit_no_system: bool,
}

pub fn parse_token_value(param: &str) -> Result<TokenValue> {
    let invalid = || SearchError::invalid(format!("Invalid token search parameter: {param}"));

    if param == "|" {
        return Err(invalid());
    }

    let parts: Vec<&str> = param.split('|').collect();
    match parts.as_slice() {
        [code] => Ok(TokenValue {
            system: None,
            code: Some((*code).to_string()),
            explicit_no_system: false,
        }),
        [system, code] => Ok(TokenValue {
            system: (!system.is_empty()).then(|| (*system).to_string()),
            code: (!code.is_empty()).then(|| (*code).to_string()),
            explicit_no_system: system.is_empty(),
        }),
        _ => Err(invalid()),
    }
}
