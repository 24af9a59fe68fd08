//! Typed search values.
//!
//! A raw parameter value is first split on unescaped commas (OR semantics),
//! then each piece is parsed according to the parameter type.

pub mod date;
pub mod number;
pub mod quantity;
pub mod reference;
pub mod token;

pub use date::{DateRange, DateValue, parse_date_value};
pub use number::{NumberValue, parse_number, parse_number_value};
pub use quantity::{QuantityValue, parse_quantity_value};
pub use reference::{ReferenceValue, parse_reference_value};
pub use token::{TokenValue, parse_token_value};

use crate::error::Result;
use crate::parameters::{SearchParamDefinition, SearchParameterType};

/// One parsed OR-value of a search parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// string, uri, composite and special values are kept verbatim
    String(String),
    Number(NumberValue),
    Date(DateValue),
    Quantity(QuantityValue),
    Token(TokenValue),
    Reference(ReferenceValue),
}

/// Split a raw value on commas unless escaped as `\,`.
///
/// The escape backslash is removed and empty pieces are dropped.
pub fn or_values(raw: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => {
                if !current.is_empty() {
                    values.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        values.push(current);
    }
    values
}

/// Parse one OR-split value for the given parameter definition.
pub fn parse_value(def: &SearchParamDefinition, raw: &str) -> Result<TypedValue> {
    Ok(match def.param_type {
        SearchParameterType::Number => TypedValue::Number(parse_number_value(raw)?),
        SearchParameterType::Date => TypedValue::Date(parse_date_value(raw)?),
        SearchParameterType::Quantity => TypedValue::Quantity(parse_quantity_value(raw)?),
        SearchParameterType::Token => TypedValue::Token(parse_token_value(raw)?),
        SearchParameterType::Reference => TypedValue::Reference(parse_reference_value(def, raw)?),
        // composite and special are not interpreted
        SearchParameterType::String
        | SearchParameterType::Uri
        | SearchParameterType::Composite
        | SearchParameterType::Special => TypedValue::String(raw.to_string()),
    })
}
