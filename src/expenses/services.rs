use crate::error::ValidationError;

/// Checked form fields of an add/update command.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidExpenseInput {
    pub name: String,
    pub amount: f64,
}

/// Parses user-typed amount text. Only finite numbers above zero pass.
pub fn parse_amount(text: &str) -> Result<f64, ValidationError> {
    match text.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => Err(ValidationError::InvalidAmount),
    }
}

pub fn validate_expense_input(
    name: &str,
    amount_text: &str,
    max_name_length: usize,
) -> Result<ValidExpenseInput, ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::NameRequired);
    }
    if name.chars().count() > max_name_length {
        return Err(ValidationError::NameTooLong {
            max: max_name_length,
        });
    }
    let amount = parse_amount(amount_text)?;
    Ok(ValidExpenseInput {
        name: name.to_string(),
        amount,
    })
}
