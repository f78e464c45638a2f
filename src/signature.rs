// Argument validation for the built-in functions

use crate::errors::EvaluatorError;
use crate::value::Value;

/// Parameter requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

/// One named argument of a function
#[derive(Debug, Clone, Copy)]
pub struct Parameter {
    pub name: &'static str,
    pub requirement: Requirement,
}

/// Function signature: the sub-keys a function reads from its argument mapping
#[derive(Debug, Clone)]
pub struct Signature {
    pub function: &'static str,
    pub params: Vec<Parameter>,
}

impl Signature {
    /// Create a new signature
    pub fn new(function: &'static str) -> Self {
        Signature {
            function,
            params: Vec::new(),
        }
    }

    pub fn required(mut self, name: &'static str) -> Self {
        self.params.push(Parameter {
            name,
            requirement: Requirement::Required,
        });
        self
    }

    pub fn optional(mut self, name: &'static str) -> Self {
        self.params.push(Parameter {
            name,
            requirement: Requirement::Optional,
        });
        self
    }

    /// Check that every required argument is present and truthy
    pub fn validate(&self, args: &Value) -> Result<(), EvaluatorError> {
        for param in &self.params {
            if param.requirement != Requirement::Required {
                continue;
            }
            let present = args.get(param.name).map_or(false, Value::is_truthy);
            if !present {
                return Err(EvaluatorError::missing_argument(self.function, param.name)
                    .with_source(args.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::value;

    #[test]
    fn test_signature_validation() {
        let sig = Signature::new("each").required("of").required("do").optional("parseInput");

        // Valid: both required args provided
        assert!(sig.validate(&value!({"of": [1], "do": {}})).is_ok());

        // Invalid: missing 'do'
        let err = sig.validate(&value!({"of": [1]})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingRequiredArgument);
        assert_eq!(err.message, "for each please supply 'do:'");
        assert_eq!(err.source_fragment, Some(value!({"of": [1]})));

        // Invalid: not a mapping at all
        assert!(sig.validate(&Value::from("x")).is_err());
    }
}
